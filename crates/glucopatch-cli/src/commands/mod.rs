//! Command implementations for the CLI.

mod config;
mod decode;
mod scan;
mod watch;

pub use config::cmd_config;
pub use decode::cmd_decode;
pub use scan::cmd_scan;
pub use watch::{WatchArgs, cmd_watch};
