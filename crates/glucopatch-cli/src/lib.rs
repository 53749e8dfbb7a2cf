//! Command-line interface for GlucoPatch sensor patches.
//!
//! The `glucopatch` binary scans for patches, streams their readings and
//! hosts an interactive terminal dashboard with live glucose and
//! temperature charts.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `scan` | Scan for nearby patches |
//! | `watch` | Connect and print readings as they arrive |
//! | `decode` | Decode a single payload offline |
//! | `dashboard` | Launch the terminal dashboard |
//! | `config` | Inspect or create the config file |
//! | `completions` | Generate shell completions |
//!
//! # Configuration
//!
//! Settings live in `~/.config/glucopatch/config.toml` (or the platform
//! equivalent); `--config PATH` points at another file. See
//! [`config::Config`] for the available keys. Command-line flags always win
//! over the file.
//!
//! # Environment Variables
//!
//! - `GLUCOPATCH_DEVICE`: default device for `watch` and `dashboard`
//! - `NO_COLOR`: disable colored output when set
//! - `RUST_LOG`: log filter when neither `--verbose` nor `--quiet` is given
//!
//! # Examples
//!
//! Stream readings from the nearest patch as CSV:
//! ```bash
//! glucopatch watch --format csv
//! ```
//!
//! Try the dashboard without hardware:
//! ```bash
//! glucopatch dashboard --demo
//! ```

use std::time::Duration;

use time::UtcOffset;

// Re-export core dependencies for convenience
pub use glucopatch_core;
pub use glucopatch_types;

pub mod config;

/// Interval between simulated readings with `--demo`.
pub const DEMO_INTERVAL: Duration = Duration::from_secs(1);

/// The local UTC offset, falling back to UTC when it cannot be determined.
///
/// Must be called before any other thread is started: the lookup refuses to
/// run in a multi-threaded process on most Unix platforms.
pub fn local_clock_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

// TUI module - publicly exposed for glucopatch-tui crate to use
#[cfg(feature = "tui")]
pub mod tui;
