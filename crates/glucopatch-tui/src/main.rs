//! Standalone GlucoPatch dashboard.
//!
//! Usage: `glucopatch-tui [--demo]`. The device comes from
//! `GLUCOPATCH_DEVICE` or the config file; everything else is read from the
//! config file.

use anyhow::Result;
use glucopatch_cli::config::Config;
use glucopatch_cli::{local_clock_offset, tui};
use time::UtcOffset;

fn main() -> Result<()> {
    // Read while the process is still single-threaded.
    let clock_offset = local_clock_offset();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(clock_offset))
}

async fn run(clock_offset: UtcOffset) -> Result<()> {
    let demo = std::env::args().skip(1).any(|arg| arg == "--demo");
    let device = std::env::var("GLUCOPATCH_DEVICE")
        .ok()
        .filter(|d| !d.is_empty());

    let config = Config::load(None);
    tui::run(&config, device, demo, clock_offset).await
}
