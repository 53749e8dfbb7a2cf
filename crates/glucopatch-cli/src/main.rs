//! GlucoPatch command-line interface.

mod cli;
mod commands;
mod format;
mod style;
mod util;

use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use glucopatch_cli::{DEMO_INTERVAL, local_clock_offset};
use glucopatch_cli::config::{Config, resolve_device};
use glucopatch_core::{BleTransport, MockTransport, Session};
use time::UtcOffset;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Commands};
use commands::{WatchArgs, cmd_config, cmd_decode, cmd_scan, cmd_watch};
use format::FormatOptions;
use util::PromptChooser;

fn main() -> Result<ExitCode> {
    human_panic::setup_panic!();

    // Read while the process is still single-threaded.
    let clock_offset = local_clock_offset();

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(run(clock_offset))
}

async fn run(clock_offset: UtcOffset) -> Result<ExitCode> {
    let cli = Cli::parse();

    // Handle completions command early (before config and tracing)
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "glucopatch", &mut io::stdout());
        return Ok(ExitCode::SUCCESS);
    }

    let config = Config::load(cli.config.as_deref());
    let no_color = cli.no_color || config.no_color;

    // The dashboard owns the screen; its log panel replaces stderr logging.
    #[cfg(feature = "tui")]
    let dashboard = matches!(cli.command, Commands::Dashboard { .. });
    #[cfg(not(feature = "tui"))]
    let dashboard = false;
    if !dashboard {
        init_tracing(cli.verbose, cli.quiet);
    }

    let opts = FormatOptions::new(no_color)
        .with_compact(cli.compact)
        .with_clock_offset(clock_offset);
    let output = cli.output.as_ref();

    match cli.command {
        Commands::Scan { filter, format } => {
            let options = config.scan_options(&filter.into())?;
            let transport = BleTransport::new();
            cmd_scan(&transport, &options, format, output, cli.quiet, &opts).await?;
        }
        Commands::Watch {
            device,
            filter,
            count,
            format,
            no_header,
            demo,
        } => {
            let session_config = config
                .session_config(&filter.into())?
                .clock_offset(clock_offset);
            let chooser = PromptChooser::new(resolve_device(device, &config));
            let opts = opts.with_no_header(no_header);
            let args = WatchArgs {
                chooser: &chooser,
                count,
                format,
                output,
                quiet: cli.quiet,
                opts: &opts,
            };
            if demo {
                let transport = Arc::new(MockTransport::demo(DEMO_INTERVAL));
                cmd_watch(&Session::new(transport, session_config), args).await?;
            } else {
                let transport = Arc::new(BleTransport::new());
                cmd_watch(&Session::new(transport, session_config), args).await?;
            }
        }
        Commands::Decode { payload, format } => {
            if !cmd_decode(payload, format, output, cli.quiet, clock_offset, &opts)? {
                return Ok(ExitCode::FAILURE);
            }
        }
        #[cfg(feature = "tui")]
        Commands::Dashboard { device, demo } => {
            glucopatch_cli::tui::run(&config, device, demo, clock_offset).await?;
        }
        Commands::Config { action } => {
            cmd_config(action, cli.config.as_deref(), output, no_color)?;
        }
        // Handled before config was loaded.
        Commands::Completions { .. } => {}
    }

    Ok(ExitCode::SUCCESS)
}

/// Install the stderr log subscriber.
///
/// Session log entries are already printed by the commands themselves, so
/// their tracing mirror stays off unless `--verbose` or `RUST_LOG` asks.
fn init_tracing(verbose: bool, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("warn,glucopatch::session=off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,glucopatch::session=off"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}
