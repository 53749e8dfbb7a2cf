//! Watch command implementation.
//!
//! Connects once, then prints every reading the patch notifies until the
//! requested count is reached, the link drops or Ctrl+C is pressed. The
//! session's diagnostic log goes to stderr so stdout stays machine-readable.
//! There is no automatic reconnect.

use std::path::PathBuf;

use anyhow::{Context, Result};
use glucopatch_core::{
    ConnectionState, DeviceChooser, EventReceiver, LogEntry, Reading, Session,
    SessionEvent, Transport,
};
use owo_colors::OwoColorize;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::cli::OutputFormat;
use crate::format::{
    FormatOptions, format_watch_csv_header, format_watch_csv_line, format_watch_json_line,
    format_watch_line,
};
use crate::style;
use crate::util::{append_output, print_log_entry, write_output};

/// Arguments for the watch command.
pub struct WatchArgs<'a> {
    pub chooser: &'a dyn DeviceChooser,
    pub count: u32,
    pub format: OutputFormat,
    pub output: Option<&'a PathBuf>,
    pub quiet: bool,
    pub opts: &'a FormatOptions,
}

pub async fn cmd_watch<T: Transport>(session: &Session<T>, args: WatchArgs<'_>) -> Result<()> {
    let WatchArgs {
        chooser,
        count,
        format,
        output,
        quiet,
        opts,
    } = args;

    let mut events = session.subscribe();
    let log = LogPrinter { quiet, opts };

    let connect = session.connect(chooser);
    tokio::pin!(connect);
    let result = loop {
        tokio::select! {
            result = &mut connect => break result,
            event = events.recv() => {
                if let Ok(SessionEvent::Log { entry }) = event {
                    log.print(&entry);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nCancelled.");
                return Ok(());
            }
        }
    };
    log.drain(&mut events);
    let device = result.context("Could not connect to a patch")?;

    if !quiet {
        let header = if opts.no_color {
            format!("Watching: {} ({})", device.display_name(), device.id)
        } else {
            format!(
                "Watching: {} ({})",
                device.display_name().green(),
                device.id.cyan()
            )
        };
        eprintln!("{}", header);
        if count > 0 {
            eprintln!("Count: {} | Press Ctrl+C to stop", count);
        } else {
            eprintln!("Press Ctrl+C to stop");
        }
        eprintln!("{}", "-".repeat(50));
    }

    let mut sink = ReadingSink::new(format, output, opts);
    let mut received: u32 = 0;

    while count == 0 || received < count {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!();
                break;
            }
            event = events.recv() => match event {
                Ok(SessionEvent::ReadingAppended { reading }) => {
                    sink.write(&reading)?;
                    received += 1;
                }
                Ok(SessionEvent::Log { entry }) => log.print(&entry),
                Ok(SessionEvent::StateChanged { state: ConnectionState::Disconnected }) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!(
                        "{}",
                        style::format_warning(
                            &format!("Output fell behind; {} event(s) skipped", skipped),
                            opts.no_color
                        )
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    session
        .disconnect()
        .await
        .context("Failed to disconnect cleanly")?;
    log.drain(&mut events);

    if !quiet {
        eprintln!(
            "{}",
            style::format_success(&format!("Received {} reading(s).", received), opts.no_color)
        );
    }
    Ok(())
}

/// Renders session log entries on stderr.
struct LogPrinter<'a> {
    quiet: bool,
    opts: &'a FormatOptions,
}

impl LogPrinter<'_> {
    fn print(&self, entry: &LogEntry) {
        print_log_entry(entry, self.quiet, self.opts.no_color);
    }

    /// Print log entries already queued on `events`, discarding the rest.
    fn drain(&self, events: &mut EventReceiver) {
        loop {
            match events.try_recv() {
                Ok(SessionEvent::Log { entry }) => self.print(&entry),
                Ok(_) | Err(TryRecvError::Lagged(_)) => {}
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }
}

/// Writes readings in the chosen format.
struct ReadingSink<'a> {
    format: OutputFormat,
    output: Option<&'a PathBuf>,
    opts: &'a FormatOptions,
    header_written: bool,
    started: bool,
}

impl<'a> ReadingSink<'a> {
    fn new(format: OutputFormat, output: Option<&'a PathBuf>, opts: &'a FormatOptions) -> Self {
        Self {
            format,
            output,
            opts,
            header_written: opts.no_header,
            started: false,
        }
    }

    fn write(&mut self, reading: &Reading) -> Result<()> {
        let content = match self.format {
            OutputFormat::Text => format_watch_line(reading, self.opts),
            OutputFormat::Json => format_watch_json_line(reading)?,
            OutputFormat::Csv => {
                let mut content = String::new();
                if !self.header_written {
                    content.push_str(format_watch_csv_header());
                    self.header_written = true;
                }
                content.push_str(&format_watch_csv_line(reading));
                content
            }
        };

        // A fresh run replaces the file unless rows are being appended.
        if !self.started && !self.opts.no_header {
            write_output(self.output, &content)?;
        } else {
            append_output(self.output, &content)?;
        }
        self.started = true;
        Ok(())
    }
}
