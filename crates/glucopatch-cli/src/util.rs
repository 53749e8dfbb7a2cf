//! Utility functions for CLI operations.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use dialoguer::{Select, theme::ColorfulTheme};
use glucopatch_core::{
    ByIdentifier, DeviceChooser, DiscoveredDevice, DiscoveryError, LogEntry, LogLevel,
};

use crate::style;

/// Chooses the device to connect to after a scan.
///
/// An explicit identifier wins. Otherwise a single candidate is taken as is,
/// and several candidates are offered in a prompt when stdin and stderr are
/// terminals (strongest signal first when they are not).
#[derive(Debug, Clone, Default)]
pub struct PromptChooser {
    preferred: Option<String>,
}

impl PromptChooser {
    pub fn new(preferred: Option<String>) -> Self {
        Self { preferred }
    }

    fn interactive() -> bool {
        io::stdin().is_terminal() && io::stderr().is_terminal()
    }
}

impl DeviceChooser for PromptChooser {
    fn choose(
        &self,
        candidates: &[DiscoveredDevice],
    ) -> std::result::Result<DiscoveredDevice, DiscoveryError> {
        if let Some(wanted) = &self.preferred {
            return ByIdentifier(wanted.clone()).choose(candidates);
        }
        if candidates.len() == 1 || !Self::interactive() {
            return candidates.first().cloned().ok_or(DiscoveryError::Cancelled);
        }

        let items: Vec<String> = candidates.iter().map(describe_device).collect();
        let selection = Select::with_theme(&ColorfulTheme::default())
            .with_prompt("Select a patch")
            .items(&items)
            .default(0)
            .interact_opt();

        match selection {
            Ok(Some(index)) => candidates
                .get(index)
                .cloned()
                .ok_or(DiscoveryError::Cancelled),
            Ok(None) | Err(_) => Err(DiscoveryError::Cancelled),
        }
    }
}

/// One-line label for a device in prompts.
pub fn describe_device(device: &DiscoveredDevice) -> String {
    match device.rssi {
        Some(rssi) => format!("{} ({}, {} dBm)", device.display_name(), device.id, rssi),
        None => format!("{} ({})", device.display_name(), device.id),
    }
}

/// Print a diagnostic log entry on stderr. Quiet mode keeps warnings and errors.
pub fn print_log_entry(entry: &LogEntry, quiet: bool, no_color: bool) {
    if quiet && entry.level == LogLevel::Info {
        return;
    }
    eprintln!(
        "{}",
        style::format_log_line(&entry.time, entry.level, &entry.message, no_color)
    );
}

/// Write output to file or stdout
pub fn write_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, content)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}

/// Append output to a file, or write to stdout.
pub fn append_output(output: Option<&PathBuf>, content: &str) -> Result<()> {
    match output {
        Some(path) => {
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open {}", path.display()))?;
            file.write_all(content.as_bytes())
                .with_context(|| format!("Failed to write to {}", path.display()))?;
        }
        None => {
            print!("{}", content);
            io::stdout().flush()?;
        }
    }
    Ok(())
}
