//! Visual styling utilities for the CLI.
//!
//! Spinners for the slow BLE steps, colour bands for glucose and skin
//! temperature, and the small status prefixes used on stderr.

use std::time::Duration;

use glucopatch_core::LogLevel;
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;

// ============================================================================
// Progress Indicators
// ============================================================================

/// Standard spinner tick characters (Braille dots animation)
const SPINNER_TICK_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Standard spinner tick interval
const SPINNER_TICK_MS: u64 = 80;

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
        .tick_chars(SPINNER_TICK_CHARS)
}

fn spinner(message: String) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(spinner_style());
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(SPINNER_TICK_MS));
    pb
}

/// Create a spinner for scanning operations.
pub fn scanning_spinner(timeout_secs: u64) -> ProgressBar {
    spinner(format!("Scanning for patches... ({}s)", timeout_secs))
}

// ============================================================================
// Color Thresholds
// ============================================================================

/// Glucose bands (mg/dL).
pub mod glucose {
    pub const LOW: f64 = 70.0; // Red: < 70
    pub const HIGH: f64 = 180.0; // Yellow: 180-250
    pub const VERY_HIGH: f64 = 250.0; // Red: > 250
}

/// Skin temperature bands (Celsius).
pub mod temperature {
    pub const COLD: f64 = 35.0; // Cyan: < 35°C
    pub const WARM: f64 = 38.0; // Orange: > 38°C
}

// ============================================================================
// Colored Value Formatting
// ============================================================================

/// Format a glucose value with a colour for its band.
pub fn format_glucose_colored(mg_dl: f64, no_color: bool) -> String {
    let formatted = format!("{}", mg_dl);
    if no_color {
        return formatted;
    }

    if mg_dl < glucose::LOW || mg_dl > glucose::VERY_HIGH {
        format!("{}", formatted.red())
    } else if mg_dl > glucose::HIGH {
        format!("{}", formatted.yellow())
    } else {
        format!("{}", formatted.green())
    }
}

/// Format skin temperature with appropriate color.
pub fn format_temp_colored(celsius: f64, no_color: bool) -> String {
    let formatted = format!("{}", celsius);
    if no_color {
        return formatted;
    }

    if celsius < temperature::COLD {
        format!("{}", formatted.cyan())
    } else if celsius > temperature::WARM {
        // Orange color (RGB: 255, 165, 0)
        format!("{}", formatted.truecolor(255, 165, 0))
    } else {
        format!("{}", formatted.green())
    }
}

/// Get a short label for a glucose value.
pub fn glucose_band(mg_dl: f64) -> &'static str {
    if mg_dl < glucose::LOW {
        "Low"
    } else if mg_dl <= glucose::HIGH {
        "In range"
    } else if mg_dl <= glucose::VERY_HIGH {
        "High"
    } else {
        "Very high"
    }
}

// ============================================================================
// Signal Strength Bar
// ============================================================================

/// Format RSSI as a visual signal bar.
/// RSSI typically ranges from -100 dBm (weak) to -30 dBm (strong).
pub fn format_signal_bar(rssi: Option<i16>, no_color: bool) -> String {
    let Some(rssi) = rssi else {
        return "N/A".to_string();
    };

    // -30 dBm = excellent (10), -100 dBm = very weak (0)
    let filled = ((rssi + 100).clamp(0, 70) as f32 / 7.0).round() as usize;
    let filled = filled.min(10);
    let bar = format!("{}{}", "█".repeat(filled), "░".repeat(10 - filled));

    if no_color {
        format!("{} {:>4}", bar, rssi)
    } else if filled >= 7 {
        format!("{} {:>4}", bar.green(), rssi)
    } else if filled >= 4 {
        format!("{} {:>4}", bar.yellow(), rssi)
    } else {
        format!("{} {:>4}", bar.red(), rssi)
    }
}

// ============================================================================
// Status Messages
// ============================================================================

/// Format a success message.
pub fn format_success(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[OK] {}", message)
    } else {
        format!("{} {}", "[OK]".green(), message)
    }
}

/// Format a warning message.
pub fn format_warning(message: &str, no_color: bool) -> String {
    if no_color {
        format!("[!!] {}", message)
    } else {
        format!("{} {}", "[!!]".yellow(), message)
    }
}

/// Format one diagnostic log line for stderr.
pub fn format_log_line(time: &str, level: LogLevel, message: &str, no_color: bool) -> String {
    let label = format!("{:<5}", level.to_string());
    if no_color {
        return format!("[{}] {} {}", time, label, message);
    }
    let label = match level {
        LogLevel::Info => format!("{}", label.dimmed()),
        LogLevel::Warn => format!("{}", label.yellow()),
        LogLevel::Error => format!("{}", label.red().bold()),
    };
    format!("[{}] {} {}", time.dimmed(), label, message)
}

/// Format a title header.
pub fn format_title(title: &str, no_color: bool) -> String {
    if no_color {
        format!("{}\n{}", title, "━".repeat(title.chars().count()))
    } else {
        format!(
            "{}\n{}",
            title.bold(),
            "━".repeat(title.chars().count()).dimmed()
        )
    }
}

/// Apply the standard table style.
pub fn apply_table_style(table: &mut tabled::Table) {
    table.with(tabled::settings::Style::rounded());
}
