//! Color helper functions for the TUI.
//!
//! # Glucose Color Coding
//!
//! | Range (mg/dL) | Color  | Label     |
//! |---------------|--------|-----------|
//! | below 70      | Red    | Low       |
//! | 70-180        | Green  | In range  |
//! | 181-250       | Yellow | High      |
//! | above 250     | Red    | Very high |

use glucopatch_core::{ConnectionState, LogLevel};
use ratatui::style::Color;

/// Orange used for warm skin temperature.
const ORANGE: Color = Color::Rgb(255, 165, 0);

/// Band label and color for a glucose value.
#[must_use]
pub fn glucose_band(mg_dl: f64) -> (&'static str, Color) {
    if mg_dl < 70.0 {
        ("Low", Color::Red)
    } else if mg_dl <= 180.0 {
        ("In range", Color::Green)
    } else if mg_dl <= 250.0 {
        ("High", Color::Yellow)
    } else {
        ("Very high", Color::Red)
    }
}

/// Color for a skin temperature in °C.
#[must_use]
pub fn temperature_color(celsius: f64) -> Color {
    if celsius < 35.0 {
        Color::Cyan
    } else if celsius > 38.0 {
        ORANGE
    } else {
        Color::Green
    }
}

#[must_use]
pub fn state_color(state: ConnectionState) -> Color {
    match state {
        ConnectionState::Connected => Color::Green,
        ConnectionState::Connecting => Color::Yellow,
        ConnectionState::Disconnected => Color::DarkGray,
    }
}

#[must_use]
pub fn level_color(level: LogLevel) -> Color {
    match level {
        LogLevel::Info => Color::Gray,
        LogLevel::Warn => Color::Yellow,
        LogLevel::Error => Color::Red,
    }
}
