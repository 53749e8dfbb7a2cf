//! Core types for GlucoPatch sensor data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;

/// A single glucose/temperature sample reported by the patch.
///
/// Values are stored exactly as the patch reported them. `timestamp` is the
/// patch-supplied ISO-8601 string when present, otherwise the RFC 3339
/// rendering of the decode instant.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Reading {
    /// Sample time as reported by the patch (or filled in at decode time).
    pub timestamp: String,
    /// Blood glucose in mg/dL.
    #[cfg_attr(feature = "serde", serde(rename = "glucose_mg_dL"))]
    pub glucose_mg_dl: f64,
    /// Skin temperature in degrees Celsius.
    #[cfg_attr(feature = "serde", serde(rename = "temperature_C"))]
    pub temperature_c: f64,
    /// Opaque firmware uptime string, passed through untouched.
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub uptime: Option<String>,
    /// Host wall clock when the frame was decoded.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub received_at: OffsetDateTime,
}

impl Reading {
    /// Create a reading received at `received_at` with the given sample values.
    #[must_use]
    pub fn new(
        timestamp: impl Into<String>,
        glucose_mg_dl: f64,
        temperature_c: f64,
        received_at: OffsetDateTime,
    ) -> Self {
        Self {
            timestamp: timestamp.into(),
            glucose_mg_dl,
            temperature_c,
            uptime: None,
            received_at,
        }
    }

    /// Parse `timestamp` as RFC 3339.
    ///
    /// Returns `None` when the patch sent a timestamp in some other format.
    #[must_use]
    pub fn parsed_timestamp(&self) -> Option<OffsetDateTime> {
        OffsetDateTime::parse(&self.timestamp, &Rfc3339).ok()
    }

    /// The instant this reading should be plotted at.
    ///
    /// Uses the patch timestamp when it is RFC 3339, else the receipt time.
    #[must_use]
    pub fn plot_time(&self) -> OffsetDateTime {
        self.parsed_timestamp().unwrap_or(self.received_at)
    }
}

impl fmt::Display for Reading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} mg/dL, {} °C @ {}",
            self.glucose_mg_dl, self.temperature_c, self.timestamp
        )
    }
}

/// Severity of a diagnostic log entry. Only used for colouring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LogLevel {
    #[default]
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

/// One line of the human-readable diagnostic log.
///
/// Entries are never parsed back; `time` is a display string.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LogEntry {
    /// Wall-clock time of day the entry was recorded (`HH:MM:SS`).
    pub time: String,
    /// Free-form message.
    pub message: String,
    /// Entry severity.
    #[cfg_attr(feature = "serde", serde(default))]
    pub level: LogLevel,
}

impl LogEntry {
    /// Create an entry stamped with the given instant.
    #[must_use]
    pub fn at(level: LogLevel, message: impl Into<String>, when: OffsetDateTime) -> Self {
        let clock = format_description!("[hour]:[minute]:[second]");
        let time = when
            .format(&clock)
            .unwrap_or_else(|_| when.unix_timestamp().to_string());
        Self {
            time,
            message: message.into(),
            level,
        }
    }

    /// Create an entry stamped with the current time at `offset`.
    #[must_use]
    pub fn now(level: LogLevel, message: impl Into<String>, offset: UtcOffset) -> Self {
        Self::at(level, message, OffsetDateTime::now_utc().to_offset(offset))
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.time, self.message)
    }
}
