//! Output formatting utilities for text, JSON, and CSV output.

use anyhow::Result;
use glucopatch_core::{DecodeError, DiscoveredDevice, DiscoveryFilter, Reading};
use owo_colors::OwoColorize;
use serde::Serialize;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use crate::style;

/// Formatting options for output.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
    /// Offset for wall-clock times (captured at startup).
    pub clock_offset: UtcOffset,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            no_color: false,
            no_header: false,
            compact: false,
            clock_offset: UtcOffset::UTC,
        }
    }
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            ..Self::default()
        }
    }

    /// Create with the offset wall-clock times are shown at.
    pub fn with_clock_offset(mut self, offset: UtcOffset) -> Self {
        self.clock_offset = offset;
        self
    }

    /// Create with no_header option for CSV output.
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }

    /// Create with compact JSON option.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }
}

/// Escape a string for CSV output.
/// Wraps the value in quotes if it contains commas, quotes, or newlines.
/// Double quotes are escaped by doubling them.
#[must_use]
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Receipt time as wall clock `HH:MM:SS` at `offset`.
fn local_clock(at: OffsetDateTime, offset: UtcOffset) -> String {
    at.to_offset(offset)
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_else(|_| "??:??:??".to_string())
}

fn rfc3339(at: OffsetDateTime) -> String {
    at.format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| at.unix_timestamp().to_string())
}

// ============================================================================
// Scan formatting
// ============================================================================

pub fn format_scan_json(devices: &[DiscoveredDevice], opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ScanResult<'a> {
        count: usize,
        devices: &'a [DiscoveredDevice],
    }

    opts.as_json(&ScanResult {
        count: devices.len(),
        devices,
    })
}

#[must_use]
pub fn format_scan_text(
    devices: &[DiscoveredDevice],
    filter: &DiscoveryFilter,
    opts: &FormatOptions,
) -> String {
    use tabled::{Table, Tabled};

    if devices.is_empty() {
        return format!("No devices matching {} found.\n", filter);
    }

    #[derive(Tabled)]
    struct DeviceRow {
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Signal")]
        signal: String,
        #[tabled(rename = "Identifier")]
        identifier: String,
    }

    let count = if opts.no_color {
        devices.len().to_string()
    } else {
        format!("{}", devices.len().to_string().green().bold())
    };
    let header = format!("Found {} device(s) matching {}\n\n", count, filter);

    let rows: Vec<DeviceRow> = devices
        .iter()
        .map(|d| DeviceRow {
            name: if opts.no_color {
                d.display_name().to_string()
            } else {
                format!("{}", d.display_name().cyan())
            },
            signal: style::format_signal_bar(d.rssi, opts.no_color),
            identifier: d.id.clone(),
        })
        .collect();

    let mut table = Table::new(rows);
    style::apply_table_style(&mut table);
    format!("{}{}\n", header, table)
}

#[must_use]
pub fn format_scan_csv(devices: &[DiscoveredDevice], opts: &FormatOptions) -> String {
    let mut output = if opts.no_header {
        String::new()
    } else {
        "name,identifier,rssi\n".to_string()
    };
    for device in devices {
        output.push_str(&format!(
            "{},{},{}\n",
            csv_escape(device.name.as_deref().unwrap_or("")),
            csv_escape(&device.id),
            device.rssi.map(|r| r.to_string()).unwrap_or_default(),
        ));
    }
    output
}

// ============================================================================
// Reading formatting
// ============================================================================

/// Multi-line description of one reading (used by `decode`).
#[must_use]
pub fn format_reading_text(reading: &Reading, opts: &FormatOptions) -> String {
    let mut output = style::format_title("GlucoPatch Reading", opts.no_color);
    output.push('\n');
    output.push_str(&format!(
        "  Glucose:     {} mg/dL ({})\n",
        style::format_glucose_colored(reading.glucose_mg_dl, opts.no_color),
        style::glucose_band(reading.glucose_mg_dl)
    ));
    output.push_str(&format!(
        "  Temperature: {} °C\n",
        style::format_temp_colored(reading.temperature_c, opts.no_color)
    ));
    output.push_str(&format!("  Timestamp:   {}\n", reading.timestamp));
    if let Some(uptime) = &reading.uptime {
        output.push_str(&format!("  Uptime:      {}\n", uptime));
    }
    output
}

#[must_use = "formatted JSON should be written somewhere"]
pub fn format_reading_json(reading: &Reading, opts: &FormatOptions) -> Result<String> {
    opts.as_json(reading)
}

/// Format a single reading line for watch output.
#[must_use]
pub fn format_watch_line(reading: &Reading, opts: &FormatOptions) -> String {
    let clock = local_clock(reading.received_at, opts.clock_offset);
    let clock = if opts.no_color {
        clock
    } else {
        format!("{}", clock.dimmed())
    };
    format!(
        "[{}] {} mg/dL  {} °C  {}\n",
        clock,
        style::format_glucose_colored(reading.glucose_mg_dl, opts.no_color),
        style::format_temp_colored(reading.temperature_c, opts.no_color),
        style::glucose_band(reading.glucose_mg_dl)
    )
}

/// Header for watch CSV output.
#[must_use]
pub fn format_watch_csv_header() -> &'static str {
    "received_at,timestamp,glucose_mg_dL,temperature_C,uptime\n"
}

/// Format a reading as a CSV line for watch output (no header).
#[must_use]
pub fn format_watch_csv_line(reading: &Reading) -> String {
    format!(
        "{},{},{},{},{}\n",
        rfc3339(reading.received_at),
        csv_escape(&reading.timestamp),
        reading.glucose_mg_dl,
        reading.temperature_c,
        csv_escape(reading.uptime.as_deref().unwrap_or(""))
    )
}

/// Format a reading as one JSON line for watch output.
pub fn format_watch_json_line(reading: &Reading) -> Result<String> {
    Ok(serde_json::to_string(reading)? + "\n")
}

/// Describe a payload that could not be decoded.
pub fn format_decode_error_json(error: &DecodeError, opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct DecodeFailure<'a> {
        error: &'a str,
        message: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        raw: Option<&'a str>,
    }

    opts.as_json(&DecodeFailure {
        error: error.kind(),
        message: error.to_string(),
        raw: error.raw_text(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn reading() -> Reading {
        Reading::new(
            "2024-05-01T10:00:00Z",
            105.0,
            36.8,
            datetime!(2024-05-01 10:00:01 UTC),
        )
    }

    #[test]
    fn test_csv_escape() {
        assert_eq!(csv_escape("plain"), "plain");
        assert_eq!(csv_escape("a,b"), "\"a,b\"");
        assert_eq!(csv_escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_watch_csv_line() {
        let line = format_watch_csv_line(&reading());
        assert_eq!(
            line,
            "2024-05-01T10:00:01Z,2024-05-01T10:00:00Z,105,36.8,\n"
        );
        assert_eq!(format_watch_csv_header().split(',').count(), 5);
    }

    #[test]
    fn test_watch_csv_line_escapes_uptime() {
        let mut reading = reading();
        reading.uptime = Some("1d, 2h".to_string());
        assert!(format_watch_csv_line(&reading).ends_with(",\"1d, 2h\"\n"));
    }

    #[test]
    fn test_watch_line_plain() {
        let line = format_watch_line(&reading(), &FormatOptions::new(true));
        assert!(line.contains("105 mg/dL"));
        assert!(line.contains("36.8 °C"));
        assert!(line.contains("In range"));
        assert!(!line.contains('\u{1b}'));
    }

    #[test]
    fn test_watch_line_uses_clock_offset() {
        let opts = FormatOptions::new(true);
        let utc = format_watch_line(&reading(), &opts);
        let shifted = format_watch_line(
            &reading(),
            &opts.with_clock_offset(UtcOffset::from_hms(2, 0, 0).unwrap()),
        );
        assert!(utc.contains("10:00:01"), "{utc}");
        assert!(shifted.contains("12:00:01"), "{shifted}");
    }

    #[test]
    fn test_watch_json_line_uses_wire_names() {
        let line = format_watch_json_line(&reading()).unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["glucose_mg_dL"], 105.0);
        assert_eq!(value["temperature_C"], 36.8);
    }

    #[test]
    fn test_reading_text_plain() {
        let text = format_reading_text(&reading(), &FormatOptions::new(true));
        assert!(text.contains("Glucose:     105 mg/dL (In range)"));
        assert!(text.contains("Temperature: 36.8 °C"));
        assert!(!text.contains("Uptime"));
    }

    #[test]
    fn test_reading_json_compact() {
        let opts = FormatOptions::new(true).with_compact(true);
        let json = format_reading_json(&reading(), &opts).unwrap();
        assert_eq!(json.lines().count(), 1);
    }

    #[test]
    fn test_scan_text_empty() {
        let text = format_scan_text(
            &[],
            &DiscoveryFilter::default(),
            &FormatOptions::new(true),
        );
        assert_eq!(text, "No devices matching name prefix 'ESP32' found.\n");
    }

    #[test]
    fn test_scan_outputs() {
        let devices = vec![
            DiscoveredDevice::new("AA:BB:CC:DD:EE:FF", Some("ESP32-GlucoPatch")).with_rssi(-60),
            DiscoveredDevice::new("11:22:33:44:55:66", None),
        ];
        let opts = FormatOptions::new(true);

        let text = format_scan_text(&devices, &DiscoveryFilter::AcceptAll, &opts);
        assert!(text.starts_with("Found 2 device(s) matching any name"));
        assert!(text.contains("ESP32-GlucoPatch"));

        let csv = format_scan_csv(&devices, &opts);
        assert_eq!(
            csv,
            "name,identifier,rssi\nESP32-GlucoPatch,AA:BB:CC:DD:EE:FF,-60\n,11:22:33:44:55:66,\n"
        );
        let csv = format_scan_csv(&devices, &opts.with_no_header(true));
        assert_eq!(csv.lines().count(), 2);

        let json = format_scan_json(&devices, &opts).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["devices"][0]["id"], "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_decode_error_json() {
        let err = glucopatch_core::decode(b"not json at all").unwrap_err();
        let json = format_decode_error_json(&err, &FormatOptions::default()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["error"], "syntax");
        assert_eq!(value["raw"], "not json at all");
    }
}
