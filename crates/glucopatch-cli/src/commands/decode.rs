//! Decode command implementation.
//!
//! Replays one captured notification payload through the same
//! decode/append/log path a live session uses.

use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use glucopatch_core::Recorder;
use time::UtcOffset;

use crate::cli::OutputFormat;
use crate::format::{
    FormatOptions, format_decode_error_json, format_reading_json, format_reading_text,
    format_watch_csv_header, format_watch_csv_line,
};
use crate::util::{print_log_entry, write_output};

/// Returns whether the payload decoded.
pub fn cmd_decode(
    payload: Option<String>,
    format: OutputFormat,
    output: Option<&PathBuf>,
    quiet: bool,
    clock_offset: UtcOffset,
    opts: &FormatOptions,
) -> Result<bool> {
    let bytes = match payload {
        Some(text) => text.into_bytes(),
        None => read_stdin()?,
    };

    let recorder = Recorder::new(None, 1, clock_offset);
    let result = recorder.ingest_frame(&bytes);
    for entry in recorder.log().entries() {
        print_log_entry(&entry, quiet, opts.no_color);
    }

    match result {
        Ok(reading) => {
            let content = match format {
                OutputFormat::Text => format_reading_text(&reading, opts),
                OutputFormat::Json => format_reading_json(&reading, opts)?,
                OutputFormat::Csv => {
                    let header = if opts.no_header {
                        ""
                    } else {
                        format_watch_csv_header()
                    };
                    format!("{}{}", header, format_watch_csv_line(&reading))
                }
            };
            write_output(output, &content)?;
            Ok(true)
        }
        Err(err) => {
            // Text and CSV callers already saw the failure in the log line.
            if format == OutputFormat::Json {
                write_output(output, &format_decode_error_json(&err, opts)?)?;
            }
            Ok(false)
        }
    }
}

/// Read the whole payload from stdin, dropping one trailing line break.
fn read_stdin() -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    io::stdin()
        .read_to_end(&mut bytes)
        .context("Failed to read payload from stdin")?;
    if bytes.ends_with(b"\n") {
        bytes.pop();
        if bytes.ends_with(b"\r") {
            bytes.pop();
        }
    }
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_valid_payload_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reading.json");
        let decoded = cmd_decode(
            Some(r#"{"glucose_mg_dL": 105, "temperature_C": 36.8}"#.to_string()),
            OutputFormat::Json,
            Some(&path),
            true,
            UtcOffset::UTC,
            &FormatOptions::new(true),
        )
        .unwrap();
        assert!(decoded);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["glucose_mg_dL"], 105.0);
        assert_eq!(value["temperature_C"], 36.8);
    }

    #[test]
    fn test_decode_invalid_payload_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("error.json");
        let decoded = cmd_decode(
            Some("not json at all".to_string()),
            OutputFormat::Json,
            Some(&path),
            true,
            UtcOffset::UTC,
            &FormatOptions::new(true),
        )
        .unwrap();
        assert!(!decoded);

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["error"], "syntax");
    }
}
