//! Frame decoder: one BLE notification in, one [`Reading`] out.
//!
//! A frame is a UTF-8 JSON object:
//!
//! ```text
//! {"glucose_mg_dL": 105, "temperature_C": 36.8, "timestamp": "...", "uptime": "..."}
//! ```
//!
//! `glucose_mg_dL` and `temperature_C` are required finite numbers.
//! `timestamp` is optional and defaults to the decode instant. `uptime` is
//! optional and passed through. Unknown fields are ignored.

use serde_json::{Map, Value};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{DecodeError, DecodeResult, SchemaViolation};
use crate::types::Reading;

/// Wire name of the glucose field.
pub const GLUCOSE_FIELD: &str = "glucose_mg_dL";
/// Wire name of the temperature field.
pub const TEMPERATURE_FIELD: &str = "temperature_C";
/// Wire name of the optional timestamp field.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Wire name of the optional uptime field.
pub const UPTIME_FIELD: &str = "uptime";

/// Decode a frame, stamping it with the current UTC time.
///
/// # Examples
///
/// ```
/// use glucopatch_types::decode;
///
/// let reading = decode(br#"{"glucose_mg_dL": 105, "temperature_C": 36.8}"#).unwrap();
/// assert_eq!(reading.glucose_mg_dl, 105.0);
/// assert_eq!(reading.temperature_c, 36.8);
/// ```
pub fn decode(bytes: &[u8]) -> DecodeResult<Reading> {
    decode_at(bytes, OffsetDateTime::now_utc())
}

/// Decode a frame using `now` as the receipt time.
pub fn decode_at(bytes: &[u8], now: OffsetDateTime) -> DecodeResult<Reading> {
    let text = std::str::from_utf8(bytes).map_err(|e| DecodeError::Encoding {
        valid_up_to: e.valid_up_to(),
    })?;

    let value: Value = serde_json::from_str(text).map_err(|e| DecodeError::Syntax {
        raw: text.to_string(),
        message: e.to_string(),
    })?;

    let Value::Object(fields) = value else {
        return Err(DecodeError::Schema(SchemaViolation::NotAnObject));
    };

    let glucose_mg_dl = finite_number(&fields, GLUCOSE_FIELD)?;
    let temperature_c = finite_number(&fields, TEMPERATURE_FIELD)?;

    let timestamp = match fields.get(TIMESTAMP_FIELD) {
        None | Some(Value::Null) => now
            .format(&Rfc3339)
            .unwrap_or_else(|_| now.unix_timestamp().to_string()),
        Some(Value::String(s)) => s.clone(),
        Some(_) => {
            return Err(DecodeError::Schema(SchemaViolation::WrongType {
                field: TIMESTAMP_FIELD,
                expected: "string",
            }));
        }
    };

    let uptime = match fields.get(UPTIME_FIELD) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    Ok(Reading {
        timestamp,
        glucose_mg_dl,
        temperature_c,
        uptime,
        received_at: now,
    })
}

fn finite_number(fields: &Map<String, Value>, field: &'static str) -> DecodeResult<f64> {
    let value = fields
        .get(field)
        .ok_or(DecodeError::Schema(SchemaViolation::MissingField(field)))?;

    let number = value.as_f64().ok_or(DecodeError::Schema(SchemaViolation::WrongType {
        field,
        expected: "number",
    }))?;

    if !number.is_finite() {
        return Err(DecodeError::Schema(SchemaViolation::NonFinite(field)));
    }

    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 10:00:00 UTC);

    #[test]
    fn test_decode_minimal_payload_defaults_timestamp() {
        let reading = decode_at(br#"{"glucose_mg_dL": 105, "temperature_C": 36.8}"#, NOW).unwrap();

        assert_eq!(reading.glucose_mg_dl, 105.0);
        assert_eq!(reading.temperature_c, 36.8);
        assert_eq!(reading.timestamp, "2024-05-01T10:00:00Z");
        assert_eq!(reading.received_at, NOW);
        assert!(reading.uptime.is_none());
    }

    #[test]
    fn test_decode_keeps_patch_timestamp() {
        let reading = decode_at(
            br#"{"timestamp":"2024-04-30T23:59:59Z","glucose_mg_dL":88.5,"temperature_C":35.1}"#,
            NOW,
        )
        .unwrap();

        assert_eq!(reading.timestamp, "2024-04-30T23:59:59Z");
        assert_eq!(reading.received_at, NOW);
    }

    #[test]
    fn test_decode_non_rfc3339_timestamp_is_kept_verbatim() {
        let reading = decode_at(
            br#"{"timestamp":"boot+42s","glucose_mg_dL":88,"temperature_C":35}"#,
            NOW,
        )
        .unwrap();
        assert_eq!(reading.timestamp, "boot+42s");
    }

    #[test]
    fn test_decode_uptime_passthrough() {
        let reading = decode_at(
            br#"{"glucose_mg_dL":1,"temperature_C":2,"uptime":"01:02:03"}"#,
            NOW,
        )
        .unwrap();
        assert_eq!(reading.uptime.as_deref(), Some("01:02:03"));

        let reading = decode_at(
            br#"{"glucose_mg_dL":1,"temperature_C":2,"uptime":12345}"#,
            NOW,
        )
        .unwrap();
        assert_eq!(reading.uptime.as_deref(), Some("12345"));
    }

    #[test]
    fn test_decode_ignores_unknown_fields() {
        let reading = decode_at(
            br#"{"glucose_mg_dL":90,"temperature_C":36,"battery":80,"extra":{"a":1}}"#,
            NOW,
        )
        .unwrap();
        assert_eq!(reading.glucose_mg_dl, 90.0);
    }

    #[test]
    fn test_decode_invalid_utf8() {
        let err = decode_at(&[b'{', 0xFF, 0xFE, b'}'], NOW).unwrap_err();
        assert_eq!(err, DecodeError::Encoding { valid_up_to: 1 });
        assert_eq!(err.kind(), "encoding");
    }

    #[test]
    fn test_decode_not_json_preserves_raw_text() {
        let err = decode_at(b"not json at all", NOW).unwrap_err();
        match &err {
            DecodeError::Syntax { raw, .. } => assert_eq!(raw, "not json at all"),
            other => panic!("expected syntax error, got {other:?}"),
        }
        assert_eq!(err.raw_text(), Some("not json at all"));
        assert!(err.to_string().contains("not json at all"));
    }

    #[test]
    fn test_decode_empty_frame_is_syntax_error() {
        let err = decode_at(b"", NOW).unwrap_err();
        assert!(matches!(err, DecodeError::Syntax { .. }));
    }

    #[test]
    fn test_decode_non_object_is_schema_error() {
        let payloads: [&[u8]; 4] = [b"[1,2,3]", b"42", b"\"hello\"", b"null"];
        for payload in payloads {
            let err = decode_at(payload, NOW).unwrap_err();
            assert_eq!(err, DecodeError::Schema(SchemaViolation::NotAnObject));
        }
    }

    #[test]
    fn test_decode_missing_field() {
        let err = decode_at(br#"{"temperature_C": 36.8}"#, NOW).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Schema(SchemaViolation::MissingField(GLUCOSE_FIELD))
        );

        let err = decode_at(br#"{"glucose_mg_dL": 100}"#, NOW).unwrap_err();
        assert_eq!(
            err,
            DecodeError::Schema(SchemaViolation::MissingField(TEMPERATURE_FIELD))
        );
    }

    #[test]
    fn test_decode_wrong_field_types() {
        let err = decode_at(br#"{"glucose_mg_dL": "105", "temperature_C": 36.8}"#, NOW)
            .unwrap_err();
        assert_eq!(
            err,
            DecodeError::Schema(SchemaViolation::WrongType {
                field: GLUCOSE_FIELD,
                expected: "number",
            })
        );

        let err = decode_at(br#"{"glucose_mg_dL": null, "temperature_C": 36.8}"#, NOW)
            .unwrap_err();
        assert!(matches!(err, DecodeError::Schema(SchemaViolation::WrongType { .. })));

        let err = decode_at(
            br#"{"glucose_mg_dL": 1, "temperature_C": 2, "timestamp": 1714557600}"#,
            NOW,
        )
        .unwrap_err();
        assert_eq!(
            err,
            DecodeError::Schema(SchemaViolation::WrongType {
                field: TIMESTAMP_FIELD,
                expected: "string",
            })
        );
    }

    #[test]
    fn test_decode_non_finite_literals_rejected() {
        // JSON has no NaN/Infinity literal, and out-of-range numbers do not parse.
        assert!(decode_at(br#"{"glucose_mg_dL": NaN, "temperature_C": 1}"#, NOW).is_err());
        assert!(decode_at(br#"{"glucose_mg_dL": 1e400, "temperature_C": 1}"#, NOW).is_err());
    }

    #[test]
    fn test_schema_violation_display() {
        let err = DecodeError::Schema(SchemaViolation::MissingField(GLUCOSE_FIELD));
        assert_eq!(
            err.to_string(),
            "Invalid reading: missing field 'glucose_mg_dL'"
        );
        assert_eq!(err.kind(), "schema");
        assert!(err.raw_text().is_none());
    }
}

/// Property-based tests for the frame decoder.
///
/// # Running Tests
///
/// ```bash
/// cargo test -p glucopatch-types decode::proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;
    use time::macros::datetime;

    const NOW: OffsetDateTime = datetime!(2024-05-01 10:00:00 UTC);

    proptest! {
        /// Decoding arbitrary bytes never panics.
        #[test]
        fn decode_never_panics(data: Vec<u8>) {
            let _ = decode_at(&data, NOW);
        }

        /// Finite values survive a trip through the wire format bit-for-bit.
        #[test]
        fn finite_values_preserved_exactly(
            glucose in any::<f64>().prop_filter("finite", |v| v.is_finite()),
            temperature in any::<f64>().prop_filter("finite", |v| v.is_finite()),
        ) {
            let frame = serde_json::json!({
                "glucose_mg_dL": glucose,
                "temperature_C": temperature,
            })
            .to_string();

            let reading = decode_at(frame.as_bytes(), NOW).unwrap();
            prop_assert_eq!(reading.glucose_mg_dl.to_bits(), glucose.to_bits());
            prop_assert_eq!(reading.temperature_c.to_bits(), temperature.to_bits());
        }

        /// Any frame missing the glucose field is rejected.
        #[test]
        fn missing_glucose_always_rejected(temperature in -50.0f64..60.0) {
            let frame = format!(r#"{{"temperature_C": {temperature}}}"#);
            let err = decode_at(frame.as_bytes(), NOW).unwrap_err();
            prop_assert_eq!(err, DecodeError::Schema(SchemaViolation::MissingField(GLUCOSE_FIELD)));
        }
    }
}
