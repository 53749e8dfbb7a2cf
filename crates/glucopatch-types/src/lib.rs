//! Platform-agnostic types for GlucoPatch glucose/temperature sensor patches.
//!
//! This crate provides the data model and wire decoder shared by the
//! connection layer (glucopatch-core) and the command-line tools.
//!
//! # Features
//!
//! - [`Reading`] and [`LogEntry`] data types
//! - Frame decoder for the JSON notification payload
//! - UUID constants for the patch's GATT service
//! - Error types for frame decoding
//!
//! # Example
//!
//! ```
//! use glucopatch_types::{decode, DecodeError};
//!
//! let reading = decode(br#"{"glucose_mg_dL": 112, "temperature_C": 36.4}"#).unwrap();
//! assert_eq!(reading.glucose_mg_dl, 112.0);
//!
//! let err = decode(b"not json at all").unwrap_err();
//! assert!(matches!(err, DecodeError::Syntax { .. }));
//! ```

pub mod decode;
pub mod error;
pub mod types;
pub mod uuid;

pub use decode::{decode, decode_at};
pub use error::{DecodeError, DecodeResult, SchemaViolation};
pub use types::{LogEntry, LogLevel, Reading};
pub use uuid as uuids;
