//! Error types for frame decoding in glucopatch-types.

use thiserror::Error;

/// Errors that can occur when decoding a notification frame.
///
/// Decoding is all-or-nothing: any of these means no reading was produced.
/// Transport errors are not represented here (those belong in glucopatch-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Error)]
#[non_exhaustive]
pub enum DecodeError {
    /// The frame is not valid UTF-8.
    #[error("Frame is not valid UTF-8 (invalid byte at offset {valid_up_to})")]
    Encoding {
        /// Length of the longest valid UTF-8 prefix.
        valid_up_to: usize,
    },

    /// The frame text is not valid JSON.
    #[error("Invalid JSON ({message}): {raw}")]
    Syntax {
        /// The raw frame text, preserved for logging.
        raw: String,
        /// Parser message.
        message: String,
    },

    /// The JSON is well-formed but does not describe a reading.
    #[error("Invalid reading: {0}")]
    Schema(SchemaViolation),
}

/// What made a well-formed JSON frame unacceptable as a reading.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum SchemaViolation {
    /// Top-level value is not an object.
    NotAnObject,
    /// A required field is absent.
    MissingField(&'static str),
    /// A field has the wrong JSON type.
    WrongType {
        field: &'static str,
        expected: &'static str,
    },
    /// A numeric field is NaN or infinite.
    NonFinite(&'static str),
}

impl std::fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotAnObject => write!(f, "payload is not a JSON object"),
            Self::MissingField(field) => write!(f, "missing field '{}'", field),
            Self::WrongType { field, expected } => {
                write!(f, "field '{}' must be a {}", field, expected)
            }
            Self::NonFinite(field) => write!(f, "field '{}' is not finite", field),
        }
    }
}

impl DecodeError {
    /// Short category name used in log entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Encoding { .. } => "encoding",
            Self::Syntax { .. } => "syntax",
            Self::Schema(_) => "schema",
        }
    }

    /// The raw frame text, when the frame was at least valid UTF-8.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            Self::Syntax { raw, .. } => Some(raw),
            _ => None,
        }
    }
}

/// Result type alias using glucopatch-types' DecodeError type.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;
