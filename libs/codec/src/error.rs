//! Decode errors for inbound relay frames
//!
//! Each variant carries enough context to log a useful diagnostic line when a
//! single frame is discarded.

use thiserror::Error;

/// Why an inbound frame could not be turned into an envelope
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecodeError {
    /// Frame was empty or whitespace only
    #[error("Empty message body")]
    Empty,

    /// Frame bytes were not valid UTF-8
    #[error("Message body is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 { valid_up_to: usize },

    /// Frame text was not parseable JSON
    #[error("Invalid JSON at line {line}, column {column}: {message}")]
    InvalidJson {
        line: usize,
        column: usize,
        message: String,
    },

    /// JSON parsed but the top level was not an object
    #[error("Expected a JSON object, got {found}")]
    NotAnObject { found: &'static str },

    /// Object had no `type` field
    #[error("Missing required field `type`")]
    MissingType,

    /// `type` was present but not a string
    #[error("Field `type` must be a string, got {found}")]
    InvalidType { found: &'static str },
}

impl DecodeError {
    pub(crate) fn from_json(err: &serde_json::Error) -> Self {
        DecodeError::InvalidJson {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Outbound envelope could not be serialized
#[derive(Debug, Error)]
#[error("Failed to encode envelope: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

pub type CodecResult<T> = std::result::Result<T, DecodeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_are_descriptive() {
        let err = DecodeError::InvalidType { found: "number" };
        assert_eq!(err.to_string(), "Field `type` must be a string, got number");

        let err = DecodeError::InvalidUtf8 { valid_up_to: 3 };
        assert!(err.to_string().contains("byte 3"));
    }
}
