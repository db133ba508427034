//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while encoding or decoding command batches.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Failed to encode commands to JSON.
    #[error("encoding failed: {message}")]
    EncodingFailed {
        /// Description of the encoding error.
        message: String,
    },

    /// The payload is not valid JSON.
    #[error("invalid JSON: {message}")]
    InvalidJson {
        /// Description of the parse error.
        message: String,
    },

    /// The JSON is well-formed but does not describe a command.
    #[error("invalid command structure: {message}")]
    InvalidStructure {
        /// Description of the structural error.
        message: String,
    },

    /// A command carries an id that is not part of the vocabulary.
    #[error("unknown command id: {id}")]
    UnknownCommand {
        /// The unrecognized command id.
        id: String,
    },
}

impl CodecError {
    /// Creates an invalid structure error.
    pub fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    /// Creates an invalid JSON error.
    pub fn invalid_json(message: impl Into<String>) -> Self {
        Self::InvalidJson {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = CodecError::UnknownCommand {
            id: "Teleport".into(),
        };
        assert_eq!(err.to_string(), "unknown command id: Teleport");

        let err = CodecError::invalid_structure("expected array");
        assert!(err.to_string().contains("expected array"));
    }
}
