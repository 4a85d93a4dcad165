//! Error types for the `serenai-models` crate.
//!
//! Frame decoding returns variants of [`ModelError`]. Callers are expected
//! to treat every variant as recoverable: the offending frame is dropped.

/// Errors produced when decoding or validating model types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// The payload was not valid JSON, or did not match the shape its
    /// `type` tag announces.
    #[error("malformed frame: {reason}")]
    MalformedFrame {
        /// Human-readable explanation from the decoder.
        reason: String,
    },

    /// The payload carried a `type` tag this client does not know.
    #[error("unknown frame type \"{tag}\"")]
    UnknownFrameType {
        /// The tag found in the payload.
        tag: String,
    },

    /// A required field was missing from the payload.
    #[error("missing required field: {field}")]
    MissingField {
        /// The name of the missing field.
        field: String,
    },
}

impl ModelError {
    /// Whether the error only reports an unrecognised tag on an otherwise
    /// well-formed payload.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, Self::UnknownFrameType { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_malformed() {
        let err = ModelError::MalformedFrame {
            reason: "expected value at line 1 column 1".into(),
        };
        assert_eq!(
            err.to_string(),
            "malformed frame: expected value at line 1 column 1"
        );
    }

    #[test]
    fn error_display_unknown_type() {
        let err = ModelError::UnknownFrameType {
            tag: "typing_status".into(),
        };
        assert_eq!(err.to_string(), "unknown frame type \"typing_status\"");
        assert!(err.is_unknown_type());
    }

    #[test]
    fn error_display_missing_field() {
        let err = ModelError::MissingField {
            field: "type".into(),
        };
        assert_eq!(err.to_string(), "missing required field: type");
        assert!(!err.is_unknown_type());
    }
}
