//! Codec errors for MLLP framing and ISO 8583 encoding/decoding
//!
//! Every variant describes malformed bytes or a malformed structured message.
//! None of them are retryable: sending the same bytes again fails the same way.

use thiserror::Error;

/// Codec format errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CodecError {
    /// Message Type Indicator is missing, the wrong length, or not numeric
    #[error("Invalid MTI '{mti}': {reason}")]
    InvalidMti { mti: String, reason: String },

    /// A bitmap bit is set for a field the schema does not define
    #[error("No schema entry for field {position} (bitmap bit set at offset {offset})")]
    MissingFieldDefinition { position: u16, offset: usize },

    /// LLVAR/LLLVAR length prefix is not made of ASCII digits
    #[error("Invalid length prefix {prefix:?} for field {position} at offset {offset}")]
    InvalidLengthPrefix {
        position: u16,
        prefix: String,
        offset: usize,
    },

    /// Field value exceeds what its definition allows
    #[error("Field {position} is {length} bytes, limit is {max}")]
    FieldTooLong {
        position: u16,
        length: usize,
        max: usize,
    },

    /// Field value does not fit its declared content class
    #[error("Invalid value for field {position}: {reason}")]
    InvalidFieldValue { position: u16, reason: String },

    /// Field position outside the bitmaps this codec can express
    #[error("Field position {position} is out of range (allowed 2..={max}, excluding bitmap bits)")]
    FieldOutOfRange { position: u16, max: u16 },

    /// Tertiary bitmap needed or announced while disabled
    #[error("Tertiary bitmap required for field {position} but not enabled")]
    TertiaryBitmapDisabled { position: u16 },

    /// Structured (XML) form could not be interpreted
    #[error("Malformed structured message: {reason}")]
    MalformedStructuredMessage { reason: String },

    /// Input ended before the message was complete
    #[error("Truncated message: {context}")]
    Truncated { context: String },

    /// Decoded frame grew beyond the configured maximum
    #[error("Frame too large: {size} bytes exceeds limit {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    /// Codec configuration cannot produce a working codec
    #[error("Invalid codec configuration: {reason}")]
    InvalidConfiguration { reason: String },

    /// The structural transform rejected the content
    #[error("Transform failed ({direction}): {reason}")]
    Transform { direction: String, reason: String },
}

impl CodecError {
    pub fn invalid_mti(mti: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMti {
            mti: mti.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_length_prefix(position: u16, prefix: &[u8], offset: usize) -> Self {
        Self::InvalidLengthPrefix {
            position,
            prefix: String::from_utf8_lossy(prefix).into_owned(),
            offset,
        }
    }

    pub fn invalid_field_value(position: u16, reason: impl Into<String>) -> Self {
        Self::InvalidFieldValue {
            position,
            reason: reason.into(),
        }
    }

    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedStructuredMessage {
            reason: reason.into(),
        }
    }

    pub fn invalid_configuration(reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            reason: reason.into(),
        }
    }

    pub fn transform(direction: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Transform {
            direction: direction.into(),
            reason: reason.into(),
        }
    }

    /// Codec errors never succeed on retry
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CodecError::InvalidMti { .. } => "mti",
            CodecError::MissingFieldDefinition { .. } => "schema",
            CodecError::InvalidLengthPrefix { .. } => "length_prefix",
            CodecError::FieldTooLong { .. } => "field_length",
            CodecError::InvalidFieldValue { .. } => "field_value",
            CodecError::FieldOutOfRange { .. } => "field_position",
            CodecError::TertiaryBitmapDisabled { .. } => "bitmap",
            CodecError::MalformedStructuredMessage { .. } => "structure",
            CodecError::Truncated { .. } => "truncated",
            CodecError::FrameTooLarge { .. } => "frame_size",
            CodecError::InvalidConfiguration { .. } => "configuration",
            CodecError::Transform { .. } => "transform",
        }
    }
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_prefix_error_keeps_raw_prefix() {
        let err = CodecError::invalid_length_prefix(2, b"0x", 12);
        assert_eq!(
            err.to_string(),
            "Invalid length prefix \"0x\" for field 2 at offset 12"
        );
        assert_eq!(err.category(), "length_prefix");
    }

    #[test]
    fn test_codec_errors_are_never_retryable() {
        assert!(!CodecError::invalid_mti("02", "too short").is_retryable());
        assert!(!CodecError::FrameTooLarge { size: 10, limit: 5 }.is_retryable());
    }
}
