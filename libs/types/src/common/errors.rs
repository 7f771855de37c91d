//! Error types for identifier validation
//!
//! Session identifiers arrive from callers as free-form hints, so parsing them
//! must report why a hint was rejected rather than panicking.

use thiserror::Error;

/// Errors that can occur during typed ID validation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// ID value is null/zero when non-null required
    #[error("ID cannot be null/zero")]
    NullId,

    /// ID text is empty or whitespace only
    #[error("ID cannot be empty")]
    Empty,

    /// ID text is not a decimal number
    #[error("ID '{input}' is not a valid decimal identifier")]
    NotNumeric { input: String },

    /// Custom validation failure with message
    #[error("Validation failed: {message}")]
    Custom { message: String },
}
