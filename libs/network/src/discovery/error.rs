//! Error types for service-record lookups

use thiserror::Error;

/// Directory lookup failure, distinct from an empty answer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    #[error("Directory unavailable: {message}")]
    Unavailable { message: String },

    #[error("Malformed service name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Unsupported attribute '{attribute}'")]
    UnsupportedAttribute { attribute: String },
}
