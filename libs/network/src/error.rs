//! Connector Error Types
//!
//! Error handling for connection lookup, endpoint resolution, session
//! pooling, socket I/O and codec failures.

use codec::CodecError;
use gateway_config::ConfigValidationError;
use std::net::SocketAddr;
use thiserror::Error;
use types::SessionId;

/// Main connector error type
#[derive(Error, Debug)]
pub enum ConnectorError {
    /// No running connector for this connection id
    #[error("Connection '{connection_id}' not found")]
    ConnectionNotFound { connection_id: String },

    /// Service-record lookup failed or returned no usable record
    #[error("Endpoint resolution failed for '{query}': {message}")]
    EndpointResolution {
        query: String,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Caller asked to reuse a session the pool does not hold
    #[error("Session {session_id} not found for connection '{connection_id}'")]
    SessionNotFound {
        connection_id: String,
        session_id: SessionId,
    },

    /// Malformed bytes on encode or decode
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Network connectivity errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Connection management errors
    #[error("Connection error: {message} (remote: {remote_addr:?})")]
    Connection {
        message: String,
        remote_addr: Option<SocketAddr>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Connect or write exceeded its deadline
    #[error("Timeout error: {operation} exceeded {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    /// Generic I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        source: std::io::Error,
    },
}

/// Result type alias for connector operations
pub type Result<T> = std::result::Result<T, ConnectorError>;

impl ConnectorError {
    pub fn connection_not_found(connection_id: impl Into<String>) -> Self {
        Self::ConnectionNotFound {
            connection_id: connection_id.into(),
        }
    }

    /// Create an endpoint resolution error
    pub fn endpoint_resolution(query: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EndpointResolution {
            query: query.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create an endpoint resolution error with source
    pub fn endpoint_resolution_with_source(
        query: impl Into<String>,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::EndpointResolution {
            query: query.into(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn session_not_found(connection_id: impl Into<String>, session_id: SessionId) -> Self {
        Self::SessionNotFound {
            connection_id: connection_id.into(),
            session_id,
        }
    }

    /// Create a network error with source
    pub fn network_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>, remote_addr: Option<SocketAddr>) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: None,
        }
    }

    /// Create a connection error with source
    pub fn connection_with_source(
        message: impl Into<String>,
        remote_addr: Option<SocketAddr>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Connection {
            message: message.into(),
            remote_addr,
            source: Some(Box::new(source)),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Check if this is a retryable error
    ///
    /// Retrying is the caller's decision; the connector makes one connect
    /// attempt per pool miss.
    pub fn is_retryable(&self) -> bool {
        match self {
            ConnectorError::Network { .. } => true,
            ConnectorError::Connection { .. } => true,
            ConnectorError::Timeout { .. } => true,
            ConnectorError::Io { .. } => true,
            ConnectorError::ConnectionNotFound { .. } => false,
            ConnectorError::EndpointResolution { .. } => false,
            ConnectorError::SessionNotFound { .. } => false,
            ConnectorError::Codec(_) => false,
            ConnectorError::Configuration { .. } => false,
        }
    }

    /// Check if this is a transient error
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ConnectorError::Network { .. }
                | ConnectorError::Connection { .. }
                | ConnectorError::Timeout { .. }
                | ConnectorError::Io { .. }
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            ConnectorError::ConnectionNotFound { .. } => "connection_not_found",
            ConnectorError::EndpointResolution { .. } => "endpoint_resolution",
            ConnectorError::SessionNotFound { .. } => "session_not_found",
            ConnectorError::Codec(_) => "codec",
            ConnectorError::Network { .. } => "network",
            ConnectorError::Connection { .. } => "connection",
            ConnectorError::Configuration { .. } => "configuration",
            ConnectorError::Timeout { .. } => "timeout",
            ConnectorError::Io { .. } => "io",
        }
    }
}

// Custom Clone implementation since Box<dyn Error> doesn't implement Clone
impl Clone for ConnectorError {
    fn clone(&self) -> Self {
        match self {
            ConnectorError::ConnectionNotFound { connection_id } => {
                ConnectorError::ConnectionNotFound {
                    connection_id: connection_id.clone(),
                }
            }
            ConnectorError::EndpointResolution { query, message, .. } => {
                ConnectorError::EndpointResolution {
                    query: query.clone(),
                    message: message.clone(),
                    source: None, // Source errors are not cloneable, so we omit them
                }
            }
            ConnectorError::SessionNotFound {
                connection_id,
                session_id,
            } => ConnectorError::SessionNotFound {
                connection_id: connection_id.clone(),
                session_id: *session_id,
            },
            ConnectorError::Codec(e) => ConnectorError::Codec(e.clone()),
            ConnectorError::Network { message, .. } => ConnectorError::Network {
                message: message.clone(),
                source: None,
            },
            ConnectorError::Connection {
                message,
                remote_addr,
                ..
            } => ConnectorError::Connection {
                message: message.clone(),
                remote_addr: *remote_addr,
                source: None,
            },
            ConnectorError::Configuration { message, field } => ConnectorError::Configuration {
                message: message.clone(),
                field: field.clone(),
            },
            ConnectorError::Timeout {
                operation,
                timeout_ms,
            } => ConnectorError::Timeout {
                operation: operation.clone(),
                timeout_ms: *timeout_ms,
            },
            ConnectorError::Io { message, source } => ConnectorError::Io {
                message: message.clone(),
                source: std::io::Error::new(source.kind(), message.as_str()),
            },
        }
    }
}

/// Convert standard I/O errors to connector errors
impl From<std::io::Error> for ConnectorError {
    fn from(error: std::io::Error) -> Self {
        ConnectorError::Io {
            message: error.to_string(),
            source: error,
        }
    }
}

/// Convert definition validation failures to configuration errors
impl From<ConfigValidationError> for ConnectorError {
    fn from(error: ConfigValidationError) -> Self {
        ConnectorError::configuration(error.to_string(), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn test_error_construction() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = ConnectorError::network_with_source("Connection refused", refused);
        assert_eq!(err.category(), "network");
        assert!(err.is_retryable());
        assert!(err.is_transient());
    }

    #[test]
    fn test_connection_error() {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 2575);
        let err = ConnectorError::connection("Handshake failed", Some(addr));

        match err {
            ConnectorError::Connection { remote_addr, .. } => {
                assert_eq!(remote_addr, Some(addr));
            }
            _ => panic!("Expected Connection error"),
        }
    }

    #[test]
    fn test_fatal_errors_are_not_retryable() {
        assert!(!ConnectorError::connection_not_found("gone").is_retryable());
        assert!(!ConnectorError::endpoint_resolution("_hl7._tcp.lab", "no record").is_retryable());
        assert!(!ConnectorError::session_not_found("c1", SessionId::new(9)).is_retryable());
        assert!(!ConnectorError::from(CodecError::malformed("bad")).is_retryable());
        assert!(ConnectorError::timeout("connect", 1000).is_retryable());
    }

    #[test]
    fn test_display_carries_identifiers() {
        let err = ConnectorError::session_not_found("lab-results", SessionId::new(42));
        assert_eq!(
            err.to_string(),
            "Session 42 not found for connection 'lab-results'"
        );
        assert_eq!(err.category(), "session_not_found");
    }

    #[test]
    fn test_clone_drops_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err = ConnectorError::endpoint_resolution_with_source("_x._tcp.y", "lookup failed", io_err);
        match err.clone() {
            ConnectorError::EndpointResolution { source, query, .. } => {
                assert!(source.is_none());
                assert_eq!(query, "_x._tcp.y");
            }
            other => panic!("Expected EndpointResolution, got {:?}", other),
        }
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "test");
        let err = ConnectorError::from(io_err);

        match err {
            ConnectorError::Io { message, .. } => {
                assert!(message.contains("test"));
            }
            _ => panic!("Expected Io error"),
        }
    }
}
