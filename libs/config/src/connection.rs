//! Connection definitions
//!
//! One definition per upstream endpoint. The connection manager treats a
//! definition as immutable for the life of the runtime built from it; an
//! update replaces the runtime.
//!
//! ```toml
//! [[connections]]
//! id = "lab-results"
//! exchange_pattern = "out_in"
//! keep_alive = true
//! listen_timeout_ms = 5000
//!
//! [connections.endpoint]
//! mode = "dns"
//! service = "hl7"
//! domain = "lab.example.org"
//!
//! [connections.codec]
//! type = "mllp"
//! ```

use crate::defaults::connector;
use codec::{CodecConfiguration, CodecError};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use types::{ConnectionId, Direction, ExchangePattern, DEFAULT_CONTENT_TYPE};

/// Semantic problems in a connection definition
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigValidationError {
    #[error("Connection definition has an empty id")]
    EmptyId,

    #[error("Connection '{id}': static endpoint host is empty")]
    EmptyHost { id: String },

    #[error("Connection '{id}': static endpoint port must be non-zero")]
    ZeroPort { id: String },

    #[error("Connection '{id}': dns endpoint requires a non-empty {field}")]
    MissingDnsField { id: String, field: &'static str },

    #[error("Connection '{id}': out_in exchange requires a non-zero listen_timeout_ms")]
    ZeroListenTimeout { id: String },

    #[error("Connection '{id}': {field} must be non-zero")]
    ZeroSize { id: String, field: &'static str },

    #[error("Connection '{id}': invalid codec configuration: {source}")]
    Codec {
        id: String,
        #[source]
        source: CodecError,
    },

    #[error("Connection id '{id}' is defined more than once")]
    DuplicateId { id: String },

    #[error("Service record '{name}': {reason}")]
    ServiceRecord { name: String, reason: String },
}

/// Where the upstream endpoint lives
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum EndpointConfig {
    /// Fixed host and port
    Static { host: String, port: u16 },
    /// Resolved through `_{service}._tcp.{domain}` service records
    Dns {
        service: String,
        domain: String,
        /// Only accept records whose target matches this host
        #[serde(default)]
        hostname: Option<String>,
    },
}

impl EndpointConfig {
    pub fn is_dynamic(&self) -> bool {
        matches!(self, EndpointConfig::Dns { .. })
    }
}

/// Socket I/O options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketOptions {
    pub connect_timeout_ms: u64,
    pub tcp_nodelay: bool,
    pub read_buffer_size: usize,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: connector::CONNECT_TIMEOUT_MS,
            tcp_nodelay: true,
            read_buffer_size: connector::READ_BUFFER_SIZE,
        }
    }
}

impl SocketOptions {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn default_true() -> bool {
    true
}

fn default_listen_timeout_ms() -> u64 {
    connector::LISTEN_TIMEOUT_MS
}

fn default_content_type() -> String {
    DEFAULT_CONTENT_TYPE.to_string()
}

fn default_max_message_size() -> usize {
    connector::MAX_MESSAGE_SIZE
}

/// Administrator-defined outbound connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub id: ConnectionId,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default)]
    pub direction: Direction,

    #[serde(default)]
    pub exchange_pattern: ExchangePattern,

    /// Return the session to the pool after an exchange
    #[serde(default = "default_true")]
    pub keep_alive: bool,

    /// OutIn read timeout
    #[serde(default = "default_listen_timeout_ms")]
    pub listen_timeout_ms: u64,

    #[serde(default = "default_content_type")]
    pub content_type: String,

    /// Upper bound for one encoded or decoded frame
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub codec: CodecConfiguration,

    #[serde(default)]
    pub socket: SocketOptions,
}

impl ConnectionDefinition {
    /// Outbound OutIn definition with defaults for everything else
    pub fn new(id: impl Into<ConnectionId>, endpoint: EndpointConfig) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            enabled: true,
            direction: Direction::Outbound,
            exchange_pattern: ExchangePattern::OutIn,
            keep_alive: true,
            listen_timeout_ms: connector::LISTEN_TIMEOUT_MS,
            content_type: default_content_type(),
            max_message_size: connector::MAX_MESSAGE_SIZE,
            endpoint,
            codec: CodecConfiguration::default(),
            socket: SocketOptions::default(),
        }
    }

    pub fn listen_timeout(&self) -> Duration {
        Duration::from_millis(self.listen_timeout_ms)
    }

    pub fn is_outbound(&self) -> bool {
        self.direction == Direction::Outbound
    }

    /// Display name, falling back to the id
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            self.id.as_str()
        } else {
            &self.name
        }
    }

    /// Check the definition is usable
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.id.is_empty() {
            return Err(ConfigValidationError::EmptyId);
        }
        let id = || self.id.to_string();

        match &self.endpoint {
            EndpointConfig::Static { host, port } => {
                if host.trim().is_empty() {
                    return Err(ConfigValidationError::EmptyHost { id: id() });
                }
                if *port == 0 {
                    return Err(ConfigValidationError::ZeroPort { id: id() });
                }
            }
            EndpointConfig::Dns {
                service, domain, ..
            } => {
                if service.trim().is_empty() {
                    return Err(ConfigValidationError::MissingDnsField {
                        id: id(),
                        field: "service",
                    });
                }
                if domain.trim().is_empty() {
                    return Err(ConfigValidationError::MissingDnsField {
                        id: id(),
                        field: "domain",
                    });
                }
            }
        }

        if self.exchange_pattern.expects_response() && self.listen_timeout_ms == 0 {
            return Err(ConfigValidationError::ZeroListenTimeout { id: id() });
        }
        if self.max_message_size == 0 {
            return Err(ConfigValidationError::ZeroSize {
                id: id(),
                field: "max_message_size",
            });
        }
        if self.socket.read_buffer_size == 0 {
            return Err(ConfigValidationError::ZeroSize {
                id: id(),
                field: "socket.read_buffer_size",
            });
        }

        self.codec
            .validate()
            .map_err(|source| ConfigValidationError::Codec { id: id(), source })
    }
}
