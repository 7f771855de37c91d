//! # Sockgate Configuration
//!
//! Connection definitions, connector defaults and gateway configuration
//! loading.
//!
//! ## Features
//!
//! - **Connection Definitions**: endpoint, exchange pattern, keep-alive, codec
//!   and socket options for one upstream connection, with validation
//! - **Defaults**: timeouts, buffer sizes and the service-record TTL
//! - **Gateway Configuration**: TOML file plus `environments/<env>.toml`
//!   overlay plus `SOCKGATE_*` environment variables
//!
//! ## Usage
//!
//! ```rust,no_run
//! use gateway_config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Some(Path::new("config/gateway.toml")), Some("staging"))?;
//! for connection in config.enabled_connections() {
//!     println!("{} -> {:?}", connection.id, connection.endpoint);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod connection;
pub mod defaults;
pub mod gateway_config;

// Re-export commonly used types
pub use connection::{ConfigValidationError, ConnectionDefinition, EndpointConfig, SocketOptions};
pub use gateway_config::{default_config_path, load_config, GatewayConfig, ServiceRecordConfig};
