//! Connector defaults
//!
//! Values applied when a connection definition leaves a setting out.

/// Socket connector defaults
pub mod connector {
    /// TCP connect timeout (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 10_000;

    /// OutIn read timeout (milliseconds)
    pub const LISTEN_TIMEOUT_MS: u64 = 30_000;

    /// Bytes requested per socket read
    pub const READ_BUFFER_SIZE: usize = 8 * 1024;

    /// Largest single decoded frame
    pub const MAX_MESSAGE_SIZE: usize = codec::DEFAULT_MAX_FRAME_SIZE;
}

/// Endpoint resolution defaults
pub mod discovery {
    /// How long a service-record lookup result stays valid
    pub const RESOLUTION_TTL_SECS: u64 = 60;

    /// Attribute ids requested from the directory
    pub const SERVICE_RECORD_ATTRIBUTE: &str = "SRV";
}

/// Configuration file locations
pub mod files {
    pub const DEFAULT_CONFIG_PATH: &str = "config/gateway.toml";

    /// Directory holding `<env>.toml` overlays, relative to the base file
    pub const ENVIRONMENTS_DIR: &str = "environments";

    /// Prefix for environment variable overrides (`SOCKGATE_LOG_LEVEL`)
    pub const ENV_PREFIX: &str = "SOCKGATE";
}
