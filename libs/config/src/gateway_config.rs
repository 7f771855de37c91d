//! Gateway Configuration Module
//!
//! Loads connection definitions and static service records from TOML files
//! with environment-specific overrides.

use crate::connection::{ConfigValidationError, ConnectionDefinition, EndpointConfig};
use crate::defaults::files;
use anyhow::{Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Main gateway configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GatewayConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Outbound connection definitions
    #[serde(default)]
    pub connections: Vec<ConnectionDefinition>,

    /// Static service directory entries
    #[serde(default)]
    pub service_records: Vec<ServiceRecordConfig>,
}

/// One service record served by the static directory
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ServiceRecordConfig {
    /// Query name, e.g. `_hl7._tcp.lab.example.org`
    pub name: String,
    #[serde(default)]
    pub priority: u16,
    #[serde(default)]
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            connections: Vec::new(),
            service_records: Vec::new(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from files with environment overrides
    pub fn load(base_path: Option<&Path>, environment: Option<&str>) -> Result<Self> {
        let base = base_path.unwrap_or(Path::new(files::DEFAULT_CONFIG_PATH));

        let mut builder = Config::builder().add_source(File::from(base).required(true));

        // Add environment-specific overrides if specified
        if let Some(env) = environment {
            let env_file = base
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default()
                .join(files::ENVIRONMENTS_DIR)
                .join(format!("{}.toml", env));

            if env_file.exists() {
                info!("Loading environment config: {:?}", env_file);
                builder = builder.add_source(File::from(env_file));
            } else {
                warn!("Environment config not found: {:?}", env_file);
            }
        }

        // Override with environment variables (SOCKGATE_ prefix)
        builder = builder.add_source(
            Environment::with_prefix(files::ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Get the definition for a connection id
    pub fn get_connection(&self, id: &str) -> Option<&ConnectionDefinition> {
        self.connections.iter().find(|c| c.id.as_str() == id)
    }

    /// Definitions that should get a runtime
    pub fn enabled_connections(&self) -> impl Iterator<Item = &ConnectionDefinition> {
        self.connections.iter().filter(|c| c.enabled)
    }

    /// Validate every definition and service record
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        let mut seen = HashSet::new();
        for connection in &self.connections {
            connection.validate()?;
            if !seen.insert(connection.id.as_str()) {
                return Err(ConfigValidationError::DuplicateId {
                    id: connection.id.to_string(),
                });
            }
        }

        for record in &self.service_records {
            if record.port == 0 {
                return Err(ConfigValidationError::ServiceRecord {
                    name: record.name.clone(),
                    reason: "port must be non-zero".to_string(),
                });
            }
            if record.target.trim().is_empty() {
                return Err(ConfigValidationError::ServiceRecord {
                    name: record.name.clone(),
                    reason: "target is empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Expand environment variables in host names and record targets
    pub fn expand_env_vars(&mut self) -> Result<()> {
        for connection in &mut self.connections {
            match &mut connection.endpoint {
                EndpointConfig::Static { host, .. } => {
                    *host = shellexpand::env(host.as_str())
                        .context("Failed to expand endpoint host")?
                        .into_owned();
                }
                EndpointConfig::Dns {
                    domain, hostname, ..
                } => {
                    *domain = shellexpand::env(domain.as_str())
                        .context("Failed to expand service domain")?
                        .into_owned();
                    if let Some(hostname) = hostname {
                        *hostname = shellexpand::env(hostname.as_str())
                            .context("Failed to expand endpoint hostname")?
                            .into_owned();
                    }
                }
            }
        }

        for record in &mut self.service_records {
            record.target = shellexpand::env(record.target.as_str())
                .context("Failed to expand service record target")?
                .into_owned();
        }
        Ok(())
    }
}

/// Load, expand and validate a gateway configuration
pub fn load_config(path: Option<&Path>, environment: Option<&str>) -> Result<GatewayConfig> {
    let mut config = GatewayConfig::load(path, environment)?;
    config.expand_env_vars()?;
    config.validate().context("Invalid gateway configuration")?;
    debug!(
        connections = config.connections.len(),
        service_records = config.service_records.len(),
        "Gateway configuration loaded"
    );
    Ok(config)
}

/// Default configuration path, honouring `SOCKGATE_CONFIG`
pub fn default_config_path() -> PathBuf {
    std::env::var_os(format!("{}_CONFIG", files::ENV_PREFIX))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(files::DEFAULT_CONFIG_PATH))
}
