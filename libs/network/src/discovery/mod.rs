//! Service Discovery and Endpoint Resolution
//!
//! ## Purpose
//!
//! Maps a connection definition to the `(host, port)` its sessions connect
//! to. Static endpoints pass straight through. Dynamic endpoints are looked
//! up as SRV-style service records named `_{service}._tcp.{domain}` and
//! cached per connector runtime for a fixed TTL.
//!
//! ## Directory Seam
//!
//! [`ServiceRecordLookup`] is the directory collaborator. A failed lookup is a
//! [`LookupError`]; a name with no records is an empty `Vec`, not an error.
//! [`StaticServiceDirectory`] serves records from configuration and is what
//! the gateway binary uses when no external directory is wired in.

pub mod error;
pub mod resolver;

pub use error::LookupError;
pub use resolver::{Endpoint, EndpointResolver, Resolution, ResolutionCache};

use async_trait::async_trait;
use gateway_config::defaults::discovery::SERVICE_RECORD_ATTRIBUTE;
use gateway_config::ServiceRecordConfig;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// One service record: where a service instance listens
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub priority: u16,
    pub weight: u16,
    pub port: u16,
    pub target: String,
}

impl ServiceRecord {
    pub fn new(priority: u16, weight: u16, port: u16, target: impl Into<String>) -> Self {
        Self {
            priority,
            weight,
            port,
            target: target.into(),
        }
    }

    /// Target without the trailing root dot
    pub fn host(&self) -> &str {
        self.target.strip_suffix('.').unwrap_or(&self.target)
    }
}

impl From<&ServiceRecordConfig> for ServiceRecord {
    fn from(config: &ServiceRecordConfig) -> Self {
        Self::new(config.priority, config.weight, config.port, config.target.clone())
    }
}

/// Directory lookup collaborator
#[async_trait]
pub trait ServiceRecordLookup: Send + Sync + Debug {
    /// Records for `name`, ordered as the directory returns them
    async fn lookup_service_records(
        &self,
        name: &str,
        attribute_ids: &[&str],
    ) -> Result<Vec<ServiceRecord>, LookupError>;
}

/// Build the service-record query name
pub fn service_query_name(service: &str, domain: &str) -> String {
    format!(
        "_{}._tcp.{}",
        service.trim_start_matches('_'),
        domain.trim_end_matches('.')
    )
}

fn normalize(name: &str) -> String {
    name.trim_end_matches('.').to_ascii_lowercase()
}

/// In-memory directory fed from configuration
#[derive(Debug, Default)]
pub struct StaticServiceDirectory {
    records: RwLock<HashMap<String, Vec<ServiceRecord>>>,
    lookups: AtomicUsize,
}

impl StaticServiceDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(records: &[ServiceRecordConfig]) -> Self {
        let directory = Self::new();
        for record in records {
            directory.add_record(&record.name, ServiceRecord::from(record));
        }
        directory
    }

    pub fn add_record(&self, name: &str, record: ServiceRecord) {
        self.records
            .write()
            .entry(normalize(name))
            .or_default()
            .push(record);
    }

    /// Replace every record under `name`
    pub fn set_records(&self, name: &str, records: Vec<ServiceRecord>) {
        self.records.write().insert(normalize(name), records);
    }

    /// Number of lookups served so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ServiceRecordLookup for StaticServiceDirectory {
    async fn lookup_service_records(
        &self,
        name: &str,
        attribute_ids: &[&str],
    ) -> Result<Vec<ServiceRecord>, LookupError> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        if let Some(attribute) = attribute_ids
            .iter()
            .find(|a| !a.eq_ignore_ascii_case(SERVICE_RECORD_ATTRIBUTE))
        {
            return Err(LookupError::UnsupportedAttribute {
                attribute: attribute.to_string(),
            });
        }
        if !name.starts_with('_') {
            return Err(LookupError::InvalidName {
                name: name.to_string(),
                reason: "service names start with '_'".to_string(),
            });
        }

        let records = self
            .records
            .read()
            .get(&normalize(name))
            .cloned()
            .unwrap_or_default();
        debug!(name, records = records.len(), "Static directory lookup");
        Ok(records)
    }
}
