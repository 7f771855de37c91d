//! Endpoint resolver with a per-runtime TTL cache
//!
//! The cache is an explicit `(endpoint, expiry)` pair recomputed lazily on
//! the first resolve after expiry. Any lookup attempt moves the expiry
//! forward, whether the lookup succeeds, fails, or returns the same port.

use super::{service_query_name, ServiceRecord, ServiceRecordLookup};
use crate::{ConnectorError, Result};
use gateway_config::defaults::discovery::{RESOLUTION_TTL_SECS, SERVICE_RECORD_ATTRIBUTE};
use gateway_config::{ConnectionDefinition, EndpointConfig};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Resolved connect target
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Cached dynamic resolution for one connector runtime
#[derive(Debug, Default)]
pub struct ResolutionCache {
    endpoint: Option<Endpoint>,
    expires_at: Option<Instant>,
}

impl ResolutionCache {
    pub fn endpoint(&self) -> Option<&Endpoint> {
        self.endpoint.as_ref()
    }

    /// Whether a cached endpoint can be used at `now`
    pub fn is_fresh(&self, now: Instant) -> bool {
        match (&self.endpoint, self.expires_at) {
            (Some(_), Some(expires_at)) => now < expires_at,
            _ => false,
        }
    }
}

/// Outcome of one resolve call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub endpoint: Endpoint,
    /// A directory lookup was performed
    pub looked_up: bool,
    /// The lookup produced a different port than the cached endpoint
    pub changed: bool,
}

/// Static or service-record endpoint resolution
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    directory: Option<Arc<dyn ServiceRecordLookup>>,
    ttl: Duration,
}

impl EndpointResolver {
    pub fn new(directory: Option<Arc<dyn ServiceRecordLookup>>) -> Self {
        Self {
            directory,
            ttl: Duration::from_secs(RESOLUTION_TTL_SECS),
        }
    }

    /// Resolver for static endpoints only
    pub fn static_only() -> Self {
        Self::new(None)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Resolve the endpoint a definition's sessions connect to
    ///
    /// Dynamic definitions consult `cache` first and only query the directory
    /// once the cached entry has expired.
    pub async fn resolve(
        &self,
        definition: &ConnectionDefinition,
        cache: &mut ResolutionCache,
    ) -> Result<Resolution> {
        let (service, domain, hostname) = match &definition.endpoint {
            EndpointConfig::Static { host, port } => {
                return Ok(Resolution {
                    endpoint: Endpoint::new(host.clone(), *port),
                    looked_up: false,
                    changed: false,
                });
            }
            EndpointConfig::Dns {
                service,
                domain,
                hostname,
            } => (service, domain, hostname.as_deref()),
        };

        let now = Instant::now();
        if cache.is_fresh(now) {
            if let Some(endpoint) = cache.endpoint() {
                return Ok(Resolution {
                    endpoint: endpoint.clone(),
                    looked_up: false,
                    changed: false,
                });
            }
        }

        let query = service_query_name(service, domain);
        let directory = self.directory.as_ref().ok_or_else(|| {
            ConnectorError::configuration(
                format!(
                    "connection '{}' needs a service directory to resolve {}",
                    definition.id, query
                ),
                Some("endpoint"),
            )
        })?;

        cache.expires_at = Some(now + self.ttl);
        debug!(connection_id = %definition.id, query = %query, "Looking up service records");

        let records = directory
            .lookup_service_records(&query, &[SERVICE_RECORD_ATTRIBUTE])
            .await
            .map_err(|e| {
                ConnectorError::endpoint_resolution_with_source(
                    query.clone(),
                    "service record lookup failed",
                    e,
                )
            })?;

        let record = select_record(&records, hostname).ok_or_else(|| {
            let message = match hostname {
                Some(h) => format!("no service record with target '{}'", h),
                None => "no service record found".to_string(),
            };
            ConnectorError::endpoint_resolution(query.clone(), message)
        })?;

        let endpoint = Endpoint::new(record.host(), record.port);
        // A renamed target on the same port keeps pooled sessions
        let changed = cache
            .endpoint
            .as_ref()
            .map(|previous| previous.port != endpoint.port)
            .unwrap_or(false);

        if changed {
            info!(
                connection_id = %definition.id,
                previous = %cache.endpoint.as_ref().map(|e| e.to_string()).unwrap_or_default(),
                current = %endpoint,
                "Resolved endpoint changed"
            );
        } else {
            info!(connection_id = %definition.id, endpoint = %endpoint, "Resolved endpoint");
        }

        cache.endpoint = Some(endpoint.clone());
        Ok(Resolution {
            endpoint,
            looked_up: true,
            changed,
        })
    }
}

/// Pick the record to connect to
///
/// Restricts to `hostname` when given (case-insensitive, trailing dot
/// ignored), then takes the lowest priority, ties broken by target name.
pub fn select_record<'a>(
    records: &'a [ServiceRecord],
    hostname: Option<&str>,
) -> Option<&'a ServiceRecord> {
    let wanted = hostname.map(|h| h.trim_end_matches('.').to_ascii_lowercase());
    records
        .iter()
        .filter(|r| match &wanted {
            Some(h) => r.host().eq_ignore_ascii_case(h),
            None => true,
        })
        .min_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.host().to_ascii_lowercase().cmp(&b.host().to_ascii_lowercase()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::{LookupError, StaticServiceDirectory};
    use async_trait::async_trait;

    const QUERY: &str = "_hl7._tcp.lab.example.org";

    fn dns_definition(hostname: Option<&str>) -> ConnectionDefinition {
        ConnectionDefinition::new(
            "lab",
            EndpointConfig::Dns {
                service: "hl7".to_string(),
                domain: "lab.example.org".to_string(),
                hostname: hostname.map(str::to_string),
            },
        )
    }

    fn directory_with(records: Vec<ServiceRecord>) -> Arc<StaticServiceDirectory> {
        let directory = Arc::new(StaticServiceDirectory::new());
        directory.set_records(QUERY, records);
        directory
    }

    #[test]
    fn test_select_lowest_priority_then_name() {
        let records = vec![
            ServiceRecord::new(20, 0, 1001, "a.lab."),
            ServiceRecord::new(10, 0, 1002, "z.lab."),
            ServiceRecord::new(10, 0, 1003, "m.lab."),
        ];
        assert_eq!(select_record(&records, None).unwrap().port, 1003);
        assert_eq!(select_record(&records, Some("A.LAB.")).unwrap().port, 1001);
        assert!(select_record(&records, Some("other.lab")).is_none());
    }

    #[tokio::test]
    async fn test_static_endpoint_passes_through() {
        let resolver = EndpointResolver::static_only();
        let definition = ConnectionDefinition::new(
            "s",
            EndpointConfig::Static {
                host: "10.0.0.1".to_string(),
                port: 2575,
            },
        );
        let mut cache = ResolutionCache::default();
        let resolution = resolver.resolve(&definition, &mut cache).await.unwrap();
        assert_eq!(resolution.endpoint, Endpoint::new("10.0.0.1", 2575));
        assert!(!resolution.looked_up);
        assert!(cache.endpoint().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_bounded_by_ttl() {
        let directory = directory_with(vec![ServiceRecord::new(10, 0, 2575, "lis-1.lab.")]);
        let resolver = EndpointResolver::new(Some(directory.clone()));
        let definition = dns_definition(None);
        let mut cache = ResolutionCache::default();

        let first = resolver.resolve(&definition, &mut cache).await.unwrap();
        assert!(first.looked_up);
        assert!(!first.changed);

        tokio::time::advance(Duration::from_secs(30)).await;
        let second = resolver.resolve(&definition, &mut cache).await.unwrap();
        assert!(!second.looked_up);
        assert_eq!(directory.lookup_count(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        let third = resolver.resolve(&definition, &mut cache).await.unwrap();
        assert!(third.looked_up);
        assert!(!third.changed);
        assert_eq!(directory.lookup_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_change_detected_after_ttl() {
        let directory = directory_with(vec![ServiceRecord::new(10, 0, 2575, "lis-1.lab.")]);
        let resolver = EndpointResolver::new(Some(directory.clone()));
        let definition = dns_definition(None);
        let mut cache = ResolutionCache::default();

        resolver.resolve(&definition, &mut cache).await.unwrap();
        directory.set_records(QUERY, vec![ServiceRecord::new(10, 0, 2576, "lis-1.lab.")]);

        // Still cached
        let cached = resolver.resolve(&definition, &mut cache).await.unwrap();
        assert_eq!(cached.endpoint.port, 2575);

        tokio::time::advance(resolver.ttl()).await;
        let moved = resolver.resolve(&definition, &mut cache).await.unwrap();
        assert!(moved.changed);
        assert_eq!(moved.endpoint, Endpoint::new("lis-1.lab", 2576));
    }

    #[tokio::test(start_paused = true)]
    async fn test_target_rename_on_same_port_is_not_a_change() {
        let directory = directory_with(vec![ServiceRecord::new(10, 0, 2575, "lis-1.lab.")]);
        let resolver = EndpointResolver::new(Some(directory.clone()));
        let definition = dns_definition(None);
        let mut cache = ResolutionCache::default();

        resolver.resolve(&definition, &mut cache).await.unwrap();
        directory.set_records(QUERY, vec![ServiceRecord::new(10, 0, 2575, "lis-2.lab.")]);

        tokio::time::advance(resolver.ttl()).await;
        let renamed = resolver.resolve(&definition, &mut cache).await.unwrap();
        assert!(renamed.looked_up);
        assert!(!renamed.changed);
        assert_eq!(renamed.endpoint, Endpoint::new("lis-2.lab", 2575));
        assert_eq!(cache.endpoint(), Some(&Endpoint::new("lis-2.lab", 2575)));
    }

    #[tokio::test]
    async fn test_no_matching_record() {
        let directory = directory_with(vec![ServiceRecord::new(10, 0, 2575, "lis-1.lab.")]);
        let resolver = EndpointResolver::new(Some(directory));
        let mut cache = ResolutionCache::default();

        let err = resolver
            .resolve(&dns_definition(Some("lis-9.lab")), &mut cache)
            .await
            .unwrap_err();
        assert!(matches!(err, ConnectorError::EndpointResolution { .. }));
        assert!(!err.is_retryable());
    }

    #[derive(Debug)]
    struct BrokenDirectory;

    #[async_trait]
    impl ServiceRecordLookup for BrokenDirectory {
        async fn lookup_service_records(
            &self,
            _name: &str,
            _attribute_ids: &[&str],
        ) -> std::result::Result<Vec<ServiceRecord>, LookupError> {
            Err(LookupError::Unavailable {
                message: "connection refused".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_keeps_source() {
        let resolver = EndpointResolver::new(Some(Arc::new(BrokenDirectory)));
        let mut cache = ResolutionCache::default();
        let err = resolver
            .resolve(&dns_definition(None), &mut cache)
            .await
            .unwrap_err();
        match err {
            ConnectorError::EndpointResolution { query, source, .. } => {
                assert_eq!(query, QUERY);
                assert!(source.is_some());
            }
            other => panic!("Expected EndpointResolution, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_dynamic_endpoint_without_directory() {
        let resolver = EndpointResolver::static_only();
        let mut cache = ResolutionCache::default();
        assert!(matches!(
            resolver.resolve(&dns_definition(None), &mut cache).await,
            Err(ConnectorError::Configuration { .. })
        ));
    }
}
