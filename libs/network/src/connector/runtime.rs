//! Connector runtime: the session pool of one running connection
//!
//! Pool mutation is serialized by one `tokio::sync::Mutex` per runtime. The
//! lock is held across `connect()` so two callers cannot race to reuse or
//! register the same session id. Runtimes for different connections share
//! nothing.

use crate::discovery::{Endpoint, EndpointResolver, ResolutionCache};
use crate::transports::{SessionConnector, SessionHandle};
use crate::{ConnectorError, Result};
use codec::StreamCodec;
use gateway_config::ConnectionDefinition;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use types::{ExchangePattern, SessionId, StructuredMessage};

/// Counters for one runtime
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuntimeStats {
    /// Sessions currently registered
    pub sessions: usize,
    /// Real `connect()` calls that succeeded
    pub connects: u64,
    /// Hint hits on a pooled session
    pub reuses: u64,
    /// Sessions actually closed
    pub closes: u64,
    /// Directory lookups performed
    pub lookups: u64,
}

/// Session pool, codec and resolution cache built from one definition
#[derive(Debug)]
pub struct ConnectorRuntime {
    definition: Arc<ConnectionDefinition>,
    codec: Arc<dyn StreamCodec>,
    connector: Arc<dyn SessionConnector>,
    resolver: Arc<EndpointResolver>,
    resolution: Mutex<ResolutionCache>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
    /// Set when re-resolution moved the endpoint; the next acquire connects
    expired: AtomicBool,
    connects: AtomicU64,
    reuses: AtomicU64,
    closes: AtomicU64,
    lookups: AtomicU64,
}

impl ConnectorRuntime {
    pub fn new(
        definition: Arc<ConnectionDefinition>,
        connector: Arc<dyn SessionConnector>,
        resolver: Arc<EndpointResolver>,
    ) -> Result<Self> {
        let codec = codec::build_codec(&definition.codec, definition.max_message_size)?;
        info!(
            connection_id = %definition.id,
            codec = codec.name(),
            pattern = %definition.exchange_pattern,
            keep_alive = definition.keep_alive,
            "Built connector runtime"
        );
        Ok(Self {
            definition,
            codec,
            connector,
            resolver,
            resolution: Mutex::new(ResolutionCache::default()),
            sessions: Mutex::new(HashMap::new()),
            expired: AtomicBool::new(false),
            connects: AtomicU64::new(0),
            reuses: AtomicU64::new(0),
            closes: AtomicU64::new(0),
            lookups: AtomicU64::new(0),
        })
    }

    pub fn definition(&self) -> &Arc<ConnectionDefinition> {
        &self.definition
    }

    pub fn codec(&self) -> &dyn StreamCodec {
        self.codec.as_ref()
    }

    pub fn is_expired(&self) -> bool {
        self.expired.load(Ordering::Acquire)
    }

    /// Resolve the endpoint, marking the runtime expired if it moved
    ///
    /// Concurrent callers queue on the cache lock, so one expiry causes one
    /// lookup.
    pub async fn resolve(&self) -> Result<Endpoint> {
        let mut cache = self.resolution.lock().await;
        let resolution = self.resolver.resolve(&self.definition, &mut cache).await?;
        if resolution.looked_up {
            self.lookups.fetch_add(1, Ordering::Relaxed);
        }
        if resolution.changed {
            self.expired.store(true, Ordering::Release);
        }
        Ok(resolution.endpoint)
    }

    /// Reuse the hinted session or connect a new one
    ///
    /// A hint that parses but names no registered session fails with
    /// `SessionNotFound` while the pool holds other sessions. An expired
    /// runtime always connects; sessions opened before the endpoint moved stay
    /// registered until they close on their own. The expiry clears only once
    /// a session connects to the endpoint currently held in the cache.
    pub async fn acquire_session(
        &self,
        endpoint: &Endpoint,
        hint: Option<&str>,
    ) -> Result<SessionHandle> {
        let mut sessions = self.sessions.lock().await;

        if self.is_expired() {
            debug!(
                connection_id = %self.definition.id,
                endpoint = %endpoint,
                "Endpoint changed, opening a new session"
            );
        } else if let Some(id) = hint.and_then(|h| h.trim().parse::<SessionId>().ok()) {
            match sessions.get(&id) {
                Some(handle) if handle.is_open() => {
                    self.reuses.fetch_add(1, Ordering::Relaxed);
                    debug!(connection_id = %self.definition.id, session_id = %id, "Reusing session");
                    return Ok(handle.clone());
                }
                Some(_) => {
                    sessions.remove(&id);
                    debug!(
                        connection_id = %self.definition.id,
                        session_id = %id,
                        "Hinted session is closed, reconnecting"
                    );
                }
                None if !sessions.is_empty() => {
                    return Err(ConnectorError::session_not_found(
                        self.definition.id.as_str(),
                        id,
                    ));
                }
                None => {}
            }
        }

        let io = self
            .connector
            .connect(&endpoint.host, endpoint.port, &self.definition.socket)
            .await?;
        let handle = SessionHandle::new(io, self.codec.new_state());
        self.connects.fetch_add(1, Ordering::Relaxed);
        // Only a connect to the currently resolved endpoint settles an expiry
        let current = self.resolution.lock().await.endpoint().cloned();
        if current.map_or(true, |current| current == *endpoint) {
            self.expired.store(false, Ordering::Release);
        }

        let displaced = sessions.insert(handle.id(), handle.clone());
        drop(sessions);

        if let Some(old) = displaced {
            warn!(
                connection_id = %self.definition.id,
                session_id = %old.id(),
                "Session id reissued by transport, closing previous session"
            );
            self.close_handle(&old).await;
        }

        debug!(
            connection_id = %self.definition.id,
            session_id = %handle.id(),
            "Registered session"
        );
        Ok(handle)
    }

    /// One exchange on an acquired session
    ///
    /// Read is configured before the write. OutOnly never reads. An OutIn
    /// read that times out returns `Ok(None)`.
    pub async fn exchange(
        &self,
        handle: &SessionHandle,
        wire: &[u8],
        pattern: ExchangePattern,
    ) -> Result<Option<StructuredMessage>> {
        let mut session = handle.lock().await;
        session.configure_read(pattern, self.definition.listen_timeout());
        session.write(wire).await?;
        if pattern.expects_response() {
            session.receive(self.codec.as_ref()).await
        } else {
            Ok(None)
        }
    }

    /// Keep the session pooled or close it
    pub async fn release_or_close(&self, handle: &SessionHandle, keep_alive: bool) -> Result<()> {
        if keep_alive && handle.is_open() {
            debug!(connection_id = %self.definition.id, session_id = %handle.id(), "Released session");
            return Ok(());
        }
        self.close_session(handle).await
    }

    /// Deregister and close a session
    pub async fn close_session(&self, handle: &SessionHandle) -> Result<()> {
        {
            let mut sessions = self.sessions.lock().await;
            let registered = sessions
                .get(&handle.id())
                .map(|h| h.same_session(handle))
                .unwrap_or(false);
            if registered {
                sessions.remove(&handle.id());
            }
        }
        if handle.close().await? {
            self.closes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Close every registered session
    ///
    /// Each close waits for the session's lock, so an exchange in progress
    /// completes first.
    pub async fn drain(&self) -> usize {
        let handles: Vec<SessionHandle> = self
            .sessions
            .lock()
            .await
            .drain()
            .map(|(_, handle)| handle)
            .collect();

        let mut closed = 0;
        for handle in &handles {
            if self.close_handle(handle).await {
                closed += 1;
            }
        }
        info!(
            connection_id = %self.definition.id,
            sessions = handles.len(),
            closed,
            "Drained connector runtime"
        );
        closed
    }

    async fn close_handle(&self, handle: &SessionHandle) -> bool {
        match handle.close().await {
            Ok(true) => {
                self.closes.fetch_add(1, Ordering::Relaxed);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(
                    connection_id = %self.definition.id,
                    session_id = %handle.id(),
                    "Error closing session: {}",
                    e
                );
                false
            }
        }
    }

    /// Registered session by id
    pub async fn session(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.lock().await.get(&id).cloned()
    }

    pub async fn stats(&self) -> RuntimeStats {
        RuntimeStats {
            sessions: self.sessions.lock().await.len(),
            connects: self.connects.load(Ordering::Relaxed),
            reuses: self.reuses.load(Ordering::Relaxed),
            closes: self.closes.load(Ordering::Relaxed),
            lookups: self.lookups.load(Ordering::Relaxed),
        }
    }
}
