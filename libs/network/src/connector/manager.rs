//! Connection manager facade
//!
//! Owns one slot per connection id. A slot's `tokio::sync::Mutex` guards the
//! lifecycle state and is held for the whole of a transition, so an update
//! racing a removal for the same id is applied in order. Sends only hold the
//! slot lock long enough to clone the running runtime.

use super::runtime::ConnectorRuntime;
use crate::discovery::{EndpointResolver, ServiceRecordLookup};
use crate::transports::{SessionConnector, TcpConnector};
use crate::{ConnectorError, Result};
use gateway_config::ConnectionDefinition;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use types::{ConnectionId, OutgoingMessageResponse, StructuredMessage};

/// Lifecycle of one connection id
#[derive(Debug, Clone, Default)]
pub enum LifecycleState {
    #[default]
    Stopped,
    Starting,
    Running(Arc<ConnectorRuntime>),
    Draining(Arc<ConnectorRuntime>),
}

impl LifecycleState {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleState::Stopped => "stopped",
            LifecycleState::Starting => "starting",
            LifecycleState::Running(_) => "running",
            LifecycleState::Draining(_) => "draining",
        }
    }

    fn running(&self) -> Option<&Arc<ConnectorRuntime>> {
        match self {
            LifecycleState::Running(runtime) => Some(runtime),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct SlotState {
    definition: Arc<ConnectionDefinition>,
    lifecycle: LifecycleState,
}

#[derive(Debug)]
struct ConnectionSlot {
    state: Mutex<SlotState>,
}

impl ConnectionSlot {
    fn new(definition: Arc<ConnectionDefinition>) -> Self {
        Self {
            state: Mutex::new(SlotState {
                definition,
                lifecycle: LifecycleState::Stopped,
            }),
        }
    }
}

/// Public surface of the outbound connector
#[derive(Debug)]
pub struct ConnectionManager {
    slots: RwLock<HashMap<ConnectionId, Arc<ConnectionSlot>>>,
    connector: Arc<dyn SessionConnector>,
    resolver: Arc<EndpointResolver>,
    started: AtomicBool,
}

impl ConnectionManager {
    pub fn new(connector: Arc<dyn SessionConnector>, resolver: EndpointResolver) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            connector,
            resolver: Arc::new(resolver),
            started: AtomicBool::new(false),
        }
    }

    /// Manager over real TCP connections
    pub fn tcp(directory: Option<Arc<dyn ServiceRecordLookup>>) -> Self {
        Self::new(Arc::new(TcpConnector::new()), EndpointResolver::new(directory))
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Known connection ids, sorted
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        let mut ids: Vec<ConnectionId> = self.slots.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    fn slot(&self, id: &ConnectionId) -> Option<Arc<ConnectionSlot>> {
        self.slots.read().get(id).cloned()
    }

    fn all_slots(&self) -> Vec<(ConnectionId, Arc<ConnectionSlot>)> {
        let mut slots: Vec<_> = self
            .slots
            .read()
            .iter()
            .map(|(id, slot)| (id.clone(), slot.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }

    /// Running runtime for `id`
    pub async fn runtime(&self, id: &ConnectionId) -> Option<Arc<ConnectorRuntime>> {
        let slot = self.slot(id)?;
        let state = slot.state.lock().await;
        state.lifecycle.running().cloned()
    }

    /// Lifecycle state name for `id`
    pub async fn lifecycle(&self, id: &ConnectionId) -> Option<&'static str> {
        let slot = self.slot(id)?;
        let state = slot.state.lock().await;
        Some(state.lifecycle.name())
    }

    /// Add or replace a connection definition
    ///
    /// Once started, a new runtime is built before the old one drains. Before
    /// `start()`, or for a disabled definition, the definition is only
    /// recorded and any running runtime is drained.
    pub async fn connection_updated(&self, definition: ConnectionDefinition) -> Result<()> {
        definition.validate()?;
        if !definition.is_outbound() {
            return Err(ConnectorError::configuration(
                format!(
                    "connection '{}' is inbound; only outbound connections are supported",
                    definition.id
                ),
                Some("direction"),
            ));
        }

        let id = definition.id.clone();
        let definition = Arc::new(definition);
        let slot = self
            .slots
            .write()
            .entry(id.clone())
            .or_insert_with(|| Arc::new(ConnectionSlot::new(definition.clone())))
            .clone();

        let mut state = slot.state.lock().await;
        state.definition = definition.clone();
        info!(connection_id = %id, name = definition.display_name(), "Connection definition updated");

        if self.is_started() && definition.enabled {
            self.start_slot(&id, &mut state).await
        } else {
            if !definition.enabled {
                debug!(connection_id = %id, "Connection disabled");
            }
            Self::stop_slot(&id, &mut state).await;
            Ok(())
        }
    }

    /// Forget a connection, closing its sessions
    pub async fn connection_removed(&self, id: &ConnectionId) -> bool {
        let removed = self.slots.write().remove(id);
        let Some(slot) = removed else {
            debug!(connection_id = %id, "Removal of unknown connection ignored");
            return false;
        };
        let mut state = slot.state.lock().await;
        Self::stop_slot(id, &mut state).await;
        info!(connection_id = %id, "Connection removed");
        true
    }

    /// Build runtimes for every enabled definition
    ///
    /// Every slot is attempted; the first failure is returned.
    pub async fn start(&self) -> Result<()> {
        self.started.store(true, Ordering::Release);
        let mut first_error = None;
        let mut running = 0;

        for (id, slot) in self.all_slots() {
            let mut state = slot.state.lock().await;
            if !state.definition.enabled || state.lifecycle.running().is_some() {
                continue;
            }
            match self.start_slot(&id, &mut state).await {
                Ok(()) => running += 1,
                Err(e) => {
                    error!(connection_id = %id, "Failed to start connection: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        info!(connections = running, "Connection manager started");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Drain every runtime; definitions stay registered
    pub async fn stop(&self) {
        self.started.store(false, Ordering::Release);
        for (id, slot) in self.all_slots() {
            let mut state = slot.state.lock().await;
            Self::stop_slot(&id, &mut state).await;
        }
        info!("Connection manager stopped");
    }

    /// Stop and forget every connection
    pub async fn shutdown(&self) {
        self.stop().await;
        self.slots.write().clear();
        info!("Connection manager shut down");
    }

    async fn start_slot(&self, id: &ConnectionId, state: &mut SlotState) -> Result<()> {
        let previous = std::mem::replace(&mut state.lifecycle, LifecycleState::Starting);

        let runtime = match ConnectorRuntime::new(
            state.definition.clone(),
            self.connector.clone(),
            self.resolver.clone(),
        ) {
            Ok(runtime) => Arc::new(runtime),
            Err(e) => {
                state.lifecycle = previous;
                Self::stop_slot(id, state).await;
                return Err(e);
            }
        };

        if let LifecycleState::Running(old) = previous {
            state.lifecycle = LifecycleState::Draining(old.clone());
            old.drain().await;
        }

        state.lifecycle = LifecycleState::Running(runtime);
        info!(connection_id = %id, "Connection running");
        Ok(())
    }

    async fn stop_slot(id: &ConnectionId, state: &mut SlotState) {
        if let LifecycleState::Running(runtime) | LifecycleState::Draining(runtime) =
            std::mem::take(&mut state.lifecycle)
        {
            state.lifecycle = LifecycleState::Draining(runtime.clone());
            runtime.drain().await;
            info!(connection_id = %id, "Connection stopped");
        }
        state.lifecycle = LifecycleState::Stopped;
    }

    /// Send one message through a connection
    ///
    /// `session_hint` asks to reuse a session returned by an earlier call.
    /// `response_expected` overrides the definition's exchange pattern. A
    /// missing OutIn reply is `bytes: None`, not an error.
    pub async fn send_message(
        &self,
        connection_id: &ConnectionId,
        payload: &StructuredMessage,
        session_hint: Option<&str>,
        response_expected: Option<bool>,
    ) -> Result<OutgoingMessageResponse> {
        let runtime = self
            .runtime(connection_id)
            .await
            .ok_or_else(|| ConnectorError::connection_not_found(connection_id.as_str()))?;
        let definition = runtime.definition().clone();
        let pattern = definition.exchange_pattern.with_override(response_expected);

        let endpoint = runtime.resolve().await?;
        let wire = runtime.codec().encode(payload)?;
        let handle = runtime.acquire_session(&endpoint, session_hint).await?;

        let reply = match runtime.exchange(&handle, &wire, pattern).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    connection_id = %connection_id,
                    session_id = %handle.id(),
                    category = e.category(),
                    "Exchange failed, closing session: {}",
                    e
                );
                if let Err(close_err) = runtime.close_session(&handle).await {
                    debug!(session_id = %handle.id(), "Close after failure: {}", close_err);
                }
                return Err(e);
            }
        };

        runtime.release_or_close(&handle, definition.keep_alive).await?;

        debug!(
            connection_id = %connection_id,
            session_id = %handle.id(),
            pattern = %pattern,
            bytes_out = wire.len(),
            replied = reply.is_some(),
            "Exchange complete"
        );

        // Replies carry the codec's charset label
        let (content_type, bytes) = match reply {
            Some(reply) => (reply.content_type().to_string(), Some(reply.into_content())),
            None => (definition.content_type.clone(), None),
        };
        Ok(OutgoingMessageResponse {
            session_id: handle.id(),
            content_type,
            bytes,
        })
    }
}
