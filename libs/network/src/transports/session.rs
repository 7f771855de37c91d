//! Sessions and shared session handles
//!
//! A [`Session`] owns its transport, its codec framing state and any decoded
//! messages a read produced beyond the one returned. The pool hands out
//! [`SessionHandle`]s; locking the handle gives one exchange exclusive use of
//! the session.

use super::{ReadMode, SessionIo};
use crate::Result;
use codec::{FramingState, StreamCodec};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use types::{ExchangePattern, SessionId, StructuredMessage};

/// One live connection with its framing state
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    io: Box<dyn SessionIo>,
    framing: FramingState,
    read_mode: ReadMode,
    inbox: VecDeque<StructuredMessage>,
    open: Arc<AtomicBool>,
}

impl Session {
    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.io.peer_addr()
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }

    pub fn framing(&self) -> &FramingState {
        &self.framing
    }

    /// Configure the read side for an exchange pattern
    pub fn configure_read(&mut self, pattern: ExchangePattern, timeout: Duration) {
        let mode = match pattern {
            ExchangePattern::OutOnly => ReadMode::Suspended,
            ExchangePattern::OutIn => ReadMode::Enabled { timeout },
        };
        self.read_mode = mode;
        self.io.set_read_mode(mode);
    }

    /// Write already-encoded bytes
    pub async fn write(&mut self, bytes: &[u8]) -> Result<()> {
        if !self.is_open() {
            return Err(crate::ConnectorError::connection(
                format!("session {} is closed", self.id),
                self.peer_addr(),
            ));
        }
        self.io.write_all(bytes).await
    }

    /// Wait for one decoded message
    ///
    /// Returns `Ok(None)` when the read timeout elapses or the peer closes
    /// before a complete message arrives. A peer close also marks the session
    /// closed so it is not handed out again.
    pub async fn receive(&mut self, codec: &dyn StreamCodec) -> Result<Option<StructuredMessage>> {
        if let Some(message) = self.inbox.pop_front() {
            return Ok(Some(message));
        }
        let Some(timeout) = self.read_mode.timeout() else {
            return Err(crate::ConnectorError::configuration(
                format!("read is suspended on session {}", self.id),
                Some("read_mode"),
            ));
        };

        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let chunk = match tokio::time::timeout_at(deadline, self.io.read_chunk()).await {
                Ok(chunk) => chunk?,
                Err(_) => {
                    warn!(
                        session_id = %self.id,
                        timeout_ms = timeout.as_millis() as u64,
                        pending = self.framing.pending_len(),
                        "No response received within read timeout"
                    );
                    return Ok(None);
                }
            };

            if chunk.is_empty() {
                info!(session_id = %self.id, "Peer closed session before responding");
                self.open.store(false, Ordering::Release);
                return Ok(None);
            }

            let mut messages = codec.decode(&mut self.framing, &chunk)?.into_iter();
            if let Some(first) = messages.next() {
                self.inbox.extend(messages);
                return Ok(Some(first));
            }
        }
    }

    /// Close once; later calls are no-ops
    pub async fn close(&mut self) -> Result<bool> {
        if !self.open.swap(false, Ordering::AcqRel) {
            return Ok(false);
        }
        if !self.inbox.is_empty() {
            debug!(
                session_id = %self.id,
                dropped = self.inbox.len(),
                "Dropping undelivered messages on close"
            );
        }
        self.io.close().await?;
        info!(session_id = %self.id, "Closed session");
        Ok(true)
    }
}

/// Shared handle to a pooled session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: SessionId,
    open: Arc<AtomicBool>,
    inner: Arc<Mutex<Session>>,
}

impl SessionHandle {
    pub fn new(io: Box<dyn SessionIo>, framing: FramingState) -> Self {
        let id = io.id();
        let open = Arc::new(AtomicBool::new(true));
        let session = Session {
            id,
            io,
            framing,
            read_mode: ReadMode::Suspended,
            inbox: VecDeque::new(),
            open: open.clone(),
        };
        Self {
            id,
            open,
            inner: Arc::new(Mutex::new(session)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Open flag, readable without locking the session
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Exclusive access for one exchange
    pub async fn lock(&self) -> MutexGuard<'_, Session> {
        self.inner.lock().await
    }

    /// Close after any in-flight exchange on this session finishes
    pub async fn close(&self) -> Result<bool> {
        self.inner.lock().await.close().await
    }

    pub fn same_session(&self, other: &SessionHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
