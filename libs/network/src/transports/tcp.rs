//! TCP Session Transport
//!
//! Outbound TCP connections with connect timeout and `TCP_NODELAY`. Session
//! ids come from a process-wide counter, so an id is never reused while the
//! process lives.

use super::{ReadMode, SessionConnector, SessionIo};
use crate::{ConnectorError, Result};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use gateway_config::SocketOptions;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};
use types::SessionId;

static SESSION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique session ID
pub fn next_session_id() -> SessionId {
    SessionId::new(SESSION_ID_COUNTER.fetch_add(1, Ordering::SeqCst))
}

/// One open outbound TCP connection
#[derive(Debug)]
pub struct TcpSessionIo {
    id: SessionId,
    stream: TcpStream,
    peer_addr: SocketAddr,
    read_mode: ReadMode,
    read_buffer: BytesMut,
    read_buffer_size: usize,
    pub(crate) bytes_sent: u64,
    pub(crate) bytes_received: u64,
}

impl TcpSessionIo {
    pub fn new(stream: TcpStream, peer_addr: SocketAddr, read_buffer_size: usize) -> Self {
        Self {
            id: next_session_id(),
            stream,
            peer_addr,
            read_mode: ReadMode::Suspended,
            read_buffer: BytesMut::with_capacity(read_buffer_size),
            read_buffer_size,
            bytes_sent: 0,
            bytes_received: 0,
        }
    }

    pub fn read_mode(&self) -> ReadMode {
        self.read_mode
    }
}

#[async_trait]
impl SessionIo for TcpSessionIo {
    fn id(&self) -> SessionId {
        self.id
    }

    fn peer_addr(&self) -> Option<SocketAddr> {
        Some(self.peer_addr)
    }

    fn set_read_mode(&mut self, mode: ReadMode) {
        self.read_mode = mode;
    }

    async fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.stream
            .write_all(bytes)
            .await
            .map_err(|e| ConnectorError::network_with_source("Failed to write to session", e))?;

        // Flush to ensure immediate transmission
        self.stream
            .flush()
            .await
            .map_err(|e| ConnectorError::network_with_source("Failed to flush TCP stream", e))?;

        self.bytes_sent += bytes.len() as u64;
        debug!(
            session_id = %self.id,
            peer = %self.peer_addr,
            bytes = bytes.len(),
            total_sent = self.bytes_sent,
            "Wrote to TCP session"
        );
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Bytes> {
        if !self.read_mode.is_enabled() {
            return Err(ConnectorError::configuration(
                format!("read is suspended on session {}", self.id),
                Some("read_mode"),
            ));
        }

        self.read_buffer.clear();
        self.read_buffer.reserve(self.read_buffer_size);
        let n = self
            .stream
            .read_buf(&mut self.read_buffer)
            .await
            .map_err(|e| ConnectorError::network_with_source("Failed to read from session", e))?;

        self.bytes_received += n as u64;
        debug!(
            session_id = %self.id,
            peer = %self.peer_addr,
            bytes = n,
            total_received = self.bytes_received,
            "Read from TCP session"
        );
        Ok(self.read_buffer.split_to(n).freeze())
    }

    async fn close(&mut self) -> Result<()> {
        if let Err(e) = self.stream.shutdown().await {
            // Peer may already have gone away
            debug!(session_id = %self.id, "TCP shutdown returned {}", e);
        }
        Ok(())
    }
}

/// Connector producing [`TcpSessionIo`] sessions
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionConnector for TcpConnector {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        options: &SocketOptions,
    ) -> Result<Box<dyn SessionIo>> {
        info!("Connecting to TCP peer at {}:{}", host, port);

        let stream = tokio::time::timeout(
            options.connect_timeout(),
            TcpStream::connect((host, port)),
        )
        .await
        .map_err(|_| ConnectorError::timeout("connect", options.connect_timeout_ms))?
        .map_err(|e| {
            ConnectorError::connection_with_source(
                format!("Failed to connect to {}:{}", host, port),
                None,
                e,
            )
        })?;

        if options.tcp_nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                warn!("Failed to set TCP_NODELAY: {}", e);
            }
        }

        let peer_addr = stream.peer_addr()?;
        let io = TcpSessionIo::new(stream, peer_addr, options.read_buffer_size);
        info!(
            session_id = %io.id(),
            peer = %peer_addr,
            "Successfully connected to TCP peer"
        );
        Ok(Box::new(io))
    }
}
