//! Session Transport Layer
//!
//! A session is one live TCP connection plus the framing state its codec
//! needs between reads. The transport seams are two traits:
//!
//! - [`SessionConnector`] opens connections and assigns session ids
//! - [`SessionIo`] is the byte-level half of one open connection
//!
//! [`tcp::TcpConnector`] is the production implementation. The session
//! layer above these traits owns framing, read configuration and the
//! open/closed flag.

use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use gateway_config::SocketOptions;
use std::fmt::Debug;
use std::net::SocketAddr;
use std::time::Duration;
use types::SessionId;

pub mod session;
pub mod tcp;

// Re-export transport types
pub use session::{Session, SessionHandle};
pub use tcp::{TcpConnector, TcpSessionIo};

/// Read capability of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Nothing is read; OutOnly exchanges
    #[default]
    Suspended,
    /// Reads are allowed and bounded by `timeout`
    Enabled { timeout: Duration },
}

impl ReadMode {
    pub fn is_enabled(&self) -> bool {
        matches!(self, ReadMode::Enabled { .. })
    }

    pub fn timeout(&self) -> Option<Duration> {
        match self {
            ReadMode::Enabled { timeout } => Some(*timeout),
            ReadMode::Suspended => None,
        }
    }
}

/// Byte-level operations on one open connection
#[async_trait]
pub trait SessionIo: Send + Debug {
    /// Transport-assigned id
    fn id(&self) -> SessionId;

    fn peer_addr(&self) -> Option<SocketAddr>;

    /// Suspend reads or enable them with a timeout
    fn set_read_mode(&mut self, mode: ReadMode);

    /// Write every byte
    async fn write_all(&mut self, bytes: &[u8]) -> Result<()>;

    /// Read whatever is available; an empty chunk means the peer closed
    async fn read_chunk(&mut self) -> Result<Bytes>;

    async fn close(&mut self) -> Result<()>;
}

/// Opens new sessions
#[async_trait]
pub trait SessionConnector: Send + Sync + Debug {
    /// Connect once to `host:port`; no retries
    async fn connect(
        &self,
        host: &str,
        port: u16,
        options: &SocketOptions,
    ) -> Result<Box<dyn SessionIo>>;
}
