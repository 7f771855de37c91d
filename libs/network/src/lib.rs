//! Outbound Connector Network Layer
//!
//! Sends structured messages to remote TCP endpoints and optionally waits for
//! a reply, pooling sessions per connection.
//!
//! - [`transports`]: sessions, the `SessionIo`/`SessionConnector` seams, TCP
//! - [`discovery`]: static and service-record endpoint resolution with a TTL cache
//! - [`connector`]: per-connection runtimes and the [`ConnectionManager`] facade

pub mod connector;
pub mod discovery;
pub mod error;
pub mod transports;

// Re-export commonly used types
pub use connector::{ConnectionManager, ConnectorRuntime, LifecycleState, RuntimeStats};
pub use discovery::{
    service_query_name, Endpoint, EndpointResolver, LookupError, ServiceRecord,
    ServiceRecordLookup, StaticServiceDirectory,
};
pub use error::{ConnectorError, Result};
pub use transports::{
    ReadMode, Session, SessionConnector, SessionHandle, SessionIo, TcpConnector, TcpSessionIo,
};
