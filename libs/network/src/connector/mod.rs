//! Outbound Connector
//!
//! [`ConnectionManager`] is the public surface: definitions go in through
//! `connection_updated`/`connection_removed`, messages go out through
//! `send_message`. Each running connection is a [`ConnectorRuntime`] holding
//! its codec, resolution cache and session pool.
//!
//! ## Exchange
//!
//! 1. Find the running runtime, else `ConnectionNotFound`
//! 2. Resolve the endpoint (static, or cached service-record lookup)
//! 3. Encode the payload
//! 4. Reuse the hinted session or connect once
//! 5. Configure read, write, and for OutIn wait up to the listen timeout
//! 6. Keep the session pooled or close it per `keep_alive`

pub mod manager;
pub mod runtime;

pub use manager::{ConnectionManager, LifecycleState};
pub use runtime::{ConnectorRuntime, RuntimeStats};
