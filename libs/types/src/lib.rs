//! # Sockgate Shared Types
//!
//! Value types shared by the codec, configuration and network crates of the
//! outbound socket connector.
//!
//! ## Design Philosophy
//!
//! - **Typed Identifiers**: `SessionId` and `ConnectionId` cannot be mixed up
//!   with each other or with raw integers/strings
//! - **Opaque Payloads**: `StructuredMessage` is content bytes plus a content
//!   type; the structural form (XML for HL7 and ISO 8583) is produced and
//!   consumed by the codec crate
//! - **No I/O**: nothing in this crate touches sockets or async runtimes
//!
//! ## Quick Start
//!
//! ```rust
//! use types::{ConnectionId, ExchangePattern, SessionId, StructuredMessage};
//!
//! let connection = ConnectionId::new("lab-results");
//! let session: SessionId = "42".parse().unwrap();
//! let payload = StructuredMessage::xml("<Message/>");
//!
//! assert_eq!(session.inner(), 42);
//! assert!(ExchangePattern::OutIn.expects_response());
//! assert_eq!(connection.as_str(), "lab-results");
//! assert_eq!(payload.content_type(), "text/xml; charset=utf-8");
//! ```

pub mod common;
pub mod messages;

pub use common::errors::ValidationError;
pub use common::identifiers::{ConnectionId, SessionId};
pub use messages::{
    Direction, ExchangePattern, OutgoingMessageResponse, StructuredMessage,
    DEFAULT_CONTENT_TYPE,
};
