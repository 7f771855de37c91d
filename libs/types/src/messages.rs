//! Message and exchange types passed between the gateway and the connector
//!
//! - `StructuredMessage`: content bytes plus a content type, the form the rest
//!   of the gateway understands
//! - `ExchangePattern`: fire-and-forget versus request/response
//! - `OutgoingMessageResponse`: what a send hands back to the caller

use crate::common::identifiers::SessionId;
use bytes::Bytes;

/// Content type used when a connection definition does not name one
pub const DEFAULT_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Application message in its structural (textual) form
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StructuredMessage {
    content: Bytes,
    content_type: String,
}

impl StructuredMessage {
    pub fn new(content: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            content_type: content_type.into(),
        }
    }

    /// XML document with the default content type
    pub fn xml(document: impl Into<String>) -> Self {
        Self::new(Bytes::from(document.into()), DEFAULT_CONTENT_TYPE)
    }

    pub fn content(&self) -> &Bytes {
        &self.content
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// Content as UTF-8 text, if it is valid UTF-8
    pub fn as_text(&self) -> Option<&str> {
        std::str::from_utf8(&self.content).ok()
    }

    pub fn len(&self) -> usize {
        self.content.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn into_content(self) -> Bytes {
        self.content
    }

    /// Same content, relabelled with another content type
    pub fn with_content_type(self, content_type: impl Into<String>) -> Self {
        Self {
            content: self.content,
            content_type: content_type.into(),
        }
    }
}

/// Whether an exchange waits for a reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ExchangePattern {
    /// Write only; the session's read side is suspended
    OutOnly,
    /// Write, then wait up to the read timeout for one reply
    #[default]
    OutIn,
}

impl ExchangePattern {
    pub fn expects_response(&self) -> bool {
        matches!(self, ExchangePattern::OutIn)
    }

    /// Apply a caller's response-expected override
    pub fn with_override(self, response_expected: Option<bool>) -> Self {
        match response_expected {
            Some(true) => ExchangePattern::OutIn,
            Some(false) => ExchangePattern::OutOnly,
            None => self,
        }
    }
}

impl std::fmt::Display for ExchangePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExchangePattern::OutOnly => f.write_str("OutOnly"),
            ExchangePattern::OutIn => f.write_str("OutIn"),
        }
    }
}

/// Which side opens the TCP connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Direction {
    Inbound,
    #[default]
    Outbound,
}

/// Result of one outbound exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessageResponse {
    /// Session used for the exchange; pass it back as a hint to reuse it
    pub session_id: SessionId,
    pub content_type: String,
    /// Decoded reply, `None` for OutOnly or when no reply arrived in time
    pub bytes: Option<Bytes>,
}

impl OutgoingMessageResponse {
    pub fn has_response(&self) -> bool {
        self.bytes.is_some()
    }

    /// Reply as a structured message, if one was received
    pub fn message(&self) -> Option<StructuredMessage> {
        self.bytes
            .as_ref()
            .map(|b| StructuredMessage::new(b.clone(), self.content_type.clone()))
    }
}
