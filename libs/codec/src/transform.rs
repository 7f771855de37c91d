//! Message transform hook
//!
//! MLLP moves opaque payloads. A transform sits between the frame payload and
//! the structured message content so deployments can plug in HL7-to-XML style
//! conversions without touching the framing code.

use crate::error::CodecResult;
use bytes::Bytes;
use std::fmt::Debug;

pub trait MessageTransform: Send + Sync + Debug {
    /// Frame payload read off the wire into structured content
    fn to_structured(&self, payload: Bytes) -> CodecResult<Bytes>;

    /// Structured content into the frame payload to write
    fn to_wire(&self, content: &[u8]) -> CodecResult<Bytes>;
}

/// Identity transform
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl MessageTransform for PassThrough {
    fn to_structured(&self, payload: Bytes) -> CodecResult<Bytes> {
        Ok(payload)
    }

    fn to_wire(&self, content: &[u8]) -> CodecResult<Bytes> {
        Ok(Bytes::copy_from_slice(content))
    }
}
