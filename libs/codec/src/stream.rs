//! Codec seam used by the session layer
//!
//! Every session owns one [`FramingState`] created by its connection's codec.
//! The codec itself is shared between sessions and holds no mutable state.

use crate::config::CodecConfiguration;
use crate::error::CodecResult;
use crate::iso8583::{Iso8583Codec, Iso8583FrameState};
use crate::mllp::{MllpCodec, MllpFrameState};
use crate::transform::MessageTransform;
use bytes::Bytes;
use std::fmt::Debug;
use std::sync::Arc;
use types::StructuredMessage;

/// Symmetric encoder/decoder over a byte stream
pub trait StreamCodec: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Fresh decode state for a new session
    fn new_state(&self) -> FramingState;

    /// Structured message to wire bytes
    fn encode(&self, message: &StructuredMessage) -> CodecResult<Bytes>;

    /// Feed one chunk read from the wire
    ///
    /// Returns every message the chunk completes, possibly none. Incomplete
    /// trailing bytes stay in `state` for the next call.
    fn decode(&self, state: &mut FramingState, chunk: &[u8])
        -> CodecResult<Vec<StructuredMessage>>;
}

/// Per-session decode state, one variant per codec family
#[derive(Debug)]
pub enum FramingState {
    Mllp(MllpFrameState),
    Iso8583(Iso8583FrameState),
}

impl FramingState {
    /// Bytes buffered while waiting for the rest of a message
    pub fn pending_len(&self) -> usize {
        match self {
            FramingState::Mllp(state) => state.pending_len(),
            FramingState::Iso8583(state) => state.pending_len(),
        }
    }
}

/// Build the codec a connection definition selects
pub fn build_codec(
    config: &CodecConfiguration,
    max_message_size: usize,
) -> CodecResult<Arc<dyn StreamCodec>> {
    match config {
        CodecConfiguration::Mllp(mllp) => Ok(Arc::new(MllpCodec::new(mllp, max_message_size)?)),
        CodecConfiguration::Iso8583(iso) => {
            Ok(Arc::new(Iso8583Codec::new(iso, max_message_size)?))
        }
    }
}

/// Build an MLLP codec with a custom payload transform
///
/// ISO 8583 carries its own structured form, so the transform only applies
/// to MLLP configurations; other configurations ignore it.
pub fn build_codec_with_transform(
    config: &CodecConfiguration,
    max_message_size: usize,
    transform: Arc<dyn MessageTransform>,
) -> CodecResult<Arc<dyn StreamCodec>> {
    match config {
        CodecConfiguration::Mllp(mllp) => Ok(Arc::new(MllpCodec::with_transform(
            mllp,
            max_message_size,
            transform,
        )?)),
        other => build_codec(other, max_message_size),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Iso8583Config, MllpConfig};

    #[test]
    fn test_build_selects_codec_family() {
        let mllp = build_codec(&CodecConfiguration::default(), 1024).unwrap();
        assert_eq!(mllp.name(), "mllp");
        assert!(matches!(mllp.new_state(), FramingState::Mllp(_)));

        let iso =
            build_codec(&CodecConfiguration::Iso8583(Iso8583Config::default()), 1024).unwrap();
        assert_eq!(iso.name(), "iso8583");
        assert_eq!(iso.new_state().pending_len(), 0);
    }

    #[test]
    fn test_build_rejects_invalid_delimiters() {
        let config = CodecConfiguration::Mllp(MllpConfig {
            start_byte: 0x0D,
            ..Default::default()
        });
        assert!(build_codec(&config, 1024).is_err());
    }
}
