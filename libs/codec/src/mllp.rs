//! # MLLP Frame Codec
//!
//! Minimal Lower Layer Protocol framing:
//!
//! ```text
//! ┌──────────┬──────────────────┬────────────┬────────────┐
//! │ start    │ payload          │ end byte 1 │ end byte 2 │
//! │ 0x0B     │ opaque bytes     │ 0x1C       │ 0x0D       │
//! └──────────┴──────────────────┴────────────┴────────────┘
//! ```
//!
//! All three delimiters are configurable. Decoding is incremental: the
//! per-session [`MllpFrameState`] carries an unfinished payload and whether
//! end byte 1 was the last byte seen, so frames may be split anywhere across
//! reads and several frames may arrive in one read.

use crate::config::MllpConfig;
use crate::error::{CodecError, CodecResult};
use crate::stream::{FramingState, StreamCodec};
use crate::transform::{MessageTransform, PassThrough};
use bytes::{BufMut, Bytes, BytesMut};
use std::sync::Arc;
use tracing::{debug, warn};
use types::StructuredMessage;

/// Per-session MLLP decode state
#[derive(Debug, Default)]
pub struct MllpFrameState {
    pending: BytesMut,
    in_frame: bool,
    saw_end_byte_1: bool,
}

impl MllpFrameState {
    /// Bytes of the unfinished frame held between reads
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn in_frame(&self) -> bool {
        self.in_frame
    }

    pub fn saw_end_byte_1(&self) -> bool {
        self.saw_end_byte_1
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.in_frame = false;
        self.saw_end_byte_1 = false;
    }
}

#[derive(Debug, Clone)]
pub struct MllpCodec {
    start_byte: u8,
    end_byte_1: u8,
    end_byte_2: u8,
    max_frame_size: usize,
    content_type: String,
    transform: Arc<dyn MessageTransform>,
}

impl MllpCodec {
    pub fn new(config: &MllpConfig, max_frame_size: usize) -> CodecResult<Self> {
        Self::with_transform(config, max_frame_size, Arc::new(PassThrough))
    }

    pub fn with_transform(
        config: &MllpConfig,
        max_frame_size: usize,
        transform: Arc<dyn MessageTransform>,
    ) -> CodecResult<Self> {
        config.validate()?;
        Ok(Self {
            start_byte: config.start_byte,
            end_byte_1: config.end_byte_1,
            end_byte_2: config.end_byte_2,
            max_frame_size,
            content_type: format!("text/xml; charset={}", config.charset),
            transform,
        })
    }

    /// Wrap a payload in start and end delimiters
    pub fn frame(&self, payload: &[u8]) -> CodecResult<Bytes> {
        if payload.contains(&self.start_byte) {
            return Err(CodecError::malformed(format!(
                "payload contains the MLLP start byte {:#04x}",
                self.start_byte
            )));
        }
        if payload
            .windows(2)
            .any(|w| w[0] == self.end_byte_1 && w[1] == self.end_byte_2)
        {
            return Err(CodecError::malformed(
                "payload contains the MLLP end-of-block sequence",
            ));
        }
        if payload.len() > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size: payload.len(),
                limit: self.max_frame_size,
            });
        }

        let mut out = BytesMut::with_capacity(payload.len() + 3);
        out.put_u8(self.start_byte);
        out.put_slice(payload);
        out.put_u8(self.end_byte_1);
        out.put_u8(self.end_byte_2);
        Ok(out.freeze())
    }

    /// Feed one chunk, returning the payload of every frame it completes
    pub fn deframe(&self, state: &mut MllpFrameState, chunk: &[u8]) -> CodecResult<Vec<Bytes>> {
        let mut frames = Vec::new();
        let mut discarded = 0usize;
        let mut i = 0;

        while i < chunk.len() {
            if !state.in_frame {
                match chunk[i..].iter().position(|&b| b == self.start_byte) {
                    Some(offset) => {
                        discarded += offset;
                        state.in_frame = true;
                        i += offset + 1;
                    }
                    None => {
                        discarded += chunk.len() - i;
                        break;
                    }
                }
                continue;
            }

            let byte = chunk[i];
            if state.saw_end_byte_1 {
                state.saw_end_byte_1 = false;
                if byte == self.end_byte_2 {
                    frames.push(state.pending.split().freeze());
                    state.in_frame = false;
                    i += 1;
                    continue;
                }
                // Lone end byte 1 belongs to the payload
                state.pending.put_u8(self.end_byte_1);
            }

            if byte == self.end_byte_1 {
                state.saw_end_byte_1 = true;
                i += 1;
            } else if byte == self.start_byte {
                warn!(
                    dropped = state.pending.len(),
                    "MLLP start byte inside an open frame, restarting frame"
                );
                state.pending.clear();
                i += 1;
            } else {
                let run = chunk[i..]
                    .iter()
                    .position(|&b| b == self.end_byte_1 || b == self.start_byte)
                    .unwrap_or(chunk.len() - i);
                state.pending.extend_from_slice(&chunk[i..i + run]);
                i += run;
            }

            if state.pending.len() > self.max_frame_size {
                let size = state.pending.len();
                state.reset();
                return Err(CodecError::FrameTooLarge {
                    size,
                    limit: self.max_frame_size,
                });
            }
        }

        if discarded > 0 {
            debug!(discarded, "Discarded bytes outside MLLP frames");
        }
        Ok(frames)
    }
}

impl StreamCodec for MllpCodec {
    fn name(&self) -> &'static str {
        "mllp"
    }

    fn new_state(&self) -> FramingState {
        FramingState::Mllp(MllpFrameState::default())
    }

    fn encode(&self, message: &StructuredMessage) -> CodecResult<Bytes> {
        let payload = self.transform.to_wire(message.content())?;
        self.frame(&payload)
    }

    fn decode(
        &self,
        state: &mut FramingState,
        chunk: &[u8],
    ) -> CodecResult<Vec<StructuredMessage>> {
        let FramingState::Mllp(state) = state else {
            return Err(CodecError::invalid_configuration(
                "framing state does not belong to the MLLP codec",
            ));
        };
        self.deframe(state, chunk)?
            .into_iter()
            .map(|payload| -> CodecResult<StructuredMessage> {
                let content = self.transform.to_structured(payload)?;
                Ok(StructuredMessage::new(content, self.content_type.clone()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> MllpCodec {
        MllpCodec::new(&MllpConfig::default(), 1024).unwrap()
    }

    #[test]
    fn test_frame_layout() {
        let framed = codec().frame(b"MSH|^~\\&").unwrap();
        assert_eq!(framed.first(), Some(&0x0B));
        assert_eq!(&framed[framed.len() - 2..], &[0x1C, 0x0D]);
        assert_eq!(&framed[1..framed.len() - 2], b"MSH|^~\\&");
    }

    #[test]
    fn test_end_byte_2_in_next_chunk() {
        let codec = codec();
        let mut state = MllpFrameState::default();

        let frames = codec.deframe(&mut state, b"\x0Bhello\x1C").unwrap();
        assert!(frames.is_empty());
        assert!(state.saw_end_byte_1());

        let frames = codec.deframe(&mut state, b"\x0D").unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"hello")]);
        assert!(!state.in_frame());
        assert_eq!(state.pending_len(), 0);
    }

    #[test]
    fn test_lone_end_byte_1_is_payload() {
        let codec = codec();
        let mut state = MllpFrameState::default();
        let frames = codec.deframe(&mut state, b"\x0Ba\x1Cb\x1C\x0D").unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"a\x1Cb")]);
    }

    #[test]
    fn test_noise_between_frames_is_dropped() {
        let codec = codec();
        let mut state = MllpFrameState::default();
        let frames = codec
            .deframe(&mut state, b"junk\x0Bone\x1C\x0D\r\n\x0Btwo\x1C\x0D")
            .unwrap();
        assert_eq!(
            frames,
            vec![Bytes::from_static(b"one"), Bytes::from_static(b"two")]
        );
    }

    #[test]
    fn test_start_byte_restarts_open_frame() {
        let codec = codec();
        let mut state = MllpFrameState::default();
        let frames = codec
            .deframe(&mut state, b"\x0Btruncated\x0Bwhole\x1C\x0D")
            .unwrap();
        assert_eq!(frames, vec![Bytes::from_static(b"whole")]);
    }

    #[test]
    fn test_custom_delimiters() {
        let config = MllpConfig {
            start_byte: b'<',
            end_byte_1: b'>',
            end_byte_2: b'\n',
            ..Default::default()
        };
        let codec = MllpCodec::new(&config, 64).unwrap();
        let mut state = MllpFrameState::default();
        let framed = codec.frame(b"ping").unwrap();
        assert_eq!(&framed[..], b"<ping>\n");
        assert_eq!(
            codec.deframe(&mut state, &framed).unwrap(),
            vec![Bytes::from_static(b"ping")]
        );
    }

    #[test]
    fn test_oversized_frame_resets_state() {
        let codec = MllpCodec::new(&MllpConfig::default(), 4).unwrap();
        let mut state = MllpFrameState::default();
        assert!(matches!(
            codec.deframe(&mut state, b"\x0Btoo long"),
            Err(CodecError::FrameTooLarge { limit: 4, .. })
        ));
        assert!(!state.in_frame());
        assert_eq!(
            codec.deframe(&mut state, b"\x0Bok\x1C\x0D").unwrap(),
            vec![Bytes::from_static(b"ok")]
        );
    }

    #[test]
    fn test_encode_rejects_embedded_delimiters() {
        let codec = codec();
        assert!(codec.frame(b"a\x0Bb").is_err());
        assert!(codec.frame(b"a\x1C\x0Db").is_err());
        assert!(codec.frame(b"a\x1Cb").is_ok());
    }

    #[test]
    fn test_wrong_state_variant() {
        let codec = codec();
        let mut state = FramingState::Iso8583(Default::default());
        assert!(matches!(
            codec.decode(&mut state, b"\x0Bx\x1C\x0D"),
            Err(CodecError::InvalidConfiguration { .. })
        ));
    }
}
