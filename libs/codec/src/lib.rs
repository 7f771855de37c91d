//! # Sockgate Stream Codecs
//!
//! ## Purpose
//!
//! Converts between raw bytes on a TCP stream and the structured message form
//! the rest of the gateway works with. Two codec families are provided:
//!
//! - **MLLP**: frame codec delimiting opaque payloads with a start byte and a
//!   two-byte end-of-block sequence
//! - **ISO 8583**: bitmap codec reading and writing MTI, primary/secondary/
//!   tertiary bitmaps and schema-typed data elements
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → network/
//!     ↑           ↓          ↓
//! Structured   Framing    Sessions
//! Messages     Encoding   Connections
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket handling or session pooling (belongs in network/)
//! - Connection definitions (belongs in libs/config)
//!
//! Codecs are shared between sessions and hold no mutable state; the
//! per-session [`FramingState`] carries everything a partial read leaves
//! behind.

pub mod config;
pub mod constants;
pub mod error;
pub mod iso8583;
pub mod mllp;
pub mod stream;
pub mod transform;

pub use config::{CodecConfiguration, Iso8583Config, MllpConfig, MtiEncoding};
pub use constants::*;
pub use error::{CodecError, CodecResult};
pub use iso8583::bitmap::Bitmap;
pub use iso8583::message::Iso8583Message;
pub use iso8583::schema::{FieldContent, FieldDefinition, FieldFormat, FieldSchema};
pub use iso8583::{Iso8583Codec, Iso8583FrameState};
pub use mllp::{MllpCodec, MllpFrameState};
pub use stream::{build_codec, build_codec_with_transform, FramingState, StreamCodec};
pub use transform::{MessageTransform, PassThrough};
