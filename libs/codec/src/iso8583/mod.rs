//! # ISO 8583 Bitmap Codec
//!
//! Converts between ISO 8583 wire messages and their XML structured form.
//!
//! ## Wire Layout
//!
//! ```text
//! MTI (4 ASCII digits | 2 BCD bytes)
//! primary bitmap (8 bytes, bit 1 = secondary present)
//! [secondary bitmap (8 bytes, bit 65 = tertiary present)]
//! [tertiary bitmap (8 bytes)]
//! data elements in ascending position order
//! ```
//!
//! Each data element is written as the schema declares: fixed width (numeric
//! fields left-padded with '0', text fields right-padded with ' '), `LLVAR`,
//! `LLLVAR`, or fixed-width binary.
//!
//! ## Streaming
//!
//! ISO 8583 carries no frame delimiter, so the stream decoder keeps unread
//! bytes in the session's [`Iso8583FrameState`] and only emits a message once
//! the MTI, every announced bitmap and every announced field are present.
//! Running out of bytes mid-message is not an error; malformed bytes are.

pub mod bitmap;
pub mod message;
pub mod schema;

use crate::config::{Iso8583Config, MtiEncoding};
use crate::constants::{BITMAP_SIZE, MTI_DIGITS};
use crate::error::{CodecError, CodecResult};
use crate::stream::{FramingState, StreamCodec};
use bitmap::Bitmap;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use message::{validate_mti, Iso8583Message};
use schema::{FieldContent, FieldFormat, FieldSchema};
use tracing::debug;
use types::StructuredMessage;

/// Per-session ISO 8583 decode buffer
#[derive(Debug, Default)]
pub struct Iso8583FrameState {
    pending: BytesMut,
}

impl Iso8583FrameState {
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// ISO 8583 codec bound to one schema and MTI encoding
#[derive(Debug, Clone)]
pub struct Iso8583Codec {
    schema: FieldSchema,
    mti_encoding: MtiEncoding,
    tertiary: bool,
    max_message_size: usize,
    content_type: String,
}

impl Iso8583Codec {
    pub fn new(config: &Iso8583Config, max_message_size: usize) -> CodecResult<Self> {
        let schema = FieldSchema::from_definitions(&config.schema, config.tertiary_bitmap)?;
        Ok(Self {
            schema,
            mti_encoding: config.mti_encoding,
            tertiary: config.tertiary_bitmap,
            max_message_size,
            content_type: format!("text/xml; charset={}", config.charset),
        })
    }

    /// Codec over the built-in ISO 8583:1987 table with ASCII MTI
    pub fn with_default_schema() -> Self {
        Self {
            schema: FieldSchema::iso8583_1987(),
            mti_encoding: MtiEncoding::Ascii,
            tertiary: false,
            max_message_size: crate::constants::DEFAULT_MAX_FRAME_SIZE,
            content_type: types::DEFAULT_CONTENT_TYPE.to_string(),
        }
    }

    pub fn schema(&self) -> &FieldSchema {
        &self.schema
    }

    /// Encode a message to wire bytes
    pub fn encode_message(&self, message: &Iso8583Message) -> CodecResult<Bytes> {
        message.validate_mti()?;
        let bitmap = Bitmap::from_positions(message.positions(), self.tertiary)?;

        let mut out = BytesMut::with_capacity(MTI_DIGITS + bitmap.as_bytes().len() + 128);
        self.put_mti(&mut out, message.mti());
        out.put_slice(bitmap.as_bytes());

        for (position, value) in message.fields() {
            let format = self
                .schema
                .get(position)
                .ok_or(CodecError::MissingFieldDefinition {
                    position,
                    offset: out.len(),
                })?;
            put_field(&mut out, position, format, value)?;
        }

        if out.len() > self.max_message_size {
            return Err(CodecError::FrameTooLarge {
                size: out.len(),
                limit: self.max_message_size,
            });
        }
        Ok(out.freeze())
    }

    /// Decode exactly one complete message from `data`
    pub fn decode_message(&self, data: &[u8]) -> CodecResult<Iso8583Message> {
        match self.parse(data)? {
            Some((message, consumed)) if consumed == data.len() => Ok(message),
            Some((_, consumed)) => Err(CodecError::malformed(format!(
                "{} trailing bytes after message",
                data.len() - consumed
            ))),
            None => Err(CodecError::Truncated {
                context: format!("{} bytes do not hold a complete ISO 8583 message", data.len()),
            }),
        }
    }

    fn put_mti(&self, out: &mut BytesMut, mti: &str) {
        match self.mti_encoding {
            MtiEncoding::Ascii => out.put_slice(mti.as_bytes()),
            MtiEncoding::Bcd => {
                let digits = mti.as_bytes();
                for pair in digits.chunks(2) {
                    out.put_u8(((pair[0] - b'0') << 4) | (pair[1] - b'0'));
                }
            }
        }
    }

    fn read_mti(&self, cursor: &mut Cursor<'_>) -> CodecResult<Option<String>> {
        let width = match self.mti_encoding {
            MtiEncoding::Ascii => MTI_DIGITS,
            MtiEncoding::Bcd => MTI_DIGITS / 2,
        };
        let Some(raw) = cursor.take(width) else {
            return Ok(None);
        };
        let mti = match self.mti_encoding {
            MtiEncoding::Ascii => String::from_utf8_lossy(raw).into_owned(),
            MtiEncoding::Bcd => {
                let mut s = String::with_capacity(MTI_DIGITS);
                for byte in raw {
                    for nibble in [byte >> 4, byte & 0x0F] {
                        if nibble > 9 {
                            return Err(CodecError::invalid_mti(
                                hex::encode_upper(raw),
                                "BCD nibble out of range",
                            ));
                        }
                        s.push(char::from(b'0' + nibble));
                    }
                }
                s
            }
        };
        validate_mti(&mti)?;
        Ok(Some(mti))
    }

    /// Parse one message from the front of `data`
    ///
    /// Returns `Ok(None)` when `data` ends before the message does.
    fn parse(&self, data: &[u8]) -> CodecResult<Option<(Iso8583Message, usize)>> {
        let mut cursor = Cursor::new(data);

        let Some(mti) = self.read_mti(&mut cursor)? else {
            return Ok(None);
        };
        let Some(primary) = cursor.take(BITMAP_SIZE) else {
            return Ok(None);
        };
        let mut bitmap = Bitmap::from_primary(primary);
        while bitmap.announces_more() {
            if bitmap.count() == 2 && !self.tertiary {
                return Err(CodecError::TertiaryBitmapDisabled { position: 65 });
            }
            let Some(extension) = cursor.take(BITMAP_SIZE) else {
                return Ok(None);
            };
            bitmap.push_extension(extension);
        }

        let mut message = Iso8583Message::new(mti);
        for position in bitmap.data_positions() {
            let format = self
                .schema
                .get(position)
                .ok_or(CodecError::MissingFieldDefinition {
                    position,
                    offset: cursor.offset(),
                })?;
            let Some(value) = read_field(&mut cursor, position, format)? else {
                return Ok(None);
            };
            message.set_field(position, value);
        }
        Ok(Some((message, cursor.offset())))
    }
}

impl StreamCodec for Iso8583Codec {
    fn name(&self) -> &'static str {
        "iso8583"
    }

    fn new_state(&self) -> FramingState {
        FramingState::Iso8583(Iso8583FrameState::default())
    }

    fn encode(&self, message: &StructuredMessage) -> CodecResult<Bytes> {
        let xml = message
            .as_text()
            .ok_or_else(|| CodecError::malformed("structured message is not valid UTF-8"))?;
        let parsed = Iso8583Message::from_xml(xml)?;
        self.encode_message(&parsed)
    }

    fn decode(
        &self,
        state: &mut FramingState,
        chunk: &[u8],
    ) -> CodecResult<Vec<StructuredMessage>> {
        let FramingState::Iso8583(state) = state else {
            return Err(CodecError::invalid_configuration(
                "framing state does not belong to the ISO 8583 codec",
            ));
        };
        state.pending.extend_from_slice(chunk);

        let mut messages = Vec::new();
        loop {
            if state.pending.is_empty() {
                break;
            }
            let parsed = match self.parse(&state.pending) {
                Ok(parsed) => parsed,
                Err(e) => {
                    // Resynchronising inside an undelimited stream is not possible
                    state.pending.clear();
                    return Err(e);
                }
            };
            match parsed {
                Some((message, consumed)) => {
                    state.pending.advance(consumed);
                    messages.push(StructuredMessage::new(
                        message.to_xml(),
                        self.content_type.clone(),
                    ));
                }
                None => {
                    if state.pending.len() > self.max_message_size {
                        let size = state.pending.len();
                        state.pending.clear();
                        return Err(CodecError::FrameTooLarge {
                            size,
                            limit: self.max_message_size,
                        });
                    }
                    debug!(
                        pending = state.pending.len(),
                        "Partial ISO 8583 message buffered"
                    );
                    break;
                }
            }
        }
        Ok(messages)
    }
}

fn put_field(
    out: &mut BytesMut,
    position: u16,
    format: &FieldFormat,
    value: &str,
) -> CodecResult<()> {
    match *format {
        FieldFormat::Fixed { length, content } => {
            check_content(position, content, value)?;
            if value.len() > length {
                return Err(CodecError::FieldTooLong {
                    position,
                    length: value.len(),
                    max: length,
                });
            }
            let padding = length - value.len();
            match content {
                FieldContent::Numeric => {
                    out.put_bytes(b'0', padding);
                    out.put_slice(value.as_bytes());
                }
                FieldContent::Alphanumeric => {
                    out.put_slice(value.as_bytes());
                    out.put_bytes(b' ', padding);
                }
            }
        }
        FieldFormat::Llvar {
            max_length,
            content,
        }
        | FieldFormat::Lllvar {
            max_length,
            content,
        } => {
            check_content(position, content, value)?;
            let digits = format.prefix_digits();
            let limit = max_length.min(if digits == 2 { 99 } else { 999 });
            if value.len() > limit {
                return Err(CodecError::FieldTooLong {
                    position,
                    length: value.len(),
                    max: limit,
                });
            }
            out.put_slice(format!("{:0width$}", value.len(), width = digits).as_bytes());
            out.put_slice(value.as_bytes());
        }
        FieldFormat::Binary { length } => {
            let raw = hex::decode(value).map_err(|e| {
                CodecError::invalid_field_value(position, format!("binary field is not hex: {}", e))
            })?;
            if raw.len() != length {
                return Err(CodecError::invalid_field_value(
                    position,
                    format!("binary field must be {} bytes, got {}", length, raw.len()),
                ));
            }
            out.put_slice(&raw);
        }
    }
    Ok(())
}

fn read_field(
    cursor: &mut Cursor<'_>,
    position: u16,
    format: &FieldFormat,
) -> CodecResult<Option<String>> {
    let raw = match *format {
        FieldFormat::Fixed { length, .. } => match cursor.take(length) {
            Some(raw) => raw,
            None => return Ok(None),
        },
        FieldFormat::Llvar { max_length, .. } | FieldFormat::Lllvar { max_length, .. } => {
            let prefix_offset = cursor.offset();
            let Some(prefix) = cursor.take(format.prefix_digits()) else {
                return Ok(None);
            };
            if !prefix.iter().all(u8::is_ascii_digit) {
                return Err(CodecError::invalid_length_prefix(
                    position,
                    prefix,
                    prefix_offset,
                ));
            }
            let length = prefix
                .iter()
                .fold(0usize, |acc, d| acc * 10 + usize::from(d - b'0'));
            if length > max_length {
                return Err(CodecError::FieldTooLong {
                    position,
                    length,
                    max: max_length,
                });
            }
            match cursor.take(length) {
                Some(raw) => raw,
                None => return Ok(None),
            }
        }
        FieldFormat::Binary { length } => {
            return Ok(cursor.take(length).map(hex::encode_upper));
        }
    };

    let value = std::str::from_utf8(raw)
        .map_err(|_| CodecError::invalid_field_value(position, "field is not valid text"))?;
    let content = match *format {
        FieldFormat::Fixed { content, .. }
        | FieldFormat::Llvar { content, .. }
        | FieldFormat::Lllvar { content, .. } => content,
        FieldFormat::Binary { .. } => FieldContent::Alphanumeric,
    };
    check_content(position, content, value)?;
    Ok(Some(value.to_string()))
}

fn check_content(position: u16, content: FieldContent, value: &str) -> CodecResult<()> {
    if content == FieldContent::Numeric && !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::invalid_field_value(
            position,
            format!("numeric field contains non-digits: {:?}", value),
        ));
    }
    Ok(())
}

/// Forward-only reader that reports exhaustion instead of failing
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.offset.checked_add(n)?;
        if end > self.data.len() {
            return None;
        }
        let slice = &self.data[self.offset..end];
        self.offset = end;
        Some(slice)
    }

    fn offset(&self) -> usize {
        self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema::FieldDefinition;

    fn sample_config() -> Iso8583Config {
        Iso8583Config {
            schema: vec![
                FieldDefinition::new(2, FieldFormat::llvar(19, FieldContent::Numeric)),
                FieldDefinition::new(3, FieldFormat::numeric(6)),
                FieldDefinition::new(4, FieldFormat::numeric(12)),
                FieldDefinition::new(41, FieldFormat::alpha(16)),
                FieldDefinition::new(42, FieldFormat::alpha(15)),
                FieldDefinition::new(72, FieldFormat::lllvar(999, FieldContent::Alphanumeric)),
            ],
            ..Default::default()
        }
    }

    fn sample_message() -> Iso8583Message {
        Iso8583Message::new("0200")
            .with_field(2, "123456")
            .with_field(3, "000000")
            .with_field(4, "000000001000")
            .with_field(41, "TERMINAL00000001")
            .with_field(42, "MERCHANT0000001")
            .with_field(72, "free form data record")
    }

    #[test]
    fn test_sample_wire_layout() {
        let codec = Iso8583Codec::new(&sample_config(), 1024).unwrap();
        let wire = codec.encode_message(&sample_message()).unwrap();

        assert_eq!(&wire[..4], b"0200");
        assert_eq!(&wire[4..12], &[0xF0, 0, 0, 0, 0, 0xC0, 0, 0]);
        assert_eq!(&wire[12..20], &[0x01, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&wire[20..28], b"06123456");
        assert!(wire.ends_with(b"021free form data record"));
    }

    #[test]
    fn test_fixed_fields_are_padded() {
        let codec = Iso8583Codec::new(&sample_config(), 1024).unwrap();
        let message = Iso8583Message::new("0800")
            .with_field(3, "12")
            .with_field(41, "T1");
        let wire = codec.encode_message(&message).unwrap();
        assert_eq!(&wire[12..18], b"000012");
        assert_eq!(&wire[18..34], b"T1              ");
    }

    #[test]
    fn test_bcd_mti() {
        let config = Iso8583Config {
            mti_encoding: MtiEncoding::Bcd,
            ..sample_config()
        };
        let codec = Iso8583Codec::new(&config, 1024).unwrap();
        let message = Iso8583Message::new("0210").with_field(3, "000000");
        let wire = codec.encode_message(&message).unwrap();
        assert_eq!(&wire[..2], &[0x02, 0x10]);
        assert_eq!(codec.decode_message(&wire).unwrap(), message);
    }

    #[test]
    fn test_rejects_bad_mti() {
        let codec = Iso8583Codec::with_default_schema();
        let err = codec
            .encode_message(&Iso8583Message::new("20").with_field(3, "000000"))
            .unwrap_err();
        assert!(matches!(err, CodecError::InvalidMti { .. }));

        let err = codec.decode_message(b"02X0\0\0\0\0\0\0\0\0").unwrap_err();
        assert!(matches!(err, CodecError::InvalidMti { .. }));
    }

    #[test]
    fn test_bit_without_schema_entry() {
        let codec = Iso8583Codec::new(&sample_config(), 1024).unwrap();
        // bit 5 set, schema only knows 2,3,4,41,42,72
        let mut wire = b"0200".to_vec();
        wire.extend_from_slice(&[0x08, 0, 0, 0, 0, 0, 0, 0]);
        wire.extend_from_slice(b"000000000001");
        assert!(matches!(
            codec.decode_message(&wire),
            Err(CodecError::MissingFieldDefinition { position: 5, .. })
        ));
    }

    #[test]
    fn test_non_numeric_length_prefix() {
        let codec = Iso8583Codec::new(&sample_config(), 1024).unwrap();
        let mut wire = b"0200".to_vec();
        wire.extend_from_slice(&[0x40, 0, 0, 0, 0, 0, 0, 0]);
        wire.extend_from_slice(b"0A123456789");
        assert!(matches!(
            codec.decode_message(&wire),
            Err(CodecError::InvalidLengthPrefix { position: 2, offset: 12, .. })
        ));
    }

    #[test]
    fn test_tertiary_bitmap_announced_but_disabled() {
        let codec = Iso8583Codec::with_default_schema();
        let mut wire = b"0200".to_vec();
        wire.extend_from_slice(&[0x80, 0, 0, 0, 0, 0, 0, 0]);
        wire.extend_from_slice(&[0x80, 0, 0, 0, 0, 0, 0, 0]);
        wire.extend_from_slice(&[0; 8]);
        assert!(matches!(
            codec.decode_message(&wire),
            Err(CodecError::TertiaryBitmapDisabled { .. })
        ));
    }

    #[test]
    fn test_tertiary_fields_round_trip() {
        let config = Iso8583Config {
            tertiary_bitmap: true,
            schema: vec![
                FieldDefinition::new(3, FieldFormat::numeric(6)),
                FieldDefinition::new(140, FieldFormat::llvar(20, FieldContent::Alphanumeric)),
            ],
            ..Default::default()
        };
        let codec = Iso8583Codec::new(&config, 1024).unwrap();
        let message = Iso8583Message::new("0100")
            .with_field(3, "310000")
            .with_field(140, "extra");
        let wire = codec.encode_message(&message).unwrap();
        assert_eq!(wire.len(), 4 + 24 + 6 + 2 + 5);
        assert_eq!(codec.decode_message(&wire).unwrap(), message);
    }

    #[test]
    fn test_binary_fields_render_as_hex() {
        let codec = Iso8583Codec::with_default_schema();
        let message = Iso8583Message::new("0200")
            .with_field(3, "000000")
            .with_field(52, "0123456789ABCDEF");
        let wire = codec.encode_message(&message).unwrap();
        assert_eq!(&wire[wire.len() - 8..], &[0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF]);
        assert_eq!(codec.decode_message(&wire).unwrap(), message);
    }

    #[test]
    fn test_stream_decode_waits_for_complete_message() {
        let codec = Iso8583Codec::new(&sample_config(), 1024).unwrap();
        let wire = codec.encode_message(&sample_message()).unwrap();
        let mut state = codec.new_state();

        let (head, tail) = wire.split_at(25);
        assert!(codec.decode(&mut state, head).unwrap().is_empty());
        let messages = codec.decode(&mut state, tail).unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(
            Iso8583Message::from_xml(messages[0].as_text().unwrap()).unwrap(),
            sample_message()
        );
    }

    #[test]
    fn test_stream_decode_back_to_back() {
        let codec = Iso8583Codec::new(&sample_config(), 1024).unwrap();
        let first = codec.encode_message(&sample_message()).unwrap();
        let second = codec
            .encode_message(&Iso8583Message::new("0210").with_field(3, "000000"))
            .unwrap();
        let mut joined = first.to_vec();
        joined.extend_from_slice(&second);

        let mut state = codec.new_state();
        let messages = codec.decode(&mut state, &joined).unwrap();
        assert_eq!(messages.len(), 2);
        assert!(messages[1].as_text().unwrap().contains("value=\"0210\""));
    }

    #[test]
    fn test_stream_frame_limit() {
        let codec = Iso8583Codec::new(&sample_config(), 16).unwrap();
        let mut state = codec.new_state();
        let mut partial = b"0200".to_vec();
        partial.extend_from_slice(&[0x80, 0, 0, 0, 0, 0, 0, 0]);
        // secondary bitmap announcing field 72, whose LLLVAR value never arrives
        partial.extend_from_slice(&[0x01, 0, 0, 0, 0, 0, 0, 0]);
        partial.extend_from_slice(b"001");
        assert!(matches!(
            codec.decode(&mut state, &partial),
            Err(CodecError::FrameTooLarge { .. })
        ));
    }
}
