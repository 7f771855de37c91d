//! ISO 8583 message model and its XML structured form
//!
//! ```text
//! <Message><MessageTypeIndicator value="0200"/><Fields><Field position="2">123456</Field></Fields></Message>
//! ```
//!
//! Rendering is whitespace-free and ordered by position so the same message
//! always renders to the same bytes.

use crate::constants::MTI_DIGITS;
use crate::error::{CodecError, CodecResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

static MESSAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\s*(?:<\?xml[^>]*\?>)?\s*<Message\s*>(.*)</Message>\s*$").expect("valid regex"));
static MTI_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"<MessageTypeIndicator\s+value\s*=\s*"([^"]*)"\s*/>"#).expect("valid regex")
});
static FIELDS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<Fields\s*>(.*)</Fields>|<Fields\s*/>").expect("valid regex"));
static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?s)<Field\s+position\s*=\s*"(\d+)"\s*(?:/>|>(.*?)</Field>)"#)
        .expect("valid regex")
});

/// Decoded ISO 8583 message: MTI plus field values by position
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Iso8583Message {
    mti: String,
    fields: BTreeMap<u16, String>,
}

impl Iso8583Message {
    pub fn new(mti: impl Into<String>) -> Self {
        Self {
            mti: mti.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Builder-style field setter
    pub fn with_field(mut self, position: u16, value: impl Into<String>) -> Self {
        self.fields.insert(position, value.into());
        self
    }

    pub fn set_field(&mut self, position: u16, value: impl Into<String>) -> Option<String> {
        self.fields.insert(position, value.into())
    }

    pub fn mti(&self) -> &str {
        &self.mti
    }

    pub fn field(&self, position: u16) -> Option<&str> {
        self.fields.get(&position).map(String::as_str)
    }

    /// Fields in ascending position order
    pub fn fields(&self) -> impl Iterator<Item = (u16, &str)> {
        self.fields.iter().map(|(p, v)| (*p, v.as_str()))
    }

    pub fn positions(&self) -> impl Iterator<Item = u16> + '_ {
        self.fields.keys().copied()
    }

    /// Check the MTI is exactly four ASCII digits
    pub fn validate_mti(&self) -> CodecResult<()> {
        validate_mti(&self.mti)
    }

    /// Render the structured XML form
    pub fn to_xml(&self) -> String {
        let mut out = String::with_capacity(96 + self.fields.len() * 48);
        out.push_str("<Message><MessageTypeIndicator value=\"");
        out.push_str(&escape(&self.mti));
        out.push_str("\"/><Fields>");
        for (position, value) in &self.fields {
            out.push_str("<Field position=\"");
            out.push_str(&position.to_string());
            out.push_str("\">");
            out.push_str(&escape(value));
            out.push_str("</Field>");
        }
        out.push_str("</Fields></Message>");
        out
    }

    /// Parse the structured XML form
    pub fn from_xml(xml: &str) -> CodecResult<Self> {
        let body = MESSAGE_RE
            .captures(xml)
            .and_then(|c| c.get(1))
            .ok_or_else(|| CodecError::malformed("missing <Message> root element"))?
            .as_str();

        let mti = MTI_RE
            .captures(body)
            .and_then(|c| c.get(1))
            .ok_or_else(|| CodecError::malformed("missing <MessageTypeIndicator value=\"...\"/>"))?;
        let mti = unescape(mti.as_str())?;

        let mut message = Iso8583Message::new(mti);
        let fields = match FIELDS_RE.captures(body) {
            Some(c) => c.get(1).map(|m| m.as_str()).unwrap_or(""),
            None => return Err(CodecError::malformed("missing <Fields> element")),
        };

        let mut consumed = 0;
        for capture in FIELD_RE.captures_iter(fields) {
            let whole = capture.get(0).map(|m| m.range()).unwrap_or(consumed..consumed);
            reject_stray_content(&fields[consumed..whole.start])?;
            consumed = whole.end;

            let raw_position = &capture[1];
            let position: u16 = raw_position.parse().map_err(|_| {
                CodecError::malformed(format!("field position '{}' out of range", raw_position))
            })?;
            let value = unescape(capture.get(2).map(|m| m.as_str()).unwrap_or(""))?;
            if message.fields.insert(position, value).is_some() {
                return Err(CodecError::malformed(format!(
                    "field {} appears more than once",
                    position
                )));
            }
        }
        reject_stray_content(&fields[consumed..])?;
        Ok(message)
    }
}

fn reject_stray_content(between: &str) -> CodecResult<()> {
    let stray = between.trim();
    if stray.is_empty() {
        return Ok(());
    }
    let excerpt: String = stray.chars().take(40).collect();
    Err(CodecError::malformed(format!(
        "unexpected content in <Fields>: '{}'",
        excerpt
    )))
}

pub(crate) fn validate_mti(mti: &str) -> CodecResult<()> {
    if mti.len() != MTI_DIGITS {
        return Err(CodecError::invalid_mti(
            mti,
            format!("expected {} digits, got {}", MTI_DIGITS, mti.len()),
        ));
    }
    if !mti.bytes().all(|b| b.is_ascii_digit()) {
        return Err(CodecError::invalid_mti(mti, "MTI must be numeric"));
    }
    Ok(())
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn unescape(value: &str) -> CodecResult<String> {
    if !value.contains('&') {
        return Ok(value.to_string());
    }
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        let semi = tail
            .find(';')
            .ok_or_else(|| CodecError::malformed("unterminated character reference"))?;
        let entity = &tail[1..semi];
        match entity {
            "amp" => out.push('&'),
            "lt" => out.push('<'),
            "gt" => out.push('>'),
            "quot" => out.push('"'),
            "apos" => out.push('\''),
            _ => {
                let code = entity
                    .strip_prefix("#x")
                    .map(|hex| u32::from_str_radix(hex, 16))
                    .or_else(|| entity.strip_prefix('#').map(|dec| dec.parse::<u32>()))
                    .and_then(|r| r.ok())
                    .and_then(char::from_u32)
                    .ok_or_else(|| {
                        CodecError::malformed(format!("unknown character reference '&{};'", entity))
                    })?;
                out.push(code);
            }
        }
        rest = &tail[semi + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
