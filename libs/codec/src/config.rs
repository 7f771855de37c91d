//! Codec configuration carried by a connection definition
//!
//! Deserialized from the `codec` table of a connection, e.g.
//!
//! ```toml
//! [connections.codec]
//! type = "mllp"
//! start_byte = 11
//! end_byte_1 = 28
//! end_byte_2 = 13
//! ```

use crate::constants::{DEFAULT_CHARSET, MLLP_END_BYTE_1, MLLP_END_BYTE_2, MLLP_START_BYTE};
use crate::error::{CodecError, CodecResult};
use crate::iso8583::schema::FieldDefinition;
use serde::{Deserialize, Serialize};

/// Codec selection plus its settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CodecConfiguration {
    Mllp(MllpConfig),
    Iso8583(Iso8583Config),
}

impl Default for CodecConfiguration {
    fn default() -> Self {
        CodecConfiguration::Mllp(MllpConfig::default())
    }
}

impl CodecConfiguration {
    pub fn name(&self) -> &'static str {
        match self {
            CodecConfiguration::Mllp(_) => "mllp",
            CodecConfiguration::Iso8583(_) => "iso8583",
        }
    }

    pub fn validate(&self) -> CodecResult<()> {
        match self {
            CodecConfiguration::Mllp(mllp) => mllp.validate(),
            CodecConfiguration::Iso8583(iso) => iso.validate(),
        }
    }
}

/// MLLP delimiters and charset label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MllpConfig {
    pub start_byte: u8,
    pub end_byte_1: u8,
    pub end_byte_2: u8,
    pub charset: String,
}

impl Default for MllpConfig {
    fn default() -> Self {
        Self {
            start_byte: MLLP_START_BYTE,
            end_byte_1: MLLP_END_BYTE_1,
            end_byte_2: MLLP_END_BYTE_2,
            charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

impl MllpConfig {
    pub fn validate(&self) -> CodecResult<()> {
        if self.start_byte == self.end_byte_1 || self.start_byte == self.end_byte_2 {
            return Err(CodecError::invalid_configuration(format!(
                "MLLP start byte {:#04x} must differ from end bytes {:#04x}/{:#04x}",
                self.start_byte, self.end_byte_1, self.end_byte_2
            )));
        }
        Ok(())
    }
}

/// How the Message Type Indicator is written on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MtiEncoding {
    /// Four ASCII digits
    #[default]
    Ascii,
    /// Two bytes of packed BCD
    Bcd,
}

/// ISO 8583 layout settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Iso8583Config {
    pub mti_encoding: MtiEncoding,
    /// Field table; empty selects the built-in ISO 8583:1987 table
    pub schema: Vec<FieldDefinition>,
    /// Allow fields 129-192 behind a tertiary bitmap
    pub tertiary_bitmap: bool,
    pub charset: String,
}

impl Default for Iso8583Config {
    fn default() -> Self {
        Self {
            mti_encoding: MtiEncoding::Ascii,
            schema: Vec::new(),
            tertiary_bitmap: false,
            charset: DEFAULT_CHARSET.to_string(),
        }
    }
}

impl Iso8583Config {
    pub fn validate(&self) -> CodecResult<()> {
        // Building the schema checks positions and duplicates
        crate::iso8583::schema::FieldSchema::from_definitions(&self.schema, self.tertiary_bitmap)
            .map(|_| ())
    }
}
