//! ISO 8583 field schema
//!
//! A schema maps field positions to their wire format. Connection definitions
//! may supply their own table; an empty table selects the built-in
//! ISO 8583:1987 data elements.

use crate::constants::{
    SECONDARY_BITMAP_BIT, SECONDARY_MAX_FIELD, TERTIARY_BITMAP_BIT, TERTIARY_MAX_FIELD,
};
use crate::error::{CodecError, CodecResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Character class of a text field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldContent {
    /// ASCII digits only; fixed fields are left-padded with '0'
    Numeric,
    /// Any text; fixed fields are right-padded with ' '
    #[default]
    Alphanumeric,
}

/// Wire format of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldFormat {
    /// Exactly `length` characters
    Fixed {
        length: usize,
        #[serde(default)]
        content: FieldContent,
    },
    /// Two ASCII digits of length, then the value
    Llvar {
        max_length: usize,
        #[serde(default)]
        content: FieldContent,
    },
    /// Three ASCII digits of length, then the value
    Lllvar {
        max_length: usize,
        #[serde(default)]
        content: FieldContent,
    },
    /// Exactly `length` raw bytes, hex in the structured form
    Binary { length: usize },
}

impl FieldFormat {
    pub const fn numeric(length: usize) -> Self {
        FieldFormat::Fixed {
            length,
            content: FieldContent::Numeric,
        }
    }

    pub const fn alpha(length: usize) -> Self {
        FieldFormat::Fixed {
            length,
            content: FieldContent::Alphanumeric,
        }
    }

    pub const fn llvar(max_length: usize, content: FieldContent) -> Self {
        FieldFormat::Llvar {
            max_length,
            content,
        }
    }

    pub const fn lllvar(max_length: usize, content: FieldContent) -> Self {
        FieldFormat::Lllvar {
            max_length,
            content,
        }
    }

    pub const fn binary(length: usize) -> Self {
        FieldFormat::Binary { length }
    }

    /// Width of the ASCII length prefix, zero for fixed formats
    pub fn prefix_digits(&self) -> usize {
        match self {
            FieldFormat::Llvar { .. } => 2,
            FieldFormat::Lllvar { .. } => 3,
            FieldFormat::Fixed { .. } | FieldFormat::Binary { .. } => 0,
        }
    }

    fn check(&self, position: u16) -> CodecResult<()> {
        let (len, limit) = match *self {
            FieldFormat::Fixed { length, .. } | FieldFormat::Binary { length } => {
                (length, usize::MAX)
            }
            FieldFormat::Llvar { max_length, .. } => (max_length, 99),
            FieldFormat::Lllvar { max_length, .. } => (max_length, 999),
        };
        if len == 0 || len > limit {
            return Err(CodecError::invalid_configuration(format!(
                "field {} length {} must be between 1 and {}",
                position,
                len,
                limit.min(9999)
            )));
        }
        Ok(())
    }
}

/// Schema entry as written in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub position: u16,
    #[serde(flatten)]
    pub format: FieldFormat,
}

impl FieldDefinition {
    pub const fn new(position: u16, format: FieldFormat) -> Self {
        Self { position, format }
    }
}

/// Field position to format lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSchema {
    fields: BTreeMap<u16, FieldFormat>,
}

impl FieldSchema {
    /// Build a schema, falling back to the default table when `definitions` is empty
    pub fn from_definitions(definitions: &[FieldDefinition], tertiary: bool) -> CodecResult<Self> {
        if definitions.is_empty() {
            return Ok(DEFAULT_SCHEMA.clone());
        }

        let max = if tertiary {
            TERTIARY_MAX_FIELD
        } else {
            SECONDARY_MAX_FIELD
        };
        let mut fields = BTreeMap::new();
        for def in definitions {
            if def.position < 2
                || def.position > max
                || def.position == SECONDARY_BITMAP_BIT
                || def.position == TERTIARY_BITMAP_BIT
            {
                return Err(CodecError::FieldOutOfRange {
                    position: def.position,
                    max,
                });
            }
            def.format.check(def.position)?;
            if fields.insert(def.position, def.format).is_some() {
                return Err(CodecError::invalid_configuration(format!(
                    "field {} defined more than once",
                    def.position
                )));
            }
        }
        Ok(Self { fields })
    }

    /// The built-in ISO 8583:1987 table
    pub fn iso8583_1987() -> Self {
        DEFAULT_SCHEMA.clone()
    }

    pub fn get(&self, position: u16) -> Option<&FieldFormat> {
        self.fields.get(&position)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

static DEFAULT_SCHEMA: Lazy<FieldSchema> = Lazy::new(|| {
    use FieldContent::{Alphanumeric as A, Numeric as N};
    let f = FieldFormat::numeric;
    let a = FieldFormat::alpha;

    let mut fields = BTreeMap::new();
    let mut put = |position: u16, format: FieldFormat| {
        fields.insert(position, format);
    };

    put(2, FieldFormat::llvar(19, N)); // primary account number
    put(3, f(6)); // processing code
    put(4, f(12)); // amount, transaction
    put(5, f(12));
    put(6, f(12));
    put(7, f(10)); // transmission date & time
    put(8, f(8));
    put(9, f(8));
    put(10, f(8));
    put(11, f(6)); // system trace audit number
    put(12, f(6));
    put(13, f(4));
    put(14, f(4));
    put(15, f(4));
    put(16, f(4));
    put(17, f(4));
    put(18, f(4));
    for p in 19..=24 {
        put(p, f(3));
    }
    put(25, f(2));
    put(26, f(2));
    put(27, f(1));
    for p in 28..=31 {
        put(p, a(9)); // x+n8
    }
    put(32, FieldFormat::llvar(11, N));
    put(33, FieldFormat::llvar(11, N));
    put(34, FieldFormat::llvar(28, A));
    put(35, FieldFormat::llvar(37, A)); // track 2
    put(36, FieldFormat::lllvar(104, N));
    put(37, a(12)); // retrieval reference number
    put(38, a(6));
    put(39, a(2)); // response code
    put(40, a(3));
    put(41, a(8)); // card acceptor terminal id
    put(42, a(15)); // card acceptor id code
    put(43, a(40));
    put(44, FieldFormat::llvar(25, A));
    put(45, FieldFormat::llvar(76, A));
    for p in 46..=48 {
        put(p, FieldFormat::lllvar(999, A));
    }
    for p in 49..=51 {
        put(p, a(3)); // currency codes
    }
    put(52, FieldFormat::binary(8)); // PIN data
    put(53, f(16));
    put(54, FieldFormat::lllvar(120, A));
    for p in 55..=63 {
        put(p, FieldFormat::lllvar(999, A));
    }
    put(64, FieldFormat::binary(8)); // MAC
    put(66, f(1));
    put(67, f(2));
    for p in 68..=70 {
        put(p, f(3));
    }
    put(71, f(4));
    put(72, FieldFormat::lllvar(999, A)); // data record
    put(73, f(6));
    for p in 74..=81 {
        put(p, f(10));
    }
    for p in 82..=85 {
        put(p, f(12));
    }
    for p in 86..=89 {
        put(p, f(16));
    }
    put(90, f(42)); // original data elements
    put(91, a(1));
    put(92, a(2));
    put(93, a(5));
    put(94, a(7));
    put(95, a(42));
    put(96, FieldFormat::binary(8));
    put(97, a(17)); // x+n16
    put(98, a(25));
    put(99, FieldFormat::llvar(11, N));
    put(100, FieldFormat::llvar(11, N));
    put(101, FieldFormat::llvar(17, A));
    put(102, FieldFormat::llvar(28, A));
    put(103, FieldFormat::llvar(28, A));
    put(104, FieldFormat::lllvar(100, A));
    for p in 105..=127 {
        put(p, FieldFormat::lllvar(999, A));
    }
    put(128, FieldFormat::binary(8)); // MAC

    FieldSchema { fields }
});
