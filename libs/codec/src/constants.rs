//! # Codec Constants
//!
//! Wire-level defaults for the MLLP frame codec and fixed sizes of the
//! ISO 8583 message layout. Connection definitions may override the MLLP
//! delimiters; the ISO 8583 sizes are fixed by the standard.

/// MLLP start-of-block byte (VT)
pub const MLLP_START_BYTE: u8 = 0x0B;

/// First MLLP end-of-block byte (FS)
pub const MLLP_END_BYTE_1: u8 = 0x1C;

/// Second MLLP end-of-block byte (CR)
pub const MLLP_END_BYTE_2: u8 = 0x0D;

/// Upper bound for one decoded frame when the definition sets none
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024; // 16MB

/// Charset label used when a codec configuration names none
pub const DEFAULT_CHARSET: &str = "utf-8";

/// ISO 8583 bitmap width in bytes
pub const BITMAP_SIZE: usize = 8;

/// ISO 8583 MTI width in digits
pub const MTI_DIGITS: usize = 4;

/// Highest field position addressable by the primary bitmap
pub const PRIMARY_MAX_FIELD: u16 = 64;

/// Highest field position addressable with a secondary bitmap
pub const SECONDARY_MAX_FIELD: u16 = 128;

/// Highest field position addressable with a tertiary bitmap
pub const TERTIARY_MAX_FIELD: u16 = 192;

/// Bit announcing the secondary bitmap
pub const SECONDARY_BITMAP_BIT: u16 = 1;

/// Bit announcing the tertiary bitmap
pub const TERTIARY_BITMAP_BIT: u16 = 65;
