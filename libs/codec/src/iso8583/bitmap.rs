//! ISO 8583 bitmaps
//!
//! Bit numbering is 1-based and most-significant-bit first: bit 1 is the high
//! bit of the first byte. Bit 1 announces the secondary bitmap, bit 65 (bit 1
//! of the secondary bitmap) announces the tertiary bitmap.

use crate::constants::{
    BITMAP_SIZE, PRIMARY_MAX_FIELD, SECONDARY_BITMAP_BIT, SECONDARY_MAX_FIELD,
    TERTIARY_BITMAP_BIT, TERTIARY_MAX_FIELD,
};
use crate::error::{CodecError, CodecResult};

/// Up to three 8-byte bitmaps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bitmap {
    bytes: [u8; BITMAP_SIZE * 3],
    count: usize,
}

impl Bitmap {
    /// Build the bitmap(s) needed for `positions`
    ///
    /// Positions must be data fields (not 1 or 65). The secondary and tertiary
    /// presence bits are set as the highest position requires.
    pub fn from_positions<I>(positions: I, tertiary_enabled: bool) -> CodecResult<Self>
    where
        I: IntoIterator<Item = u16>,
    {
        let mut bitmap = Bitmap {
            bytes: [0; BITMAP_SIZE * 3],
            count: 1,
        };
        let limit = if tertiary_enabled {
            TERTIARY_MAX_FIELD
        } else {
            SECONDARY_MAX_FIELD
        };

        for position in positions {
            if position == SECONDARY_BITMAP_BIT
                || position == TERTIARY_BITMAP_BIT
                || position == 0
                || position > TERTIARY_MAX_FIELD
            {
                return Err(CodecError::FieldOutOfRange {
                    position,
                    max: limit,
                });
            }
            if position > SECONDARY_MAX_FIELD && !tertiary_enabled {
                return Err(CodecError::TertiaryBitmapDisabled { position });
            }
            let needed = bitmaps_for(position);
            if needed > bitmap.count {
                bitmap.count = needed;
            }
            bitmap.set(position);
        }

        if bitmap.count >= 2 {
            bitmap.set(SECONDARY_BITMAP_BIT);
        }
        if bitmap.count == 3 {
            bitmap.set(TERTIARY_BITMAP_BIT);
        }
        Ok(bitmap)
    }

    /// Start from a primary bitmap read off the wire
    pub fn from_primary(primary: &[u8]) -> Self {
        let mut bitmap = Bitmap {
            bytes: [0; BITMAP_SIZE * 3],
            count: 1,
        };
        bitmap.bytes[..BITMAP_SIZE].copy_from_slice(&primary[..BITMAP_SIZE]);
        bitmap
    }

    /// Append the next bitmap read off the wire
    pub fn push_extension(&mut self, bytes: &[u8]) {
        let start = self.count * BITMAP_SIZE;
        self.bytes[start..start + BITMAP_SIZE].copy_from_slice(&bytes[..BITMAP_SIZE]);
        self.count += 1;
    }

    pub fn is_set(&self, position: u16) -> bool {
        if position == 0 || usize::from(position) > self.count * BITMAP_SIZE * 8 {
            return false;
        }
        let (byte, mask) = locate(position);
        self.bytes[byte] & mask != 0
    }

    fn set(&mut self, position: u16) {
        let (byte, mask) = locate(position);
        self.bytes[byte] |= mask;
    }

    /// Whether another bitmap follows the ones read so far
    pub fn announces_more(&self) -> bool {
        match self.count {
            1 => self.is_set(SECONDARY_BITMAP_BIT),
            2 => self.is_set(TERTIARY_BITMAP_BIT),
            _ => false,
        }
    }

    /// Number of 8-byte bitmaps present
    pub fn count(&self) -> usize {
        self.count
    }

    /// Wire bytes of all present bitmaps
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.count * BITMAP_SIZE]
    }

    /// Set data-field positions in ascending order, skipping presence bits
    pub fn data_positions(&self) -> impl Iterator<Item = u16> + '_ {
        let max = (self.count * BITMAP_SIZE * 8) as u16;
        (2..=max).filter(move |&p| p != TERTIARY_BITMAP_BIT && self.is_set(p))
    }
}

fn bitmaps_for(position: u16) -> usize {
    if position <= PRIMARY_MAX_FIELD {
        1
    } else if position <= SECONDARY_MAX_FIELD {
        2
    } else {
        3
    }
}

fn locate(position: u16) -> (usize, u8) {
    let index = usize::from(position - 1);
    (index / 8, 0x80 >> (index % 8))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_only() {
        let bitmap = Bitmap::from_positions([3, 4, 11, 41], false).unwrap();
        assert_eq!(bitmap.count(), 1);
        assert_eq!(bitmap.as_bytes(), &[0x30, 0x20, 0, 0, 0, 0x80, 0, 0]);
        assert!(!bitmap.announces_more());
    }

    #[test]
    fn test_secondary_sets_bit_one() {
        let bitmap = Bitmap::from_positions([2, 3, 4, 41, 42, 72], false).unwrap();
        assert_eq!(bitmap.count(), 2);
        assert_eq!(
            bitmap.as_bytes(),
            &[
                0xF0, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, // primary
                0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, // secondary
            ]
        );
        let positions: Vec<u16> = bitmap.data_positions().collect();
        assert_eq!(positions, vec![2, 3, 4, 41, 42, 72]);
    }

    #[test]
    fn test_tertiary_sets_bit_sixty_five() {
        let bitmap = Bitmap::from_positions([3, 130], true).unwrap();
        assert_eq!(bitmap.count(), 3);
        assert!(bitmap.is_set(1));
        assert!(bitmap.is_set(65));
        assert_eq!(bitmap.data_positions().collect::<Vec<_>>(), vec![3, 130]);
    }

    #[test]
    fn test_tertiary_position_without_tertiary_support() {
        assert_eq!(
            Bitmap::from_positions([130], false),
            Err(CodecError::TertiaryBitmapDisabled { position: 130 })
        );
    }

    #[test]
    fn test_reserved_positions_rejected() {
        assert!(Bitmap::from_positions([1], false).is_err());
        assert!(Bitmap::from_positions([65], true).is_err());
    }

    #[test]
    fn test_rebuild_from_wire() {
        let mut bitmap = Bitmap::from_primary(&[0x80, 0, 0, 0, 0, 0, 0, 0x01]);
        assert!(bitmap.announces_more());
        bitmap.push_extension(&[0x40, 0, 0, 0, 0, 0, 0, 0]);
        assert!(!bitmap.announces_more());
        assert_eq!(bitmap.data_positions().collect::<Vec<_>>(), vec![64, 66]);
    }
}
