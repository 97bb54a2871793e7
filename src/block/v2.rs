//! Legacy block header (versions 1–3).
//!
//! Legacy blocks have a fixed capacity of at most 32768 words in multiples
//! of 256, and events may continue from one block into the next; `start`
//! tells where the first event *beginning* in this block sits.

use super::{BlockHeader, BLOCK_HEADER_BYTES, BLOCK_HEADER_WORDS, MAGIC_NUMBER};
use crate::error::{ensure_len, EvioError, Result};
use crate::types::ByteOrder;

pub const MAX_BLOCK_WORDS: u32 = 32768;
pub const BLOCK_WORD_MULTIPLE: u32 = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderV2 {
    pub size:          u32,
    pub number:        u32,
    pub header_length: u32,
    /// Word offset of the first event header starting here, 0 if none.
    pub start:         u32,
    /// Valid words in the block, header included.
    pub end:           u32,
    pub version:       u32,
    pub reserved1:     u32,
    pub magic_number:  u32,
    pub byte_order:    ByteOrder,
    buffer_starting_position: u64,
}

impl BlockHeaderV2 {
    /// A full block whose first event begins right after the header.
    pub fn new(size: u32, number: u32) -> Result<Self> {
        let h = Self {
            size,
            number,
            header_length: BLOCK_HEADER_WORDS,
            start:         BLOCK_HEADER_WORDS,
            end:           size,
            version:       2,
            reserved1:     0,
            magic_number:  MAGIC_NUMBER,
            byte_order:    ByteOrder::Big,
            buffer_starting_position: 0,
        };
        h.validate()?;
        Ok(h)
    }

    /// Parse without validating.  The starting position is set to `offset`.
    pub fn read(buf: &[u8], offset: usize, order: ByteOrder) -> Result<Self> {
        ensure_len(buf, offset, BLOCK_HEADER_BYTES)?;
        let w = |i: usize| order.read_u32(&buf[offset + 4 * i..offset + 4 * i + 4]);
        Ok(Self {
            size:          w(0),
            number:        w(1),
            header_length: w(2),
            start:         w(3),
            end:           w(4),
            version:       w(5),
            reserved1:     w(6),
            magic_number:  w(7),
            byte_order:    order,
            buffer_starting_position: offset as u64,
        })
    }
}

impl BlockHeader for BlockHeaderV2 {
    fn size(&self) -> u32 { self.size }
    fn number(&self) -> u32 { self.number }
    fn header_length(&self) -> u32 { self.header_length }
    fn version(&self) -> u32 { self.version }
    fn magic_number(&self) -> u32 { self.magic_number }
    fn byte_order(&self) -> ByteOrder { self.byte_order }
    fn has_dictionary(&self) -> bool { false }
    fn is_last_block(&self) -> bool { false }
    fn buffer_starting_position(&self) -> u64 { self.buffer_starting_position }

    fn set_buffer_starting_position(&mut self, position: u64) {
        self.buffer_starting_position = position;
    }

    fn buffer_end_position(&self) -> u64 {
        self.buffer_starting_position + 4 * self.end as u64
    }

    fn first_structure_start_position(&self) -> Option<u64> {
        if self.start == 0 {
            None
        } else {
            Some(self.buffer_starting_position + 4 * self.start as u64)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.size < BLOCK_HEADER_WORDS || self.size > MAX_BLOCK_WORDS || self.size % BLOCK_WORD_MULTIPLE != 0 {
            return Err(EvioError::format(format!(
                "block size {} must be a multiple of {} between {} and {}",
                self.size, BLOCK_WORD_MULTIPLE, BLOCK_HEADER_WORDS, MAX_BLOCK_WORDS
            )));
        }
        if self.end < BLOCK_HEADER_WORDS || self.end > MAX_BLOCK_WORDS {
            return Err(EvioError::format(format!("block end {} out of range", self.end)));
        }
        if self.start > MAX_BLOCK_WORDS {
            return Err(EvioError::format(format!("block start {} out of range", self.start)));
        }
        if self.header_length != BLOCK_HEADER_WORDS {
            return Err(EvioError::format(format!(
                "block header length {} must be {}",
                self.header_length, BLOCK_HEADER_WORDS
            )));
        }
        if self.magic_number != MAGIC_NUMBER {
            return Err(EvioError::format(format!("bad magic number 0x{:08x}", self.magic_number)));
        }
        Ok(())
    }

    fn write(&self, dst: &mut [u8], order: ByteOrder) -> Result<usize> {
        self.validate()?;
        ensure_len(dst, 0, BLOCK_HEADER_BYTES)?;
        let words = [
            self.size, self.number, self.header_length, self.start,
            self.end, self.version, self.reserved1, self.magic_number,
        ];
        for (i, w) in words.iter().enumerate() {
            order.write_u32(&mut dst[4 * i..4 * i + 4], *w);
        }
        Ok(BLOCK_HEADER_BYTES)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn size_must_be_multiple_of_256() {
        assert!(matches!(BlockHeaderV2::new(255, 1), Err(EvioError::Format(_))));
        assert!(BlockHeaderV2::new(256, 1).is_ok());
        assert!(BlockHeaderV2::new(32768 + 256, 1).is_err());
    }

    #[test]
    fn header_length_must_be_eight() {
        let mut h = BlockHeaderV2::new(256, 1).unwrap();
        h.header_length = 7;
        assert!(matches!(h.validate(), Err(EvioError::Format(_))));
    }

    #[test]
    fn magic_is_checked() {
        let mut h = BlockHeaderV2::new(256, 1).unwrap();
        h.magic_number = 0x0100_dac0;
        assert!(h.validate().is_err());
        let mut buf = [0u8; 32];
        assert!(h.write(&mut buf, ByteOrder::Big).is_err());
    }

    #[test]
    fn end_range_is_checked() {
        let mut h = BlockHeaderV2::new(256, 1).unwrap();
        h.end = 4;
        assert!(h.validate().is_err());
        h.end = 32769;
        assert!(h.validate().is_err());
    }

    #[test]
    fn positions_follow_start_and_end() {
        let mut h = BlockHeaderV2::new(512, 2).unwrap();
        h.end = 100;
        h.set_buffer_starting_position(1000);
        assert_eq!(h.buffer_end_position(), 1400);
        assert_eq!(h.next_block_start_position(), 3048);
        assert_eq!(h.first_structure_start_position(), Some(1032));
        h.start = 0;
        assert_eq!(h.first_structure_start_position(), None);
    }

    #[test]
    fn bytes_remaining_is_range_checked() {
        let mut h = BlockHeaderV2::new(256, 1).unwrap();
        h.set_buffer_starting_position(64);
        assert_eq!(h.bytes_remaining(64).unwrap(), 1024);
        assert_eq!(h.bytes_remaining(1088).unwrap(), 0);
        assert!(matches!(h.bytes_remaining(63), Err(EvioError::Range { .. })));
        assert!(matches!(h.bytes_remaining(1089), Err(EvioError::Range { .. })));
    }

    #[test]
    fn write_then_read() {
        let mut h = BlockHeaderV2::new(256, 9).unwrap();
        h.end = 40;
        h.byte_order = ByteOrder::Little;
        let mut buf = [0u8; 32];
        h.write(&mut buf, ByteOrder::Little).unwrap();
        let back = BlockHeaderV2::read(&buf, 0, ByteOrder::Little).unwrap();
        assert_eq!(back, h);
    }
}
