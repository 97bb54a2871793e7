//! Version-4 block header.  Blocks hold whole events only, record how many,
//! and carry dictionary / last-block flags above the version byte.

use tracing::warn;

use super::{BlockHeader, BLOCK_HEADER_BYTES, BLOCK_HEADER_WORDS, MAGIC_NUMBER};
use crate::error::{ensure_len, EvioError, Result};
use crate::types::ByteOrder;

pub const EVIO_VERSION: u32 = 4;

const DICTIONARY_BIT: u32 = 0x1;
const LAST_BLOCK_BIT: u32 = 0x2;
const EVENT_TYPE_SHIFT: u32 = 2;
const EVENT_TYPE_MASK: u32 = 0xf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeaderV4 {
    pub size:          u32,
    pub number:        u32,
    pub header_length: u32,
    pub event_count:   u32,
    pub reserved1:     u32,
    /// Upper 24 bits of word 5: bit 0 dictionary, bit 1 last block,
    /// bits 2-5 event type.
    pub bit_info:      u32,
    pub version:       u32,
    pub reserved2:     u32,
    pub magic_number:  u32,
    pub byte_order:    ByteOrder,
    buffer_starting_position: u64,
}

impl BlockHeaderV4 {
    pub fn new(size: u32, number: u32, event_count: u32) -> Self {
        Self {
            size,
            number,
            header_length: BLOCK_HEADER_WORDS,
            event_count,
            reserved1:     0,
            bit_info:      0,
            version:       EVIO_VERSION,
            reserved2:     0,
            magic_number:  MAGIC_NUMBER,
            byte_order:    ByteOrder::Big,
            buffer_starting_position: 0,
        }
    }

    /// Parse without validating.  The starting position is set to `offset`.
    pub fn read(buf: &[u8], offset: usize, order: ByteOrder) -> Result<Self> {
        ensure_len(buf, offset, BLOCK_HEADER_BYTES)?;
        let w = |i: usize| order.read_u32(&buf[offset + 4 * i..offset + 4 * i + 4]);
        let sixth = w(5);
        Ok(Self {
            size:          w(0),
            number:        w(1),
            header_length: w(2),
            event_count:   w(3),
            reserved1:     w(4),
            bit_info:      sixth >> 8,
            version:       sixth & 0xff,
            reserved2:     w(6),
            magic_number:  w(7),
            byte_order:    order,
            buffer_starting_position: offset as u64,
        })
    }

    pub fn set_dictionary(&mut self, on: bool) {
        self.set_bit(DICTIONARY_BIT, on);
    }

    pub fn set_last_block(&mut self, on: bool) {
        self.set_bit(LAST_BLOCK_BIT, on);
    }

    pub fn event_type(&self) -> u32 {
        (self.bit_info >> EVENT_TYPE_SHIFT) & EVENT_TYPE_MASK
    }

    pub fn set_event_type(&mut self, event_type: u32) {
        self.bit_info &= !(EVENT_TYPE_MASK << EVENT_TYPE_SHIFT);
        self.bit_info |= (event_type & EVENT_TYPE_MASK) << EVENT_TYPE_SHIFT;
    }

    fn set_bit(&mut self, bit: u32, on: bool) {
        if on {
            self.bit_info |= bit;
        } else {
            self.bit_info &= !bit;
        }
    }

    /// Word 5 as stored: version in the low byte, bit info above.
    pub fn sixth_word(&self) -> u32 {
        (self.version & 0xff) | (self.bit_info << 8)
    }
}

impl BlockHeader for BlockHeaderV4 {
    fn size(&self) -> u32 { self.size }
    fn number(&self) -> u32 { self.number }
    fn header_length(&self) -> u32 { self.header_length }
    fn version(&self) -> u32 { self.version }
    fn magic_number(&self) -> u32 { self.magic_number }
    fn byte_order(&self) -> ByteOrder { self.byte_order }
    fn has_dictionary(&self) -> bool { self.bit_info & DICTIONARY_BIT != 0 }
    fn is_last_block(&self) -> bool { self.bit_info & LAST_BLOCK_BIT != 0 }
    fn buffer_starting_position(&self) -> u64 { self.buffer_starting_position }

    fn set_buffer_starting_position(&mut self, position: u64) {
        self.buffer_starting_position = position;
    }

    fn buffer_end_position(&self) -> u64 {
        self.next_block_start_position()
    }

    fn first_structure_start_position(&self) -> Option<u64> {
        Some(self.buffer_starting_position + 4 * self.header_length as u64)
    }

    fn validate(&self) -> Result<()> {
        if self.size < BLOCK_HEADER_WORDS {
            return Err(EvioError::format(format!("block size {} below {}", self.size, BLOCK_HEADER_WORDS)));
        }
        if self.header_length < BLOCK_HEADER_WORDS || self.header_length > self.size {
            return Err(EvioError::format(format!("block header length {} out of range", self.header_length)));
        }
        if self.header_length != BLOCK_HEADER_WORDS {
            warn!(header_length = self.header_length, "non-standard block header length");
        }
        if self.version < EVIO_VERSION {
            return Err(EvioError::format(format!("block version {} below {}", self.version, EVIO_VERSION)));
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
            self.size, self.number, self.header_length, self.event_count,
            self.reserved1, self.sixth_word(), self.reserved2, self.magic_number,
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
    fn flags_live_above_version_byte() {
        let mut h = BlockHeaderV4::new(8, 1, 0);
        h.set_dictionary(true);
        h.set_last_block(true);
        h.set_event_type(5);
        assert_eq!(h.sixth_word(), 0x4 | 0x100 | 0x200 | (5 << 10));
        let mut buf = [0u8; 32];
        h.write(&mut buf, ByteOrder::Big).unwrap();
        let back = BlockHeaderV4::read(&buf, 0, ByteOrder::Big).unwrap();
        assert!(back.has_dictionary());
        assert!(back.is_last_block());
        assert_eq!(back.event_type(), 5);
        assert_eq!(back.version, 4);

        let mut cleared = back.clone();
        cleared.set_last_block(false);
        assert!(!cleared.is_last_block());
        assert!(cleared.has_dictionary());
    }

    #[test]
    fn validation_rules() {
        let mut h = BlockHeaderV4::new(8, 1, 0);
        assert!(h.validate().is_ok());
        h.version = 3;
        assert!(h.validate().is_err());
        h.version = 4;
        h.header_length = 7;
        assert!(h.validate().is_err());
        h.header_length = 8;
        h.size = 7;
        assert!(h.validate().is_err());
        h.size = 8;
        h.magic_number = 0;
        assert!(matches!(h.validate(), Err(EvioError::Format(_))));
    }

    #[test]
    fn positions() {
        let mut h = BlockHeaderV4::new(20, 1, 1);
        h.set_buffer_starting_position(100);
        assert_eq!(h.buffer_end_position(), 180);
        assert_eq!(h.next_block_start_position(), 180);
        assert_eq!(h.first_structure_start_position(), Some(132));
        assert_eq!(h.bytes_remaining(132).unwrap(), 48);
        assert!(h.bytes_remaining(181).is_err());
    }
}
