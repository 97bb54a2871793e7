//! Block (physical record) headers.
//!
//! Every block starts with an 8-word header ending in the magic number
//! `0xc0da0100`.  Readers find the byte order by comparing the raw magic
//! word with its byte-swapped value, then pick the header version from the
//! low byte of word 5:
//!
//! | Version | Type | Layout |
//! |---|---|---|
//! | 1–3 | [`BlockHeaderV2`] | size, number, headerLength(=8), start, end, version, reserved, magic |
//! | 4+  | [`BlockHeaderV4`] | size, number, headerLength, eventCount, reserved, bitInfo\|version, reserved, magic |
//!
//! Downstream code talks to the [`BlockHeader`] trait and never needs to
//! know which version it holds.

pub mod v2;
pub mod v4;

pub use v2::BlockHeaderV2;
pub use v4::BlockHeaderV4;

use crate::error::{ensure_len, EvioError, Result};
use crate::types::ByteOrder;

pub const MAGIC_NUMBER: u32 = 0xc0da_0100;
pub const BLOCK_HEADER_WORDS: u32 = 8;
pub const BLOCK_HEADER_BYTES: usize = 32;

/// Version-agnostic view of a block header.
///
/// Positions are absolute byte offsets into the buffer the block lives in;
/// the starting position is assigned by whoever located the block and is
/// not part of the wire format.
pub trait BlockHeader {
    /// Total words in the block, header included.
    fn size(&self) -> u32;
    fn number(&self) -> u32;
    fn header_length(&self) -> u32;
    fn version(&self) -> u32;
    fn magic_number(&self) -> u32;
    fn byte_order(&self) -> ByteOrder;
    fn has_dictionary(&self) -> bool;
    fn is_last_block(&self) -> bool;

    fn buffer_starting_position(&self) -> u64;
    fn set_buffer_starting_position(&mut self, position: u64);

    /// One past the last valid byte of the block.
    fn buffer_end_position(&self) -> u64;

    fn next_block_start_position(&self) -> u64 {
        self.buffer_starting_position() + 4 * self.size() as u64
    }

    /// `None` when no structure header begins in this block.
    fn first_structure_start_position(&self) -> Option<u64>;

    /// Bytes left between `position` and the start of the next block.
    fn bytes_remaining(&self, position: u64) -> Result<u64> {
        let start = self.buffer_starting_position();
        let next = self.next_block_start_position();
        if position < start || position > next {
            return Err(EvioError::Range { position, start, end: next });
        }
        Ok(next - position)
    }

    fn validate(&self) -> Result<()>;

    /// Encode all 8 words into `dst`; returns the bytes written.
    fn write(&self, dst: &mut [u8], order: ByteOrder) -> Result<usize>;
}

/// Find the byte order of the block header at `buf[offset]` from its magic word.
pub fn detect_byte_order(buf: &[u8], offset: usize) -> Result<ByteOrder> {
    ensure_len(buf, offset, BLOCK_HEADER_BYTES)?;
    let raw = &buf[offset + 28..offset + 32];
    if ByteOrder::Big.read_u32(raw) == MAGIC_NUMBER {
        Ok(ByteOrder::Big)
    } else if ByteOrder::Little.read_u32(raw) == MAGIC_NUMBER {
        Ok(ByteOrder::Little)
    } else {
        Err(EvioError::format(format!(
            "bad magic number 0x{:08x} at offset {}",
            ByteOrder::Big.read_u32(raw),
            offset + 28
        )))
    }
}

// ── VersionedBlockHeader ─────────────────────────────────────────────────────

/// A block header of either layout, as found in a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionedBlockHeader {
    V2(BlockHeaderV2),
    V4(BlockHeaderV4),
}

macro_rules! dispatch {
    ($self:ident, $h:ident => $e:expr) => {
        match $self {
            VersionedBlockHeader::V2($h) => $e,
            VersionedBlockHeader::V4($h) => $e,
        }
    };
}

impl VersionedBlockHeader {
    /// Parse and validate the block header at `buf[offset]`, detecting byte
    /// order and version.  The starting position is set to `offset`.
    pub fn read(buf: &[u8], offset: usize) -> Result<Self> {
        let order = detect_byte_order(buf, offset)?;
        let version = order.read_u32(&buf[offset + 20..offset + 24]) & 0xff;
        let header = if version < 4 {
            VersionedBlockHeader::V2(BlockHeaderV2::read(buf, offset, order)?)
        } else {
            VersionedBlockHeader::V4(BlockHeaderV4::read(buf, offset, order)?)
        };
        header.validate()?;
        Ok(header)
    }

    pub fn as_v4(&self) -> Option<&BlockHeaderV4> {
        match self {
            VersionedBlockHeader::V4(h) => Some(h),
            VersionedBlockHeader::V2(_) => None,
        }
    }

    pub fn as_v4_mut(&mut self) -> Option<&mut BlockHeaderV4> {
        match self {
            VersionedBlockHeader::V4(h) => Some(h),
            VersionedBlockHeader::V2(_) => None,
        }
    }

    /// Only version-4 blocks record their event count.
    pub fn event_count(&self) -> Option<u32> {
        self.as_v4().map(|h| h.event_count)
    }
}

impl BlockHeader for VersionedBlockHeader {
    fn size(&self) -> u32 { dispatch!(self, h => h.size()) }
    fn number(&self) -> u32 { dispatch!(self, h => h.number()) }
    fn header_length(&self) -> u32 { dispatch!(self, h => h.header_length()) }
    fn version(&self) -> u32 { dispatch!(self, h => h.version()) }
    fn magic_number(&self) -> u32 { dispatch!(self, h => h.magic_number()) }
    fn byte_order(&self) -> ByteOrder { dispatch!(self, h => h.byte_order()) }
    fn has_dictionary(&self) -> bool { dispatch!(self, h => h.has_dictionary()) }
    fn is_last_block(&self) -> bool { dispatch!(self, h => h.is_last_block()) }
    fn buffer_starting_position(&self) -> u64 { dispatch!(self, h => h.buffer_starting_position()) }

    fn set_buffer_starting_position(&mut self, position: u64) {
        dispatch!(self, h => h.set_buffer_starting_position(position))
    }

    fn buffer_end_position(&self) -> u64 { dispatch!(self, h => h.buffer_end_position()) }
    fn next_block_start_position(&self) -> u64 { dispatch!(self, h => h.next_block_start_position()) }

    fn first_structure_start_position(&self) -> Option<u64> {
        dispatch!(self, h => h.first_structure_start_position())
    }

    fn bytes_remaining(&self, position: u64) -> Result<u64> {
        dispatch!(self, h => h.bytes_remaining(position))
    }

    fn validate(&self) -> Result<()> { dispatch!(self, h => h.validate()) }

    fn write(&self, dst: &mut [u8], order: ByteOrder) -> Result<usize> {
        dispatch!(self, h => h.write(dst, order))
    }
}

impl From<BlockHeaderV2> for VersionedBlockHeader {
    fn from(h: BlockHeaderV2) -> Self {
        VersionedBlockHeader::V2(h)
    }
}

impl From<BlockHeaderV4> for VersionedBlockHeader {
    fn from(h: BlockHeaderV4) -> Self {
        VersionedBlockHeader::V4(h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_both_orders() {
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let h = BlockHeaderV4::new(8, 1, 0);
            let mut buf = [0u8; 32];
            h.write(&mut buf, order).unwrap();
            assert_eq!(detect_byte_order(&buf, 0).unwrap(), order);
            let back = VersionedBlockHeader::read(&buf, 0).unwrap();
            assert_eq!(back.byte_order(), order);
            assert_eq!(back.version(), 4);
        }
    }

    #[test]
    fn picks_legacy_layout_from_version() {
        let h = BlockHeaderV2::new(256, 3).unwrap();
        let mut buf = vec![0u8; 64];
        h.write(&mut buf[32..], ByteOrder::Little).unwrap();
        let back = VersionedBlockHeader::read(&buf, 32).unwrap();
        assert!(matches!(back, VersionedBlockHeader::V2(_)));
        assert_eq!(back.number(), 3);
        assert_eq!(back.buffer_starting_position(), 32);
        assert_eq!(back.event_count(), None);
    }

    #[test]
    fn garbage_magic_is_format_error() {
        let buf = [0xabu8; 32];
        assert!(matches!(detect_byte_order(&buf, 0), Err(EvioError::Format(_))));
    }

    #[test]
    fn truncated_header_is_underflow() {
        let buf = [0u8; 20];
        assert!(matches!(VersionedBlockHeader::read(&buf, 0), Err(EvioError::BufferUnderflow { .. })));
    }
}
