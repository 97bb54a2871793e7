//! Tagsegment header: one word, `tag(12) | type(4) | length(16)`.  There is
//! no room for padding, so byte and short payloads always read back with
//! padding 0.

use super::StructureHeader;
use crate::types::{ByteOrder, DataType, StructureType};

pub fn pack(h: &StructureHeader) -> u32 {
    let hi = (((h.tag & 0xfff) as u32) << 4) | (h.data_type.tag_segment_code() & 0x0f) as u32;
    (hi << 16) | (h.length & 0xffff)
}

pub fn unpack(word: u32) -> StructureHeader {
    let data_type = DataType::from_code((word >> 16) & 0x0f).unwrap_or(DataType::Unknown32);
    let mut h = StructureHeader::new(StructureType::TagSegment, (word >> 20) as u16, data_type, 0);
    h.length = word & 0xffff;
    h
}

pub(super) fn patch_tag(buf: &mut [u8], pos: usize, tag: u16, order: ByteOrder) {
    let at = pos..pos + 4;
    let word = order.read_u32(&buf[at.clone()]);
    order.write_u32(&mut buf[at], (word & 0x000f_ffff) | (((tag & 0xfff) as u32) << 20));
}
