//! Segment header: one word, `tag(8) | type(6)+pad(2) | length(16)`.

use super::{decode_type_byte, encode_type_byte, StructureHeader};
use crate::types::{ByteOrder, StructureType};

pub fn pack(h: &StructureHeader) -> u32 {
    (((h.tag & 0xff) as u32) << 24)
        | ((encode_type_byte(h.data_type, h.padding) as u32) << 16)
        | (h.length & 0xffff)
}

pub fn unpack(word: u32) -> StructureHeader {
    let (data_type, padding) = decode_type_byte(((word >> 16) & 0xff) as u8);
    let mut h = StructureHeader::new(StructureType::Segment, (word >> 24) as u16, data_type, 0);
    h.padding = padding;
    h.length = word & 0xffff;
    h
}

pub(super) fn patch_tag(buf: &mut [u8], pos: usize, tag: u8, order: ByteOrder) {
    let at = pos..pos + 4;
    let word = order.read_u32(&buf[at.clone()]);
    order.write_u32(&mut buf[at], (word & 0x00ff_ffff) | ((tag as u32) << 24));
}
