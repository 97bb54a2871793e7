//! Bank header: two words, the second packing tag, type/padding and num.

use super::{decode_type_byte, encode_type_byte, StructureHeader};
use crate::types::{ByteOrder, StructureType};

/// Pack the second header word.
pub fn pack(h: &StructureHeader) -> u32 {
    ((h.tag as u32) << 16)
        | ((encode_type_byte(h.data_type, h.padding) as u32) << 8)
        | h.num() as u32
}

pub fn unpack(word0: u32, word1: u32) -> StructureHeader {
    let (data_type, padding) = decode_type_byte(((word1 >> 8) & 0xff) as u8);
    let mut h = StructureHeader::new(StructureType::Bank, (word1 >> 16) as u16, data_type, (word1 & 0xff) as i32);
    h.padding = padding;
    h.length = word0;
    h
}

pub(super) fn patch_tag(buf: &mut [u8], pos: usize, tag: u16, order: ByteOrder) {
    let at = pos + 4..pos + 8;
    let word = order.read_u32(&buf[at.clone()]);
    order.write_u32(&mut buf[at], (word & 0x0000_ffff) | ((tag as u32) << 16));
}

pub(super) fn patch_num(buf: &mut [u8], pos: usize, num: u8, order: ByteOrder) {
    let at = pos + 4..pos + 8;
    let word = order.read_u32(&buf[at.clone()]);
    order.write_u32(&mut buf[at], (word & 0xffff_ff00) | num as u32);
}
