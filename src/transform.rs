//! Conversions between the three structure kinds.
//!
//! Every conversion consumes its input and moves the payload (raw bytes or
//! child structures) into the result untouched; only the header changes.
//!
//! | From → To | Length | Tag | Num |
//! |---|---|---|---|
//! | segment/tagsegment → bank | +1 | kept | supplied by caller |
//! | bank → segment | −1, must fit 16 bits | low 8 bits | dropped |
//! | bank → tagsegment | −1, must fit 16 bits | low 12 bits | dropped |
//! | segment → tagsegment | same | kept | n/a |
//! | tagsegment → segment | same | low 8 bits | n/a |
//!
//! Conversions into tagsegments fold the `ALSOBANK` and `ALSOSEGMENT`
//! aliases into `BANK` and `SEGMENT`; every other conversion keeps the data
//! type as it was.  Tagsegments have no padding field, so padding is dropped
//! on the way in and a payload that does not fill whole words will refuse
//! to write.

use tracing::trace;

use crate::error::{EvioError, Result};
use crate::header::StructureHeader;
use crate::structure::EvioStructure;
use crate::types::StructureType;

fn expect_kind(s: &EvioStructure, expected: StructureType) -> Result<()> {
    if s.kind() != expected {
        return Err(EvioError::WrongStructure { expected, found: s.kind() });
    }
    Ok(())
}

fn rebuild(source: EvioStructure, target: StructureType, num: i32,
           length: u32, padding: u8) -> EvioStructure {
    let (old, content, order) = source.into_parts();
    let data_type = match target {
        StructureType::TagSegment => old.data_type.canonical(),
        _                         => old.data_type,
    };
    let mut header = StructureHeader::new(target, old.tag, data_type, num);
    header.length = length;
    header.padding = padding;
    trace!(from = %old.kind(), to = %target, tag = header.tag, length, "transformed structure");
    EvioStructure::from_parts(header, content, order)
}

fn shrink_length(bank: &EvioStructure) -> Result<u32> {
    let length = bank.header().length;
    if length > StructureType::Segment.max_length() {
        return Err(EvioError::LengthOverflow {
            what:  "bank length",
            value: length as u64,
            limit: StructureType::Segment.max_length() as u64,
        });
    }
    Ok(length.saturating_sub(1))
}

pub fn segment_to_bank(seg: EvioStructure, num: i32) -> Result<EvioStructure> {
    expect_kind(&seg, StructureType::Segment)?;
    let (length, padding) = (seg.header().length + 1, seg.header().padding);
    Ok(rebuild(seg, StructureType::Bank, num, length, padding))
}

pub fn tag_segment_to_bank(tagseg: EvioStructure, num: i32) -> Result<EvioStructure> {
    expect_kind(&tagseg, StructureType::TagSegment)?;
    let (length, padding) = (tagseg.header().length + 1, tagseg.header().padding);
    Ok(rebuild(tagseg, StructureType::Bank, num, length, padding))
}

pub fn segment_to_tag_segment(seg: EvioStructure) -> Result<EvioStructure> {
    expect_kind(&seg, StructureType::Segment)?;
    let length = seg.header().length;
    Ok(rebuild(seg, StructureType::TagSegment, 0, length, 0))
}

pub fn tag_segment_to_segment(tagseg: EvioStructure) -> Result<EvioStructure> {
    expect_kind(&tagseg, StructureType::TagSegment)?;
    let (length, padding) = (tagseg.header().length, tagseg.header().padding);
    Ok(rebuild(tagseg, StructureType::Segment, 0, length, padding))
}

pub fn bank_to_segment(bank: EvioStructure) -> Result<EvioStructure> {
    expect_kind(&bank, StructureType::Bank)?;
    let length = shrink_length(&bank)?;
    let padding = bank.header().padding;
    Ok(rebuild(bank, StructureType::Segment, 0, length, padding))
}

pub fn bank_to_tag_segment(bank: EvioStructure) -> Result<EvioStructure> {
    expect_kind(&bank, StructureType::Bank)?;
    let length = shrink_length(&bank)?;
    Ok(rebuild(bank, StructureType::TagSegment, 0, length, 0))
}

/// Convert `s` to `target`.  `num` is only used when the target is a bank.
pub fn transform(s: EvioStructure, target: StructureType, num: i32) -> Result<EvioStructure> {
    use StructureType::*;
    match (s.kind(), target) {
        (Bank, Bank) | (Segment, Segment) | (TagSegment, TagSegment) => Ok(s),
        (Segment, Bank)          => segment_to_bank(s, num),
        (TagSegment, Bank)       => tag_segment_to_bank(s, num),
        (Segment, TagSegment)    => segment_to_tag_segment(s),
        (TagSegment, Segment)    => tag_segment_to_segment(s),
        (Bank, Segment)          => bank_to_segment(s),
        (Bank, TagSegment)       => bank_to_tag_segment(s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ByteOrder, DataType};

    fn long_bank(length: u32) -> EvioStructure {
        let mut h = StructureHeader::bank(1, DataType::Int32, 3);
        h.length = length;
        EvioStructure::from_header(h)
    }

    #[test]
    fn oversize_bank_cannot_shrink() {
        assert!(matches!(bank_to_segment(long_bank(70000)), Err(EvioError::LengthOverflow { .. })));
        assert!(matches!(bank_to_tag_segment(long_bank(70000)), Err(EvioError::LengthOverflow { .. })));
        let same = transform(long_bank(70000), StructureType::Bank, 0).unwrap();
        assert_eq!(same.header().length, 70000);
        assert_eq!(bank_to_segment(long_bank(0xffff)).unwrap().header().length, 0xfffe);
    }

    #[test]
    fn segment_to_bank_adds_header_word() {
        let mut seg = EvioStructure::segment(0xab, DataType::Short16);
        seg.set_shorts(&[1, 2, 3]).unwrap();
        seg.set_all_header_lengths().unwrap();
        assert_eq!((seg.header().length, seg.header().padding), (2, 2));

        let bank = segment_to_bank(seg, -1).unwrap();
        assert_eq!(bank.kind(), StructureType::Bank);
        assert_eq!(bank.header().length, 3);
        assert_eq!(bank.header().padding, 2);
        assert_eq!(bank.num(), 255);
        assert_eq!(bank.tag(), 0xab);
        assert_eq!(bank.computed_length(), 3);
        let shorts: Vec<i16> = bank.data().unwrap().shorts().unwrap().collect();
        assert_eq!(shorts, vec![1, 2, 3]);
    }

    #[test]
    fn tags_are_truncated_downward() {
        let ts = EvioStructure::tag_segment(0xfff, DataType::Int32);
        let seg = tag_segment_to_segment(ts).unwrap();
        assert_eq!(seg.tag(), 0xff);

        let bank = EvioStructure::bank(0x1234, DataType::Int32, 5);
        let ts = bank_to_tag_segment(bank).unwrap();
        assert_eq!(ts.tag(), 0x234);
        assert_eq!(ts.num(), 0);
    }

    #[test]
    fn aliases_folded_only_into_tag_segments() {
        let seg = EvioStructure::segment(1, DataType::AlsoBank);
        let ts = segment_to_tag_segment(seg).unwrap();
        assert_eq!(ts.data_type(), DataType::Bank);
        let ts = bank_to_tag_segment(EvioStructure::bank(1, DataType::AlsoSegment, 0)).unwrap();
        assert_eq!(ts.data_type(), DataType::Segment);

        let seg = tag_segment_to_segment(EvioStructure::tag_segment(1, DataType::AlsoSegment)).unwrap();
        assert_eq!(seg.data_type(), DataType::AlsoSegment);
        let seg = bank_to_segment(EvioStructure::bank(1, DataType::AlsoBank, 0)).unwrap();
        assert_eq!(seg.data_type(), DataType::AlsoBank);
        let bank = segment_to_bank(EvioStructure::segment(1, DataType::AlsoSegment), 2).unwrap();
        assert_eq!(bank.data_type(), DataType::AlsoSegment);
    }

    #[test]
    fn children_move_with_container() {
        let mut bank = EvioStructure::bank(1, DataType::Bank, 0);
        let mut kid = EvioStructure::bank(2, DataType::Uint32, 0);
        kid.set_uints(&[7]).unwrap();
        bank.add_child(kid).unwrap();
        bank.set_all_header_lengths().unwrap();
        let before = bank.children()[0].to_bytes(ByteOrder::Big).unwrap();

        let seg = bank_to_segment(bank).unwrap();
        assert_eq!(seg.header().length, seg.computed_length() as u32);
        assert_eq!(seg.children()[0].to_bytes(ByteOrder::Big).unwrap(), before);
    }

    #[test]
    fn wrong_source_kind() {
        let bank = EvioStructure::bank(1, DataType::Int32, 0);
        assert!(matches!(segment_to_bank(bank, 0), Err(EvioError::WrongStructure { .. })));
    }
}
