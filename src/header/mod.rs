//! Structure headers for the three structure kinds.
//!
//! # Layout
//! ```text
//! bank        word0  length
//!             word1  tag(16) | type(6)+pad(2) (8) | num(8)
//! segment     word0  tag(8) | type(6)+pad(2) (8) | length(16)
//! tagsegment  word0  tag(12) | type(4) | length(16)
//! ```
//! Each packed word is written as one 32-bit integer in the target byte
//! order, so a little-endian bank lands on disk as `[num, type, tag-lo, tag-hi]`
//! while a big-endian one reads `[tag-hi, tag-lo, type, num]`.
//!
//! The per-kind modules hold the bit packing; this module owns the buffer
//! plumbing and the in-place field patches used by the node index.

pub mod bank;
pub mod segment;
pub mod tag_segment;

use std::fmt;

use crate::error::{ensure_len, EvioError, Result};
use crate::types::{ByteOrder, DataType, StructureType};

/// Fold an arbitrary integer into the 8-bit num field.  Negative values wrap
/// as if they were a signed byte.
pub fn normalize_num(num: i32) -> u8 {
    let mut n = num;
    if n < 0 {
        n += 256;
    }
    (n & 0xff) as u8
}

/// Decode the combined type/padding byte of bank and segment headers.
pub(crate) fn decode_type_byte(raw: u8) -> (DataType, u8) {
    // 0x40 is the retired "also tagsegment" code
    if raw == 0x40 {
        return (DataType::TagSegment, 0);
    }
    let data_type = DataType::from_code((raw & 0x3f) as u32).unwrap_or(DataType::Unknown32);
    (data_type, raw >> 6)
}

#[inline]
pub(crate) fn encode_type_byte(data_type: DataType, padding: u8) -> u8 {
    (data_type.code() & 0x3f) | ((padding & 0x03) << 6)
}

// ── StructureHeader ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureHeader {
    kind:          StructureType,
    pub tag:       u16,
    num:           u8,
    /// Type of the payload, not of the structure itself.
    pub data_type: DataType,
    pub padding:   u8,
    /// Words following the length word.
    pub length:    u32,
}

impl StructureHeader {
    pub fn new(kind: StructureType, tag: u16, data_type: DataType, num: i32) -> Self {
        let num = match kind {
            StructureType::Bank => normalize_num(num),
            _                   => 0,
        };
        Self {
            kind,
            tag: tag & kind.max_tag(),
            num,
            data_type,
            padding: 0,
            length: (kind.header_words() - 1) as u32,
        }
    }

    pub fn bank(tag: u16, data_type: DataType, num: i32) -> Self {
        Self::new(StructureType::Bank, tag, data_type, num)
    }

    pub fn segment(tag: u8, data_type: DataType) -> Self {
        Self::new(StructureType::Segment, tag as u16, data_type, 0)
    }

    pub fn tag_segment(tag: u16, data_type: DataType) -> Self {
        Self::new(StructureType::TagSegment, tag, data_type, 0)
    }

    #[inline]
    pub fn kind(&self) -> StructureType {
        self.kind
    }

    /// Always 0 for segments and tagsegments.
    #[inline]
    pub fn num(&self) -> u8 {
        self.num
    }

    /// Store a num, wrapping negatives.  Ignored for kinds without a num.
    pub fn set_num(&mut self, num: i32) {
        if self.kind == StructureType::Bank {
            self.num = normalize_num(num);
        }
    }

    #[inline]
    pub fn header_words(&self) -> usize {
        self.kind.header_words()
    }

    /// Payload size in words.
    pub fn data_words(&self) -> usize {
        (self.length as usize + 1).saturating_sub(self.header_words())
    }

    /// Whole structure size in bytes, length word included.
    pub fn total_bytes(&self) -> usize {
        4 * (self.length as usize + 1)
    }

    /// Encode into the first `header_words()*4` bytes of `dst`.
    pub fn write(&self, dst: &mut [u8], order: ByteOrder) -> Result<usize> {
        let size = self.kind.header_bytes();
        ensure_len(dst, 0, size)?;
        match self.kind {
            StructureType::Bank => {
                order.write_u32(&mut dst[0..4], self.length);
                order.write_u32(&mut dst[4..8], bank::pack(self));
            }
            StructureType::Segment | StructureType::TagSegment => {
                if self.length > self.kind.max_length() {
                    return Err(EvioError::LengthOverflow {
                        what:  "header length",
                        value: self.length as u64,
                        limit: self.kind.max_length() as u64,
                    });
                }
                let word = if self.kind == StructureType::Segment {
                    segment::pack(self)
                } else {
                    tag_segment::pack(self)
                };
                order.write_u32(&mut dst[0..4], word);
            }
        }
        Ok(size)
    }

    pub fn to_bytes(&self, order: ByteOrder) -> Result<Vec<u8>> {
        let mut out = vec![0u8; self.kind.header_bytes()];
        self.write(&mut out, order)?;
        Ok(out)
    }

    /// Decode a header of the given kind starting at `src[offset]`.
    pub fn read(kind: StructureType, src: &[u8], offset: usize, order: ByteOrder) -> Result<Self> {
        ensure_len(src, offset, kind.header_bytes())?;
        let word0 = order.read_u32(&src[offset..offset + 4]);
        Ok(match kind {
            StructureType::Bank => {
                let word1 = order.read_u32(&src[offset + 4..offset + 8]);
                bank::unpack(word0, word1)
            }
            StructureType::Segment    => segment::unpack(word0),
            StructureType::TagSegment => tag_segment::unpack(word0),
        })
    }
}

impl fmt::Display for StructureHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: tag={}, num={}, type={}, pad={}, len={}",
            self.kind, self.tag, self.num, self.data_type, self.padding, self.length
        )
    }
}

// ── In-place patches ─────────────────────────────────────────────────────────

/// Rewrite the tag of the header at `buf[pos]` without touching other fields.
pub fn patch_tag(kind: StructureType, buf: &mut [u8], pos: usize, tag: u16, order: ByteOrder) -> Result<()> {
    ensure_len(buf, pos, kind.header_bytes())?;
    match kind {
        StructureType::Bank       => bank::patch_tag(buf, pos, tag, order),
        StructureType::Segment    => segment::patch_tag(buf, pos, tag as u8, order),
        StructureType::TagSegment => tag_segment::patch_tag(buf, pos, tag, order),
    }
    Ok(())
}

/// Rewrite the num of the bank header at `buf[pos]`.
pub fn patch_num(buf: &mut [u8], pos: usize, num: i32, order: ByteOrder) -> Result<()> {
    ensure_len(buf, pos, 8)?;
    bank::patch_num(buf, pos, normalize_num(num), order);
    Ok(())
}

/// Rewrite the length field of the header at `buf[pos]`.
pub fn patch_length(kind: StructureType, buf: &mut [u8], pos: usize, length: u32, order: ByteOrder) -> Result<()> {
    ensure_len(buf, pos, 4)?;
    if length > kind.max_length() {
        return Err(EvioError::LengthOverflow {
            what:  "header length",
            value: length as u64,
            limit: kind.max_length() as u64,
        });
    }
    match kind {
        StructureType::Bank => order.write_u32(&mut buf[pos..pos + 4], length),
        StructureType::Segment | StructureType::TagSegment => {
            let word = order.read_u32(&buf[pos..pos + 4]);
            order.write_u32(&mut buf[pos..pos + 4], (word & 0xffff_0000) | length);
        }
    }
    Ok(())
}

/// Read just the length field of the header at `buf[pos]`.
pub fn read_length(kind: StructureType, buf: &[u8], pos: usize, order: ByteOrder) -> Result<u32> {
    ensure_len(buf, pos, 4)?;
    let word = order.read_u32(&buf[pos..pos + 4]);
    Ok(match kind {
        StructureType::Bank => word,
        _                   => word & 0xffff,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ORDERS: [ByteOrder; 2] = [ByteOrder::Big, ByteOrder::Little];

    fn any_order() -> impl Strategy<Value = ByteOrder> {
        prop_oneof![Just(ByteOrder::Big), Just(ByteOrder::Little)]
    }

    /// Every type code a 6-bit header field can carry.
    fn wide_type() -> impl Strategy<Value = DataType> {
        (0u32..0x23).prop_filter_map("defined code", DataType::from_code)
    }

    /// Types that survive the 4-bit tagsegment field unchanged.
    fn narrow_type() -> impl Strategy<Value = DataType> {
        (0u32..0x10).prop_filter_map("defined code", DataType::from_code)
    }

    /// A type with a padding it can legally carry: 0..4 for byte and short
    /// payloads, 0 otherwise.
    fn padded_type() -> impl Strategy<Value = (DataType, u8)> {
        wide_type().prop_flat_map(|dt| {
            let limit = if dt.allows_padding() { 4u8 } else { 1 };
            (Just(dt), 0..limit)
        })
    }

    proptest! {
        #[test]
        fn bank_round_trip(tag in any::<u16>(), num in any::<u8>(), (dt, pad) in padded_type(),
                           length in 1u32.., order in any_order()) {
            let mut h = StructureHeader::bank(tag, dt, num as i32);
            h.padding = pad;
            h.length = length;
            let bytes = h.to_bytes(order).unwrap();
            prop_assert_eq!(bytes.len(), 8);
            prop_assert_eq!(StructureHeader::read(StructureType::Bank, &bytes, 0, order).unwrap(), h);
        }

        #[test]
        fn segment_round_trip(tag in any::<u8>(), (dt, pad) in padded_type(),
                              length in 0u32..=0xffff, order in any_order()) {
            let mut h = StructureHeader::segment(tag, dt);
            h.padding = pad;
            h.length = length;
            let bytes = h.to_bytes(order).unwrap();
            prop_assert_eq!(bytes.len(), 4);
            prop_assert_eq!(StructureHeader::read(StructureType::Segment, &bytes, 0, order).unwrap(), h);
        }

        #[test]
        fn tag_segment_round_trip(tag in 0u16..=0xfff, dt in narrow_type(),
                                  length in 0u32..=0xffff, order in any_order()) {
            let mut h = StructureHeader::tag_segment(tag, dt);
            h.length = length;
            let bytes = h.to_bytes(order).unwrap();
            prop_assert_eq!(StructureHeader::read(StructureType::TagSegment, &bytes, 0, order).unwrap(), h);
        }
    }

    #[test]
    fn bank_word_order_differs_by_endianness() {
        let mut h = StructureHeader::bank(0x1234, DataType::AlsoBank, 0x56);
        h.length = 1;
        let be = h.to_bytes(ByteOrder::Big).unwrap();
        assert_eq!(&be[4..8], &[0x12, 0x34, 0x0e, 0x56]);
        let le = h.to_bytes(ByteOrder::Little).unwrap();
        assert_eq!(&le[4..8], &[0x56, 0x0e, 0x34, 0x12]);
    }

    #[test]
    fn negative_num_wraps() {
        assert_eq!(normalize_num(-1), 255);
        assert_eq!(normalize_num(-256), 0);
        assert_eq!(normalize_num(300), 44);
        let h = StructureHeader::bank(1, DataType::Int32, -2);
        assert_eq!(h.num(), 254);
    }

    #[test]
    fn segment_length_overflow_rejected() {
        let mut h = StructureHeader::segment(1, DataType::Int32);
        h.length = 0x1_0000;
        let mut buf = [0u8; 4];
        assert!(matches!(h.write(&mut buf, ByteOrder::Big), Err(EvioError::LengthOverflow { .. })));
    }

    #[test]
    fn retired_tagsegment_code() {
        assert_eq!(decode_type_byte(0x40), (DataType::TagSegment, 0));
        assert_eq!(decode_type_byte(0x81), (DataType::Uint32, 2));
        assert_eq!(decode_type_byte(0x3f), (DataType::Unknown32, 0));
    }

    #[test]
    fn container_types_in_tagsegment_use_aliases() {
        let h = StructureHeader::tag_segment(7, DataType::Bank);
        let bytes = h.to_bytes(ByteOrder::Big).unwrap();
        let back = StructureHeader::read(StructureType::TagSegment, &bytes, 0, ByteOrder::Big).unwrap();
        assert_eq!(back.data_type, DataType::AlsoBank);
        assert_eq!(back.data_type.container_kind(), Some(StructureType::Bank));
    }

    #[test]
    fn patches_touch_only_their_field() {
        for order in ORDERS {
            let mut h = StructureHeader::bank(10, DataType::Short16, 3);
            h.padding = 2;
            h.length = 9;
            let mut buf = h.to_bytes(order).unwrap();
            patch_tag(StructureType::Bank, &mut buf, 0, 0xbeef, order).unwrap();
            patch_num(&mut buf, 0, -1, order).unwrap();
            patch_length(StructureType::Bank, &mut buf, 0, 11, order).unwrap();
            let back = StructureHeader::read(StructureType::Bank, &buf, 0, order).unwrap();
            assert_eq!(back.tag, 0xbeef);
            assert_eq!(back.num(), 255);
            assert_eq!(back.length, 11);
            assert_eq!(back.data_type, DataType::Short16);
            assert_eq!(back.padding, 2);

            let mut s = StructureHeader::tag_segment(0x123, DataType::Float32);
            s.length = 4;
            let mut buf = s.to_bytes(order).unwrap();
            patch_tag(StructureType::TagSegment, &mut buf, 0, 0xabc, order).unwrap();
            patch_length(StructureType::TagSegment, &mut buf, 0, 2, order).unwrap();
            let back = StructureHeader::read(StructureType::TagSegment, &buf, 0, order).unwrap();
            assert_eq!((back.tag, back.data_type, back.length), (0xabc, DataType::Float32, 2));
            assert_eq!(read_length(StructureType::TagSegment, &buf, 0, order).unwrap(), 2);
        }
    }

    #[test]
    fn segment_patches_touch_only_their_field() {
        for order in ORDERS {
            let mut s = StructureHeader::segment(0x12, DataType::Float32);
            s.length = 5;
            let mut buf = s.to_bytes(order).unwrap();
            patch_tag(StructureType::Segment, &mut buf, 0, 0xab, order).unwrap();
            patch_length(StructureType::Segment, &mut buf, 0, 9, order).unwrap();
            let back = StructureHeader::read(StructureType::Segment, &buf, 0, order).unwrap();
            assert_eq!((back.tag, back.data_type, back.length), (0xab, DataType::Float32, 9));
            assert_eq!(back.padding, 0);
            assert_eq!(read_length(StructureType::Segment, &buf, 0, order).unwrap(), 9);
        }
    }

    #[test]
    fn short_buffer_is_an_error() {
        let buf = [0u8; 6];
        assert!(matches!(
            StructureHeader::read(StructureType::Bank, &buf, 0, ByteOrder::Big),
            Err(EvioError::BufferUnderflow { .. })
        ));
    }
}
