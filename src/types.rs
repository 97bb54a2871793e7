//! Primitive enumerations shared by every layer: byte order, payload data
//! types, and the three structure kinds.
//!
//! # Codes
//! `DataType` codes are frozen by the wire format.  A header stores the
//! data type of its *payload*; a structure's own kind is implied by where
//! it sits (an event is always a bank, and a container's children all have
//! the kind named by the container's data type).

use std::fmt;

use byteorder::{BigEndian, ByteOrder as Endian, LittleEndian};
use serde::{Deserialize, Serialize};

// ── ByteOrder ────────────────────────────────────────────────────────────────

/// Runtime byte order of a buffer.  All multi-byte reads and writes in the
/// crate go through these helpers so the choice is made in one place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    Big,
    Little,
}

impl ByteOrder {
    /// Byte order of the machine this code runs on.
    pub fn native() -> Self {
        if cfg!(target_endian = "big") { ByteOrder::Big } else { ByteOrder::Little }
    }

    pub fn swapped(self) -> Self {
        match self {
            ByteOrder::Big    => ByteOrder::Little,
            ByteOrder::Little => ByteOrder::Big,
        }
    }

    /// Parse from a CLI string.
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "big" | "be"    => Some(ByteOrder::Big),
            "little" | "le" => Some(ByteOrder::Little),
            _               => None,
        }
    }

    #[inline]
    pub fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            ByteOrder::Big    => BigEndian::read_u16(buf),
            ByteOrder::Little => LittleEndian::read_u16(buf),
        }
    }

    #[inline]
    pub fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            ByteOrder::Big    => BigEndian::read_u32(buf),
            ByteOrder::Little => LittleEndian::read_u32(buf),
        }
    }

    #[inline]
    pub fn read_u64(self, buf: &[u8]) -> u64 {
        match self {
            ByteOrder::Big    => BigEndian::read_u64(buf),
            ByteOrder::Little => LittleEndian::read_u64(buf),
        }
    }

    #[inline]
    pub fn write_u16(self, buf: &mut [u8], v: u16) {
        match self {
            ByteOrder::Big    => BigEndian::write_u16(buf, v),
            ByteOrder::Little => LittleEndian::write_u16(buf, v),
        }
    }

    #[inline]
    pub fn write_u32(self, buf: &mut [u8], v: u32) {
        match self {
            ByteOrder::Big    => BigEndian::write_u32(buf, v),
            ByteOrder::Little => LittleEndian::write_u32(buf, v),
        }
    }

    #[inline]
    pub fn write_u64(self, buf: &mut [u8], v: u64) {
        match self {
            ByteOrder::Big    => BigEndian::write_u64(buf, v),
            ByteOrder::Little => LittleEndian::write_u64(buf, v),
        }
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Big    => f.write_str("big endian"),
            ByteOrder::Little => f.write_str("little endian"),
        }
    }
}

// ── DataType ─────────────────────────────────────────────────────────────────

/// Payload data type as stored in a structure header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DataType {
    Unknown32   = 0x00,
    Uint32      = 0x01,
    Float32     = 0x02,
    CharStar8   = 0x03,
    Short16     = 0x04,
    Ushort16    = 0x05,
    Char8       = 0x06,
    Uchar8      = 0x07,
    Double64    = 0x08,
    Long64      = 0x09,
    Ulong64     = 0x0a,
    Int32       = 0x0b,
    TagSegment  = 0x0c,
    AlsoSegment = 0x0d,
    AlsoBank    = 0x0e,
    Composite   = 0x0f,
    Bank        = 0x10,
    Segment     = 0x20,
    /// Only appears inside composite data.
    Hollerit    = 0x21,
    /// Only appears inside composite data.
    NValue      = 0x22,
}

impl DataType {
    /// Resolve a numeric code.  Returns `None` for codes this format does
    /// not define.
    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            0x00 => DataType::Unknown32,
            0x01 => DataType::Uint32,
            0x02 => DataType::Float32,
            0x03 => DataType::CharStar8,
            0x04 => DataType::Short16,
            0x05 => DataType::Ushort16,
            0x06 => DataType::Char8,
            0x07 => DataType::Uchar8,
            0x08 => DataType::Double64,
            0x09 => DataType::Long64,
            0x0a => DataType::Ulong64,
            0x0b => DataType::Int32,
            0x0c => DataType::TagSegment,
            0x0d => DataType::AlsoSegment,
            0x0e => DataType::AlsoBank,
            0x0f => DataType::Composite,
            0x10 => DataType::Bank,
            0x20 => DataType::Segment,
            0x21 => DataType::Hollerit,
            0x22 => DataType::NValue,
            _    => return None,
        })
    }

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// True for every type whose payload is a list of child structures.
    pub fn is_structure(self) -> bool {
        matches!(
            self,
            DataType::Bank
                | DataType::Segment
                | DataType::TagSegment
                | DataType::AlsoBank
                | DataType::AlsoSegment
        )
    }

    /// Kind of the children held by a container payload.
    pub fn container_kind(self) -> Option<StructureType> {
        match self {
            DataType::Bank | DataType::AlsoBank       => Some(StructureType::Bank),
            DataType::Segment | DataType::AlsoSegment => Some(StructureType::Segment),
            DataType::TagSegment                      => Some(StructureType::TagSegment),
            _                                         => None,
        }
    }

    /// Map the "also" aliases onto their primary codes.
    pub fn canonical(self) -> Self {
        match self {
            DataType::AlsoBank    => DataType::Bank,
            DataType::AlsoSegment => DataType::Segment,
            other                 => other,
        }
    }

    /// Size in bytes of one element, `None` for containers, strings,
    /// composite and unknown payloads.
    pub fn element_size(self) -> Option<usize> {
        match self {
            DataType::Char8 | DataType::Uchar8                         => Some(1),
            DataType::Short16 | DataType::Ushort16                     => Some(2),
            DataType::Int32 | DataType::Uint32 | DataType::Float32     => Some(4),
            DataType::Long64 | DataType::Ulong64 | DataType::Double64  => Some(8),
            _                                                          => None,
        }
    }

    /// Byte and short payloads may end in 1-3 filler bytes.
    pub fn allows_padding(self) -> bool {
        matches!(self.element_size(), Some(1) | Some(2))
    }

    /// Code written into the 4 type bits of a tagsegment header.
    pub fn tag_segment_code(self) -> u8 {
        match self {
            DataType::Bank       => DataType::AlsoBank.code(),
            DataType::Segment    => DataType::AlsoSegment.code(),
            other                => other.code() & 0x0f,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DataType::Unknown32   => "UNKNOWN32",
            DataType::Uint32      => "UINT32",
            DataType::Float32     => "FLOAT32",
            DataType::CharStar8   => "CHARSTAR8",
            DataType::Short16     => "SHORT16",
            DataType::Ushort16    => "USHORT16",
            DataType::Char8       => "CHAR8",
            DataType::Uchar8      => "UCHAR8",
            DataType::Double64    => "DOUBLE64",
            DataType::Long64      => "LONG64",
            DataType::Ulong64     => "ULONG64",
            DataType::Int32       => "INT32",
            DataType::TagSegment  => "TAGSEGMENT",
            DataType::AlsoSegment => "ALSOSEGMENT",
            DataType::AlsoBank    => "ALSOBANK",
            DataType::Composite   => "COMPOSITE",
            DataType::Bank        => "BANK",
            DataType::Segment     => "SEGMENT",
            DataType::Hollerit    => "HOLLERIT",
            DataType::NValue      => "NVALUE",
        }
    }
}

impl fmt::Display for DataType {
    /// The "also" aliases display as the type they alias.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical().name())
    }
}

// ── StructureType ────────────────────────────────────────────────────────────

/// The three structure kinds.  They differ in header width and in the
/// width of the tag and num fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StructureType {
    Bank,
    Segment,
    TagSegment,
}

impl StructureType {
    /// Header size in 32-bit words, including the length word.
    #[inline]
    pub fn header_words(self) -> usize {
        match self {
            StructureType::Bank                               => 2,
            StructureType::Segment | StructureType::TagSegment => 1,
        }
    }

    #[inline]
    pub fn header_bytes(self) -> usize {
        4 * self.header_words()
    }

    /// Largest tag the header can hold.
    pub fn max_tag(self) -> u16 {
        match self {
            StructureType::Bank       => 0xffff,
            StructureType::Segment    => 0x00ff,
            StructureType::TagSegment => 0x0fff,
        }
    }

    /// Largest value of the length field.
    pub fn max_length(self) -> u32 {
        match self {
            StructureType::Bank                               => u32::MAX,
            StructureType::Segment | StructureType::TagSegment => 0xffff,
        }
    }

    /// The data type a parent uses to declare children of this kind.
    pub fn as_data_type(self) -> DataType {
        match self {
            StructureType::Bank       => DataType::Bank,
            StructureType::Segment    => DataType::Segment,
            StructureType::TagSegment => DataType::TagSegment,
        }
    }
}

impl fmt::Display for StructureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StructureType::Bank       => "bank",
            StructureType::Segment    => "segment",
            StructureType::TagSegment => "tagsegment",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_code_resolves_back() {
        for code in 0u32..=0x40 {
            if let Some(dt) = DataType::from_code(code) {
                assert_eq!(dt.code() as u32, code);
            }
        }
        assert_eq!(DataType::from_code(0x11), None);
        assert_eq!(DataType::from_code(0x40), None);
    }

    #[test]
    fn container_predicate() {
        assert!(DataType::Bank.is_structure());
        assert!(DataType::AlsoBank.is_structure());
        assert!(DataType::AlsoSegment.is_structure());
        assert!(DataType::TagSegment.is_structure());
        assert!(!DataType::Composite.is_structure());
        assert!(!DataType::Int32.is_structure());
        assert_eq!(DataType::AlsoSegment.container_kind(), Some(StructureType::Segment));
        assert_eq!(DataType::Double64.container_kind(), None);
    }

    #[test]
    fn aliases_display_as_primary() {
        assert_eq!(DataType::AlsoBank.to_string(), "BANK");
        assert_eq!(DataType::AlsoSegment.to_string(), "SEGMENT");
        assert_eq!(DataType::Int32.to_string(), "INT32");
    }

    #[test]
    fn tag_segment_codes_fit_four_bits() {
        assert_eq!(DataType::Bank.tag_segment_code(), 0x0e);
        assert_eq!(DataType::Segment.tag_segment_code(), 0x0d);
        assert_eq!(DataType::TagSegment.tag_segment_code(), 0x0c);
        assert_eq!(DataType::Int32.tag_segment_code(), 0x0b);
    }

    #[test]
    fn byte_order_helpers() {
        let mut buf = [0u8; 4];
        ByteOrder::Big.write_u32(&mut buf, 0x0102_0304);
        assert_eq!(buf, [1, 2, 3, 4]);
        assert_eq!(ByteOrder::Little.read_u32(&buf), 0x0403_0201);
        assert_eq!(ByteOrder::Big.swapped(), ByteOrder::Little);
        assert_eq!(ByteOrder::from_name("LE"), Some(ByteOrder::Little));
    }
}
