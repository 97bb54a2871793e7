//! Composite payloads.
//!
//! A composite payload is a sequence of items, each framed as
//!
//! ```text
//! tagsegment(CHARSTAR8)  format string, e.g. "N(i,2F),a"
//! bank(COMPOSITE)        data described by that format, padding in the header
//! ```
//!
//! The format string is compiled here into its integer form; the data
//! bytes themselves are kept opaque.  Decoding sits behind the
//! [`CompositeCodec`] trait so a full element-level codec can replace
//! [`FramedCompositeCodec`] without touching readers or views.

use crate::error::{ensure_len, EvioError, Result};
use crate::header::StructureHeader;
use crate::structure::data::{pack_strings, unpack_strings};
use crate::types::{ByteOrder, DataType, StructureType};

// ── Format strings ───────────────────────────────────────────────────────────

const MAX_REPEAT: i32 = 15;
/// Code of a left parenthesis whose repeat count is stored in the data.
const OPEN_FROM_DATA: u16 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Repeat {
    Fixed(u8),
    /// Count is read from the data (`N` prefix).
    FromData,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatItem {
    Open { repeat: Repeat },
    Close,
    Value { repeat: Repeat, data_type: DataType },
}

impl FormatItem {
    pub fn from_code(code: u16) -> Result<Self> {
        if code == 0 {
            return Ok(FormatItem::Close);
        }
        if code == OPEN_FROM_DATA {
            return Ok(FormatItem::Open { repeat: Repeat::FromData });
        }
        let (count, kind) = (code / 16, code % 16);
        if kind == 0 {
            return Ok(FormatItem::Open { repeat: Repeat::Fixed(count as u8) });
        }
        let repeat = if count == 0 { Repeat::FromData } else { Repeat::Fixed(count as u8) };
        let data_type = type_for_code(kind)
            .ok_or_else(|| EvioError::CompositeFormat(format!("unknown item code {}", code)))?;
        Ok(FormatItem::Value { repeat, data_type })
    }
}

fn type_for_char(ch: char) -> Option<u16> {
    Some(match ch {
        'i' => 1,
        'F' => 2,
        'a' => 3,
        'S' => 4,
        's' => 5,
        'C' => 6,
        'c' => 7,
        'D' => 8,
        'L' => 9,
        'l' => 10,
        'I' => 11,
        'A' => 12,
        _   => return None,
    })
}

fn type_for_code(code: u16) -> Option<DataType> {
    match code {
        12 => Some(DataType::Hollerit),
        1..=11 => DataType::from_code(code as u32),
        _ => None,
    }
}

fn bad(msg: &str) -> EvioError {
    EvioError::CompositeFormat(msg.to_string())
}

/// Compile a format string into its integer codes: `16*repeat + type` for
/// values, `16*repeat` (or 15 when the count comes from data) for `(`, and
/// 0 for `)`.
pub fn format_codes(fmt: &str) -> Result<Vec<u16>> {
    let mut codes = Vec::with_capacity(2 * fmt.len());
    let mut nr: i32 = 0;
    let mut nn: i32 = 1;
    let mut level: i32 = 0;

    for ch in fmt.chars() {
        match ch {
            ' ' => continue,
            '0'..='9' => {
                if nr < 0 {
                    return Err(bad("no negative repeats"));
                }
                nr = 10 * nr.max(0) + (ch as i32 - '0' as i32);
                if nr > MAX_REPEAT {
                    return Err(bad("no more than 15 repeats allowed"));
                }
            }
            '(' => {
                if nr < 0 {
                    return Err(bad("no negative repeats"));
                }
                level += 1;
                codes.push(if nn == 0 { OPEN_FROM_DATA } else { 16 * nn.max(nr) as u16 });
                nn = 1;
                nr = 0;
            }
            ')' => {
                if nr >= 0 {
                    return Err(bad("cannot repeat right parenthesis"));
                }
                level -= 1;
                codes.push(0);
                nr = -1;
            }
            ',' => {
                if nr >= 0 {
                    return Err(bad("cannot repeat comma"));
                }
                nr = 0;
            }
            'N' => nn = 0,
            other => {
                let kf = type_for_char(other)
                    .ok_or_else(|| EvioError::CompositeFormat(format!("illegal character '{}'", other)))?;
                if nr < 0 {
                    return Err(bad("no negative repeats"));
                }
                codes.push(16 * nn.max(nr) as u16 + kf);
                nn = 1;
                nr = -1;
            }
        }
    }

    if level != 0 {
        return Err(bad("mismatched number of right/left parentheses"));
    }
    Ok(codes)
}

pub fn parse_format(fmt: &str) -> Result<Vec<FormatItem>> {
    format_codes(fmt)?.into_iter().map(FormatItem::from_code).collect()
}

// ── Framed items ─────────────────────────────────────────────────────────────

/// One framed composite item.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeData {
    pub format:     String,
    pub format_tag: u16,
    pub data_tag:   u16,
    pub data_num:   u8,
    pub items:      Vec<FormatItem>,
    /// Data bytes in the payload's byte order, padding removed.
    pub data:       Vec<u8>,
}

impl CompositeData {
    pub fn new(format: &str, format_tag: u16, data_tag: u16, data_num: u8, data: Vec<u8>) -> Result<Self> {
        Ok(Self {
            items: parse_format(format)?,
            format: format.to_string(),
            format_tag,
            data_tag,
            data_num,
            data,
        })
    }
}

pub trait CompositeCodec: Send + Sync {
    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<Vec<CompositeData>>;
    fn encode(&self, items: &[CompositeData], order: ByteOrder) -> Result<Vec<u8>>;
}

/// Splits composite payloads into their framing; data stays opaque.
#[derive(Debug, Default, Clone, Copy)]
pub struct FramedCompositeCodec;

impl CompositeCodec for FramedCompositeCodec {
    fn decode(&self, bytes: &[u8], order: ByteOrder) -> Result<Vec<CompositeData>> {
        let mut out = Vec::new();
        let mut pos = 0;
        while pos + 4 <= bytes.len() {
            let ts = StructureHeader::read(StructureType::TagSegment, bytes, pos, order)?;
            ensure_len(bytes, pos, ts.total_bytes())?;
            let strings = unpack_strings(&bytes[pos + 4..pos + ts.total_bytes()]);
            let format = strings
                .into_iter()
                .next()
                .ok_or_else(|| bad("missing format string"))?;
            let items = parse_format(&format)?;
            pos += ts.total_bytes();

            let bank = StructureHeader::read(StructureType::Bank, bytes, pos, order)?;
            ensure_len(bytes, pos, bank.total_bytes())?;
            let data_bytes = (4 * bank.data_words()).saturating_sub(bank.padding as usize);
            if data_bytes < 2 {
                return Err(bad("no composite data"));
            }
            let data = bytes[pos + 8..pos + 8 + data_bytes].to_vec();
            pos += bank.total_bytes();

            out.push(CompositeData {
                format,
                format_tag: ts.tag,
                data_tag:   bank.tag,
                data_num:   bank.num(),
                items,
                data,
            });
        }
        Ok(out)
    }

    fn encode(&self, items: &[CompositeData], order: ByteOrder) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        for item in items {
            let fmt = pack_strings(&[item.format.as_str()]);
            let mut ts = StructureHeader::tag_segment(item.format_tag, DataType::CharStar8);
            ts.length = (fmt.len() / 4) as u32;
            out.extend_from_slice(&ts.to_bytes(order)?);
            out.extend_from_slice(&fmt);

            let pad = (4 - item.data.len() % 4) % 4;
            let mut bank = StructureHeader::bank(item.data_tag, DataType::Composite, item.data_num as i32);
            bank.padding = pad as u8;
            bank.length = ((item.data.len() + pad) / 4 + 1) as u32;
            out.extend_from_slice(&bank.to_bytes(order)?);
            out.extend_from_slice(&item.data);
            out.resize(out.len() + pad, 0);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_reference_encoding() {
        assert_eq!(format_codes("i").unwrap(), vec![17]);
        assert_eq!(format_codes("2(i,F)").unwrap(), vec![32, 17, 18, 0]);
        assert_eq!(format_codes("N(a)").unwrap(), vec![15, 19, 0]);
        assert_eq!(format_codes("Ni,3D").unwrap(), vec![1, 56]);
        assert_eq!(format_codes(" 15c , A").unwrap(), vec![16 * 15 + 7, 28]);
    }

    #[test]
    fn grammar_errors() {
        assert!(format_codes("16i").is_err());
        assert!(format_codes("(i").is_err());
        assert!(format_codes("(i)2").is_err());
        assert!(format_codes("i,2,F").is_err());
        assert!(format_codes("iF").is_err());
        assert!(format_codes("x").is_err());
        assert!(format_codes("i)").is_err());
    }

    #[test]
    fn items_from_codes() {
        let items = parse_format("N(2S,l)").unwrap();
        assert_eq!(items, vec![
            FormatItem::Open { repeat: Repeat::FromData },
            FormatItem::Value { repeat: Repeat::Fixed(2), data_type: DataType::Short16 },
            FormatItem::Value { repeat: Repeat::Fixed(1), data_type: DataType::Ulong64 },
            FormatItem::Close,
        ]);
        assert_eq!(
            parse_format("A").unwrap(),
            vec![FormatItem::Value { repeat: Repeat::Fixed(1), data_type: DataType::Hollerit }]
        );
    }

    #[test]
    fn framing_round_trip() {
        let codec = FramedCompositeCodec;
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let a = CompositeData::new("2i", 3, 4, 5, vec![0, 0, 0, 1, 0, 0, 0, 2]).unwrap();
            let b = CompositeData::new("c", 6, 7, 8, vec![9, 9, 9]).unwrap();
            let bytes = codec.encode(&[a.clone(), b.clone()], order).unwrap();
            assert_eq!(bytes.len() % 4, 0);
            let back = codec.decode(&bytes, order).unwrap();
            assert_eq!(back, vec![a, b]);
        }
    }
}
