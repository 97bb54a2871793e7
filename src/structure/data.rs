//! Leaf payload handling for materialized structures: typed setters, string
//! array packing, padding and element-wise byte swapping.

use super::{Content, EvioStructure};
use crate::error::{EvioError, Result};
use crate::node::DataView;
use crate::types::{ByteOrder, DataType};

// ── Strings ──────────────────────────────────────────────────────────────────

/// Filler appended after the last null, indexed by `len % 4`.  There is
/// always at least one 0x04 so readers can tell this layout from the legacy
/// single-string one.
const STRING_PADS: [usize; 4] = [4, 3, 2, 1];
const STRING_FILLER: u8 = 0x04;

/// Encode strings as null-terminated ASCII followed by 0x04 filler.
pub fn pack_strings<S: AsRef<str>>(strings: &[S]) -> Vec<u8> {
    let mut out = Vec::new();
    for s in strings {
        out.extend_from_slice(s.as_ref().as_bytes());
        out.push(0);
    }
    let pad = STRING_PADS[out.len() % 4];
    out.resize(out.len() + pad, STRING_FILLER);
    out
}

fn is_stop_byte(b: u8) -> bool {
    (b < 0x20 && !b.is_ascii_whitespace()) || b == 0x7f
}

/// Decode a string-array payload.  Data not ending in 0x04 is the legacy
/// layout and yields only its first string.
pub fn unpack_strings(bytes: &[u8]) -> Vec<String> {
    let Some(&last) = bytes.last() else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut current = Vec::new();
    for &b in bytes {
        if b == 0 {
            out.push(String::from_utf8_lossy(&current).into_owned());
            current.clear();
            if last != STRING_FILLER {
                return out;
            }
        } else if is_stop_byte(b) {
            break;
        } else {
            current.push(b);
        }
    }
    if last != STRING_FILLER && out.is_empty() && !current.is_empty() {
        out.push(String::from_utf8_lossy(&current).into_owned());
    }
    out
}

// ── Padding / swapping ───────────────────────────────────────────────────────

/// Filler bytes needed after `bytes` payload bytes of `data_type`.
pub fn padding_for(data_type: DataType, bytes: usize) -> u8 {
    match data_type.element_size() {
        Some(1) | Some(2) => ((4 - bytes % 4) % 4) as u8,
        _                 => 0,
    }
}

/// Reverse every `width`-byte element of `bytes` in place.
pub fn swap_elements(bytes: &mut [u8], width: usize) {
    if width > 1 {
        for chunk in bytes.chunks_exact_mut(width) {
            chunk.reverse();
        }
    }
}

/// Width of the elements to swap when re-encoding `data_type` in the other
/// byte order.  `None` means the payload cannot be swapped blindly.
pub(crate) fn swap_width(data_type: DataType) -> Option<usize> {
    match data_type {
        DataType::Composite                   => None,
        DataType::CharStar8                   => Some(1),
        DataType::Unknown32                   => Some(4),
        dt                                    => Some(dt.element_size().unwrap_or(4)),
    }
}

// ── Typed setters and getters ────────────────────────────────────────────────

impl EvioStructure {
    fn set_values<T: Copy>(&mut self, values: &[T], width: usize, expected: &'static str,
                           put: fn(ByteOrder, &mut [u8], T)) -> Result<()> {
        let data_type = self.header.data_type;
        if data_type.element_size() != Some(width) {
            return Err(EvioError::DataTypeMismatch { expected, found: data_type });
        }
        let mut raw = vec![0u8; values.len() * width];
        for (chunk, v) in raw.chunks_exact_mut(width).zip(values) {
            put(self.byte_order, chunk, *v);
        }
        self.store_raw(raw);
        Ok(())
    }

    pub(crate) fn store_raw(&mut self, raw: Vec<u8>) {
        self.header.padding = padding_for(self.header.data_type, raw.len());
        self.content = Content::Raw(raw);
    }

    pub fn set_ints(&mut self, values: &[i32]) -> Result<()> {
        self.set_values(values, 4, "32-bit integers", |o, b, v| o.write_u32(b, v as u32))
    }

    pub fn set_uints(&mut self, values: &[u32]) -> Result<()> {
        self.set_values(values, 4, "32-bit integers", |o, b, v| o.write_u32(b, v))
    }

    pub fn set_floats(&mut self, values: &[f32]) -> Result<()> {
        self.set_values(values, 4, "32-bit floats", |o, b, v| o.write_u32(b, v.to_bits()))
    }

    pub fn set_shorts(&mut self, values: &[i16]) -> Result<()> {
        self.set_values(values, 2, "16-bit integers", |o, b, v| o.write_u16(b, v as u16))
    }

    pub fn set_ushorts(&mut self, values: &[u16]) -> Result<()> {
        self.set_values(values, 2, "16-bit integers", |o, b, v| o.write_u16(b, v))
    }

    pub fn set_chars(&mut self, values: &[i8]) -> Result<()> {
        self.set_values(values, 1, "bytes", |_, b, v| b[0] = v as u8)
    }

    pub fn set_uchars(&mut self, values: &[u8]) -> Result<()> {
        self.set_values(values, 1, "bytes", |_, b, v| b[0] = v)
    }

    pub fn set_longs(&mut self, values: &[i64]) -> Result<()> {
        self.set_values(values, 8, "64-bit integers", |o, b, v| o.write_u64(b, v as u64))
    }

    pub fn set_ulongs(&mut self, values: &[u64]) -> Result<()> {
        self.set_values(values, 8, "64-bit integers", |o, b, v| o.write_u64(b, v))
    }

    pub fn set_doubles(&mut self, values: &[f64]) -> Result<()> {
        self.set_values(values, 8, "64-bit floats", |o, b, v| o.write_u64(b, v.to_bits()))
    }

    pub fn set_strings<S: AsRef<str>>(&mut self, strings: &[S]) -> Result<()> {
        if self.header.data_type != DataType::CharStar8 {
            return Err(EvioError::DataTypeMismatch { expected: "strings", found: self.header.data_type });
        }
        self.store_raw(pack_strings(strings));
        Ok(())
    }

    /// Store already-encoded payload bytes (in this structure's byte order).
    /// Word-sized types need a whole number of words.
    pub fn set_raw(&mut self, raw: Vec<u8>) -> Result<()> {
        let data_type = self.header.data_type;
        if data_type.is_structure() {
            return Err(EvioError::DataTypeMismatch { expected: "leaf data", found: data_type });
        }
        if !data_type.allows_padding() && raw.len() % 4 != 0 {
            return Err(EvioError::format(format!(
                "{} payload of {} bytes is not a whole number of words", data_type, raw.len()
            )));
        }
        self.store_raw(raw);
        Ok(())
    }

    /// Zero-copy view of the leaf payload.
    pub fn data(&self) -> Result<DataView<'_>> {
        match &self.content {
            Content::Raw(raw)     => Ok(DataView::new(raw, self.header.data_type, self.byte_order)),
            Content::Children(_)  => Err(EvioError::DataTypeMismatch {
                expected: "leaf data",
                found:    self.header.data_type,
            }),
        }
    }

    pub fn strings(&self) -> Result<Vec<String>> {
        self.data()?.strings()
    }

    /// Elements held: children for containers, values for numeric leaves,
    /// strings for string arrays, words otherwise.
    pub fn number_data_items(&self) -> usize {
        match &self.content {
            Content::Children(kids) => kids.len(),
            Content::Raw(raw) => match self.header.data_type {
                DataType::CharStar8 => unpack_strings(raw).len(),
                dt => match dt.element_size() {
                    Some(size) => raw.len() / size,
                    None       => raw.len() / 4,
                },
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_pad_with_at_least_one_filler() {
        let raw = pack_strings(&["hi", "there"]);
        assert_eq!(raw.len(), 12);
        assert_eq!(&raw[9..], &[4, 4, 4]);
        assert_eq!(unpack_strings(&raw), vec!["hi", "there"]);

        let raw = pack_strings(&["abc"]);
        assert_eq!(raw, b"abc\0\x04\x04\x04\x04");
    }

    #[test]
    fn legacy_strings_yield_first_only() {
        let raw = b"first\0second\0\0\0\0";
        assert_eq!(unpack_strings(raw), vec!["first"]);
        assert_eq!(unpack_strings(b"abcd"), vec!["abcd"]);
        assert!(unpack_strings(b"").is_empty());
    }

    #[test]
    fn control_bytes_end_decoding() {
        let raw = b"ok\0bad\x01tail\0\x04\x04";
        assert_eq!(unpack_strings(raw), vec!["ok"]);
    }

    #[test]
    fn padding_rules() {
        assert_eq!(padding_for(DataType::Char8, 5), 3);
        assert_eq!(padding_for(DataType::Uchar8, 8), 0);
        assert_eq!(padding_for(DataType::Short16, 6), 2);
        assert_eq!(padding_for(DataType::Int32, 4), 0);
    }

    #[test]
    fn swap_reverses_each_element() {
        let mut b = [1u8, 2, 3, 4, 5, 6, 7, 8];
        swap_elements(&mut b, 4);
        assert_eq!(b, [4, 3, 2, 1, 8, 7, 6, 5]);
        swap_elements(&mut b, 1);
        assert_eq!(b, [4, 3, 2, 1, 8, 7, 6, 5]);
    }
}
