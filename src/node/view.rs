//! Payload access for indexed structures.
//!
//! A [`DataView`] borrows the payload bytes straight out of the reader's
//! buffer; nothing is decoded until an element is pulled from one of its
//! typed iterators.  [`OwnedData`] is the same thing over a private copy,
//! for data that has to outlive the reader.

use std::slice::ChunksExact;

use crate::composite::{CompositeCodec, CompositeData};
use crate::error::{EvioError, Result};
use crate::structure::data::unpack_strings;
use crate::types::{ByteOrder, DataType};

#[derive(Debug, Clone, Copy)]
pub struct DataView<'a> {
    bytes:     &'a [u8],
    data_type: DataType,
    order:     ByteOrder,
}

impl<'a> DataView<'a> {
    /// `bytes` must already exclude padding.
    pub fn new(bytes: &'a [u8], data_type: DataType, order: ByteOrder) -> Self {
        Self { bytes, data_type, order }
    }

    pub fn as_bytes(&self) -> &'a [u8] {
        self.bytes
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn values<T>(&self, width: usize, expected: &'static str,
                 conv: fn(ByteOrder, &[u8]) -> T) -> Result<Values<'a, T>> {
        if self.data_type.element_size() != Some(width) {
            return Err(EvioError::DataTypeMismatch { expected, found: self.data_type });
        }
        Ok(Values { chunks: self.bytes.chunks_exact(width), order: self.order, conv })
    }

    pub fn ints(&self) -> Result<Values<'a, i32>> {
        self.values(4, "32-bit integers", |o, b| o.read_u32(b) as i32)
    }

    pub fn uints(&self) -> Result<Values<'a, u32>> {
        self.values(4, "32-bit integers", |o, b| o.read_u32(b))
    }

    pub fn floats(&self) -> Result<Values<'a, f32>> {
        self.values(4, "32-bit floats", |o, b| f32::from_bits(o.read_u32(b)))
    }

    pub fn shorts(&self) -> Result<Values<'a, i16>> {
        self.values(2, "16-bit integers", |o, b| o.read_u16(b) as i16)
    }

    pub fn ushorts(&self) -> Result<Values<'a, u16>> {
        self.values(2, "16-bit integers", |o, b| o.read_u16(b))
    }

    pub fn chars(&self) -> Result<Values<'a, i8>> {
        self.values(1, "bytes", |_, b| b[0] as i8)
    }

    pub fn uchars(&self) -> Result<Values<'a, u8>> {
        self.values(1, "bytes", |_, b| b[0])
    }

    pub fn longs(&self) -> Result<Values<'a, i64>> {
        self.values(8, "64-bit integers", |o, b| o.read_u64(b) as i64)
    }

    pub fn ulongs(&self) -> Result<Values<'a, u64>> {
        self.values(8, "64-bit integers", |o, b| o.read_u64(b))
    }

    pub fn doubles(&self) -> Result<Values<'a, f64>> {
        self.values(8, "64-bit floats", |o, b| f64::from_bits(o.read_u64(b)))
    }

    pub fn strings(&self) -> Result<Vec<String>> {
        if self.data_type != DataType::CharStar8 {
            return Err(EvioError::DataTypeMismatch { expected: "strings", found: self.data_type });
        }
        Ok(unpack_strings(self.bytes))
    }

    /// Hand composite payloads to `codec`.
    pub fn composite(&self, codec: &dyn CompositeCodec) -> Result<Vec<CompositeData>> {
        if self.data_type != DataType::Composite {
            return Err(EvioError::DataTypeMismatch { expected: "composite data", found: self.data_type });
        }
        codec.decode(self.bytes, self.order)
    }

    pub fn to_owned_data(&self) -> OwnedData {
        OwnedData { bytes: self.bytes.to_vec(), data_type: self.data_type, order: self.order }
    }
}

/// Lazily decoded elements of a [`DataView`].
pub struct Values<'a, T> {
    chunks:  ChunksExact<'a, u8>,
    order:   ByteOrder,
    conv:    fn(ByteOrder, &[u8]) -> T,
}

impl<'a, T> Iterator for Values<'a, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        self.chunks.next().map(|c| (self.conv)(self.order, c))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl<'a, T> ExactSizeIterator for Values<'a, T> {}

/// Payload copied out of the buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedData {
    pub bytes:     Vec<u8>,
    pub data_type: DataType,
    pub order:     ByteOrder,
}

impl OwnedData {
    pub fn view(&self) -> DataView<'_> {
        DataView::new(&self.bytes, self.data_type, self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_iterators_respect_order() {
        let be = [0u8, 0, 0, 1, 0xff, 0xff, 0xff, 0xfe];
        let v = DataView::new(&be, DataType::Int32, ByteOrder::Big);
        assert_eq!(v.ints().unwrap().collect::<Vec<_>>(), vec![1, -2]);
        assert_eq!(v.uints().unwrap().len(), 2);

        let v = DataView::new(&be, DataType::Short16, ByteOrder::Little);
        assert_eq!(v.shorts().unwrap().collect::<Vec<_>>(), vec![0, 256, -1, -257]);
    }

    #[test]
    fn width_mismatch_is_an_error() {
        let bytes = [0u8; 8];
        let v = DataView::new(&bytes, DataType::Double64, ByteOrder::Big);
        assert!(matches!(v.ints(), Err(EvioError::DataTypeMismatch { .. })));
        assert_eq!(v.doubles().unwrap().next(), Some(0.0));
        assert!(v.strings().is_err());
    }

    #[test]
    fn owned_copy_is_independent() {
        let mut bytes = vec![1u8, 2, 3];
        let copy = DataView::new(&bytes, DataType::Uchar8, ByteOrder::Big).to_owned_data();
        bytes[0] = 9;
        assert_eq!(copy.view().uchars().unwrap().collect::<Vec<_>>(), vec![1, 2, 3]);
    }
}
