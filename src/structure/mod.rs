//! Materialized structure tree.
//!
//! An [`EvioStructure`] owns its header and either raw payload bytes or its
//! child structures.  Trees are built by hand (see the typed setters in
//! [`data`]) or by fully parsing bytes ([`parse`]), and serialized back with
//! [`EvioStructure::write`].  Children are owned outright; there is no
//! sharing and no back pointer.
//!
//! Header lengths are recomputed on every write, so a freshly built tree
//! never needs a separate length pass.  [`EvioStructure::set_all_header_lengths`]
//! brings the stored headers in line for callers that inspect them.

pub mod data;
pub mod parse;

use std::ops::{Deref, DerefMut};

use crate::error::{EvioError, Result};
use crate::header::StructureHeader;
use crate::types::{ByteOrder, DataType, StructureType};

/// Payload of a structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Leaf bytes in the structure's byte order, without padding.
    Raw(Vec<u8>),
    Children(Vec<EvioStructure>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct EvioStructure {
    pub(crate) header:     StructureHeader,
    pub(crate) content:    Content,
    pub(crate) byte_order: ByteOrder,
}

impl EvioStructure {
    pub fn from_header(header: StructureHeader) -> Self {
        let content = if header.data_type.is_structure() {
            Content::Children(Vec::new())
        } else {
            Content::Raw(Vec::new())
        };
        Self { header, content, byte_order: ByteOrder::Big }
    }

    pub fn bank(tag: u16, data_type: DataType, num: i32) -> Self {
        Self::from_header(StructureHeader::bank(tag, data_type, num))
    }

    pub fn segment(tag: u8, data_type: DataType) -> Self {
        Self::from_header(StructureHeader::segment(tag, data_type))
    }

    pub fn tag_segment(tag: u16, data_type: DataType) -> Self {
        Self::from_header(StructureHeader::tag_segment(tag, data_type))
    }

    /// Byte order of raw payload set from now on.
    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.byte_order = order;
        self
    }

    pub fn header(&self) -> &StructureHeader {
        &self.header
    }

    pub fn kind(&self) -> StructureType {
        self.header.kind()
    }

    pub fn tag(&self) -> u16 {
        self.header.tag
    }

    pub fn num(&self) -> u8 {
        self.header.num()
    }

    pub fn data_type(&self) -> DataType {
        self.header.data_type
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn set_tag(&mut self, tag: u16) {
        self.header.tag = tag & self.kind().max_tag();
    }

    pub fn set_num(&mut self, num: i32) {
        self.header.set_num(num);
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    pub(crate) fn into_parts(mut self) -> (StructureHeader, Content, ByteOrder) {
        let content = std::mem::replace(&mut self.content, Content::Raw(Vec::new()));
        (self.header, content, self.byte_order)
    }

    pub(crate) fn from_parts(header: StructureHeader, content: Content, byte_order: ByteOrder) -> Self {
        Self { header, content, byte_order }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self.content, Content::Raw(_))
    }

    /// Children in order; empty for leaves.
    pub fn children(&self) -> &[EvioStructure] {
        match &self.content {
            Content::Children(kids) => kids,
            Content::Raw(_)         => &[],
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<EvioStructure>> {
        match &mut self.content {
            Content::Children(kids) => Some(kids),
            Content::Raw(_)         => None,
        }
    }

    /// Append a child.  Its kind must match the container's declared type.
    pub fn add_child(&mut self, child: EvioStructure) -> Result<()> {
        let Some(expected) = self.header.data_type.container_kind() else {
            return Err(EvioError::DataTypeMismatch { expected: "container", found: self.header.data_type });
        };
        if child.kind() != expected {
            return Err(EvioError::WrongStructure { expected, found: child.kind() });
        }
        match &mut self.content {
            Content::Children(kids) => kids.push(child),
            Content::Raw(_)         => self.content = Content::Children(vec![child]),
        }
        Ok(())
    }

    pub fn remove_child(&mut self, index: usize) -> Option<EvioStructure> {
        match &mut self.content {
            Content::Children(kids) if index < kids.len() => Some(kids.remove(index)),
            _                                            => None,
        }
    }

    // ── Lengths ──────────────────────────────────────────────────────────────

    /// Words this structure occupies itself: its header plus raw payload and
    /// padding.  Children are not counted.
    fn own_words(&self) -> u64 {
        let body = match &self.content {
            Content::Raw(raw) => {
                let pad = data::padding_for(self.header.data_type, raw.len()) as usize;
                ((raw.len() + pad) / 4) as u64
            }
            Content::Children(_) => 0,
        };
        body + self.header.header_words() as u64
    }

    /// Every structure of the tree in pre-order, each paired with its
    /// encoded size in words.
    fn subtree_words(&self) -> Vec<(&EvioStructure, u64)> {
        let mut nodes: Vec<(&EvioStructure, u64)> = Vec::new();
        let mut parents: Vec<Option<usize>> = Vec::new();
        let mut stack = vec![(self, None)];
        while let Some((s, parent)) = stack.pop() {
            let index = nodes.len();
            nodes.push((s, s.own_words()));
            parents.push(parent);
            stack.extend(s.children().iter().rev().map(|kid| (kid, Some(index))));
        }
        // descendants always sit after their parent
        for i in (1..nodes.len()).rev() {
            if let Some(p) = parents[i] {
                nodes[p].1 += nodes[i].1;
            }
        }
        nodes
    }

    /// Encoded size in words, length word included.
    pub fn total_words(&self) -> u64 {
        let mut sum = 0;
        let mut stack = vec![self];
        while let Some(s) = stack.pop() {
            sum += s.own_words();
            stack.extend(s.children());
        }
        sum
    }

    /// Value the length field should hold.
    pub fn computed_length(&self) -> u64 {
        self.total_words() - 1
    }

    /// Tagsegment headers have no padding field, so a tagsegment payload
    /// must fill whole words.
    fn check_alignment(&self) -> Result<()> {
        if let Content::Raw(raw) = &self.content {
            if self.kind() == StructureType::TagSegment
                && data::padding_for(self.header.data_type, raw.len()) != 0
            {
                return Err(EvioError::format(format!(
                    "{} bytes of {} data do not fill a tagsegment", raw.len(), self.header.data_type
                )));
            }
        }
        Ok(())
    }

    /// Update every stored header length and padding in the tree.  Returns
    /// this structure's new length.  Nothing is changed when any structure
    /// would overflow its length field.
    pub fn set_all_header_lengths(&mut self) -> Result<u32> {
        let lengths = {
            let nodes = self.subtree_words();
            let mut lengths = Vec::with_capacity(nodes.len());
            for (s, words) in nodes {
                s.check_alignment()?;
                let length = words - 1;
                let limit = s.kind().max_length() as u64;
                if length > limit {
                    return Err(EvioError::LengthOverflow { what: "structure length", value: length, limit });
                }
                lengths.push(length as u32);
            }
            lengths
        };

        // same pre-order as subtree_words
        let mut stack = vec![&mut *self];
        let mut lengths = lengths.into_iter();
        while let Some(s) = stack.pop() {
            s.header.length = lengths.next().unwrap_or_default();
            match &mut s.content {
                Content::Raw(raw) => s.header.padding = data::padding_for(s.header.data_type, raw.len()),
                Content::Children(kids) => stack.extend(kids.iter_mut().rev()),
            }
        }
        Ok(self.header.length)
    }

    // ── Writing ──────────────────────────────────────────────────────────────

    /// Append the encoded structure to `dst`; returns the bytes written.
    /// On error `dst` is left as it was.
    pub fn write(&self, dst: &mut Vec<u8>, order: ByteOrder) -> Result<usize> {
        let start = dst.len();
        match self.write_tree(dst, order) {
            Ok(())   => Ok(dst.len() - start),
            Err(err) => {
                dst.truncate(start);
                Err(err)
            }
        }
    }

    fn write_tree(&self, dst: &mut Vec<u8>, order: ByteOrder) -> Result<()> {
        // (structure, offset of its header, index of the next child to write)
        let mut stack = vec![(self, self.write_open(dst, order)?, 0usize)];
        while let Some(&(s, at, next)) = stack.last() {
            match s.children().get(next) {
                Some(kid) => {
                    if let Some(top) = stack.last_mut() {
                        top.2 += 1;
                    }
                    let kid_at = kid.write_open(dst, order)?;
                    stack.push((kid, kid_at, 0));
                }
                None => {
                    stack.pop();
                    s.write_close(dst, at, order)?;
                }
            }
        }
        Ok(())
    }

    /// Reserve the header and append any raw payload with its padding.
    fn write_open(&self, dst: &mut Vec<u8>, order: ByteOrder) -> Result<usize> {
        self.check_alignment()?;
        let at = dst.len();
        dst.resize(at + self.header.kind().header_bytes(), 0);
        if let Content::Raw(raw) = &self.content {
            let body = dst.len();
            dst.extend_from_slice(raw);
            if order != self.byte_order {
                match data::swap_width(self.header.data_type) {
                    Some(width) => data::swap_elements(&mut dst[body..], width),
                    None => {
                        return Err(EvioError::format(format!(
                            "{} data cannot be written in {} order", self.header.data_type, order
                        )))
                    }
                }
            }
            let pad = data::padding_for(self.header.data_type, raw.len());
            dst.resize(dst.len() + pad as usize, 0);
        }
        Ok(at)
    }

    /// Fill in the header reserved at `dst[at]` once everything after it is written.
    fn write_close(&self, dst: &mut [u8], at: usize, order: ByteOrder) -> Result<()> {
        let mut header = self.header;
        header.padding = match &self.content {
            Content::Raw(raw)    => data::padding_for(header.data_type, raw.len()),
            Content::Children(_) => 0,
        };
        let length = ((dst.len() - at) / 4 - 1) as u64;
        let limit = header.kind().max_length() as u64;
        if length > limit {
            return Err(EvioError::LengthOverflow { what: "structure length", value: length, limit });
        }
        header.length = length as u32;
        let hdr_bytes = header.kind().header_bytes();
        header.write(&mut dst[at..at + hdr_bytes], order)?;
        Ok(())
    }

    pub fn to_bytes(&self, order: ByteOrder) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(4 * self.total_words() as usize);
        self.write(&mut out, order)?;
        Ok(out)
    }

    // ── Traversal ────────────────────────────────────────────────────────────

    /// Depth-first pre-order walk; `f` gets each structure and its depth.
    pub fn visit<F: FnMut(&EvioStructure, usize)>(&self, f: &mut F) {
        let mut stack = vec![(self, 0)];
        while let Some((s, depth)) = stack.pop() {
            f(s, depth);
            stack.extend(s.children().iter().rev().map(|kid| (kid, depth + 1)));
        }
    }

    /// Every structure in the tree accepted by `pred`, in pre-order.
    pub fn matching<P: Fn(&EvioStructure) -> bool>(&self, pred: P) -> Vec<&EvioStructure> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(s) = stack.pop() {
            if pred(s) {
                out.push(s);
            }
            stack.extend(s.children().iter().rev());
        }
        out
    }
}

// Children are unlinked one level at a time so that dropping a deep tree
// does not recurse once per level.
impl Drop for EvioStructure {
    fn drop(&mut self) {
        let Content::Children(kids) = &mut self.content else { return };
        let mut pending = std::mem::take(kids);
        while let Some(mut s) = pending.pop() {
            if let Content::Children(grand) = &mut s.content {
                pending.append(grand);
            }
        }
    }
}

// ── EvioEvent ────────────────────────────────────────────────────────────────

/// A top-level bank.
#[derive(Debug, Clone, PartialEq)]
pub struct EvioEvent {
    bank:             EvioStructure,
    /// 1-based position in its source, 0 when built by hand.
    pub event_number: usize,
}

impl EvioEvent {
    pub fn new(tag: u16, data_type: DataType, num: i32) -> Self {
        Self { bank: EvioStructure::bank(tag, data_type, num), event_number: 0 }
    }

    pub fn from_structure(bank: EvioStructure) -> Result<Self> {
        if bank.kind() != StructureType::Bank {
            return Err(EvioError::WrongStructure { expected: StructureType::Bank, found: bank.kind() });
        }
        Ok(Self { bank, event_number: 0 })
    }

    pub fn with_byte_order(mut self, order: ByteOrder) -> Self {
        self.bank.byte_order = order;
        self
    }

    pub fn into_structure(self) -> EvioStructure {
        self.bank
    }
}

impl Deref for EvioEvent {
    type Target = EvioStructure;

    fn deref(&self) -> &EvioStructure {
        &self.bank
    }
}

impl DerefMut for EvioEvent {
    fn deref_mut(&mut self) -> &mut EvioStructure {
        &mut self.bank
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> EvioEvent {
        let mut ev = EvioEvent::new(1, DataType::Bank, 7);
        let mut ints = EvioStructure::bank(2, DataType::Int32, 0);
        ints.set_ints(&[1, 2, 3]).unwrap();
        ev.add_child(ints).unwrap();
        let mut seg_holder = EvioStructure::bank(3, DataType::Segment, 1);
        let mut bytes = EvioStructure::segment(4, DataType::Char8);
        bytes.set_chars(&[1, -1, 3, 4, 5]).unwrap();
        seg_holder.add_child(bytes).unwrap();
        ev.add_child(seg_holder).unwrap();
        ev
    }

    #[test]
    fn lengths_follow_content() {
        let mut ev = sample();
        // 2 + (2+3) + (2 + (1+2))
        assert_eq!(ev.total_words(), 12);
        assert_eq!(ev.set_all_header_lengths().unwrap(), 11);
        assert_eq!(ev.children()[1].children()[0].header().padding, 3);
        assert_eq!(ev.children()[1].header().length, 4);
    }

    #[test]
    fn written_header_matches_content() {
        let ev = sample();
        let bytes = ev.to_bytes(ByteOrder::Big).unwrap();
        assert_eq!(bytes.len(), 48);
        assert_eq!(&bytes[0..4], &[0, 0, 0, 11]);
        assert_eq!(&bytes[4..8], &[0, 1, 0x10, 7]);
        // int payload
        assert_eq!(&bytes[16..28], &[0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0, 3]);
    }

    #[test]
    fn other_order_swaps_numbers() {
        let ev = sample();
        let le = ev.to_bytes(ByteOrder::Little).unwrap();
        assert_eq!(&le[16..20], &[1, 0, 0, 0]);
        // byte data is never swapped
        assert_eq!(&le[40..45], &[1, 0xff, 3, 4, 5]);
    }

    #[test]
    fn wrong_child_kind_rejected() {
        let mut b = EvioStructure::bank(1, DataType::Segment, 0);
        let err = b.add_child(EvioStructure::bank(2, DataType::Int32, 0)).unwrap_err();
        assert!(matches!(err, EvioError::WrongStructure { expected: StructureType::Segment, .. }));
        let mut leaf = EvioStructure::bank(1, DataType::Int32, 0);
        assert!(leaf.add_child(EvioStructure::bank(2, DataType::Int32, 0)).is_err());
    }

    #[test]
    fn composite_cannot_cross_orders() {
        let mut c = EvioStructure::bank(1, DataType::Composite, 0);
        c.set_raw(vec![0; 8]).unwrap();
        assert!(c.to_bytes(ByteOrder::Big).is_ok());
        assert!(c.to_bytes(ByteOrder::Little).is_err());
    }

    #[test]
    fn segment_overflow_detected() {
        let mut s = EvioStructure::segment(1, DataType::Uchar8);
        s.set_uchars(&vec![0u8; 4 * 0x1_0000]).unwrap();
        assert!(matches!(s.set_all_header_lengths(), Err(EvioError::LengthOverflow { .. })));
        let mut out = Vec::new();
        assert!(s.write(&mut out, ByteOrder::Big).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn failed_child_leaves_output_untouched() {
        let mut holder = EvioStructure::bank(1, DataType::Segment, 0);
        let mut ok = EvioStructure::segment(2, DataType::Uint32);
        ok.set_uints(&[1, 2]).unwrap();
        holder.add_child(ok).unwrap();
        let mut big = EvioStructure::segment(3, DataType::Uchar8);
        big.set_uchars(&vec![0u8; 4 * 0x1_0000]).unwrap();
        holder.add_child(big).unwrap();

        let mut out = vec![0xaa; 4];
        assert!(matches!(holder.write(&mut out, ByteOrder::Big), Err(EvioError::LengthOverflow { .. })));
        assert_eq!(out, vec![0xaa; 4]);
        assert!(holder.to_bytes(ByteOrder::Big).is_err());
    }

    #[test]
    fn unaligned_tag_segment_refused() {
        let mut ts = EvioStructure::tag_segment(5, DataType::Short16);
        ts.set_shorts(&[1, 2, 3]).unwrap();
        assert!(matches!(ts.to_bytes(ByteOrder::Big), Err(EvioError::Format(_))));
        assert!(matches!(ts.set_all_header_lengths(), Err(EvioError::Format(_))));

        let mut holder = EvioStructure::bank(1, DataType::TagSegment, 0);
        holder.add_child(ts).unwrap();
        let mut out = Vec::new();
        assert!(holder.write(&mut out, ByteOrder::Little).is_err());
        assert!(out.is_empty());

        let mut even = EvioStructure::tag_segment(5, DataType::Short16);
        even.set_shorts(&[1, 2]).unwrap();
        assert_eq!(even.to_bytes(ByteOrder::Big).unwrap().len(), 8);
    }

    #[test]
    fn traversal_helpers() {
        let ev = sample();
        let mut seen = Vec::new();
        ev.visit(&mut |s, depth| seen.push((s.tag(), depth)));
        assert_eq!(seen, vec![(1, 0), (2, 1), (3, 1), (4, 2)]);
        let leaves = ev.matching(|s| s.is_leaf());
        assert_eq!(leaves.iter().map(|s| s.tag()).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(ev.number_data_items(), 2);
        assert_eq!(ev.children()[0].number_data_items(), 3);
    }

    #[test]
    fn event_must_be_a_bank() {
        assert!(EvioEvent::from_structure(EvioStructure::segment(1, DataType::Int32)).is_err());
    }
}
