//! Full parse of encoded structures into an owned tree.

use super::{Content, EvioEvent, EvioStructure};
use crate::error::{ensure_len, EvioError, Result};
use crate::header::StructureHeader;
use crate::types::{ByteOrder, StructureType};

/// A container whose children are still being read.
struct Frame {
    header: StructureHeader,
    kids:   Vec<EvioStructure>,
    child:  StructureType,
    /// Offset of the next child header.
    next:   usize,
    end:    usize,
}

enum Opened {
    Leaf(EvioStructure),
    Container(Frame),
}

/// Read the header at `buf[offset]`, which must end by `limit`.  Returns the
/// opened structure and its encoded size in bytes.
fn open(buf: &[u8], offset: usize, limit: usize, kind: StructureType,
        order: ByteOrder) -> Result<(Opened, usize)> {
    let bounded = &buf[..limit];
    let header = StructureHeader::read(kind, bounded, offset, order)?;
    let total = header.total_bytes();
    if total < kind.header_bytes() {
        return Err(EvioError::format(format!("{} at offset {} has length {}", kind, offset, header.length)));
    }
    ensure_len(bounded, offset, total)?;

    let data_start = offset + kind.header_bytes();
    let data_end = offset + total;

    let opened = match header.data_type.container_kind() {
        Some(child) => Opened::Container(Frame { header, kids: Vec::new(), child, next: data_start, end: data_end }),
        None => {
            let pad = if header.data_type.allows_padding() { header.padding as usize } else { 0 };
            let end = data_end.saturating_sub(pad).max(data_start);
            let raw = Content::Raw(buf[data_start..end].to_vec());
            Opened::Leaf(EvioStructure::from_parts(header, raw, order))
        }
    };
    Ok((opened, total))
}

/// Parse the structure of `kind` whose header starts at `buf[offset]`.
/// Leaf payloads are copied out without their padding.  Nesting depth is
/// bounded only by the buffer.
pub fn parse_structure(buf: &[u8], offset: usize, kind: StructureType, order: ByteOrder) -> Result<EvioStructure> {
    let mut current = match open(buf, offset, buf.len(), kind, order)?.0 {
        Opened::Leaf(s)      => return Ok(s),
        Opened::Container(f) => f,
    };
    let mut parents: Vec<Frame> = Vec::new();

    loop {
        if current.next + current.child.header_bytes() <= current.end {
            let (opened, total) = open(buf, current.next, current.end, current.child, order)?;
            current.next += total;
            match opened {
                Opened::Leaf(s)      => current.kids.push(s),
                Opened::Container(f) => parents.push(std::mem::replace(&mut current, f)),
            }
        } else {
            let done = EvioStructure::from_parts(current.header, Content::Children(current.kids), order);
            match parents.pop() {
                Some(parent) => {
                    current = parent;
                    current.kids.push(done);
                }
                None => return Ok(done),
            }
        }
    }
}

/// Parse a top-level bank.
pub fn parse_event(buf: &[u8], offset: usize, order: ByteOrder) -> Result<EvioEvent> {
    EvioEvent::from_structure(parse_structure(buf, offset, StructureType::Bank, order)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;

    #[test]
    fn parse_inverts_write() {
        for order in [ByteOrder::Big, ByteOrder::Little] {
            let mut ev = EvioEvent::new(5, DataType::TagSegment, 9).with_byte_order(order);
            let mut ts = EvioStructure::tag_segment(0x321, DataType::Double64).with_byte_order(order);
            ts.set_doubles(&[1.5, -2.25]).unwrap();
            ev.add_child(ts).unwrap();
            let mut strs = EvioStructure::tag_segment(7, DataType::CharStar8).with_byte_order(order);
            strs.set_strings(&["alpha", "beta"]).unwrap();
            ev.add_child(strs).unwrap();
            ev.set_all_header_lengths().unwrap();

            let bytes = ev.to_bytes(order).unwrap();
            let back = parse_event(&bytes, 0, order).unwrap();
            assert_eq!(back.children().len(), 2);
            assert_eq!(back.children()[0].tag(), 0x321);
            let d: Vec<f64> = back.children()[0].data().unwrap().doubles().unwrap().collect();
            assert_eq!(d, vec![1.5, -2.25]);
            assert_eq!(back.children()[1].strings().unwrap(), vec!["alpha", "beta"]);
            assert_eq!(back.header(), ev.header());
        }
    }

    #[test]
    fn padded_bytes_trimmed() {
        let mut b = EvioStructure::bank(1, DataType::Uchar8, 0);
        b.set_uchars(&[9, 8, 7]).unwrap();
        let bytes = b.to_bytes(ByteOrder::Big).unwrap();
        let back = parse_structure(&bytes, 0, StructureType::Bank, ByteOrder::Big).unwrap();
        assert_eq!(back.data().unwrap().as_bytes(), &[9, 8, 7]);
        assert_eq!(back.header().padding, 1);
    }

    /// `depth` banks of banks around one bank holding a single int.
    fn nested_banks(depth: usize, order: ByteOrder) -> Vec<u8> {
        let mut buf = vec![0u8; 8 * depth + 12];
        for level in 0..depth {
            let at = 8 * level;
            order.write_u32(&mut buf[at..at + 4], (2 * (depth - level) + 2) as u32);
            order.write_u32(&mut buf[at + 4..at + 8], 0x0001_1000);
        }
        let at = 8 * depth;
        order.write_u32(&mut buf[at..at + 4], 2);
        order.write_u32(&mut buf[at + 4..at + 8], 0x0002_0b00);
        order.write_u32(&mut buf[at + 8..at + 12], 42);
        buf
    }

    #[test]
    fn deep_nesting_parses_and_writes() {
        let depth = 100_000;
        let bytes = nested_banks(depth, ByteOrder::Little);
        let mut ev = parse_event(&bytes, 0, ByteOrder::Little).unwrap();

        let mut deepest = 0;
        ev.visit(&mut |_: &EvioStructure, d: usize| deepest = deepest.max(d));
        assert_eq!(deepest, depth);
        assert_eq!(ev.total_words() as usize, bytes.len() / 4);
        assert_eq!(ev.set_all_header_lengths().unwrap() as usize, bytes.len() / 4 - 1);
        assert_eq!(ev.to_bytes(ByteOrder::Little).unwrap(), bytes);
    }

    #[test]
    fn truncated_input_fails() {
        let mut b = EvioStructure::bank(1, DataType::Int32, 0);
        b.set_ints(&[1, 2, 3, 4]).unwrap();
        let bytes = b.to_bytes(ByteOrder::Big).unwrap();
        assert!(parse_structure(&bytes[..16], 0, StructureType::Bank, ByteOrder::Big).is_err());
    }

    #[test]
    fn child_cannot_overrun_parent() {
        let mut bytes = nested_banks(2, ByteOrder::Big);
        // outer bank claims one word less than its child needs
        ByteOrder::Big.write_u32(&mut bytes[0..4], 5);
        assert!(parse_structure(&bytes[..24], 0, StructureType::Bank, ByteOrder::Big).is_err());
    }
}
