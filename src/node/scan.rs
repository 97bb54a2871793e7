//! Buffer scanning: event extraction and recursive structure indexing.
//!
//! The walk is iterative (an explicit frame stack) so deeply nested input
//! cannot exhaust the call stack, and it visits structures in document
//! order, so an event's flat list is a pre-order listing of its tree.

use tracing::trace;

use super::{EvioNode, NodeArena, NodeId};
use crate::error::{EvioError, Result};
use crate::header::StructureHeader;
use crate::types::{ByteOrder, StructureType};

/// Index the top-level bank at `pos` without looking inside it.  The bank
/// must end at or before `limit`.
pub fn extract_event_node(arena: &mut NodeArena, buf: &[u8], order: ByteOrder,
                          pos: usize, limit: usize, block: usize, place: usize) -> Result<NodeId> {
    if pos + 8 > limit {
        return Err(EvioError::format(format!(
            "not enough data to read event {} at offset {}", place + 1, pos
        )));
    }
    let h = StructureHeader::read(StructureType::Bank, buf, pos, order)?;
    if h.length < 1 || pos + h.total_bytes() > limit {
        return Err(EvioError::format(format!(
            "bad length {} for event {} at offset {}", h.length, place + 1, pos
        )));
    }
    let id = arena.next_id();
    arena.push(EvioNode::event(id, pos, h.length, h.tag, h.num(), h.padding, h.data_type, block, place));
    Ok(id)
}

/// Index every structure below `id`.  Leaf payloads are only measured.
pub fn scan_structure(arena: &mut NodeArena, buf: &[u8], order: ByteOrder, id: NodeId) -> Result<usize> {
    let node = arena.get(id)?;
    let (start, end) = (node.data_pos, node.end_pos());
    scan_range(arena, buf, order, id, start, end)
}

/// Index the structures in `buf[start..end]` as new children of `parent`,
/// descending into containers.  Returns the number of nodes created.
pub fn scan_range(arena: &mut NodeArena, buf: &[u8], order: ByteOrder,
                  parent: NodeId, start: usize, end: usize) -> Result<usize> {
    if end > buf.len() {
        return Err(EvioError::BufferUnderflow { offset: start, needed: end.saturating_sub(start), available: buf.len().saturating_sub(start) });
    }

    struct Frame {
        parent: NodeId,
        kind:   StructureType,
        next:   usize,
        end:    usize,
    }

    let Some(kind) = arena.get(parent)?.data_type.container_kind() else {
        return Ok(0);
    };
    let mut stack = vec![Frame { parent, kind, next: start, end }];
    let mut created = 0;

    while let Some(frame) = stack.last_mut() {
        let hdr_bytes = frame.kind.header_bytes();
        if frame.next + hdr_bytes > frame.end {
            if frame.next != frame.end {
                trace!(pos = frame.next, end = frame.end, "ignoring trailing words in container");
            }
            stack.pop();
            continue;
        }

        let pos = frame.next;
        let h = StructureHeader::read(frame.kind, buf, pos, order)?;
        let total = h.total_bytes();
        if total < hdr_bytes || pos + total > frame.end {
            return Err(EvioError::format(format!(
                "{} at offset {} with length {} overruns its parent (ends at {})",
                frame.kind, pos, h.length, frame.end
            )));
        }
        frame.next = pos + total;
        let owner = frame.parent;

        let mut child = arena.get(owner)?.descend();
        child.len = h.length;
        child.tag = h.tag;
        child.num = h.num();
        child.pad = h.padding;
        child.pos = pos;
        child.kind = h.kind();
        child.data_pos = pos + hdr_bytes;
        child.data_len = h.data_words() as u32;
        child.data_type = h.data_type;

        let child_id = arena.add_child(owner, child)?;
        created += 1;

        if let Some(kind) = h.data_type.container_kind() {
            stack.push(Frame { parent: child_id, kind, next: pos + hdr_bytes, end: pos + total });
        }
    }

    trace!(parent = parent.0, created, "scanned structure range");
    Ok(created)
}
