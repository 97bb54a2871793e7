//! Lazy node index over an evio buffer.
//!
//! # Model
//! A scan produces one [`EvioNode`] per structure: a handful of scalars
//! locating the structure's header and payload inside the backing buffer.
//! Payloads are never decoded during a scan, so indexing cost tracks the
//! number of structures rather than the number of payload elements.
//!
//! Nodes live in a [`NodeArena`] and refer to each other by [`NodeId`].
//! Each event node owns the flat list of every node in its tree (itself
//! included); descendants only hold the id of their event.  Ids stay valid
//! for the life of the arena; nodes whose bytes were removed are flagged
//! obsolete instead of being freed.

pub mod scan;
pub mod view;

pub use view::{DataView, OwnedData};

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{EvioError, Result};
use crate::types::{DataType, StructureType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub usize);

// ── EvioNode ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EvioNode {
    /// Value of the length word.
    pub len:       u32,
    pub tag:       u16,
    pub num:       u8,
    pub pad:       u8,
    /// Absolute byte offset of the header.
    pub pos:       usize,
    /// This structure's own kind.
    pub kind:      StructureType,
    /// Payload length in words.
    pub data_len:  u32,
    /// Absolute byte offset of the payload.
    pub data_pos:  usize,
    /// Declared payload type.
    pub data_type: DataType,
    pub is_event:  bool,
    /// Index of the block holding this node's event.
    pub block:     usize,
    /// 0-based index of the event this node belongs to.
    pub place:     usize,
    pub event:     NodeId,
    pub parent:    Option<NodeId>,
    pub children:  Vec<NodeId>,
    obsolete:      bool,
    scanned:       bool,
    all_nodes:     Vec<NodeId>,
}

impl EvioNode {
    /// A top-level bank node.  Scan fields (children, flat list) start empty.
    pub(crate) fn event(id: NodeId, pos: usize, len: u32, tag: u16, num: u8, pad: u8,
                        data_type: DataType, block: usize, place: usize) -> Self {
        Self {
            len,
            tag,
            num,
            pad,
            pos,
            kind:      StructureType::Bank,
            data_len:  len.saturating_sub(1),
            data_pos:  pos + 8,
            data_type,
            is_event:  true,
            block,
            place,
            event:     id,
            parent:    None,
            children:  Vec::new(),
            obsolete:  false,
            scanned:   false,
            all_nodes: vec![id],
        }
    }

    /// Shallow duplicate used as the starting point for a child node: keeps
    /// the event/block linkage, drops everything list-shaped.  The caller
    /// overwrites the per-structure fields.
    pub(crate) fn descend(&self) -> Self {
        Self {
            len:       self.len,
            tag:       self.tag,
            num:       self.num,
            pad:       self.pad,
            pos:       self.pos,
            kind:      self.kind,
            data_len:  self.data_len,
            data_pos:  self.data_pos,
            data_type: self.data_type,
            is_event:  false,
            block:     self.block,
            place:     self.place,
            event:     self.event,
            parent:    None,
            children:  Vec::new(),
            obsolete:  self.obsolete,
            scanned:   self.scanned,
            all_nodes: Vec::new(),
        }
    }

    /// Bytes spanned by header plus payload.
    pub fn total_bytes(&self) -> usize {
        4 * self.data_len as usize + self.data_pos - self.pos
    }

    /// Payload bytes without trailing padding.
    pub fn data_bytes(&self) -> usize {
        (4 * self.data_len as usize).saturating_sub(self.pad as usize)
    }

    /// 1-based number of the owning event.
    pub fn event_number(&self) -> usize {
        self.place + 1
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete
    }

    pub fn is_scanned(&self) -> bool {
        self.scanned
    }

    /// Flat list of the whole tree.  Empty on non-event nodes.
    pub fn all_nodes(&self) -> &[NodeId] {
        &self.all_nodes
    }

    pub fn end_pos(&self) -> usize {
        self.data_pos + 4 * self.data_len as usize
    }
}

// ── NodeArena ────────────────────────────────────────────────────────────────

/// Owner of every node produced by scanning one buffer.
#[derive(Debug, Default, Clone)]
pub struct NodeArena {
    nodes: Vec<EvioNode>,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn next_id(&self) -> NodeId {
        NodeId(self.nodes.len())
    }

    pub(crate) fn push(&mut self, node: EvioNode) -> NodeId {
        let id = self.next_id();
        self.nodes.push(node);
        id
    }

    pub fn get(&self, id: NodeId) -> Result<&EvioNode> {
        self.nodes.get(id.0).ok_or(EvioError::InvalidNode(id.0))
    }

    pub(crate) fn get_mut(&mut self, id: NodeId) -> Result<&mut EvioNode> {
        self.nodes.get_mut(id.0).ok_or(EvioError::InvalidNode(id.0))
    }

    /// Like `get`, but refuses obsolete nodes.
    pub fn live(&self, id: NodeId) -> Result<&EvioNode> {
        let node = self.get(id)?;
        if node.obsolete {
            return Err(EvioError::ObsoleteNode);
        }
        Ok(node)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &EvioNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut EvioNode> {
        self.nodes.iter_mut()
    }

    /// Store `child` under `parent`, registering it in the event's flat list.
    pub(crate) fn add_child(&mut self, parent: NodeId, mut child: EvioNode) -> Result<NodeId> {
        let event = self.get(parent)?.event;
        child.parent = Some(parent);
        child.event = event;
        let id = self.push(child);
        self.get_mut(parent)?.children.push(id);
        self.get_mut(event)?.all_nodes.push(id);
        Ok(id)
    }

    /// Flag `id` and its whole subtree obsolete.
    pub fn set_obsolete(&mut self, id: NodeId) -> Result<()> {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let node = self.get_mut(cur)?;
            node.obsolete = true;
            stack.extend(node.children.iter().copied());
        }
        Ok(())
    }

    /// Detach `child` from `parent` and drop its subtree from the event's
    /// flat list.  The detached nodes stay in the arena.
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<bool> {
        let parent_node = self.get_mut(parent)?;
        let Some(at) = parent_node.children.iter().position(|c| *c == child) else {
            return Ok(false);
        };
        parent_node.children.remove(at);
        let event = parent_node.event;

        let subtree: HashSet<NodeId> = self.subtree(child)?.into_iter().collect();
        self.get_mut(event)?.all_nodes.retain(|n| !subtree.contains(n));
        self.get_mut(child)?.parent = None;
        Ok(true)
    }

    /// `id` followed by all of its descendants, depth first.
    pub fn subtree(&self, id: NodeId) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            out.push(cur);
            stack.extend(self.get(cur)?.children.iter().rev().copied());
        }
        Ok(out)
    }

    pub(crate) fn mark_scanned(&mut self, event: NodeId) -> Result<()> {
        self.get_mut(event)?.scanned = true;
        Ok(())
    }

    /// Serializable snapshot of the subtree rooted at `id`.
    pub fn summary(&self, id: NodeId) -> Result<NodeSummary> {
        let mut current = self.summary_frame(id)?;
        let mut parents = Vec::new();
        loop {
            match current.1.pop() {
                Some(child) => {
                    let frame = self.summary_frame(child)?;
                    parents.push(std::mem::replace(&mut current, frame));
                }
                None => {
                    let (done, _) = current;
                    match parents.pop() {
                        Some(parent) => {
                            current = parent;
                            current.0.children.push(done);
                        }
                        None => return Ok(done),
                    }
                }
            }
        }
    }

    /// A childless summary of `id` plus its child ids, last child first.
    fn summary_frame(&self, id: NodeId) -> Result<(NodeSummary, Vec<NodeId>)> {
        let node = self.get(id)?;
        let pending = node.children.iter().rev().copied().collect();
        let summary = NodeSummary {
            id,
            kind:      node.kind,
            tag:       node.tag,
            num:       node.num,
            data_type: node.data_type,
            pad:       node.pad,
            len:       node.len,
            pos:       node.pos,
            data_pos:  node.data_pos,
            data_len:  node.data_len,
            obsolete:  node.obsolete,
            children:  Vec::with_capacity(node.children.len()),
        };
        Ok((summary, pending))
    }
}

/// Plain-data copy of a node subtree, for display and JSON export.
#[derive(Debug, Clone, Serialize)]
pub struct NodeSummary {
    pub id:        NodeId,
    pub kind:      StructureType,
    pub tag:       u16,
    pub num:       u8,
    pub data_type: DataType,
    pub pad:       u8,
    pub len:       u32,
    pub pos:       usize,
    pub data_pos:  usize,
    pub data_len:  u32,
    pub obsolete:  bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children:  Vec<NodeSummary>,
}

impl Drop for NodeSummary {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(mut s) = pending.pop() {
            pending.append(&mut s.children);
        }
    }
}
