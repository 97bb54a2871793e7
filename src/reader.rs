//! Compact reader: index an evio buffer without materializing it.
//!
//! # Layout
//!
//! ```text
//! ┌───────────────┬──────────────────────┬───────────────┬─────┐
//! │ block header  │ [dictionary] events  │ block header  │ ... │
//! └───────────────┴──────────────────────┴───────────────┴─────┘
//! ```
//!
//! Construction walks every block header and records one [`BlockNode`] per
//! block and one event node per top-level bank.  Nothing below an event is
//! looked at until [`CompactReader::scanned_event`] (or a search) asks for
//! it.  The reader owns its buffer, so every [`DataView`] it hands out
//! borrows the reader and cannot outlive the bytes it points into; edits
//! need `&mut self` and therefore cannot run while a view is alive.
//!
//! Editing (`add_structure`, `remove_structure`) is only supported for
//! version-4 framing, where an event never spans blocks.

use std::borrow::Cow;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::block::{BlockHeader, VersionedBlockHeader, BLOCK_HEADER_BYTES};
use crate::error::{ensure_len, EvioError, Result};
use crate::header::{normalize_num, patch_length, patch_num, patch_tag, StructureHeader};
use crate::node::scan::{extract_event_node, scan_range, scan_structure};
use crate::node::{DataView, EvioNode, NodeArena, NodeId, OwnedData};
use crate::structure::data::unpack_strings;
use crate::structure::parse::{parse_event, parse_structure};
use crate::structure::{EvioEvent, EvioStructure};
use crate::types::{ByteOrder, StructureType};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Byte offset of the first block header.
    pub initial_position: usize,
    /// Scan every event's tree up front instead of on first use.
    pub eager_scan:       bool,
}

/// One block as located in the buffer.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub header: VersionedBlockHeader,
    /// Byte offset of the block header.
    pub pos:    usize,
    /// Block size in words, header included.
    pub len:    u32,
    /// Events beginning in this block (dictionary excluded).
    pub count:  u32,
    /// 0-based index of this block.
    pub place:  usize,
}

pub struct CompactReader {
    buffer:     Vec<u8>,
    order:      ByteOrder,
    options:    ReaderOptions,
    blocks:     Vec<BlockNode>,
    events:     Vec<NodeId>,
    arena:      NodeArena,
    dictionary: Option<String>,
}

impl CompactReader {
    pub fn new(buffer: Vec<u8>) -> Result<Self> {
        Self::with_options(buffer, ReaderOptions::default())
    }

    pub fn with_options(buffer: Vec<u8>, options: ReaderOptions) -> Result<Self> {
        let order = crate::block::detect_byte_order(&buffer, options.initial_position)?;
        let mut reader = Self {
            buffer,
            order,
            options,
            blocks:     Vec::new(),
            events:     Vec::new(),
            arena:      NodeArena::new(),
            dictionary: None,
        };
        reader.walk_blocks()?;
        if reader.options.eager_scan {
            for n in 1..=reader.events.len() {
                reader.scanned_event(n)?;
            }
        }
        Ok(reader)
    }

    pub fn from_file<P: AsRef<Path>>(path: P, options: ReaderOptions) -> Result<Self> {
        Self::with_options(std::fs::read(path)?, options)
    }

    // ── Block walk ───────────────────────────────────────────────────────────

    fn walk_blocks(&mut self) -> Result<()> {
        let mut pos = self.options.initial_position;
        let len = self.buffer.len();

        loop {
            if pos == len {
                break;
            }
            if len - pos < BLOCK_HEADER_BYTES {
                return Err(EvioError::format(format!(
                    "{} trailing bytes at offset {} are too few for a block header", len - pos, pos
                )));
            }
            let header = VersionedBlockHeader::read(&self.buffer, pos)?;
            if header.byte_order() != self.order {
                return Err(EvioError::format(format!("block at offset {} switches byte order", pos)));
            }
            let block_bytes = 4 * header.size() as usize;
            if pos + block_bytes > len {
                return Err(EvioError::format(format!(
                    "block {} at offset {} claims {} bytes, only {} left",
                    header.number(), pos, block_bytes, len - pos
                )));
            }

            let place = self.blocks.len();
            let count = match &header {
                VersionedBlockHeader::V4(h) => self.index_v4_block(&header, h.event_count, place)?,
                VersionedBlockHeader::V2(_) => self.index_v2_block(&header, place)?,
            };
            debug!(
                block = header.number(),
                pos,
                words = header.size(),
                version = header.version(),
                events = count,
                "indexed block"
            );

            let last = header.is_last_block();
            self.blocks.push(BlockNode { len: header.size(), header, pos, count, place });
            pos += block_bytes;
            if last {
                break;
            }
        }

        if self.blocks.is_empty() {
            return Err(EvioError::format("buffer holds no blocks"));
        }
        Ok(())
    }

    fn index_v4_block(&mut self, header: &VersionedBlockHeader, event_count: u32, block: usize) -> Result<u32> {
        let mut p = header
            .first_structure_start_position()
            .ok_or_else(|| EvioError::format("version 4 block without structures"))? as usize;
        let end = header.buffer_end_position() as usize;

        if block == 0 && header.has_dictionary() {
            let h = StructureHeader::read(StructureType::Bank, &self.buffer, p, self.order)?;
            if h.length < 1 {
                return Err(EvioError::format(format!(
                    "dictionary bank at offset {} has length {}", p, h.length
                )));
            }
            if p + h.total_bytes() > end {
                return Err(EvioError::format("dictionary overruns its block"));
            }
            let payload = &self.buffer[p + 8..p + h.total_bytes()];
            self.dictionary = unpack_strings(payload).into_iter().next();
            p += h.total_bytes();
        }

        for _ in 0..event_count {
            let id = self.push_event(p, end, block)?;
            p = self.arena.get(id)?.end_pos();
        }
        Ok(event_count)
    }

    fn index_v2_block(&mut self, header: &VersionedBlockHeader, block: usize) -> Result<u32> {
        let start = header.buffer_starting_position() as usize;
        let Some(first) = header.first_structure_start_position() else {
            return Err(EvioError::format(format!(
                "block {} only continues an event from an earlier block", header.number()
            )));
        };
        let mut p = first as usize;
        let end = header.buffer_end_position() as usize;
        if p < start + BLOCK_HEADER_BYTES || p > end {
            return Err(EvioError::format(format!("block {} has a bad start word", header.number())));
        }

        let mut count = 0;
        while p < end {
            if end - p < 8 {
                return Err(EvioError::format(format!(
                    "event at offset {} spans past block {}", p, header.number()
                )));
            }
            let h = StructureHeader::read(StructureType::Bank, &self.buffer, p, self.order)?;
            if p + h.total_bytes() > end {
                return Err(EvioError::format(format!(
                    "event at offset {} spans past block {}", p, header.number()
                )));
            }
            let id = self.push_event(p, end, block)?;
            p = self.arena.get(id)?.end_pos();
            count += 1;
        }
        Ok(count)
    }

    fn push_event(&mut self, pos: usize, limit: usize, block: usize) -> Result<NodeId> {
        let place = self.events.len();
        let id = extract_event_node(&mut self.arena, &self.buffer, self.order, pos, limit, block, place)?;
        self.events.push(id);
        Ok(id)
    }

    // ── Summary accessors ────────────────────────────────────────────────────

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn blocks(&self) -> &[BlockNode] {
        &self.blocks
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    pub fn first_block_header(&self) -> &VersionedBlockHeader {
        &self.blocks[0].header
    }

    pub fn evio_version(&self) -> u32 {
        self.first_block_header().version()
    }

    pub fn has_dictionary(&self) -> bool {
        self.dictionary.is_some()
    }

    pub fn dictionary_xml(&self) -> Option<&str> {
        self.dictionary.as_deref()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn arena(&self) -> &NodeArena {
        &self.arena
    }

    pub fn node(&self, id: NodeId) -> Result<&EvioNode> {
        self.arena.get(id)
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    // ── Events and search ────────────────────────────────────────────────────

    /// Unscanned node of event `n` (1-based).
    pub fn event(&self, n: usize) -> Result<NodeId> {
        if n == 0 || n > self.events.len() {
            return Err(EvioError::Range { position: n as u64, start: 1, end: self.events.len() as u64 });
        }
        Ok(self.events[n - 1])
    }

    /// Node of event `n` with its whole tree indexed.  Scans at most once.
    pub fn scanned_event(&mut self, n: usize) -> Result<NodeId> {
        let id = self.event(n)?;
        if !self.arena.get(id)?.is_scanned() {
            let created = scan_structure(&mut self.arena, &self.buffer, self.order, id)?;
            self.arena.mark_scanned(id)?;
            trace!(event = n, created, "scanned event");
        }
        Ok(id)
    }

    /// Structures in event `n` (the event itself included) with this tag and num.
    pub fn search_event(&mut self, n: usize, tag: u16, num: u8) -> Result<Vec<NodeId>> {
        let id = self.scanned_event(n)?;
        let event = self.arena.get(id)?;
        let mut found = Vec::new();
        for nid in event.all_nodes() {
            let node = self.arena.get(*nid)?;
            if node.tag == tag && node.num == num && !node.is_obsolete() {
                found.push(*nid);
            }
        }
        Ok(found)
    }

    // ── Data access ──────────────────────────────────────────────────────────

    /// Zero-copy typed view of a leaf's payload, padding excluded.
    pub fn data(&self, id: NodeId) -> Result<DataView<'_>> {
        let node = self.arena.live(id)?;
        if node.data_type.is_structure() {
            return Err(EvioError::DataTypeMismatch { expected: "leaf data", found: node.data_type });
        }
        let bytes = if node.data_type.allows_padding() {
            node.data_bytes()
        } else {
            4 * node.data_len as usize
        };
        ensure_len(&self.buffer, node.data_pos, bytes)?;
        Ok(DataView::new(&self.buffer[node.data_pos..node.data_pos + bytes], node.data_type, self.order))
    }

    /// Independent copy of a leaf's payload.
    pub fn data_copy(&self, id: NodeId) -> Result<OwnedData> {
        Ok(self.data(id)?.to_owned_data())
    }

    /// Header plus payload of a structure, borrowed or copied.
    pub fn structure_bytes(&self, id: NodeId, copy: bool) -> Result<Cow<'_, [u8]>> {
        let node = self.arena.live(id)?;
        ensure_len(&self.buffer, node.pos, node.total_bytes())?;
        let bytes = &self.buffer[node.pos..node.pos + node.total_bytes()];
        Ok(if copy { Cow::Owned(bytes.to_vec()) } else { Cow::Borrowed(bytes) })
    }

    pub fn event_bytes(&self, n: usize, copy: bool) -> Result<Cow<'_, [u8]>> {
        self.structure_bytes(self.event(n)?, copy)
    }

    /// Fully materialize the structure behind `id`.
    pub fn to_structure(&self, id: NodeId) -> Result<EvioStructure> {
        let node = self.arena.live(id)?;
        parse_structure(&self.buffer, node.pos, node.kind, self.order)
    }

    pub fn parse_event(&self, n: usize) -> Result<EvioEvent> {
        let node = self.arena.get(self.event(n)?)?;
        let mut ev = parse_event(&self.buffer, node.pos, self.order)?;
        ev.event_number = n;
        Ok(ev)
    }

    /// Materialize every event.  Runs on the rayon pool with the `parallel`
    /// feature.
    pub fn parse_all_events(&self) -> Result<Vec<EvioEvent>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;

            (1..=self.events.len())
                .into_par_iter()
                .map(|n| self.parse_event(n))
                .collect()
        }

        #[cfg(not(feature = "parallel"))]
        {
            (1..=self.events.len()).map(|n| self.parse_event(n)).collect()
        }
    }

    // ── In-place edits ───────────────────────────────────────────────────────

    pub fn update_tag(&mut self, id: NodeId, tag: u16) -> Result<()> {
        let (kind, pos) = {
            let node = self.arena.live(id)?;
            (node.kind, node.pos)
        };
        patch_tag(kind, &mut self.buffer, pos, tag, self.order)?;
        self.arena.get_mut(id)?.tag = tag & kind.max_tag();
        Ok(())
    }

    /// Only banks carry a num.
    pub fn update_num(&mut self, id: NodeId, num: i32) -> Result<()> {
        let (kind, pos) = {
            let node = self.arena.live(id)?;
            (node.kind, node.pos)
        };
        if kind != StructureType::Bank {
            return Err(EvioError::WrongStructure { expected: StructureType::Bank, found: kind });
        }
        patch_num(&mut self.buffer, pos, num, self.order)?;
        self.arena.get_mut(id)?.num = normalize_num(num);
        Ok(())
    }

    fn editable_block(&self, block: usize) -> Result<()> {
        match self.blocks.get(block).map(|b| &b.header) {
            Some(VersionedBlockHeader::V4(_)) => Ok(()),
            Some(VersionedBlockHeader::V2(h)) => Err(EvioError::format(format!(
                "editing needs version 4 blocks, found version {}", h.version
            ))),
            None => Err(EvioError::format(format!("no block {}", block))),
        }
    }

    /// Add `delta` words to the size word of block `block`.
    fn resize_block(&mut self, block: usize, delta: i64) -> Result<()> {
        let node = &mut self.blocks[block];
        let size = node.len as i64 + delta;
        if size < 8 || size > u32::MAX as i64 {
            return Err(EvioError::LengthOverflow { what: "block size", value: size.max(0) as u64, limit: u32::MAX as u64 });
        }
        let size = size as u32;
        self.order.write_u32(&mut self.buffer[node.pos..node.pos + 4], size);
        node.len = size;
        if let Some(h) = node.header.as_v4_mut() {
            h.size = size;
        }
        Ok(())
    }

    /// Move every live node at or beyond `from` and every later block by `delta` bytes.
    fn shift_after(&mut self, from: usize, block: usize, delta: isize) {
        for node in self.arena.iter_mut() {
            if !node.is_obsolete() && node.pos >= from {
                node.pos = node.pos.wrapping_add_signed(delta);
                node.data_pos = node.data_pos.wrapping_add_signed(delta);
            }
        }
        for b in self.blocks.iter_mut().skip(block + 1) {
            b.pos = b.pos.wrapping_add_signed(delta);
            b.header.set_buffer_starting_position(b.pos as u64);
        }
    }

    /// Append already encoded structures to the end of event `n`.  `bytes`
    /// must tile exactly into structures of the kind the event holds, in the
    /// reader's byte order.
    pub fn add_structure(&mut self, n: usize, bytes: &[u8]) -> Result<()> {
        let id = self.event(n)?;
        let event = self.arena.live(id)?.clone();
        self.editable_block(event.block)?;

        let Some(kind) = event.data_type.container_kind() else {
            return Err(EvioError::DataTypeMismatch { expected: "container event", found: event.data_type });
        };
        if bytes.is_empty() || bytes.len() % 4 != 0 {
            return Err(EvioError::format(format!("{} bytes cannot be whole structures", bytes.len())));
        }
        let mut p = 0;
        while p < bytes.len() {
            let h = StructureHeader::read(kind, bytes, p, self.order)?;
            if h.total_bytes() < kind.header_bytes() || p + h.total_bytes() > bytes.len() {
                return Err(EvioError::format(format!("{} at offset {} of added bytes overruns them", kind, p)));
            }
            p += h.total_bytes();
        }

        let words = (bytes.len() / 4) as u64;
        let new_len = event.len as u64 + words;
        if new_len > u32::MAX as u64 {
            return Err(EvioError::LengthOverflow { what: "event length", value: new_len, limit: u32::MAX as u64 });
        }

        let at = event.end_pos();
        self.shift_after(at, event.block, bytes.len() as isize);
        self.buffer.splice(at..at, bytes.iter().copied());
        patch_length(StructureType::Bank, &mut self.buffer, event.pos, new_len as u32, self.order)?;
        {
            let node = self.arena.get_mut(id)?;
            node.len = new_len as u32;
            node.data_len += words as u32;
        }
        self.resize_block(event.block, words as i64)?;

        if event.is_scanned() {
            scan_range(&mut self.arena, &self.buffer, self.order, id, at, at + bytes.len())?;
        }
        debug!(event = n, pos = at, words, "added structures");
        Ok(())
    }

    /// Cut a non-event structure out of the buffer.  Ancestor and block
    /// lengths shrink to match, later nodes move down, and the removed
    /// subtree is marked obsolete.
    pub fn remove_structure(&mut self, id: NodeId) -> Result<()> {
        let node = self.arena.live(id)?.clone();
        if node.is_event {
            return Err(EvioError::format("events cannot be removed, only their descendants"));
        }
        self.editable_block(node.block)?;

        let bytes = node.total_bytes();
        let words = (bytes / 4) as u32;

        let mut cur = node.parent;
        while let Some(pid) = cur {
            let parent = self.arena.get(pid)?;
            let (kind, pos, len, next) = (parent.kind, parent.pos, parent.len, parent.parent);
            let new_len = len.saturating_sub(words);
            patch_length(kind, &mut self.buffer, pos, new_len, self.order)?;
            let parent = self.arena.get_mut(pid)?;
            parent.len = new_len;
            parent.data_len = parent.data_len.saturating_sub(words);
            cur = next;
        }
        self.resize_block(node.block, -(words as i64))?;

        self.buffer.drain(node.pos..node.pos + bytes);
        self.arena.set_obsolete(id)?;
        if let Some(parent) = node.parent {
            self.arena.remove_child(parent, id)?;
        }
        self.shift_after(node.pos + bytes, node.block, -(bytes as isize));

        debug!(event = node.event_number(), pos = node.pos, words, "removed structure");
        Ok(())
    }
}
