//! Event writer: frames encoded events into version-4 blocks.
//!
//! Blocks are numbered from 1.  A block is closed when the next event would
//! push it past `max_block_words` or `max_events_per_block`; an event too big
//! for any block gets a block of its own.  The optional XML dictionary is
//! the first bank of block 1 and is not counted as an event.  `finish`
//! flags the final block as last, emitting a header-only block when nothing
//! is pending.

use std::io::Write;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::block::{BlockHeader, BlockHeaderV4, BLOCK_HEADER_BYTES, BLOCK_HEADER_WORDS};
use crate::error::{EvioError, Result};
use crate::header::read_length;
use crate::structure::{EvioEvent, EvioStructure};
use crate::types::{ByteOrder, DataType, StructureType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterOptions {
    pub byte_order:           ByteOrder,
    /// Upper bound on block size in words, header included.
    pub max_block_words:      u32,
    pub max_events_per_block: u32,
    pub dictionary_xml:       Option<String>,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            byte_order:           ByteOrder::Big,
            max_block_words:      1_000_000,
            max_events_per_block: 10_000,
            dictionary_xml:       None,
        }
    }
}

pub struct EventWriter<W: Write> {
    out:            W,
    options:        WriterOptions,
    pending:        Vec<u8>,
    pending_events: u32,
    /// Dictionary bank sits at the front of `pending`.
    pending_dict:   bool,
    block_number:   u32,
    events_written: u64,
}

impl<W: Write> EventWriter<W> {
    pub fn new(out: W, options: WriterOptions) -> Result<Self> {
        if options.max_block_words <= BLOCK_HEADER_WORDS || options.max_events_per_block == 0 {
            return Err(EvioError::format("writer block limits leave no room for events"));
        }
        let mut writer = Self {
            out,
            options,
            pending:        Vec::new(),
            pending_events: 0,
            pending_dict:   false,
            block_number:   1,
            events_written: 0,
        };
        if let Some(xml) = writer.options.dictionary_xml.clone() {
            let mut dict = EvioStructure::bank(0, DataType::CharStar8, 0);
            dict.set_strings(&[xml])?;
            dict.write(&mut writer.pending, writer.options.byte_order)?;
            writer.pending_dict = true;
        }
        Ok(writer)
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.options.byte_order
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    /// Blocks already handed to the sink.
    pub fn blocks_written(&self) -> u32 {
        self.block_number - 1
    }

    pub fn write_event(&mut self, event: &EvioEvent) -> Result<()> {
        let bytes = event.to_bytes(self.options.byte_order)?;
        self.append(&bytes)
    }

    /// Append an already encoded bank, which must be in the writer's byte order.
    pub fn write_raw_event(&mut self, bytes: &[u8]) -> Result<()> {
        if bytes.len() < 8 || bytes.len() % 4 != 0 {
            return Err(EvioError::format(format!("{} bytes is not an encoded bank", bytes.len())));
        }
        let length = read_length(StructureType::Bank, bytes, 0, self.options.byte_order)? as usize;
        if 4 * (length + 1) != bytes.len() {
            return Err(EvioError::format(format!(
                "bank length word {} disagrees with {} bytes", length, bytes.len()
            )));
        }
        self.append(bytes)
    }

    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let words = (bytes.len() / 4) as u64;
        let pending_words = (self.pending.len() / 4) as u64;
        let full = pending_words + words + BLOCK_HEADER_WORDS as u64 > self.options.max_block_words as u64
            || self.pending_events >= self.options.max_events_per_block;
        if full && !self.pending.is_empty() {
            self.flush_block(false)?;
        }
        self.pending.extend_from_slice(bytes);
        self.pending_events += 1;
        self.events_written += 1;
        Ok(())
    }

    fn flush_block(&mut self, last: bool) -> Result<()> {
        let words = BLOCK_HEADER_WORDS + (self.pending.len() / 4) as u32;
        let mut header = BlockHeaderV4::new(words, self.block_number, self.pending_events);
        header.set_dictionary(self.pending_dict);
        header.set_last_block(last);

        let mut raw = [0u8; BLOCK_HEADER_BYTES];
        header.write(&mut raw, self.options.byte_order)?;
        self.out.write_all(&raw)?;
        self.out.write_all(&self.pending)?;

        debug!(
            block = header.number(),
            words,
            events = self.pending_events,
            dictionary = self.pending_dict,
            last,
            "flushed block"
        );

        self.pending.clear();
        self.pending_events = 0;
        self.pending_dict = false;
        self.block_number += 1;
        Ok(())
    }

    /// Write everything pending, mark the last block and hand back the sink.
    pub fn finish(mut self) -> Result<W> {
        self.flush_block(true)?;
        self.out.flush()?;
        Ok(self.out)
    }
}

/// Encode `events` as a complete in-memory evio buffer.
pub fn write_events_to_vec(events: &[EvioEvent], options: WriterOptions) -> Result<Vec<u8>> {
    let mut writer = EventWriter::new(Vec::new(), options)?;
    for ev in events {
        writer.write_event(ev)?;
    }
    writer.finish()
}
