use std::io;
use thiserror::Error;

use crate::types::{DataType, StructureType};

#[derive(Error, Debug)]
pub enum EvioError {
    /// Header fields out of their allowed range, bad magic number, truncated
    /// or inconsistent structure lengths.
    #[error("Bad evio format: {0}")]
    Format(String),
    /// A length or tag cannot be represented in the target structure.
    #[error("Length overflow: {what} is {value}, limit is {limit}")]
    LengthOverflow {
        what:  &'static str,
        value: u64,
        limit: u64,
    },
    /// Byte-position arithmetic was handed a position outside the block.
    #[error("Position {position} outside of range {start}..={end}")]
    Range { position: u64, start: u64, end: u64 },
    #[error("Buffer underflow: need {needed} bytes at offset {offset}, only {available} available")]
    BufferUnderflow {
        offset:    usize,
        needed:    usize,
        available: usize,
    },
    /// The bytes indexed by this node were removed from the backing buffer.
    #[error("Node is obsolete; its bytes were removed from the buffer")]
    ObsoleteNode,
    #[error("No node with id {0}")]
    InvalidNode(usize),
    #[error("Data type mismatch: expected {expected}, found {found}")]
    DataTypeMismatch {
        expected: &'static str,
        found:    DataType,
    },
    #[error("Wrong structure kind: expected {expected}, found {found}")]
    WrongStructure {
        expected: StructureType,
        found:    StructureType,
    },
    #[error("Composite format error: {0}")]
    CompositeFormat(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl EvioError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        EvioError::Format(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EvioError>;

/// Fail with `BufferUnderflow` unless `buf[offset..offset + needed]` exists.
#[inline]
pub(crate) fn ensure_len(buf: &[u8], offset: usize, needed: usize) -> Result<()> {
    let available = buf.len().saturating_sub(offset);
    if offset > buf.len() || available < needed {
        return Err(EvioError::BufferUnderflow { offset, needed, available });
    }
    Ok(())
}
