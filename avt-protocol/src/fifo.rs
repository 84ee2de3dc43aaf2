//! Packet FIFO
//!
//! Ordered queue of packet headers paired with optional payload views, used to
//! buffer packets for retransmission or deferred sending. Entries hold views,
//! never copies: pushing a payload adds one reference to its storage and every
//! removal releases exactly one.

use crate::buffer::Buffer;
use crate::error::ErrorKind;
use crate::packet::PacketHeader;
use std::collections::VecDeque;
use std::mem;
use thiserror::Error;
use tracing::trace;

/// Structural overhead counted per entry by [`PacketFifo::size_estimate`]
pub const ENTRY_OVERHEAD: usize = mem::size_of::<FifoEntry>();

/// FIFO errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FifoError {
    #[error("FIFO is empty")]
    Empty,

    #[error("Cannot drop {count} entries from a FIFO holding {len}")]
    CountExceedsLength { count: usize, len: usize },

    #[error("Failed to grow FIFO to {0} entries")]
    OutOfMemory(usize),
}

impl FifoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FifoError::Empty => ErrorKind::NotFound,
            FifoError::CountExceedsLength { .. } => ErrorKind::InvalidArgument,
            FifoError::OutOfMemory(_) => ErrorKind::OutOfMemory,
        }
    }
}

/// One queued packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FifoEntry {
    pub header: PacketHeader,
    pub payload: Option<Buffer>,
}

impl FifoEntry {
    /// Bytes accounted for this entry
    pub fn size(&self) -> usize {
        ENTRY_OVERHEAD + self.payload.as_ref().map_or(0, Buffer::len)
    }
}

/// Packet queue, oldest entry first
#[derive(Debug, Default)]
pub struct PacketFifo {
    entries: VecDeque<FifoEntry>,
}

impl PacketFifo {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// Make room for `additional` entries, doubling capacity (starting at 1)
    fn reserve(&mut self, additional: usize) -> Result<(), FifoError> {
        let needed = self.entries.len() + additional;
        let mut capacity = self.entries.capacity();
        if needed <= capacity {
            return Ok(());
        }
        while capacity < needed {
            capacity = capacity.max(1) * 2;
        }
        self.entries
            .try_reserve_exact(capacity - self.entries.len())
            .map_err(|_| FifoError::OutOfMemory(capacity))
    }

    /// Append a packet; the payload is referenced, not copied
    pub fn push(&mut self, header: PacketHeader, payload: Option<&Buffer>) -> Result<(), FifoError> {
        self.reserve(1)?;
        self.entries.push_back(FifoEntry {
            header,
            payload: payload.cloned(),
        });
        Ok(())
    }

    /// Remove and return the oldest entry
    pub fn pop(&mut self) -> Result<FifoEntry, FifoError> {
        self.entries.pop_front().ok_or(FifoError::Empty)
    }

    /// New view of the oldest entry, leaving it queued
    pub fn peek(&self) -> Result<FifoEntry, FifoError> {
        self.entries.front().cloned().ok_or(FifoError::Empty)
    }

    /// Iterate entries oldest first
    pub fn iter(&self) -> impl Iterator<Item = &FifoEntry> {
        self.entries.iter()
    }

    /// Append views of every entry of `src`; `src` is left unchanged
    pub fn copy_from(&mut self, src: &PacketFifo) -> Result<(), FifoError> {
        self.reserve(src.len())?;
        self.entries.extend(src.entries.iter().cloned());
        Ok(())
    }

    /// Append every entry of `src`, leaving `src` empty
    pub fn move_from(&mut self, src: &mut PacketFifo) -> Result<(), FifoError> {
        self.reserve(src.len())?;
        self.entries.append(&mut src.entries);
        Ok(())
    }

    /// Discard the newest entries
    ///
    /// With `count == 0` the queue is scanned from the oldest entry,
    /// accumulating [`FifoEntry::size`]; the entry at which the running total
    /// first exceeds `size_ceiling` and everything after it are released. If
    /// the total never exceeds the ceiling nothing is removed.
    ///
    /// With `count > 0` the newest `count` entries are released.
    ///
    /// Returns the number of entries removed.
    pub fn drop_tail(&mut self, count: usize, size_ceiling: usize) -> Result<usize, FifoError> {
        let len = self.entries.len();
        let keep = if count == 0 {
            let mut total = 0usize;
            self.entries
                .iter()
                .position(|entry| {
                    total = total.saturating_add(entry.size());
                    total > size_ceiling
                })
                .unwrap_or(len)
        } else {
            len.checked_sub(count)
                .ok_or(FifoError::CountExceedsLength { count, len })?
        };

        self.entries.truncate(keep);
        trace!(removed = len - keep, kept = keep, "dropped FIFO tail");
        Ok(len - keep)
    }

    /// Per-entry overhead plus payload lengths
    pub fn size_estimate(&self) -> usize {
        self.entries.iter().map(FifoEntry::size).sum()
    }

    /// Release every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
