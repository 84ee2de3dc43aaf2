//! Segment Reassembly
//!
//! Receive-side counterpart of the segmentation engine. Head packets and
//! generic segments are collected per head sequence number until every byte of
//! the payload is present. Segments arriving before their head are kept, and
//! the head-header fragments they carry are checked against the head once it
//! shows up. If the head is lost, seven segments with distinct `seq mod 7`
//! are enough to rebuild its protected bytes.

use crate::buffer::Buffer;
use crate::packet::{
    head_fragment_offset, GenericSegment, PacketError, PacketHeader, HEAD_FRAGMENT_COUNT,
    HEAD_FRAGMENT_SIZE, PROTECTED_SIZE,
};
use crate::sequence::SeqNumber;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, trace};

/// Default number of incomplete payloads kept before the oldest is evicted
pub const DEFAULT_MAX_PENDING: usize = 64;

/// A complete payload with its head header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reassembled {
    pub header: PacketHeader,
    pub payload: Buffer,
}

#[derive(Default)]
struct Pending {
    head: Option<(PacketHeader, [u8; PROTECTED_SIZE])>,
    total_length: Option<u32>,
    chunks: BTreeMap<u32, Buffer>,
    fragments: [Option<[u8; HEAD_FRAGMENT_SIZE]>; HEAD_FRAGMENT_COUNT as usize],
}

/// Collects segmented payloads keyed by head sequence number
pub struct Reassembler {
    pending: HashMap<u32, Pending>,
    max_pending: usize,
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

impl Reassembler {
    pub fn new(max_pending: usize) -> Self {
        Reassembler {
            pending: HashMap::new(),
            max_pending: max_pending.max(1),
        }
    }

    /// Number of incomplete payloads
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Feed one received packet
    ///
    /// Returns the completed payload when this packet supplies its last
    /// missing bytes. Packets that are neither segments nor segmented heads
    /// are returned as-is.
    pub fn push(
        &mut self,
        header_bytes: &[u8],
        payload: Buffer,
    ) -> Result<Option<Reassembled>, PacketError> {
        let header = PacketHeader::decode(header_bytes)?;
        if payload.len() != header.payload_len() {
            return Err(PacketError::InvalidField {
                field: "payload_length",
                value: payload.len() as u64,
            });
        }

        match header {
            PacketHeader::GenericSegment(segment) => self.push_segment(segment, payload),
            head if head.is_segmented() => {
                let mut protected = [0u8; PROTECTED_SIZE];
                protected.copy_from_slice(&header_bytes[..PROTECTED_SIZE]);
                self.push_head(head, protected, payload)
            }
            header => Ok(Some(Reassembled { header, payload })),
        }
    }

    fn push_segment(
        &mut self,
        segment: GenericSegment,
        payload: Buffer,
    ) -> Result<Option<Reassembled>, PacketError> {
        let end = segment.offset as u64 + segment.length as u64;
        if segment.offset == 0 || end > segment.total_length as u64 {
            return Err(PacketError::SegmentOutOfRange {
                offset: segment.offset,
                length: segment.length,
                total: segment.total_length,
            });
        }

        let target = segment.target_seq;
        let pending = self.entry(target);
        if let Some(head) = pending.chunks.get(&0) {
            if head.len() as u64 > segment.total_length as u64 {
                return Err(PacketError::SegmentOutOfRange {
                    offset: 0,
                    length: head.len() as u32,
                    total: segment.total_length,
                });
            }
        }
        match pending.total_length {
            Some(total) if total != segment.total_length => {
                return Err(PacketError::InvalidField {
                    field: "total_length",
                    value: segment.total_length as u64,
                });
            }
            _ => pending.total_length = Some(segment.total_length),
        }

        if let Some((_, protected)) = &pending.head {
            let at = head_fragment_offset(segment.seq);
            if protected[at..at + HEAD_FRAGMENT_SIZE] != segment.head_fragment {
                return Err(PacketError::HeadMismatch { target_seq: target });
            }
        }

        pending.fragments[(segment.seq % HEAD_FRAGMENT_COUNT) as usize] =
            Some(segment.head_fragment);
        pending.chunks.insert(segment.offset, payload);
        trace!(seq = segment.seq, target_seq = target, offset = segment.offset, "segment queued");

        Ok(self.try_complete(target))
    }

    fn push_head(
        &mut self,
        head: PacketHeader,
        protected: [u8; PROTECTED_SIZE],
        payload: Buffer,
    ) -> Result<Option<Reassembled>, PacketError> {
        let seq = head.seq();
        let pending = self.entry(seq);

        // a head longer than the whole payload can never complete
        if let Some(total) = pending.total_length {
            if payload.len() as u64 > total as u64 {
                return Err(PacketError::SegmentOutOfRange {
                    offset: 0,
                    length: payload.len() as u32,
                    total,
                });
            }
        }

        for (slot, fragment) in pending.fragments.iter().enumerate() {
            if let Some(fragment) = fragment {
                let at = slot * HEAD_FRAGMENT_SIZE;
                if protected[at..at + HEAD_FRAGMENT_SIZE] != fragment[..] {
                    return Err(PacketError::HeadMismatch { target_seq: seq });
                }
            }
        }

        pending.chunks.insert(0, payload);
        pending.head = Some((head, protected));
        Ok(self.try_complete(seq))
    }

    /// Rebuild a lost head header from the fragments its segments carried
    ///
    /// Returns `Ok(None)` until segments covering all seven fragment slots
    /// have arrived.
    pub fn recover_head(&self, target_seq: u32) -> Result<Option<PacketHeader>, PacketError> {
        let Some(pending) = self.pending.get(&target_seq) else {
            return Ok(None);
        };
        if let Some((head, _)) = &pending.head {
            return Ok(Some(head.clone()));
        }

        let mut protected = [0u8; PROTECTED_SIZE];
        for (slot, fragment) in pending.fragments.iter().enumerate() {
            match fragment {
                Some(fragment) => {
                    let at = slot * HEAD_FRAGMENT_SIZE;
                    protected[at..at + HEAD_FRAGMENT_SIZE].copy_from_slice(fragment);
                }
                None => return Ok(None),
            }
        }

        let head = PacketHeader::decode_protected(&protected)?;
        if head.seq() != target_seq {
            return Err(PacketError::HeadMismatch { target_seq });
        }
        Ok(Some(head))
    }

    /// Forget an incomplete payload
    pub fn discard(&mut self, target_seq: u32) -> bool {
        self.pending.remove(&target_seq).is_some()
    }

    fn entry(&mut self, key: u32) -> &mut Pending {
        if !self.pending.contains_key(&key) && self.pending.len() >= self.max_pending {
            let newest = SeqNumber::new(key);
            let oldest = self
                .pending
                .keys()
                .copied()
                .max_by_key(|&k| SeqNumber::new(k).distance_to(newest));
            if let Some(oldest) = oldest {
                debug!(target_seq = oldest, "evicting incomplete payload");
                self.pending.remove(&oldest);
            }
        }
        self.pending.entry(key).or_default()
    }

    fn try_complete(&mut self, key: u32) -> Option<Reassembled> {
        let pending = self.pending.get(&key)?;
        let total = pending.total_length?;
        pending.head.as_ref()?;

        let mut expected = 0u64;
        for (&offset, chunk) in &pending.chunks {
            if offset as u64 != expected {
                return None;
            }
            expected += chunk.len() as u64;
        }
        if expected != total as u64 {
            return None;
        }

        let pending = self.pending.remove(&key)?;
        let (header, _) = pending.head?;
        let mut data = Vec::with_capacity(total as usize);
        for chunk in pending.chunks.values() {
            data.extend_from_slice(chunk);
        }
        debug!(seq = key, bytes = total, "payload reassembled");

        Some(Reassembled {
            header,
            payload: Buffer::from_vec(data),
        })
    }
}
