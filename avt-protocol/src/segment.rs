//! Segmentation Engine
//!
//! Splits a payload larger than the sink's maximum payload size into a head
//! packet followed by a chain of generic segments. Each segment carries a
//! zero-copy view of its slice, a back-reference to the head's sequence
//! number and four bytes of the head header, so a receiver that loses the head
//! can rebuild it from any seven consecutive segments.

use crate::buffer::{Buffer, BufferError};
use crate::error::ErrorKind;
use crate::packet::{EncodedHeader, GenericSegment, PacketHeader};
use crate::sequence::SequenceState;
use crate::tag::IntegrityTag;
use thiserror::Error;
use tracing::{trace, warn};

/// Segmentation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SegmentError {
    #[error("Maximum payload size is zero")]
    ZeroMaxPayload,

    #[error("Payload of {0} bytes exceeds the 32-bit length field")]
    PayloadTooLarge(usize),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

impl SegmentError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SegmentError::ZeroMaxPayload | SegmentError::PayloadTooLarge(_) => {
                ErrorKind::InvalidArgument
            }
            SegmentError::Buffer(e) => e.kind(),
        }
    }
}

/// Destination of encoded packets
pub trait PacketSink {
    type Error: From<SegmentError>;

    /// Largest payload one packet may carry
    fn max_payload_len(&mut self) -> usize;

    fn send_packet(&mut self, header: &EncodedHeader, payload: Option<&Buffer>)
        -> Result<(), Self::Error>;
}

/// What the head packet needs to know about the split
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeadInfo {
    /// Sequence number assigned to the head packet
    pub seq: u32,
    /// Bytes carried by the head packet
    pub payload_length: u32,
    /// Length of the whole payload
    pub total_length: u32,
    pub segmented: bool,
}

/// Outcome of a successful [`Segmenter::send`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentReport {
    pub head_seq: u32,
    pub segments: u32,
}

/// Emits one logical payload as a head packet plus generic segments
pub struct Segmenter<'a> {
    seq: &'a SequenceState,
    tag: &'a dyn IntegrityTag,
}

impl<'a> Segmenter<'a> {
    pub fn new(seq: &'a SequenceState, tag: &'a dyn IntegrityTag) -> Self {
        Segmenter { seq, tag }
    }

    /// Send `payload` through `sink`
    ///
    /// `head` builds the head header from the sequence number and lengths
    /// chosen here. The chain stops at the first failed send and returns that
    /// error; packets already sent stay sent.
    pub fn send<S, F>(&self, sink: &mut S, payload: &Buffer, head: F) -> Result<SegmentReport, S::Error>
    where
        S: PacketSink,
        F: FnOnce(HeadInfo) -> PacketHeader,
    {
        let max = sink.max_payload_len();
        if max == 0 {
            return Err(SegmentError::ZeroMaxPayload.into());
        }

        let total = payload.len();
        let total_length =
            u32::try_from(total).map_err(|_| SegmentError::PayloadTooLarge(total))?;
        let head_len = total.min(max);

        let head_seq = self.seq.next();
        let header = head(HeadInfo {
            seq: head_seq,
            payload_length: head_len as u32,
            total_length,
            segmented: total > max,
        });
        let segment_of = header.kind();
        let stream_id = header.stream_id();
        let encoded = header.encode(self.tag);

        let view = payload.view(0, head_len).map_err(SegmentError::from)?;
        if let Err(e) = sink.send_packet(&encoded, Some(&view)) {
            warn!(seq = head_seq, kind = %segment_of, "head packet send failed");
            return Err(e);
        }
        drop(view);

        let mut report = SegmentReport {
            head_seq,
            segments: 0,
        };
        let mut offset = head_len;
        while offset < total {
            let len = (total - offset).min(max);
            let seq = self.seq.next();
            let segment = PacketHeader::GenericSegment(GenericSegment {
                segment_of,
                stream_id,
                seq,
                target_seq: head_seq,
                total_length,
                offset: offset as u32,
                length: len as u32,
                head_fragment: encoded.head_fragment(seq),
            });

            let view = payload.view(offset, len).map_err(SegmentError::from)?;
            if let Err(e) = sink.send_packet(&segment.encode(self.tag), Some(&view)) {
                warn!(seq, target_seq = head_seq, offset, "segment send failed, chain aborted");
                return Err(e);
            }
            trace!(seq, target_seq = head_seq, offset, len, "sent segment");

            offset += len;
            report.segments += 1;
        }

        Ok(report)
    }
}
