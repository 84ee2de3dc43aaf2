//! AVT Packet Transport Core
//!
//! This crate implements the transport-independent core of AVT: shared
//! payload buffers, the packet FIFO, the wire header codec with pluggable
//! integrity tags, per-output sequencing, and the segmentation engine with its
//! receive-side reassembler.

pub mod buffer;
pub mod error;
pub mod fifo;
pub mod packet;
pub mod reassembly;
pub mod segment;
pub mod sequence;
pub mod tag;

pub use buffer::{Buffer, BufferError, BufferMut};
pub use error::ErrorKind;
pub use fifo::{FifoEntry, FifoError, PacketFifo};
pub use packet::{
    Compression, DataKind, EncodedHeader, FrameType, PacketError, PacketHeader, PacketKind,
    Rational, MAX_HEADER_SIZE, SESSION_STREAM_ID,
};
pub use reassembly::{Reassembled, Reassembler};
pub use segment::{HeadInfo, PacketSink, SegmentError, SegmentReport, Segmenter};
pub use sequence::{SeqNumber, SequenceState};
pub use tag::{DigestTag, IntegrityTag, ZeroTag, TAG_SIZE};
