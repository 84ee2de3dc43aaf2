//! Session error type

use avt_io::IoError;
use avt_protocol::{BufferError, ErrorKind, FifoError, PacketError, SegmentError};
use thiserror::Error;

/// Errors returned by outputs, sessions and inputs
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),

    #[error("Segmentation error: {0}")]
    Segment(#[from] SegmentError),

    #[error("FIFO error: {0}")]
    Fifo(#[from] FifoError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Stream {0} is not registered")]
    UnknownStream(u16),

    #[error("Stream {0} is already registered")]
    DuplicateStream(u16),

    #[error("Stream id {0:#06x} is reserved for session-scoped packets")]
    ReservedStreamId(u16),

    #[error("Truncated packet: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(e) => e.kind(),
            Error::Packet(e) => e.kind(),
            Error::Segment(e) => e.kind(),
            Error::Fifo(e) => e.kind(),
            Error::Buffer(e) => e.kind(),
            Error::UnknownStream(_) | Error::DuplicateStream(_) | Error::ReservedStreamId(_) => {
                ErrorKind::InvalidArgument
            }
            Error::Truncated { .. } => ErrorKind::InvalidData,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
