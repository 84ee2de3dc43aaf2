//! Backend trait and addressing
//!
//! Every carrier exposes the same capability set. Optional capabilities
//! (destination fan-out, seeking) default to [`IoError::NotSupported`].

use crate::file::FileIo;
use crate::null::NullIo;
use crate::socket::UdpIo;
use avt_protocol::{Buffer, BufferError, BufferMut, ErrorKind};
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// I/O errors
#[derive(Error, Debug)]
pub enum IoError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Operation not supported by {0} backend")]
    NotSupported(&'static str),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Unknown destination: {0}")]
    UnknownDestination(SocketAddr),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),
}

impl IoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IoError::Io(_) => ErrorKind::Io,
            IoError::NotSupported(_) => ErrorKind::NotSupported,
            IoError::InvalidAddress(_) => ErrorKind::InvalidArgument,
            IoError::UnknownDestination(_) => ErrorKind::NotFound,
            IoError::Buffer(e) => e.kind(),
        }
    }

    /// Platform error code of an underlying I/O failure
    pub fn os_error(&self) -> Option<i32> {
        match self {
            IoError::Io(e) => e.raw_os_error(),
            _ => None,
        }
    }
}

/// Where a backend reads from or writes to
///
/// Textual forms: `file:<path>`, `udp://<ip>:<port>` and `null:`. UDP
/// addresses must be literal socket addresses; host names are not resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    File(PathBuf),
    Udp(SocketAddr),
    Null,
}

impl Address {
    pub fn parse(s: &str) -> Result<Self, IoError> {
        if let Some(path) = s.strip_prefix("file:") {
            if path.is_empty() {
                return Err(IoError::InvalidAddress(s.to_string()));
            }
            Ok(Address::File(PathBuf::from(path)))
        } else if let Some(addr) = s.strip_prefix("udp://") {
            addr.parse()
                .map(Address::Udp)
                .map_err(|_| IoError::InvalidAddress(s.to_string()))
        } else if s == "null:" {
            Ok(Address::Null)
        } else {
            Err(IoError::InvalidAddress(s.to_string()))
        }
    }
}

impl FromStr for Address {
    type Err = IoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Address::File(path) => write!(f, "file:{}", path.display()),
            Address::Udp(addr) => write!(f, "udp://{}", addr),
            Address::Null => f.write_str("null:"),
        }
    }
}

/// Direction a backend is opened for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
}

/// Lowest-level transport
pub trait IoBackend: Send {
    /// Short backend name used in logs and errors
    fn name(&self) -> &'static str;

    /// Largest payload that fits in one packet after the header
    fn max_payload_len(&self) -> usize;

    /// Append up to `len` bytes to `buf`
    ///
    /// Returns the number of bytes appended; 0 means end of input.
    fn read(&mut self, buf: &mut BufferMut, len: usize) -> Result<usize, IoError>;

    /// Finish reading the current packet
    ///
    /// Datagram carriers discard what is left of the current datagram so the
    /// next read starts on a new one. Returns the number of bytes discarded.
    fn end_packet(&mut self) -> usize {
        0
    }

    /// Write one packet: the encoded header followed by its payload
    ///
    /// Returns the backend's write offset after the packet.
    fn write(&mut self, header: &[u8], payload: Option<&Buffer>) -> Result<u64, IoError>;

    /// Reposition the backend; returns the new offset
    fn seek(&mut self, _offset: u64) -> Result<u64, IoError> {
        Err(IoError::NotSupported(self.name()))
    }

    fn flush(&mut self) -> Result<(), IoError>;

    fn add_destination(&mut self, _addr: &Address) -> Result<(), IoError> {
        Err(IoError::NotSupported(self.name()))
    }

    fn remove_destination(&mut self, _addr: &Address) -> Result<(), IoError> {
        Err(IoError::NotSupported(self.name()))
    }

    /// Release the carrier
    fn close(self: Box<Self>) -> Result<(), IoError>;
}

/// Open the backend matching `address`
pub fn open(address: &Address, mode: OpenMode) -> Result<Box<dyn IoBackend>, IoError> {
    let backend: Box<dyn IoBackend> = match address {
        Address::File(path) => Box::new(FileIo::open(path, mode)?),
        Address::Udp(addr) => Box::new(UdpIo::open(*addr, mode)?),
        Address::Null => Box::new(NullIo::new()),
    };
    debug!(backend = backend.name(), %address, ?mode, "opened I/O backend");
    Ok(backend)
}
