//! Error classification shared by every layer of the stack

use std::fmt;

/// Broad category of a failure
///
/// Each crate defines its own error enum; `kind()` maps every variant onto one
/// of these so callers can branch on the category without matching on the
/// concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Allocation failed
    OutOfMemory,
    /// Bad range, unknown stream id, count larger than the queue, arithmetic overflow
    InvalidArgument,
    /// Backend lacks an optional capability
    NotSupported,
    /// Nothing to return (empty queue)
    NotFound,
    /// Operation not allowed in the current state (growing a shared buffer)
    InvalidState,
    /// Malformed or corrupted wire data
    InvalidData,
    /// Failure reported by the underlying transport
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::OutOfMemory => "out of memory",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::NotSupported => "not supported",
            ErrorKind::NotFound => "not found",
            ErrorKind::InvalidState => "invalid state",
            ErrorKind::InvalidData => "invalid data",
            ErrorKind::Io => "I/O failure",
        };
        f.write_str(name)
    }
}
