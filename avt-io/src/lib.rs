//! AVT I/O Backends
//!
//! This crate provides the lowest layer of the stack: a uniform
//! [`IoBackend`] trait over byte- and datagram-oriented carriers, with file,
//! UDP and null implementations, plus address parsing and clock helpers.

pub mod backend;
pub mod file;
pub mod null;
pub mod socket;
pub mod time;

pub use backend::{open, Address, IoBackend, IoError, OpenMode};
pub use file::FileIo;
pub use null::NullIo;
pub use socket::UdpIo;
