//! AVT - timestamped media packet transport
//!
//! High-level Rust API over the AVT packet core, I/O backends and sessions.

pub use avt_io as io;
pub use avt_protocol as protocol;
pub use avt_session as session;

// Re-export commonly used types
pub use io::Address;
pub use protocol::{Buffer, DigestTag, IntegrityTag, PacketHeader, PacketKind, ZeroTag};
pub use session::{CodecId, Input, InputEvent, MediaPacket, Output, OutputOptions, Session, Stream};
