//! AVT sessions
//!
//! Sending and receiving on top of the packet core: an [`Output`] owns a
//! protocol and emits sequenced, tagged packets, a [`Session`] adds the
//! stream registry and the lifecycle packets, and an [`Input`] reads a
//! packet stream back.

pub mod error;
pub mod input;
pub mod output;
pub mod protocol;
pub mod session;
pub mod stream;

pub use error::{Error, Result};
pub use input::{Input, InputEvent, InputStats};
pub use output::{Output, OutputOptions};
pub use protocol::{NoopProtocol, Protocol, ReceivedPacket};
pub use session::Session;
pub use stream::{CodecId, MediaPacket, Stream, StreamRegistry};
