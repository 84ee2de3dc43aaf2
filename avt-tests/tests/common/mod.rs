//! Shared in-memory wire for cross-crate tests

#![allow(dead_code)]

use avt_io::{IoBackend, IoError};
use avt_protocol::{Buffer, BufferMut, PacketHeader};
use avt_session::{NoopProtocol, Protocol};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;

/// One packet as written: header bytes and payload bytes
pub type WirePacket = (Vec<u8>, Vec<u8>);

#[derive(Default)]
struct WireState {
    packets: Vec<WirePacket>,
    fail_after: Option<usize>,
}

/// Records every packet an output writes
#[derive(Clone)]
pub struct Wire {
    state: Arc<Mutex<WireState>>,
    max_payload: usize,
}

impl Wire {
    pub fn new(max_payload: usize) -> Self {
        Wire {
            state: Arc::default(),
            max_payload,
        }
    }

    /// Refuse every write once `writes` packets have been recorded
    pub fn fail_after(&self, writes: usize) {
        self.state.lock().fail_after = Some(writes);
    }

    /// Protocol writing into this wire
    pub fn protocol(&self) -> Box<dyn Protocol> {
        Box::new(NoopProtocol::new(Box::new(WireIo { wire: self.clone() })))
    }

    pub fn packets(&self) -> Vec<WirePacket> {
        self.state.lock().packets.clone()
    }

    pub fn headers(&self) -> Vec<PacketHeader> {
        self.packets()
            .iter()
            .map(|(header, _)| PacketHeader::decode(header).unwrap())
            .collect()
    }

    /// Protocol replaying the recorded packets accepted by `keep`
    pub fn replay(&self, keep: impl Fn(usize) -> bool) -> Box<dyn Protocol> {
        let mut data = Vec::new();
        for (i, (header, payload)) in self.packets().into_iter().enumerate() {
            if keep(i) {
                data.extend_from_slice(&header);
                data.extend_from_slice(&payload);
            }
        }
        Box::new(NoopProtocol::new(Box::new(Replay { data, pos: 0 })))
    }
}

struct WireIo {
    wire: Wire,
}

impl IoBackend for WireIo {
    fn name(&self) -> &'static str {
        "wire"
    }

    fn max_payload_len(&self) -> usize {
        self.wire.max_payload
    }

    fn read(&mut self, _buf: &mut BufferMut, _len: usize) -> Result<usize, IoError> {
        Err(IoError::NotSupported("read"))
    }

    fn write(&mut self, header: &[u8], payload: Option<&Buffer>) -> Result<u64, IoError> {
        let mut state = self.wire.state.lock();
        if state.fail_after.is_some_and(|limit| state.packets.len() >= limit) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "wire closed").into());
        }
        let payload = payload.map(Buffer::to_vec).unwrap_or_default();
        state.packets.push((header.to_vec(), payload));
        Ok(state.packets.len() as u64)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), IoError> {
        Ok(())
    }
}

struct Replay {
    data: Vec<u8>,
    pos: usize,
}

impl IoBackend for Replay {
    fn name(&self) -> &'static str {
        "replay"
    }

    fn max_payload_len(&self) -> usize {
        usize::MAX
    }

    fn read(&mut self, buf: &mut BufferMut, len: usize) -> Result<usize, IoError> {
        let n = len.min(self.data.len() - self.pos);
        buf.extend_from_slice(&self.data[self.pos..self.pos + n])?;
        self.pos += n;
        Ok(n)
    }

    fn write(&mut self, _header: &[u8], _payload: Option<&Buffer>) -> Result<u64, IoError> {
        Err(IoError::NotSupported("write"))
    }

    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), IoError> {
        Ok(())
    }
}
