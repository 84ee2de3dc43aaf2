//! Protocol backends
//!
//! A protocol sits between the session and an I/O backend. The no-op
//! protocol forwards packets unchanged: on the wire a stream is a plain
//! sequence of self-describing packets.

use crate::error::{Error, Result};
use avt_io::{Address, IoBackend, OpenMode};
use avt_protocol::{
    Buffer, BufferMut, EncodedHeader, PacketError, PacketHeader, PacketKind, MAX_HEADER_SIZE,
};
use bytes::Bytes;
use tracing::{debug, trace};

/// Largest single read while filling a payload; lengths come off the wire,
/// so memory only grows with bytes actually received
const READ_CHUNK: usize = 64 * 1024;

/// One packet read back from a protocol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedPacket {
    pub header: PacketHeader,
    /// Header exactly as received, tags included
    pub header_bytes: Bytes,
    pub payload: Option<Buffer>,
}

pub trait Protocol: Send {
    fn name(&self) -> &'static str;

    fn max_payload_len(&self) -> usize;

    /// Send one packet; returns the backend's write offset afterwards
    fn send(&mut self, header: &EncodedHeader, payload: Option<&Buffer>) -> Result<u64>;

    /// Read the next packet, or `None` at end of input
    fn receive(&mut self) -> Result<Option<ReceivedPacket>>;

    fn add_destination(&mut self, addr: &Address) -> Result<()>;

    fn remove_destination(&mut self, addr: &Address) -> Result<()>;

    fn seek(&mut self, offset: u64) -> Result<u64>;

    fn flush(&mut self) -> Result<()>;

    fn close(self: Box<Self>) -> Result<()>;
}

/// Pass-through protocol
pub struct NoopProtocol {
    io: Box<dyn IoBackend>,
}

impl NoopProtocol {
    pub fn new(io: Box<dyn IoBackend>) -> Self {
        NoopProtocol { io }
    }

    /// Open the I/O backend for `address` and wrap it
    pub fn open(address: &Address, mode: OpenMode) -> Result<Self> {
        Ok(Self::new(avt_io::open(address, mode)?))
    }

    /// Read until `buf` holds `target` bytes or the input ends
    fn fill(&mut self, buf: &mut BufferMut, target: usize) -> Result<usize> {
        while buf.len() < target {
            let want = (target - buf.len()).min(READ_CHUNK);
            let n = self.io.read(buf, want)?;
            if n == 0 {
                break;
            }
        }
        Ok(buf.len())
    }

    fn read_packet(&mut self) -> Result<Option<ReceivedPacket>> {
        let mut head = BufferMut::with_capacity(MAX_HEADER_SIZE)?;
        match self.fill(&mut head, 2)? {
            0 => return Ok(None),
            1 => {
                return Err(Error::Truncated {
                    expected: 2,
                    actual: 1,
                })
            }
            _ => {}
        }

        let descriptor = u16::from_be_bytes([head[0], head[1]]);
        let kind = PacketKind::from_descriptor(descriptor)
            .ok_or(PacketError::UnknownDescriptor(descriptor))?;
        let header_len = kind.header_len();
        let got = self.fill(&mut head, header_len)?;
        if got < header_len {
            return Err(Error::Truncated {
                expected: header_len,
                actual: got,
            });
        }

        let header = PacketHeader::decode(&head)?;
        let payload_len = header.payload_len();
        let payload = if payload_len > 0 {
            let mut body = BufferMut::with_capacity(payload_len.min(READ_CHUNK))?;
            let got = self.fill(&mut body, payload_len)?;
            if got < payload_len {
                return Err(Error::Truncated {
                    expected: payload_len,
                    actual: got,
                });
            }
            Some(body.freeze())
        } else {
            None
        };

        trace!(kind = %kind, seq = header.seq(), payload_len, "received packet");
        Ok(Some(ReceivedPacket {
            header,
            header_bytes: Bytes::copy_from_slice(&head),
            payload,
        }))
    }
}

impl Protocol for NoopProtocol {
    fn name(&self) -> &'static str {
        "noop"
    }

    fn max_payload_len(&self) -> usize {
        self.io.max_payload_len()
    }

    fn send(&mut self, header: &EncodedHeader, payload: Option<&Buffer>) -> Result<u64> {
        Ok(self.io.write(header.as_bytes(), payload)?)
    }

    /// Read one packet; on datagram carriers the rest of its datagram is
    /// discarded whether or not the packet was complete
    fn receive(&mut self) -> Result<Option<ReceivedPacket>> {
        let packet = self.read_packet();
        self.io.end_packet();
        packet
    }

    fn add_destination(&mut self, addr: &Address) -> Result<()> {
        Ok(self.io.add_destination(addr)?)
    }

    fn remove_destination(&mut self, addr: &Address) -> Result<()> {
        Ok(self.io.remove_destination(addr)?)
    }

    fn seek(&mut self, offset: u64) -> Result<u64> {
        Ok(self.io.seek(offset)?)
    }

    fn flush(&mut self) -> Result<()> {
        Ok(self.io.flush()?)
    }

    fn close(self: Box<Self>) -> Result<()> {
        debug!(backend = self.io.name(), "closing protocol");
        Ok(self.io.close()?)
    }
}
