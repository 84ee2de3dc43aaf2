//! UDP backend
//!
//! One packet per datagram. A writer sends every packet to each of its
//! destinations; a reader receives datagrams on its bound address and serves
//! them through partial reads, so a packet can be consumed header first and
//! payload second. Reads never cross into the next datagram: once the
//! current one is used up they return 0 until [`IoBackend::end_packet`]
//! releases it.

use crate::backend::{Address, IoBackend, IoError, OpenMode};
use avt_protocol::{Buffer, BufferMut, MAX_HEADER_SIZE};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::io::{IoSlice, Read};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tracing::{debug, trace, warn};

/// Link MTU assumed when sizing payloads
pub const DEFAULT_MTU: usize = 1500;

const IPV4_UDP_OVERHEAD: usize = 20 + 8;
const IPV6_UDP_OVERHEAD: usize = 40 + 8;
const MAX_DATAGRAM: usize = 65536;

pub struct UdpIo {
    inner: Socket,
    destinations: Vec<SocketAddr>,
    max_payload: usize,
    datagram: Vec<u8>,
    /// Unread bytes of the last datagram are `datagram[pos..len]`
    pos: usize,
    len: usize,
    /// A datagram is being consumed and has not been released yet
    current: bool,
    sent: u64,
}

impl UdpIo {
    /// Bind to `addr` for reading, or to an ephemeral port with `addr` as the
    /// first destination for writing
    pub fn open(addr: SocketAddr, mode: OpenMode) -> Result<Self, IoError> {
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;

        let (bind, destinations) = match mode {
            OpenMode::Read => (addr, Vec::new()),
            OpenMode::Write => {
                let any = if addr.is_ipv4() {
                    SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0))
                } else {
                    SocketAddr::from((Ipv6Addr::UNSPECIFIED, 0))
                };
                (any, vec![addr])
            }
        };
        socket.bind(&bind.into())?;

        let overhead = if addr.is_ipv4() {
            IPV4_UDP_OVERHEAD
        } else {
            IPV6_UDP_OVERHEAD
        };
        let max_payload = DEFAULT_MTU - overhead - MAX_HEADER_SIZE;
        debug!(%bind, ?mode, max_payload, "opened UDP socket");

        Ok(UdpIo {
            inner: socket,
            destinations,
            max_payload,
            datagram: Vec::new(),
            pos: 0,
            len: 0,
            current: false,
            sent: 0,
        })
    }

    /// Get the local address this socket is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, IoError> {
        let addr = self.inner.local_addr()?;
        addr.as_socket()
            .ok_or_else(|| IoError::InvalidAddress(format!("{:?}", addr)))
    }

    pub fn destinations(&self) -> &[SocketAddr] {
        &self.destinations
    }

    /// Set the receive buffer size
    pub fn set_recv_buffer_size(&self, size: usize) -> Result<(), IoError> {
        self.inner.set_recv_buffer_size(size)?;
        Ok(())
    }

    /// Block until a non-empty datagram arrives
    fn recv_datagram(&mut self) -> Result<(), IoError> {
        self.datagram.resize(MAX_DATAGRAM, 0);
        loop {
            let n = (&self.inner).read(&mut self.datagram)?;
            if n == 0 {
                trace!("skipped empty datagram");
                continue;
            }
            self.pos = 0;
            self.len = n;
            self.current = true;
            trace!(bytes = n, "received datagram");
            return Ok(());
        }
    }

    fn udp_addr(addr: &Address) -> Result<SocketAddr, IoError> {
        match addr {
            Address::Udp(addr) => Ok(*addr),
            other => Err(IoError::InvalidAddress(other.to_string())),
        }
    }
}

impl IoBackend for UdpIo {
    fn name(&self) -> &'static str {
        "udp"
    }

    fn max_payload_len(&self) -> usize {
        self.max_payload
    }

    /// Serve bytes from the current datagram, receiving one (blocking) if
    /// none is held
    fn read(&mut self, buf: &mut BufferMut, len: usize) -> Result<usize, IoError> {
        if len == 0 {
            return Ok(0);
        }
        if !self.current {
            self.recv_datagram()?;
        }

        let n = len.min(self.len - self.pos);
        buf.extend_from_slice(&self.datagram[self.pos..self.pos + n])?;
        self.pos += n;
        Ok(n)
    }

    fn end_packet(&mut self) -> usize {
        let dropped = self.len - self.pos;
        if dropped > 0 {
            debug!(bytes = dropped, "dropped unread datagram bytes");
        }
        self.pos = 0;
        self.len = 0;
        self.current = false;
        dropped
    }

    fn write(&mut self, header: &[u8], payload: Option<&Buffer>) -> Result<u64, IoError> {
        let body: &[u8] = payload.map(Buffer::as_slice).unwrap_or(&[]);
        let slices = [IoSlice::new(header), IoSlice::new(body)];
        let datagram_len = header.len() + body.len();

        for dest in &self.destinations {
            let sent = self
                .inner
                .send_to_vectored(&slices, &SockAddr::from(*dest))?;
            if sent != datagram_len {
                warn!(%dest, sent, expected = datagram_len, "short datagram write");
            }
            self.sent += sent as u64;
        }
        Ok(self.sent)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    fn add_destination(&mut self, addr: &Address) -> Result<(), IoError> {
        let addr = Self::udp_addr(addr)?;
        if !self.destinations.contains(&addr) {
            self.destinations.push(addr);
            debug!(%addr, "added destination");
        }
        Ok(())
    }

    fn remove_destination(&mut self, addr: &Address) -> Result<(), IoError> {
        let addr = Self::udp_addr(addr)?;
        let index = self
            .destinations
            .iter()
            .position(|d| *d == addr)
            .ok_or(IoError::UnknownDestination(addr))?;
        self.destinations.remove(index);
        debug!(%addr, "removed destination");
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), IoError> {
        debug!(bytes = self.sent, "closed UDP socket");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avt_protocol::ErrorKind;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn test_max_payload_fits_mtu() {
        let io = UdpIo::open(loopback(), OpenMode::Read).unwrap();
        assert_eq!(io.max_payload_len() + MAX_HEADER_SIZE + 28, DEFAULT_MTU);
    }

    #[test]
    fn test_send_recv_partial_reads() {
        let mut receiver = UdpIo::open(loopback(), OpenMode::Read).unwrap();
        let target = receiver.local_addr().unwrap();
        let mut sender = UdpIo::open(target, OpenMode::Write).unwrap();

        let payload = Buffer::from_vec(b"media bytes".to_vec());
        sender.write(b"HEADER", Some(&payload)).unwrap();

        let mut buf = BufferMut::with_capacity(64).unwrap();
        assert_eq!(receiver.read(&mut buf, 6).unwrap(), 6);
        assert_eq!(&buf[..], b"HEADER");
        assert_eq!(receiver.read(&mut buf, 64).unwrap(), 11);
        assert_eq!(&buf[6..], b"media bytes");
    }

    #[test]
    fn test_reads_stop_at_datagram_end() {
        let mut receiver = UdpIo::open(loopback(), OpenMode::Read).unwrap();
        let target = receiver.local_addr().unwrap();
        let mut sender = UdpIo::open(target, OpenMode::Write).unwrap();
        sender.write(b"first", None).unwrap();
        sender.write(b"second", None).unwrap();

        let mut buf = BufferMut::with_capacity(16).unwrap();
        assert_eq!(receiver.read(&mut buf, 16).unwrap(), 5);
        assert_eq!(receiver.read(&mut buf, 16).unwrap(), 0);
        assert_eq!(receiver.end_packet(), 0);

        let mut buf = BufferMut::with_capacity(16).unwrap();
        assert_eq!(receiver.read(&mut buf, 3).unwrap(), 3);
        assert_eq!(&buf[..], b"sec");
        assert_eq!(receiver.end_packet(), 3);
    }

    #[test]
    fn test_empty_datagram_skipped() {
        let mut receiver = UdpIo::open(loopback(), OpenMode::Read).unwrap();
        let target = receiver.local_addr().unwrap();
        let mut sender = UdpIo::open(target, OpenMode::Write).unwrap();
        sender.write(&[], None).unwrap();
        sender.write(b"after", None).unwrap();

        let mut buf = BufferMut::with_capacity(16).unwrap();
        assert_eq!(receiver.read(&mut buf, 16).unwrap(), 5);
        assert_eq!(&buf[..], b"after");
    }

    #[test]
    fn test_destination_fan_out() {
        let mut a = UdpIo::open(loopback(), OpenMode::Read).unwrap();
        let mut b = UdpIo::open(loopback(), OpenMode::Read).unwrap();
        let a_addr = Address::Udp(a.local_addr().unwrap());
        let b_addr = Address::Udp(b.local_addr().unwrap());

        let mut sender = UdpIo::open(a.local_addr().unwrap(), OpenMode::Write).unwrap();
        sender.add_destination(&b_addr).unwrap();
        sender.add_destination(&b_addr).unwrap();
        assert_eq!(sender.destinations().len(), 2);

        sender.write(b"both", None).unwrap();
        for io in [&mut a, &mut b] {
            let mut buf = BufferMut::with_capacity(8).unwrap();
            io.read(&mut buf, 8).unwrap();
            assert_eq!(&buf[..], b"both");
        }

        sender.remove_destination(&a_addr).unwrap();
        let err = sender.remove_destination(&a_addr).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(sender.destinations().len(), 1);
    }

    #[test]
    fn test_seek_not_supported() {
        let mut io = UdpIo::open(loopback(), OpenMode::Read).unwrap();
        assert_eq!(io.seek(0).unwrap_err().kind(), ErrorKind::NotSupported);
        let err = io.add_destination(&Address::Null).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    }
}
