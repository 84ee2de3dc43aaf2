//! Null backend: discards writes, reads nothing

use crate::backend::{IoBackend, IoError};
use avt_protocol::{Buffer, BufferMut};

/// Payload limit reported when none is configured
pub const DEFAULT_MAX_PAYLOAD: usize = 1372;

#[derive(Debug)]
pub struct NullIo {
    max_payload: usize,
    written: u64,
}

impl NullIo {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        NullIo {
            max_payload,
            written: 0,
        }
    }

    /// Bytes accepted so far
    pub fn bytes_written(&self) -> u64 {
        self.written
    }
}

impl Default for NullIo {
    fn default() -> Self {
        Self::new()
    }
}

impl IoBackend for NullIo {
    fn name(&self) -> &'static str {
        "null"
    }

    fn max_payload_len(&self) -> usize {
        self.max_payload
    }

    fn read(&mut self, _buf: &mut BufferMut, _len: usize) -> Result<usize, IoError> {
        Ok(0)
    }

    fn write(&mut self, header: &[u8], payload: Option<&Buffer>) -> Result<u64, IoError> {
        self.written += (header.len() + payload.map_or(0, Buffer::len)) as u64;
        Ok(self.written)
    }

    fn seek(&mut self, offset: u64) -> Result<u64, IoError> {
        Ok(offset)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        Ok(())
    }

    fn close(self: Box<Self>) -> Result<(), IoError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_discards() {
        let mut io = NullIo::with_max_payload(64);
        assert_eq!(io.max_payload_len(), 64);
        let payload = Buffer::from_vec(vec![0; 10]);
        assert_eq!(io.write(&[0; 36], Some(&payload)).unwrap(), 46);
        assert_eq!(io.bytes_written(), 46);

        let mut buf = BufferMut::with_capacity(8).unwrap();
        assert_eq!(io.read(&mut buf, 8).unwrap(), 0);
        assert!(buf.is_empty());
    }
}
