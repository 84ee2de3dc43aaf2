//! File backend
//!
//! Packets are appended back to back with no extra framing. Reads and writes
//! keep independent positions, so a file opened for writing can be read back
//! through the same handle.

use crate::backend::{IoBackend, IoError, OpenMode};
use avt_protocol::{Buffer, BufferMut};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tracing::{debug, trace};

#[derive(Debug)]
pub struct FileIo {
    file: File,
    mode: OpenMode,
    rpos: u64,
    wpos: u64,
    /// Whether the OS file position currently sits at `wpos`
    writing: bool,
}

impl FileIo {
    /// Open `path`; write mode creates or truncates it
    pub fn open(path: &Path, mode: OpenMode) -> Result<Self, IoError> {
        let file = match mode {
            OpenMode::Write => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(true)
                .open(path)?,
            OpenMode::Read => File::open(path)?,
        };
        debug!(path = %path.display(), ?mode, "opened file");

        Ok(FileIo {
            file,
            mode,
            rpos: 0,
            wpos: 0,
            writing: false,
        })
    }

    /// Offset of the next read
    pub fn read_position(&self) -> u64 {
        self.rpos
    }

    /// Offset of the next write
    pub fn write_position(&self) -> u64 {
        self.wpos
    }
}

impl IoBackend for FileIo {
    fn name(&self) -> &'static str {
        "file"
    }

    fn max_payload_len(&self) -> usize {
        u32::MAX as usize
    }

    fn read(&mut self, buf: &mut BufferMut, len: usize) -> Result<usize, IoError> {
        if self.writing {
            self.file.seek(SeekFrom::Start(self.rpos))?;
            self.writing = false;
        }

        let start = buf.len();
        let end = start.saturating_add(len);
        buf.grow(end)?;

        let mut filled = 0;
        while start + filled < end {
            match self.file.read(&mut buf[start + filled..end]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    buf.truncate(start);
                    return Err(e.into());
                }
            }
        }

        buf.truncate(start + filled);
        self.rpos += filled as u64;
        Ok(filled)
    }

    fn write(&mut self, header: &[u8], payload: Option<&Buffer>) -> Result<u64, IoError> {
        if !self.writing {
            self.file.seek(SeekFrom::Start(self.wpos))?;
            self.writing = true;
        }

        self.file.write_all(header)?;
        let mut written = header.len();
        if let Some(payload) = payload {
            self.file.write_all(payload)?;
            written += payload.len();
        }

        self.wpos += written as u64;
        trace!(bytes = written, offset = self.wpos, "file write");
        Ok(self.wpos)
    }

    /// Move the read position
    fn seek(&mut self, offset: u64) -> Result<u64, IoError> {
        self.rpos = self.file.seek(SeekFrom::Start(offset))?;
        self.writing = false;
        Ok(self.rpos)
    }

    fn flush(&mut self) -> Result<(), IoError> {
        self.file.flush()?;
        Ok(())
    }

    fn close(mut self: Box<Self>) -> Result<(), IoError> {
        self.file.flush()?;
        if self.mode == OpenMode::Write {
            self.file.sync_data()?;
        }
        debug!(bytes = self.wpos, "closed file");
        Ok(())
    }
}
