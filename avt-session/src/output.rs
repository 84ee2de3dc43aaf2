//! Packet emission
//!
//! An [`Output`] owns the protocol stack, the sequence counter and the
//! integrity tag function. Every packet it emits consumes exactly one sequence
//! number. The protocol is locked for the whole of a segmented send, so the
//! head and its segments go out back to back and in sequence order even when
//! several threads share one output.

use crate::error::{Error, Result};
use crate::protocol::{NoopProtocol, Protocol};
use crate::stream::MediaPacket;
use avt_io::{Address, OpenMode};
use avt_protocol::packet::{EndOfStream, GenericData, SessionStart, StreamData, TimeSync};
use avt_protocol::{
    Buffer, DataKind, EncodedHeader, FifoError, HeadInfo, IntegrityTag, PacketFifo, PacketHeader,
    PacketSink, SegmentReport, Segmenter, SequenceState, ZeroTag, SESSION_STREAM_ID,
};
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Output configuration
#[derive(Clone)]
pub struct OutputOptions {
    /// Announced in the session-start packet (at most 15 bytes are sent)
    pub producer_name: String,
    pub producer_version: (u8, u8, u8),
    /// Cap on the payload bytes per packet, below the backend's own limit
    pub max_payload: Option<usize>,
    pub tag: Arc<dyn IntegrityTag>,
}

impl Default for OutputOptions {
    fn default() -> Self {
        OutputOptions {
            producer_name: "avt-rust".to_string(),
            producer_version: (
                env!("CARGO_PKG_VERSION_MAJOR").parse().unwrap_or(0),
                env!("CARGO_PKG_VERSION_MINOR").parse().unwrap_or(0),
                env!("CARGO_PKG_VERSION_PATCH").parse().unwrap_or(0),
            ),
            max_payload: None,
            tag: Arc::new(ZeroTag),
        }
    }
}

impl fmt::Debug for OutputOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputOptions")
            .field("producer_name", &self.producer_name)
            .field("producer_version", &self.producer_version)
            .field("max_payload", &self.max_payload)
            .finish_non_exhaustive()
    }
}

/// Segmenter sink over a locked protocol
struct ProtocolSink<'a> {
    protocol: MutexGuard<'a, Box<dyn Protocol>>,
    max_payload: Option<usize>,
}

impl PacketSink for ProtocolSink<'_> {
    type Error = Error;

    fn max_payload_len(&mut self) -> usize {
        let limit = self.protocol.max_payload_len();
        self.max_payload.map_or(limit, |cap| cap.min(limit))
    }

    fn send_packet(&mut self, header: &EncodedHeader, payload: Option<&Buffer>) -> Result<()> {
        self.protocol.send(header, payload).map(|_| ())
    }
}

/// Sending side of a session
pub struct Output {
    protocol: Mutex<Box<dyn Protocol>>,
    seq: SequenceState,
    tag: Arc<dyn IntegrityTag>,
    max_payload: Option<usize>,
}

impl Output {
    /// Open `address` through the no-op protocol and emit session-start
    pub fn open(address: &Address, options: OutputOptions) -> Result<Self> {
        let protocol = NoopProtocol::open(address, OpenMode::Write)?;
        Self::with_protocol(Box::new(protocol), options)
    }

    /// Wrap an already opened protocol and emit session-start
    ///
    /// If session-start cannot be sent the protocol is closed and the send
    /// error returned.
    pub fn with_protocol(protocol: Box<dyn Protocol>, options: OutputOptions) -> Result<Self> {
        let output = Output {
            protocol: Mutex::new(protocol),
            seq: SequenceState::new(),
            tag: options.tag.clone(),
            max_payload: options.max_payload,
        };

        let (major, minor, micro) = options.producer_version;
        let started = output.emit(|seq| {
            PacketHeader::SessionStart(SessionStart {
                seq,
                session_flags: 0,
                producer_major: major,
                producer_minor: minor,
                producer_micro: micro,
                producer_name: options.producer_name.clone(),
            })
        });

        if let Err(e) = started {
            warn!(error = %e, "session start failed, closing backend");
            if let Err(close_err) = output.protocol.into_inner().close() {
                warn!(error = %close_err, "close after failed session start");
            }
            return Err(e);
        }

        debug!(producer = %options.producer_name, "output opened");
        Ok(output)
    }

    /// Sequence state shared by everything this output emits
    pub fn sequence(&self) -> &SequenceState {
        &self.seq
    }

    /// Epoch set by the last [`time_sync`](Self::time_sync), 0 before that
    pub fn epoch(&self) -> u64 {
        self.seq.epoch()
    }

    /// Effective payload limit per packet
    pub fn max_payload_len(&self) -> usize {
        let limit = self.protocol.lock().max_payload_len();
        self.max_payload.map_or(limit, |cap| cap.min(limit))
    }

    /// Emit a packet without payload
    ///
    /// `build` receives the packet's sequence number; returns that number.
    pub fn emit<F>(&self, build: F) -> Result<u32>
    where
        F: FnOnce(u32) -> PacketHeader,
    {
        let mut protocol = self.protocol.lock();
        let seq = self.seq.next();
        let header = build(seq);
        protocol.send(&header.encode(self.tag.as_ref()), None)?;
        trace!(kind = %header.kind(), seq, "emitted packet");
        Ok(seq)
    }

    /// Emit a payload, segmenting it if it exceeds the payload limit
    pub fn emit_payload<F>(&self, payload: &Buffer, head: F) -> Result<SegmentReport>
    where
        F: FnOnce(HeadInfo) -> PacketHeader,
    {
        let mut sink = ProtocolSink {
            protocol: self.protocol.lock(),
            max_payload: self.max_payload,
        };
        Segmenter::new(&self.seq, self.tag.as_ref()).send(&mut sink, payload, head)
    }

    /// Announce `epoch` with a time-sync packet; it is stored once sent
    pub fn time_sync(&self, epoch: u64) -> Result<()> {
        self.emit(|seq| {
            PacketHeader::TimeSync(TimeSync {
                seq,
                epoch,
                ..TimeSync::default()
            })
        })?;
        self.seq.set_epoch(epoch);
        debug!(epoch, "time sync sent");
        Ok(())
    }

    /// Send one media frame on `stream_id`
    pub fn write_stream_data(&self, stream_id: u16, packet: &MediaPacket) -> Result<SegmentReport> {
        self.emit_payload(&packet.data, |info| {
            PacketHeader::StreamData(StreamData {
                stream_id,
                seq: info.seq,
                frame_type: packet.frame_type,
                segmented: info.segmented,
                fec_group: false,
                field_id: false,
                compression: packet.compression,
                pts: packet.pts,
                duration: packet.duration,
                data_length: info.payload_length,
            })
        })
    }

    /// Send an auxiliary payload (init data, ICC profile, LUT, user data)
    pub fn write_generic(&self, kind: DataKind, stream_id: u16, data: &Buffer) -> Result<SegmentReport> {
        self.emit_payload(data, |info| {
            PacketHeader::GenericData(GenericData {
                kind,
                stream_id,
                seq: info.seq,
                payload_length: info.payload_length,
                total_length: info.total_length,
            })
        })
    }

    /// Send application data; `flags` fill the descriptor's low byte
    pub fn write_user_data(&self, data: &Buffer, flags: u8, user_id: u16) -> Result<SegmentReport> {
        self.write_generic(DataKind::UserData { flags }, user_id, data)
    }

    /// Emit end-of-stream for one stream, or the whole session with
    /// [`SESSION_STREAM_ID`]
    pub fn end_of_stream(&self, stream_id: u16) -> Result<u32> {
        self.emit(|seq| PacketHeader::EndOfStream(EndOfStream { stream_id, seq }))
    }

    /// Send every queued packet in order
    ///
    /// Entries are removed only once sent; on failure the failed entry and
    /// everything after it stay queued. Returns the number of packets sent.
    pub fn send_queue(&self, fifo: &mut PacketFifo) -> Result<usize> {
        let mut protocol = self.protocol.lock();
        let mut sent = 0;
        loop {
            let entry = match fifo.peek() {
                Ok(entry) => entry,
                Err(FifoError::Empty) => break,
                Err(e) => return Err(e.into()),
            };
            protocol.send(&entry.header.encode(self.tag.as_ref()), entry.payload.as_ref())?;
            fifo.pop()?;
            sent += 1;
        }
        trace!(sent, "queue flushed");
        Ok(sent)
    }

    pub fn add_destination(&self, addr: &Address) -> Result<()> {
        self.protocol.lock().add_destination(addr)
    }

    pub fn remove_destination(&self, addr: &Address) -> Result<()> {
        self.protocol.lock().remove_destination(addr)
    }

    pub fn seek(&self, offset: u64) -> Result<u64> {
        self.protocol.lock().seek(offset)
    }

    pub fn flush(&self) -> Result<()> {
        self.protocol.lock().flush()
    }

    /// Emit broadcast end-of-stream, then close the protocol
    ///
    /// The protocol is closed even if the end-of-stream send fails; that
    /// failure is reported in preference to a close failure.
    pub fn close(self) -> Result<()> {
        let eos = self.end_of_stream(SESSION_STREAM_ID);
        if let Err(e) = &eos {
            warn!(error = %e, "broadcast end-of-stream failed");
        }
        let closed = self.protocol.into_inner().close();
        debug!(packets = self.seq.peek(), "output closed");

        match (eos, closed) {
            (Err(e), _) => Err(e),
            (Ok(_), closed) => closed,
        }
    }
}
