//! Receiving side
//!
//! An [`Input`] reads packets from a protocol, checks their integrity tags,
//! tracks the global sequence to count lost packets, and can hand segmented
//! payloads to a [`Reassembler`].

use crate::error::Result;
use crate::protocol::{NoopProtocol, Protocol, ReceivedPacket};
use avt_io::{Address, OpenMode};
use avt_protocol::{
    Buffer, IntegrityTag, PacketHeader, PacketKind, Reassembled, Reassembler, SeqNumber, ZeroTag,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Receive counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputStats {
    pub packets: u64,
    /// Sequence numbers skipped over and not yet seen late
    pub lost: u64,
    /// Packets arriving behind the highest sequence seen
    pub reordered: u64,
    pub tag_failures: u64,
}

/// What [`Input::next_event`] produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputEvent {
    /// A packet without payload (session start, registration, end of stream, ...)
    Control(PacketHeader),
    /// A complete payload, reassembled if it was segmented
    Payload(Reassembled),
}

pub struct Input {
    protocol: Box<dyn Protocol>,
    tag: Arc<dyn IntegrityTag>,
    reassembler: Reassembler,
    next_seq: Option<SeqNumber>,
    epoch: Option<u64>,
    stats: InputStats,
}

impl Input {
    /// Open `address` for reading through the no-op protocol
    pub fn open(address: &Address, tag: Arc<dyn IntegrityTag>) -> Result<Self> {
        let protocol = NoopProtocol::open(address, OpenMode::Read)?;
        Ok(Self::with_protocol(Box::new(protocol), tag))
    }

    pub fn with_protocol(protocol: Box<dyn Protocol>, tag: Arc<dyn IntegrityTag>) -> Self {
        Input {
            protocol,
            tag,
            reassembler: Reassembler::default(),
            next_seq: None,
            epoch: None,
            stats: InputStats::default(),
        }
    }

    /// Input that accepts any tag
    pub fn without_verification(protocol: Box<dyn Protocol>) -> Self {
        Self::with_protocol(protocol, Arc::new(ZeroTag))
    }

    pub fn stats(&self) -> InputStats {
        self.stats
    }

    /// Epoch announced by the last time-sync packet
    pub fn epoch(&self) -> Option<u64> {
        self.epoch
    }

    /// Read the next packet, or `None` at end of input
    ///
    /// A packet whose tag does not verify is consumed and reported as an
    /// error; reading can continue afterwards.
    pub fn receive(&mut self) -> Result<Option<ReceivedPacket>> {
        let Some(packet) = self.protocol.receive()? else {
            return Ok(None);
        };
        self.stats.packets += 1;
        self.track(packet.header.seq());

        if let Err(e) = PacketHeader::verify(&packet.header_bytes, self.tag.as_ref()) {
            self.stats.tag_failures += 1;
            warn!(seq = packet.header.seq(), "integrity tag mismatch");
            return Err(e.into());
        }

        if let PacketHeader::TimeSync(sync) = &packet.header {
            debug!(epoch = sync.epoch, "time sync received");
            self.epoch = Some(sync.epoch);
        }
        Ok(Some(packet))
    }

    /// Read until a control packet or a complete payload is available
    pub fn next_event(&mut self) -> Result<Option<InputEvent>> {
        while let Some(packet) = self.receive()? {
            let carries_payload = matches!(
                packet.header.kind(),
                PacketKind::StreamData
                    | PacketKind::GenericSegment
                    | PacketKind::StreamInitData
                    | PacketKind::IccProfile
                    | PacketKind::Lut
                    | PacketKind::UserData
            );
            if !carries_payload {
                return Ok(Some(InputEvent::Control(packet.header)));
            }

            let payload = packet.payload.unwrap_or_else(|| Buffer::from_vec(Vec::new()));
            if let Some(done) = self.reassembler.push(&packet.header_bytes, payload)? {
                return Ok(Some(InputEvent::Payload(done)));
            }
        }
        Ok(None)
    }

    /// Reassembler holding incomplete payloads
    pub fn reassembler(&self) -> &Reassembler {
        &self.reassembler
    }

    fn track(&mut self, seq: u32) {
        let seq = SeqNumber::new(seq);
        match self.next_seq {
            Some(expected) if seq != expected => {
                let gap = expected.distance_to(seq);
                if gap > 0 {
                    self.stats.lost += gap as u64;
                    debug!(expected = %expected, got = %seq, "sequence gap");
                    self.next_seq = Some(seq.next());
                } else {
                    self.stats.reordered += 1;
                    self.stats.lost = self.stats.lost.saturating_sub(1);
                    trace!(expected = %expected, got = %seq, "late packet");
                }
            }
            _ => self.next_seq = Some(seq.next()),
        }
    }

    pub fn close(self) -> Result<()> {
        debug!(packets = self.stats.packets, lost = self.stats.lost, "closing input");
        self.protocol.close()
    }
}

impl std::fmt::Debug for Input {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("protocol", &self.protocol.name())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
