//! Stream lifecycle
//!
//! A [`Session`] couples an [`Output`] with the registry of streams it has
//! announced. Registration emits the stream's registration packet followed
//! by whatever metadata the stream carries; closing a stream emits its
//! end-of-stream and forgets it.

use crate::error::{Error, Result};
use crate::output::{Output, OutputOptions};
use crate::stream::{MediaPacket, Stream, StreamRegistry};
use avt_io::Address;
use avt_protocol::packet::{
    StreamDuration, StreamRegistration, VideoInfoPacket, VideoOrientationPacket,
};
use avt_protocol::{Buffer, DataKind, PacketHeader, SegmentReport};
use tracing::{debug, warn};

pub struct Session {
    output: Output,
    streams: StreamRegistry,
}

impl Session {
    /// Open an output on `address` and start a session on it
    pub fn open(address: &Address, options: OutputOptions) -> Result<Self> {
        Ok(Self::new(Output::open(address, options)?))
    }

    pub fn new(output: Output) -> Self {
        Session {
            output,
            streams: StreamRegistry::new(),
        }
    }

    pub fn output(&self) -> &Output {
        &self.output
    }

    pub fn streams(&self) -> &StreamRegistry {
        &self.streams
    }

    pub fn stream(&self, id: u16) -> Option<&Stream> {
        self.streams.get(id)
    }

    /// Register a new stream and announce it
    ///
    /// The stream stays registered even if announcing it fails, so the
    /// announcement can be retried with [`update`](Self::update).
    pub fn register(&mut self, stream: Stream) -> Result<()> {
        self.streams.insert(stream.clone())?;
        debug!(stream_id = stream.id, codec = stream.codec_id.0, "registering stream");
        self.announce(&stream)
    }

    /// Replace a registered stream's parameters and announce them again
    pub fn update(&mut self, stream: Stream) -> Result<()> {
        self.streams.replace(stream.clone())?;
        debug!(stream_id = stream.id, "updating stream");
        self.announce(&stream)
    }

    /// Emit registration, then duration, video info, orientation and the
    /// auxiliary payloads, stopping at the first failure
    fn announce(&self, stream: &Stream) -> Result<()> {
        let id = stream.id;

        self.output.emit(|seq| {
            PacketHeader::StreamRegistration(StreamRegistration {
                stream_id: id,
                seq,
                related_id: stream.related_to,
                derived_id: stream.derived_from,
                bandwidth: stream.bitrate,
                flags: stream.flags,
                codec_id: stream.codec_id.0,
                timebase: stream.timebase,
            })
        })?;

        if let Some(duration) = stream.duration {
            self.output.emit(|seq| {
                PacketHeader::StreamDuration(StreamDuration {
                    stream_id: id,
                    seq,
                    duration,
                })
            })?;
        }

        if let Some(info) = &stream.video_info {
            self.output.emit(|seq| {
                PacketHeader::VideoInfo(VideoInfoPacket {
                    stream_id: id,
                    seq,
                    info: info.clone(),
                })
            })?;
        }

        if let Some(orientation) = stream.video_orientation {
            self.output.emit(|seq| {
                PacketHeader::VideoOrientation(VideoOrientationPacket {
                    stream_id: id,
                    seq,
                    orientation,
                })
            })?;
        }

        let payloads = [
            (DataKind::InitData, &stream.init_data),
            (DataKind::IccProfile, &stream.icc_profile),
            (DataKind::Lut, &stream.lut),
        ];
        for (kind, data) in payloads {
            if let Some(data) = data {
                self.output.write_generic(kind, id, data)?;
            }
        }

        Ok(())
    }

    /// Send a media frame on a registered stream
    pub fn write_stream_data(&self, stream_id: u16, packet: &MediaPacket) -> Result<SegmentReport> {
        if !self.streams.contains(stream_id) {
            return Err(Error::UnknownStream(stream_id));
        }
        self.output.write_stream_data(stream_id, packet)
    }

    pub fn write_user_data(&self, data: &Buffer, flags: u8, user_id: u16) -> Result<SegmentReport> {
        self.output.write_user_data(data, flags, user_id)
    }

    pub fn time_sync(&self, epoch: u64) -> Result<()> {
        self.output.time_sync(epoch)
    }

    /// Emit end-of-stream for `stream_id` and remove it
    ///
    /// The stream is removed even if the end-of-stream send fails.
    pub fn close_stream(&mut self, stream_id: u16) -> Result<()> {
        self.streams.remove(stream_id)?;
        let sent = self.output.end_of_stream(stream_id);
        if let Err(e) = &sent {
            warn!(stream_id, error = %e, "end-of-stream failed");
        }
        debug!(stream_id, remaining = self.streams.len(), "stream closed");
        sent.map(|_| ())
    }

    /// Emit broadcast end-of-stream and close the output
    pub fn close(self) -> Result<()> {
        debug!(streams = self.streams.len(), "closing session");
        self.output.close()
    }
}
