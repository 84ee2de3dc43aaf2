//! Streams and the stream registry

use crate::error::{Error, Result};
use avt_protocol::packet::{VideoInfo, VideoOrientation};
use avt_protocol::{Buffer, Compression, FrameType, Rational, SESSION_STREAM_ID};
use std::fmt;

/// Codec identifier carried in stream registration
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodecId(pub u32);

impl CodecId {
    pub const RAW_VIDEO: CodecId = CodecId(1);
    pub const FFV1: CodecId = CodecId(2);
    pub const AV1: CodecId = CodecId(3);
    pub const VP9: CodecId = CodecId(4);
    pub const H264: CodecId = CodecId(5);
    pub const H265: CodecId = CodecId(6);
    pub const DIRAC: CodecId = CodecId(7);
    pub const TIFF: CodecId = CodecId(8);
    pub const PNG: CodecId = CodecId(9);
    pub const JPEG: CodecId = CodecId(10);
    pub const SVG: CodecId = CodecId(11);

    pub const RAW_AUDIO: CodecId = CodecId(32768);
    pub const OPUS: CodecId = CodecId(32769);
    pub const AAC: CodecId = CodecId(32770);
    pub const AC3: CodecId = CodecId(32771);
    pub const FLAC: CodecId = CodecId(32772);

    pub const ASS: CodecId = CodecId(65536);

    /// Look up a codec by its lowercase name
    pub fn from_name(name: &str) -> Option<Self> {
        let id = match name {
            "rawvideo" => Self::RAW_VIDEO,
            "ffv1" => Self::FFV1,
            "av1" => Self::AV1,
            "vp9" => Self::VP9,
            "h264" => Self::H264,
            "h265" | "hevc" => Self::H265,
            "dirac" => Self::DIRAC,
            "tiff" => Self::TIFF,
            "png" => Self::PNG,
            "jpeg" => Self::JPEG,
            "svg" => Self::SVG,
            "rawaudio" => Self::RAW_AUDIO,
            "opus" => Self::OPUS,
            "aac" => Self::AAC,
            "ac3" => Self::AC3,
            "flac" => Self::FLAC,
            "ass" => Self::ASS,
            _ => return None,
        };
        Some(id)
    }
}

impl fmt::Debug for CodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CodecId({})", self.0)
    }
}

/// A logical stream and the parameters announced when it is registered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    pub id: u16,
    pub codec_id: CodecId,
    pub related_to: Option<u16>,
    pub derived_from: Option<u16>,
    pub timebase: Rational,
    /// Bits per second, 0 if unknown
    pub bitrate: u64,
    pub flags: u64,
    /// Total duration in nanoseconds
    pub duration: Option<u64>,
    pub video_info: Option<VideoInfo>,
    pub video_orientation: Option<VideoOrientation>,
    pub init_data: Option<Buffer>,
    pub icc_profile: Option<Buffer>,
    pub lut: Option<Buffer>,
}

impl Stream {
    /// Stream with a nanosecond timebase and nothing else set
    pub fn new(id: u16, codec_id: CodecId) -> Self {
        Stream {
            id,
            codec_id,
            related_to: None,
            derived_from: None,
            timebase: Rational::new(1, 1_000_000_000),
            bitrate: 0,
            flags: 0,
            duration: None,
            video_info: None,
            video_orientation: None,
            init_data: None,
            icc_profile: None,
            lut: None,
        }
    }
}

/// One frame of timed media
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPacket {
    pub data: Buffer,
    pub frame_type: FrameType,
    pub compression: Compression,
    /// Presentation time in stream timebase units
    pub pts: i64,
    pub duration: i64,
}

impl MediaPacket {
    pub fn new(data: Buffer, pts: i64) -> Self {
        MediaPacket {
            data,
            frame_type: FrameType::default(),
            compression: Compression::None,
            pts,
            duration: 0,
        }
    }
}

/// Registered streams in registration order
#[derive(Debug, Default)]
pub struct StreamRegistry {
    streams: Vec<Stream>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: u16) -> Option<&Stream> {
        self.streams.iter().find(|s| s.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Stream> {
        self.streams.iter()
    }

    pub fn ids(&self) -> Vec<u16> {
        self.streams.iter().map(|s| s.id).collect()
    }

    fn position(&self, id: u16) -> Option<usize> {
        self.streams.iter().position(|s| s.id == id)
    }

    /// Add a new stream
    pub fn insert(&mut self, stream: Stream) -> Result<()> {
        if stream.id == SESSION_STREAM_ID {
            return Err(Error::ReservedStreamId(stream.id));
        }
        if self.contains(stream.id) {
            return Err(Error::DuplicateStream(stream.id));
        }
        self.streams.push(stream);
        Ok(())
    }

    /// Replace the parameters of a registered stream, keeping its position
    pub fn replace(&mut self, stream: Stream) -> Result<()> {
        let index = self
            .position(stream.id)
            .ok_or(Error::UnknownStream(stream.id))?;
        self.streams[index] = stream;
        Ok(())
    }

    /// Remove a stream; the others keep their relative order
    pub fn remove(&mut self, id: u16) -> Result<Stream> {
        let index = self.position(id).ok_or(Error::UnknownStream(id))?;
        Ok(self.streams.remove(index))
    }
}
