//! Packet Headers and Wire Serialization
//!
//! Every packet starts with a self-describing header in network byte order:
//!
//! ```text
//!  0               2               4                               8
//! +---------------+---------------+-------------------------------+
//! |  descriptor   |   stream id   |        global sequence        |
//! +---------------+---------------+-------------------------------+
//! |            kind-specific fields (20 bytes)                   |
//! +---------------------------------------------------------------+
//! |            integrity tag over bytes 0..28 (8 bytes)           |
//! +---------------------------------------------------------------+
//! ```
//!
//! The high byte of the descriptor names the packet kind, the low byte carries
//! kind-specific flags. Stream registration and video info append a second
//! protected block, sealed by a second tag.

use crate::error::ErrorKind;
use crate::tag::{IntegrityTag, TAG_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;
use thiserror::Error;

/// Bytes covered by the first integrity tag
pub const PROTECTED_SIZE: usize = 28;

/// Header size of every kind without an extended block
pub const BASE_HEADER_SIZE: usize = PROTECTED_SIZE + TAG_SIZE;

/// Largest header of any kind (video info)
pub const MAX_HEADER_SIZE: usize = 68;

/// Stream id used by session-scoped packets and broadcast end-of-stream
pub const SESSION_STREAM_ID: u16 = 0xFFFF;

/// Related/derived stream id meaning "none"
pub const NO_STREAM: u16 = 0xFFFF;

/// Size of one head-header fragment carried by a generic segment
pub const HEAD_FRAGMENT_SIZE: usize = 4;

/// Number of distinct fragments the protected head region splits into
pub const HEAD_FRAGMENT_COUNT: u32 = (PROTECTED_SIZE / HEAD_FRAGMENT_SIZE) as u32;

const PRODUCER_NAME_LEN: usize = 15;

const SEGMENTED_FLAG: u8 = 0x20;
const FEC_GROUP_FLAG: u8 = 0x10;
const FIELD_ID_FLAG: u8 = 0x08;
const COMPRESSION_MASK: u8 = 0x07;

/// Offset into the head header's protected region copied by the segment
/// with sequence `seq`
#[inline]
pub fn head_fragment_offset(seq: u32) -> usize {
    (seq % HEAD_FRAGMENT_COUNT) as usize * HEAD_FRAGMENT_SIZE
}

/// Packet kind (high byte of the descriptor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketKind {
    SessionStart = 0x50,
    TimeSync = 0x01,
    StreamRegistration = 0x02,
    StreamInitData = 0x03,
    VideoInfo = 0x04,
    VideoOrientation = 0x05,
    IccProfile = 0x06,
    Lut = 0x07,
    StreamDuration = 0x08,
    StreamData = 0x10,
    GenericSegment = 0x20,
    UserData = 0x40,
    EndOfStream = 0xFF,
}

impl PacketKind {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x50 => Some(PacketKind::SessionStart),
            0x01 => Some(PacketKind::TimeSync),
            0x02 => Some(PacketKind::StreamRegistration),
            0x03 => Some(PacketKind::StreamInitData),
            0x04 => Some(PacketKind::VideoInfo),
            0x05 => Some(PacketKind::VideoOrientation),
            0x06 => Some(PacketKind::IccProfile),
            0x07 => Some(PacketKind::Lut),
            0x08 => Some(PacketKind::StreamDuration),
            0x10 => Some(PacketKind::StreamData),
            0x20 => Some(PacketKind::GenericSegment),
            0x40 => Some(PacketKind::UserData),
            0xFF => Some(PacketKind::EndOfStream),
            _ => None,
        }
    }

    /// Kind named by a full 16-bit descriptor
    pub fn from_descriptor(descriptor: u16) -> Option<Self> {
        Self::from_u8((descriptor >> 8) as u8)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Descriptor with all flag bits clear
    pub fn base_descriptor(self) -> u16 {
        (self as u16) << 8
    }

    /// Encoded header length for this kind
    pub fn header_len(self) -> usize {
        match self {
            PacketKind::StreamRegistration => 56,
            PacketKind::VideoInfo => MAX_HEADER_SIZE,
            _ => BASE_HEADER_SIZE,
        }
    }

    /// Protected byte ranges, each immediately followed by its tag
    fn tag_blocks(self) -> &'static [(usize, usize)] {
        match self {
            PacketKind::StreamRegistration => &[(0, PROTECTED_SIZE), (36, 48)],
            PacketKind::VideoInfo => &[(0, PROTECTED_SIZE), (36, 60)],
            _ => &[(0, PROTECTED_SIZE)],
        }
    }
}

impl fmt::Display for PacketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Rational number (timebases, aspect ratios, frame rates)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    pub const fn new(num: i32, den: i32) -> Self {
        Rational { num, den }
    }
}

impl Default for Rational {
    fn default() -> Self {
        Rational::new(0, 1)
    }
}

/// Frame type (bits 6-7 of the stream-data descriptor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum FrameType {
    #[default]
    Predicted = 0b00,
    Bidirectional = 0b01,
    Key = 0b10,
    Unspecified = 0b11,
}

impl FrameType {
    pub fn from_bits(value: u8) -> Self {
        match value & 0b11 {
            0b00 => FrameType::Predicted,
            0b01 => FrameType::Bidirectional,
            0b10 => FrameType::Key,
            _ => FrameType::Unspecified,
        }
    }

    pub fn as_bits(self) -> u8 {
        self as u8
    }
}

/// Payload compression (bits 0-2 of the stream-data descriptor)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum Compression {
    #[default]
    None = 0,
    Zstd = 1,
}

impl Compression {
    pub fn from_bits(value: u8) -> Option<Self> {
        match value & COMPRESSION_MASK {
            0 => Some(Compression::None),
            1 => Some(Compression::Zstd),
            _ => None,
        }
    }
}

/// First packet of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStart {
    pub seq: u32,
    pub session_flags: u16,
    pub producer_major: u8,
    pub producer_minor: u8,
    pub producer_micro: u8,
    /// Truncated to 15 bytes on the wire
    pub producer_name: String,
}

/// Establishes the epoch used to interpret timestamps
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TimeSync {
    pub seq: u32,
    pub clock_id: u8,
    pub clock_hz2: u8,
    pub epoch: u64,
    pub clock_hz: u32,
    pub clock_seq: u32,
}

/// Announces a stream and its codec parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamRegistration {
    pub stream_id: u16,
    pub seq: u32,
    pub related_id: Option<u16>,
    pub derived_id: Option<u16>,
    pub bandwidth: u64,
    pub flags: u64,
    pub codec_id: u32,
    pub timebase: Rational,
}

/// Total stream duration in nanoseconds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDuration {
    pub stream_id: u16,
    pub seq: u32,
    pub duration: u64,
}

/// Video parameters
///
/// Color fields are carried as raw enumeration values; their meaning is up to
/// the codec layer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub signal_aspect: Rational,
    pub subsampling: u8,
    pub colorspace: u8,
    pub bit_depth: u8,
    pub interlaced: bool,
    pub gamma: Rational,
    pub framerate: Rational,
    pub limited_range: bool,
    pub chroma_pos: u8,
    pub primaries: u8,
    pub transfer: u8,
    pub matrix: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoInfoPacket {
    pub stream_id: u16,
    pub seq: u32,
    pub info: VideoInfo,
}

/// Display orientation of a video stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoOrientation {
    /// Clockwise rotation in degrees
    pub rotation: u16,
    pub flip_horizontal: bool,
    pub flip_vertical: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoOrientationPacket {
    pub stream_id: u16,
    pub seq: u32,
    pub orientation: VideoOrientation,
}

/// Timed media payload (head packet of a possibly segmented frame)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamData {
    pub stream_id: u16,
    pub seq: u32,
    pub frame_type: FrameType,
    pub segmented: bool,
    pub fec_group: bool,
    pub field_id: bool,
    pub compression: Compression,
    pub pts: i64,
    pub duration: i64,
    /// Payload bytes carried by this packet
    pub data_length: u32,
}

impl StreamData {
    fn descriptor(&self) -> u16 {
        let mut flags = self.frame_type.as_bits() << 6;
        if self.segmented {
            flags |= SEGMENTED_FLAG;
        }
        if self.fec_group {
            flags |= FEC_GROUP_FLAG;
        }
        if self.field_id {
            flags |= FIELD_ID_FLAG;
        }
        flags |= self.compression as u8;
        PacketKind::StreamData.base_descriptor() | flags as u16
    }
}

/// Auxiliary payload carried by a generic data head packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataKind {
    InitData,
    IccProfile,
    Lut,
    /// Application data; the flags occupy the descriptor's low byte
    UserData { flags: u8 },
}

impl DataKind {
    pub fn packet_kind(self) -> PacketKind {
        match self {
            DataKind::InitData => PacketKind::StreamInitData,
            DataKind::IccProfile => PacketKind::IccProfile,
            DataKind::Lut => PacketKind::Lut,
            DataKind::UserData { .. } => PacketKind::UserData,
        }
    }
}

/// Head packet of an auxiliary payload (init data, ICC, LUT, user data)
///
/// For user data the stream id slot holds the user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericData {
    pub kind: DataKind,
    pub stream_id: u16,
    pub seq: u32,
    /// Payload bytes carried by this packet
    pub payload_length: u32,
    /// Length of the whole payload
    pub total_length: u32,
}

impl GenericData {
    pub fn is_segmented(&self) -> bool {
        self.payload_length < self.total_length
    }

    fn descriptor(&self) -> u16 {
        let flags = match self.kind {
            DataKind::UserData { flags } => flags,
            _ if self.is_segmented() => SEGMENTED_FLAG,
            _ => 0,
        };
        self.kind.packet_kind().base_descriptor() | flags as u16
    }
}

/// Trailing slice of a payload that did not fit into its head packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericSegment {
    /// Kind of the head packet this segment continues
    pub segment_of: PacketKind,
    pub stream_id: u16,
    pub seq: u32,
    /// Sequence number of the head packet
    pub target_seq: u32,
    pub total_length: u32,
    pub offset: u32,
    pub length: u32,
    /// Four bytes of the head header's protected region, chosen by `seq`
    pub head_fragment: [u8; HEAD_FRAGMENT_SIZE],
}

/// End of one stream, or of the whole session with [`SESSION_STREAM_ID`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfStream {
    pub stream_id: u16,
    pub seq: u32,
}

/// Decoded packet header
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PacketHeader {
    SessionStart(SessionStart),
    TimeSync(TimeSync),
    StreamRegistration(StreamRegistration),
    StreamDuration(StreamDuration),
    VideoInfo(VideoInfoPacket),
    VideoOrientation(VideoOrientationPacket),
    StreamData(StreamData),
    GenericData(GenericData),
    GenericSegment(GenericSegment),
    EndOfStream(EndOfStream),
}

impl PacketHeader {
    pub fn kind(&self) -> PacketKind {
        match self {
            PacketHeader::SessionStart(_) => PacketKind::SessionStart,
            PacketHeader::TimeSync(_) => PacketKind::TimeSync,
            PacketHeader::StreamRegistration(_) => PacketKind::StreamRegistration,
            PacketHeader::StreamDuration(_) => PacketKind::StreamDuration,
            PacketHeader::VideoInfo(_) => PacketKind::VideoInfo,
            PacketHeader::VideoOrientation(_) => PacketKind::VideoOrientation,
            PacketHeader::StreamData(_) => PacketKind::StreamData,
            PacketHeader::GenericData(p) => p.kind.packet_kind(),
            PacketHeader::GenericSegment(_) => PacketKind::GenericSegment,
            PacketHeader::EndOfStream(_) => PacketKind::EndOfStream,
        }
    }

    /// Full 16-bit descriptor including flags
    pub fn descriptor(&self) -> u16 {
        match self {
            PacketHeader::StreamData(p) => p.descriptor(),
            PacketHeader::GenericData(p) => p.descriptor(),
            PacketHeader::GenericSegment(p) => {
                PacketKind::GenericSegment.base_descriptor() | p.segment_of.as_u8() as u16
            }
            other => other.kind().base_descriptor(),
        }
    }

    pub fn stream_id(&self) -> u16 {
        match self {
            PacketHeader::SessionStart(_) | PacketHeader::TimeSync(_) => SESSION_STREAM_ID,
            PacketHeader::StreamRegistration(p) => p.stream_id,
            PacketHeader::StreamDuration(p) => p.stream_id,
            PacketHeader::VideoInfo(p) => p.stream_id,
            PacketHeader::VideoOrientation(p) => p.stream_id,
            PacketHeader::StreamData(p) => p.stream_id,
            PacketHeader::GenericData(p) => p.stream_id,
            PacketHeader::GenericSegment(p) => p.stream_id,
            PacketHeader::EndOfStream(p) => p.stream_id,
        }
    }

    /// Global sequence number
    pub fn seq(&self) -> u32 {
        match self {
            PacketHeader::SessionStart(p) => p.seq,
            PacketHeader::TimeSync(p) => p.seq,
            PacketHeader::StreamRegistration(p) => p.seq,
            PacketHeader::StreamDuration(p) => p.seq,
            PacketHeader::VideoInfo(p) => p.seq,
            PacketHeader::VideoOrientation(p) => p.seq,
            PacketHeader::StreamData(p) => p.seq,
            PacketHeader::GenericData(p) => p.seq,
            PacketHeader::GenericSegment(p) => p.seq,
            PacketHeader::EndOfStream(p) => p.seq,
        }
    }

    /// Number of payload bytes following this header on the wire
    pub fn payload_len(&self) -> usize {
        match self {
            PacketHeader::StreamData(p) => p.data_length as usize,
            PacketHeader::GenericData(p) => p.payload_length as usize,
            PacketHeader::GenericSegment(p) => p.length as usize,
            _ => 0,
        }
    }

    /// Whether this is a head packet whose payload continues in segments
    pub fn is_segmented(&self) -> bool {
        match self {
            PacketHeader::StreamData(p) => p.segmented,
            PacketHeader::GenericData(p) => p.is_segmented(),
            _ => false,
        }
    }

    /// Encoded header length
    pub fn encoded_len(&self) -> usize {
        self.kind().header_len()
    }

    /// Serialize to network byte order, sealing each protected block with `tag`
    pub fn encode(&self, tag: &dyn IntegrityTag) -> EncodedHeader {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u16(self.descriptor());
        buf.put_u16(self.stream_id());
        buf.put_u32(self.seq());

        match self {
            PacketHeader::SessionStart(p) => {
                buf.put_u16(p.session_flags);
                buf.put_u8(p.producer_major);
                buf.put_u8(p.producer_minor);
                buf.put_u8(p.producer_micro);
                let mut name = [0u8; PRODUCER_NAME_LEN];
                let raw = p.producer_name.as_bytes();
                let n = raw.len().min(PRODUCER_NAME_LEN);
                name[..n].copy_from_slice(&raw[..n]);
                buf.put_slice(&name);
                seal(&mut buf, 0, tag);
            }
            PacketHeader::TimeSync(p) => {
                buf.put_u8(p.clock_id);
                buf.put_u8(p.clock_hz2);
                buf.put_u16(0);
                buf.put_u64(p.epoch);
                buf.put_u32(p.clock_hz);
                buf.put_u32(p.clock_seq);
                seal(&mut buf, 0, tag);
            }
            PacketHeader::StreamRegistration(p) => {
                buf.put_u16(p.related_id.unwrap_or(NO_STREAM));
                buf.put_u16(p.derived_id.unwrap_or(NO_STREAM));
                buf.put_u64(p.bandwidth);
                buf.put_u64(p.flags);
                seal(&mut buf, 0, tag);
                let ext = buf.len();
                buf.put_u32(p.codec_id);
                buf.put_i32(p.timebase.num);
                buf.put_i32(p.timebase.den);
                seal(&mut buf, ext, tag);
            }
            PacketHeader::StreamDuration(p) => {
                buf.put_u64(p.duration);
                buf.put_bytes(0, 12);
                seal(&mut buf, 0, tag);
            }
            PacketHeader::VideoInfo(p) => {
                let vi = &p.info;
                buf.put_u32(vi.width);
                buf.put_u32(vi.height);
                buf.put_i32(vi.signal_aspect.num);
                buf.put_i32(vi.signal_aspect.den);
                buf.put_u8(vi.subsampling);
                buf.put_u8(vi.colorspace);
                buf.put_u8(vi.bit_depth);
                buf.put_u8(vi.interlaced as u8);
                seal(&mut buf, 0, tag);
                let ext = buf.len();
                buf.put_i32(vi.gamma.num);
                buf.put_i32(vi.gamma.den);
                buf.put_i32(vi.framerate.num);
                buf.put_i32(vi.framerate.den);
                buf.put_u16(vi.limited_range as u16);
                buf.put_u8(vi.chroma_pos);
                buf.put_u8(vi.primaries);
                buf.put_u8(vi.transfer);
                buf.put_u8(vi.matrix);
                buf.put_u16(0);
                seal(&mut buf, ext, tag);
            }
            PacketHeader::VideoOrientation(p) => {
                buf.put_u16(p.orientation.rotation);
                buf.put_u8(p.orientation.flip_horizontal as u8);
                buf.put_u8(p.orientation.flip_vertical as u8);
                buf.put_bytes(0, 16);
                seal(&mut buf, 0, tag);
            }
            PacketHeader::StreamData(p) => {
                buf.put_i64(p.pts);
                buf.put_i64(p.duration);
                buf.put_u32(p.data_length);
                seal(&mut buf, 0, tag);
            }
            PacketHeader::GenericData(p) => {
                buf.put_u32(p.payload_length);
                buf.put_u32(p.total_length);
                buf.put_bytes(0, 12);
                seal(&mut buf, 0, tag);
            }
            PacketHeader::GenericSegment(p) => {
                buf.put_u32(p.target_seq);
                buf.put_u32(p.total_length);
                buf.put_u32(p.offset);
                buf.put_u32(p.length);
                buf.put_slice(&p.head_fragment);
                seal(&mut buf, 0, tag);
            }
            PacketHeader::EndOfStream(_) => {
                buf.put_bytes(0, 20);
                seal(&mut buf, 0, tag);
            }
        }

        debug_assert_eq!(buf.len(), self.encoded_len());
        EncodedHeader { bytes: buf.freeze() }
    }

    /// Parse a header from the start of `bytes` (network byte order)
    ///
    /// Tags are skipped; use [`PacketHeader::verify`] to check them.
    pub fn decode(bytes: &[u8]) -> Result<Self, PacketError> {
        if bytes.len() < 2 {
            return Err(PacketError::InsufficientData {
                expected: 2,
                actual: bytes.len(),
            });
        }

        let descriptor = u16::from_be_bytes([bytes[0], bytes[1]]);
        let kind =
            PacketKind::from_descriptor(descriptor).ok_or(PacketError::UnknownDescriptor(descriptor))?;
        let len = kind.header_len();
        if bytes.len() < len {
            return Err(PacketError::InsufficientData {
                expected: len,
                actual: bytes.len(),
            });
        }

        let flags = descriptor as u8;
        let mut buf = &bytes[2..len];
        let stream_id = buf.get_u16();
        let seq = buf.get_u32();

        let header = match kind {
            PacketKind::SessionStart => {
                let session_flags = buf.get_u16();
                let producer_major = buf.get_u8();
                let producer_minor = buf.get_u8();
                let producer_micro = buf.get_u8();
                let name = &buf[..PRODUCER_NAME_LEN];
                let end = name.iter().position(|&b| b == 0).unwrap_or(PRODUCER_NAME_LEN);
                let producer_name = String::from_utf8_lossy(&name[..end]).into_owned();
                PacketHeader::SessionStart(SessionStart {
                    seq,
                    session_flags,
                    producer_major,
                    producer_minor,
                    producer_micro,
                    producer_name,
                })
            }
            PacketKind::TimeSync => {
                let clock_id = buf.get_u8();
                let clock_hz2 = buf.get_u8();
                buf.advance(2);
                PacketHeader::TimeSync(TimeSync {
                    seq,
                    clock_id,
                    clock_hz2,
                    epoch: buf.get_u64(),
                    clock_hz: buf.get_u32(),
                    clock_seq: buf.get_u32(),
                })
            }
            PacketKind::StreamRegistration => {
                let related_id = optional_id(buf.get_u16());
                let derived_id = optional_id(buf.get_u16());
                let bandwidth = buf.get_u64();
                let flags = buf.get_u64();
                buf.advance(TAG_SIZE);
                let codec_id = buf.get_u32();
                let timebase = Rational::new(buf.get_i32(), buf.get_i32());
                PacketHeader::StreamRegistration(StreamRegistration {
                    stream_id,
                    seq,
                    related_id,
                    derived_id,
                    bandwidth,
                    flags,
                    codec_id,
                    timebase,
                })
            }
            PacketKind::StreamDuration => PacketHeader::StreamDuration(StreamDuration {
                stream_id,
                seq,
                duration: buf.get_u64(),
            }),
            PacketKind::VideoInfo => {
                let width = buf.get_u32();
                let height = buf.get_u32();
                let signal_aspect = Rational::new(buf.get_i32(), buf.get_i32());
                let subsampling = buf.get_u8();
                let colorspace = buf.get_u8();
                let bit_depth = buf.get_u8();
                let interlaced = buf.get_u8() != 0;
                buf.advance(TAG_SIZE);
                let gamma = Rational::new(buf.get_i32(), buf.get_i32());
                let framerate = Rational::new(buf.get_i32(), buf.get_i32());
                let limited_range = buf.get_u16() != 0;
                PacketHeader::VideoInfo(VideoInfoPacket {
                    stream_id,
                    seq,
                    info: VideoInfo {
                        width,
                        height,
                        signal_aspect,
                        subsampling,
                        colorspace,
                        bit_depth,
                        interlaced,
                        gamma,
                        framerate,
                        limited_range,
                        chroma_pos: buf.get_u8(),
                        primaries: buf.get_u8(),
                        transfer: buf.get_u8(),
                        matrix: buf.get_u8(),
                    },
                })
            }
            PacketKind::VideoOrientation => {
                let rotation = buf.get_u16();
                let flip_horizontal = buf.get_u8() != 0;
                let flip_vertical = buf.get_u8() != 0;
                PacketHeader::VideoOrientation(VideoOrientationPacket {
                    stream_id,
                    seq,
                    orientation: VideoOrientation {
                        rotation,
                        flip_horizontal,
                        flip_vertical,
                    },
                })
            }
            PacketKind::StreamData => {
                let compression = Compression::from_bits(flags).ok_or(PacketError::InvalidField {
                    field: "compression",
                    value: (flags & COMPRESSION_MASK) as u64,
                })?;
                PacketHeader::StreamData(StreamData {
                    stream_id,
                    seq,
                    frame_type: FrameType::from_bits(flags >> 6),
                    segmented: flags & SEGMENTED_FLAG != 0,
                    fec_group: flags & FEC_GROUP_FLAG != 0,
                    field_id: flags & FIELD_ID_FLAG != 0,
                    compression,
                    pts: buf.get_i64(),
                    duration: buf.get_i64(),
                    data_length: buf.get_u32(),
                })
            }
            PacketKind::StreamInitData
            | PacketKind::IccProfile
            | PacketKind::Lut
            | PacketKind::UserData => {
                let kind = match kind {
                    PacketKind::StreamInitData => DataKind::InitData,
                    PacketKind::IccProfile => DataKind::IccProfile,
                    PacketKind::Lut => DataKind::Lut,
                    _ => DataKind::UserData { flags },
                };
                let payload_length = buf.get_u32();
                let total_length = buf.get_u32();
                if payload_length > total_length {
                    return Err(PacketError::InvalidField {
                        field: "payload_length",
                        value: payload_length as u64,
                    });
                }
                PacketHeader::GenericData(GenericData {
                    kind,
                    stream_id,
                    seq,
                    payload_length,
                    total_length,
                })
            }
            PacketKind::GenericSegment => {
                let segment_of = PacketKind::from_u8(flags).ok_or(PacketError::InvalidField {
                    field: "segment_of",
                    value: flags as u64,
                })?;
                let target_seq = buf.get_u32();
                let total_length = buf.get_u32();
                let offset = buf.get_u32();
                let length = buf.get_u32();
                let mut head_fragment = [0u8; HEAD_FRAGMENT_SIZE];
                buf.copy_to_slice(&mut head_fragment);
                PacketHeader::GenericSegment(GenericSegment {
                    segment_of,
                    stream_id,
                    seq,
                    target_seq,
                    total_length,
                    offset,
                    length,
                    head_fragment,
                })
            }
            PacketKind::EndOfStream => PacketHeader::EndOfStream(EndOfStream { stream_id, seq }),
        };

        Ok(header)
    }

    /// Parse a header from its 28 protected bytes alone
    ///
    /// Only kinds without an extended block can be rebuilt this way; this is
    /// how a receiver recovers a lost head header from segment fragments.
    pub fn decode_protected(protected: &[u8; PROTECTED_SIZE]) -> Result<Self, PacketError> {
        let mut full = [0u8; BASE_HEADER_SIZE];
        full[..PROTECTED_SIZE].copy_from_slice(protected);
        Self::decode(&full)
    }

    /// Check every tag of an encoded header
    pub fn verify(bytes: &[u8], tag: &dyn IntegrityTag) -> Result<(), PacketError> {
        let header = Self::decode(bytes)?;
        for &(start, end) in header.kind().tag_blocks() {
            if !tag.verify(&bytes[start..end], &bytes[end..end + TAG_SIZE]) {
                return Err(PacketError::TagMismatch {
                    kind: header.kind(),
                    seq: header.seq(),
                });
            }
        }
        Ok(())
    }
}

fn optional_id(raw: u16) -> Option<u16> {
    if raw == NO_STREAM {
        None
    } else {
        Some(raw)
    }
}

/// Append the tag over `buf[from..]`
fn seal(buf: &mut BytesMut, from: usize, tag: &dyn IntegrityTag) {
    let value = tag.compute(&buf[from..]);
    buf.put_slice(&value);
}

/// Serialized header bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedHeader {
    bytes: Bytes,
}

impl EncodedHeader {
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// The first protected block
    pub fn protected(&self) -> &[u8] {
        &self.bytes[..PROTECTED_SIZE]
    }

    /// Fragment of the protected block that the segment with `seq` carries
    pub fn head_fragment(&self, seq: u32) -> [u8; HEAD_FRAGMENT_SIZE] {
        let offset = head_fragment_offset(seq);
        let mut fragment = [0u8; HEAD_FRAGMENT_SIZE];
        fragment.copy_from_slice(&self.bytes[offset..offset + HEAD_FRAGMENT_SIZE]);
        fragment
    }
}

impl AsRef<[u8]> for EncodedHeader {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

/// Packet parsing and validation errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("Insufficient data: expected {expected} bytes, got {actual}")]
    InsufficientData { expected: usize, actual: usize },

    #[error("Unknown packet descriptor: {0:#06x}")]
    UnknownDescriptor(u16),

    #[error("Invalid {field} value: {value}")]
    InvalidField { field: &'static str, value: u64 },

    #[error("Integrity tag mismatch on {kind} packet {seq}")]
    TagMismatch { kind: PacketKind, seq: u32 },

    #[error("Segment [{offset}, +{length}) outside payload of {total} bytes")]
    SegmentOutOfRange {
        offset: u32,
        length: u32,
        total: u32,
    },

    #[error("Head packet {target_seq} disagrees with fragments carried by its segments")]
    HeadMismatch { target_seq: u32 },
}

impl PacketError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::InvalidData
    }
}
