//! Packetizing a byte stream onto one session stream

use crate::config::StreamConfig;
use crate::stats::{format_bandwidth, rate_bps};
use avt_protocol::{Buffer, FrameType};
use avt_session::{MediaPacket, Session};
use std::io::{self, Read};
use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SendError {
    #[error("Input error: {0}")]
    Input(#[from] io::Error),

    #[error("Session error: {0}")]
    Session(#[from] avt_session::Error),
}

/// Totals of one send run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendSummary {
    pub packets: u64,
    pub bytes: u64,
}

/// Fill `buf` as far as the input allows; 0 means end of input
pub fn read_chunk(reader: &mut dyn Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Send `reader` as key frames of `chunk_size` bytes on `stream.id`, then
/// close the stream and the session
///
/// The session is closed on failure too, so the broadcast end of stream is
/// still attempted and the backend still syncs; the first error is returned.
pub fn send_all(
    mut session: Session,
    stream: &StreamConfig,
    reader: &mut dyn Read,
) -> Result<SendSummary, SendError> {
    let summary = match send_chunks(&session, stream, reader) {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(close_err) = session.close() {
                tracing::warn!("Close after failure also failed: {}", close_err);
            }
            return Err(e);
        }
    };

    let stream_closed = session.close_stream(stream.id);
    session.close()?;
    stream_closed?;
    Ok(summary)
}

fn send_chunks(
    session: &Session,
    stream: &StreamConfig,
    reader: &mut dyn Read,
) -> Result<SendSummary, SendError> {
    let mut chunk = vec![0u8; stream.chunk_size];
    let mut summary = SendSummary::default();
    let start_time = Instant::now();

    loop {
        let n = read_chunk(reader, &mut chunk)?;
        if n == 0 {
            tracing::info!("End of input reached");
            break;
        }

        let mut packet = MediaPacket::new(
            Buffer::copy_from_slice(&chunk[..n]),
            summary.packets as i64 * stream.frame_duration,
        );
        packet.duration = stream.frame_duration;
        packet.frame_type = FrameType::Key;
        let report = session.write_stream_data(stream.id, &packet)?;
        tracing::trace!(seq = report.head_seq, segments = report.segments, "sent chunk");

        summary.bytes += n as u64;
        summary.packets += 1;
        if summary.packets % 100 == 0 {
            tracing::info!(
                "Sent {} packets, {}",
                summary.packets,
                format_bandwidth(rate_bps(summary.bytes, start_time.elapsed()))
            );
        }
    }
    Ok(summary)
}
