//! Statistics and packet display

use avt_protocol::PacketHeader;
use avt_session::InputStats;
use std::time::Duration;

/// Format bytes in human-readable form
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format bandwidth in human-readable form
pub fn format_bandwidth(bps: u64) -> String {
    const KBPS: u64 = 1000;
    const MBPS: u64 = KBPS * 1000;
    const GBPS: u64 = MBPS * 1000;

    if bps >= GBPS {
        format!("{:.2} Gbps", bps as f64 / GBPS as f64)
    } else if bps >= MBPS {
        format!("{:.2} Mbps", bps as f64 / MBPS as f64)
    } else if bps >= KBPS {
        format!("{:.2} Kbps", bps as f64 / KBPS as f64)
    } else {
        format!("{} bps", bps)
    }
}

/// Average rate over `elapsed`, 0 for sub-millisecond spans
pub fn rate_bps(bytes: u64, elapsed: Duration) -> u64 {
    let millis = elapsed.as_millis() as u64;
    if millis == 0 {
        0
    } else {
        bytes.saturating_mul(8_000) / millis
    }
}

/// One-line description of a packet header
pub fn describe(header: &PacketHeader) -> String {
    let detail = match header {
        PacketHeader::SessionStart(p) => format!(
            "producer={:?} version={}.{}.{}",
            p.producer_name, p.producer_major, p.producer_minor, p.producer_micro
        ),
        PacketHeader::TimeSync(p) => format!("epoch={}", p.epoch),
        PacketHeader::StreamRegistration(p) => format!(
            "codec={} timebase={}/{} bandwidth={}",
            p.codec_id,
            p.timebase.num,
            p.timebase.den,
            format_bandwidth(p.bandwidth)
        ),
        PacketHeader::StreamDuration(p) => format!("duration={}ns", p.duration),
        PacketHeader::VideoInfo(p) => format!("{}x{}", p.info.width, p.info.height),
        PacketHeader::VideoOrientation(p) => format!("rotation={}", p.orientation.rotation),
        PacketHeader::StreamData(p) => format!(
            "pts={} duration={} frame={:?} len={}",
            p.pts, p.duration, p.frame_type, p.data_length
        ),
        PacketHeader::GenericData(p) => format!("len={}/{}", p.payload_length, p.total_length),
        PacketHeader::GenericSegment(p) => format!(
            "target={} offset={} len={}/{}",
            p.target_seq, p.offset, p.length, p.total_length
        ),
        PacketHeader::EndOfStream(_) => String::new(),
    };
    format!(
        "#{:<8} {:<18} stream={:<5} {}",
        header.seq(),
        header.kind(),
        header.stream_id(),
        detail
    )
    .trim_end()
    .to_string()
}

/// Display receive statistics
pub fn display_input_stats(stats: &InputStats, bytes: u64, elapsed: Duration) {
    println!("\n┌─────────────────────────────────────────────┐");
    println!("│ INPUT STATISTICS                            │");
    println!("├─────────────────────────────────────────────┤");
    println!("│ Packets:   {}", stats.packets);
    println!("│ Lost:      {}", stats.lost);
    println!("│ Reordered: {}", stats.reordered);
    println!("│ Bad tags:  {}", stats.tag_failures);
    println!(
        "│ Payload:   {} ({})",
        format_bytes(bytes),
        format_bandwidth(rate_bps(bytes, elapsed))
    );
    println!("└─────────────────────────────────────────────┘");
}
