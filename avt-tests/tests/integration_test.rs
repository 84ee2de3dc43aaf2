//! End-to-end integration tests
//!
//! Drives sessions through real and in-memory backends and reads the result
//! back through the receive path.

mod common;

use avt_io::Address;
use avt_protocol::packet::{StreamData, VideoInfo, VideoOrientation};
use avt_protocol::{
    Buffer, Compression, DataKind, DigestTag, FrameType, PacketFifo, PacketHeader, PacketKind,
    Rational, Reassembler, SESSION_STREAM_ID,
};
use avt_session::{
    CodecId, Input, InputEvent, MediaPacket, Output, OutputOptions, Session, Stream,
};
use common::Wire;
use std::sync::Arc;
use std::thread;

fn temp_path(name: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!("avt-tests-{}-{}", std::process::id(), name))
}

fn pattern(len: usize, salt: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(salt)).collect()
}

fn options(max_payload: usize) -> OutputOptions {
    OutputOptions {
        max_payload: Some(max_payload),
        tag: Arc::new(DigestTag),
        ..OutputOptions::default()
    }
}

#[test]
fn test_file_roundtrip() {
    let path = temp_path("roundtrip.avt");
    let address = Address::File(path.clone());
    let init = pattern(250, 1);
    let small = pattern(50, 2);
    let large = pattern(230, 3);

    let mut session = Session::open(&address, options(100)).unwrap();
    session.time_sync(1_700_000_000_000_000_000).unwrap();

    let mut stream = Stream::new(1, CodecId::AV1);
    stream.timebase = Rational::new(1, 90_000);
    stream.bitrate = 4_000_000;
    stream.duration = Some(5_000_000_000);
    stream.video_info = Some(VideoInfo {
        width: 1920,
        height: 1080,
        framerate: Rational::new(30, 1),
        ..VideoInfo::default()
    });
    stream.video_orientation = Some(VideoOrientation {
        rotation: 90,
        flip_horizontal: false,
        flip_vertical: true,
    });
    stream.init_data = Some(Buffer::from_vec(init.clone()));
    session.register(stream).unwrap();

    let mut frame = MediaPacket::new(Buffer::from_vec(small.clone()), 0);
    frame.frame_type = FrameType::Key;
    session.write_stream_data(1, &frame).unwrap();
    let frame = MediaPacket::new(Buffer::from_vec(large.clone()), 3000);
    session.write_stream_data(1, &frame).unwrap();

    session.close_stream(1).unwrap();
    session.close().unwrap();

    let mut input = Input::open(&address, Arc::new(DigestTag)).unwrap();
    let mut events = Vec::new();
    while let Some(event) = input.next_event().unwrap() {
        events.push(event);
    }
    input.close().unwrap();
    std::fs::remove_file(&path).unwrap();

    let kinds: Vec<PacketKind> = events
        .iter()
        .map(|event| match event {
            InputEvent::Control(header) => header.kind(),
            InputEvent::Payload(done) => done.header.kind(),
        })
        .collect();
    assert_eq!(
        kinds,
        vec![
            PacketKind::SessionStart,
            PacketKind::TimeSync,
            PacketKind::StreamRegistration,
            PacketKind::StreamDuration,
            PacketKind::VideoInfo,
            PacketKind::VideoOrientation,
            PacketKind::StreamInitData,
            PacketKind::StreamData,
            PacketKind::StreamData,
            PacketKind::EndOfStream,
            PacketKind::EndOfStream,
        ]
    );

    match &events[2] {
        InputEvent::Control(PacketHeader::StreamRegistration(reg)) => {
            assert_eq!(reg.codec_id, CodecId::AV1.0);
            assert_eq!(reg.timebase, Rational::new(1, 90_000));
            assert_eq!(reg.bandwidth, 4_000_000);
            assert_eq!(reg.related_id, None);
        }
        other => panic!("unexpected {:?}", other),
    }
    match &events[4] {
        InputEvent::Control(PacketHeader::VideoInfo(video)) => {
            assert_eq!((video.info.width, video.info.height), (1920, 1080));
            assert_eq!(video.info.framerate, Rational::new(30, 1));
        }
        other => panic!("unexpected {:?}", other),
    }

    let payloads: Vec<Vec<u8>> = events
        .iter()
        .filter_map(|event| match event {
            InputEvent::Payload(done) => Some(done.payload.to_vec()),
            InputEvent::Control(_) => None,
        })
        .collect();
    assert_eq!(payloads, vec![init, small, large]);

    match &events[8] {
        InputEvent::Payload(done) => match &done.header {
            PacketHeader::StreamData(data) => {
                assert_eq!(data.pts, 3000);
                assert!(data.segmented);
                assert_eq!(data.data_length, 100);
            }
            other => panic!("unexpected {:?}", other),
        },
        other => panic!("unexpected {:?}", other),
    }
    match &events[10] {
        InputEvent::Control(header) => assert_eq!(header.stream_id(), SESSION_STREAM_ID),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_sequence_is_global_across_streams() {
    let wire = Wire::new(1000);
    let mut session = Session::new(Output::with_protocol(wire.protocol(), options(1000)).unwrap());
    session.register(Stream::new(1, CodecId::OPUS)).unwrap();
    session.register(Stream::new(2, CodecId::H264)).unwrap();
    for pts in 0..3 {
        let frame = MediaPacket::new(Buffer::from_vec(vec![0; 10]), pts);
        session.write_stream_data(1, &frame).unwrap();
        session.write_stream_data(2, &frame).unwrap();
    }
    session
        .write_user_data(&Buffer::from_vec(vec![1, 2, 3]), 0x05, 77)
        .unwrap();
    session.close().unwrap();

    let headers = wire.headers();
    let seqs: Vec<u32> = headers.iter().map(PacketHeader::seq).collect();
    assert_eq!(seqs, (0..headers.len() as u32).collect::<Vec<_>>());

    let user = headers
        .iter()
        .find(|h| h.kind() == PacketKind::UserData)
        .unwrap();
    assert_eq!(user.descriptor(), 0x4005);
    assert_eq!(user.stream_id(), 77);
    match user {
        PacketHeader::GenericData(data) => assert_eq!(data.kind, DataKind::UserData { flags: 0x05 }),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_lost_head_rebuilt_from_segments() {
    let wire = Wire::new(40);
    let output = Output::with_protocol(wire.protocol(), options(40)).unwrap();
    let payload = pattern(320, 9);
    let mut frame = MediaPacket::new(Buffer::from_vec(payload.clone()), -42);
    frame.duration = 1001;
    frame.compression = Compression::Zstd;
    let report = output.write_stream_data(4, &frame).unwrap();
    assert_eq!(report.segments, 7);

    let packets = wire.packets();
    // session start, then the head and its seven segments
    let (head_bytes, head_payload) = &packets[1];
    let head = PacketHeader::decode(head_bytes).unwrap();

    let mut reassembler = Reassembler::default();
    for (header, data) in &packets[2..] {
        let done = reassembler
            .push(header, Buffer::from_vec(data.clone()))
            .unwrap();
        assert!(done.is_none());
    }

    let rebuilt = reassembler.recover_head(report.head_seq).unwrap().unwrap();
    assert_eq!(rebuilt, head);
    match &rebuilt {
        PacketHeader::StreamData(StreamData {
            stream_id,
            pts,
            duration,
            compression,
            ..
        }) => {
            assert_eq!(*stream_id, 4);
            assert_eq!(*pts, -42);
            assert_eq!(*duration, 1001);
            assert_eq!(*compression, Compression::Zstd);
        }
        other => panic!("unexpected {:?}", other),
    }

    let done = reassembler
        .push(head_bytes, Buffer::from_vec(head_payload.clone()))
        .unwrap()
        .unwrap();
    assert_eq!(done.payload.to_vec(), payload);
    assert_eq!(reassembler.pending_count(), 0);
}

#[test]
fn test_input_counts_dropped_packets() {
    let wire = Wire::new(64);
    let output = Output::with_protocol(wire.protocol(), options(64)).unwrap();
    for pts in 0..5 {
        let frame = MediaPacket::new(Buffer::from_vec(vec![pts as u8; 16]), pts);
        output.write_stream_data(3, &frame).unwrap();
    }
    output.close().unwrap();

    // drop frames with pts 1 and 2 (packets 2 and 3)
    let mut input = Input::with_protocol(wire.replay(|i| i != 2 && i != 3), Arc::new(DigestTag));
    let mut frames = Vec::new();
    while let Some(event) = input.next_event().unwrap() {
        if let InputEvent::Payload(done) = event {
            frames.push(done.payload.to_vec()[0]);
        }
    }

    assert_eq!(frames, vec![0, 3, 4]);
    assert_eq!(input.stats().lost, 2);
    assert_eq!(input.stats().packets, 5);
    assert_eq!(input.stats().tag_failures, 0);
}

#[test]
fn test_send_queue_stops_at_failure() {
    let wire = Wire::new(1000);
    let output = Output::with_protocol(wire.protocol(), options(1000)).unwrap();

    let mut fifo = PacketFifo::new();
    for seq in 100..104 {
        let data = Buffer::from_vec(vec![seq as u8; 8]);
        let header = PacketHeader::StreamData(StreamData {
            stream_id: 1,
            seq,
            frame_type: FrameType::Key,
            segmented: false,
            fec_group: false,
            field_id: false,
            compression: Compression::None,
            pts: seq as i64,
            duration: 0,
            data_length: 8,
        });
        fifo.push(header, Some(&data)).unwrap();
    }

    // session start plus two queued packets get through
    wire.fail_after(3);
    assert!(output.send_queue(&mut fifo).is_err());
    assert_eq!(fifo.len(), 2);
    assert_eq!(fifo.peek().unwrap().header.seq(), 102);

    let sent: Vec<u32> = wire.headers().iter().map(PacketHeader::seq).collect();
    assert_eq!(sent, vec![0, 100, 101]);
    assert_eq!(wire.packets()[1].1, vec![100; 8]);
}

#[test]
fn test_shared_output_keeps_chains_contiguous() {
    let wire = Wire::new(40);
    let output = Arc::new(Output::with_protocol(wire.protocol(), options(40)).unwrap());

    let handles: Vec<_> = (0..4u16)
        .map(|stream_id| {
            let output = Arc::clone(&output);
            thread::spawn(move || {
                for pts in 0..25 {
                    let frame = MediaPacket::new(Buffer::from_vec(vec![0; 100]), pts);
                    output.write_stream_data(stream_id, &frame).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let headers = wire.headers();
    assert_eq!(headers.len(), 1 + 100 * 3);

    let mut head_seq = None;
    for (i, header) in headers.iter().enumerate() {
        assert_eq!(header.seq(), i as u32);
        match header {
            PacketHeader::StreamData(_) => head_seq = Some(header.seq()),
            PacketHeader::GenericSegment(segment) => {
                assert_eq!(Some(segment.target_seq), head_seq);
                assert_eq!(segment.stream_id, headers[segment.target_seq as usize].stream_id());
            }
            _ => {}
        }
    }
}

#[test]
fn test_null_output_discards() {
    let mut session = Session::open(&Address::Null, OutputOptions::default()).unwrap();
    session.register(Stream::new(1, CodecId::FLAC)).unwrap();
    let frame = MediaPacket::new(Buffer::from_vec(vec![0; 5000]), 0);
    let report = session.write_stream_data(1, &frame).unwrap();
    assert!(report.segments > 0);
    session.close().unwrap();
}
