//! Property-based tests for segmentation, the FIFO and shared buffers
//!
//! These tests use proptest to check the invariants that must hold for any
//! payload size, payload limit and queue contents.

use avt_protocol::packet::{GenericData, StreamDuration, StreamData};
use avt_protocol::{
    Buffer, Compression, DataKind, DigestTag, EncodedHeader, FrameType, PacketFifo, PacketHeader,
    PacketSink, Reassembler, SegmentError, Segmenter, SeqNumber, SequenceState,
};
use proptest::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Sink keeping every packet it is handed
struct Collect {
    max: usize,
    packets: Vec<(EncodedHeader, Vec<u8>)>,
}

impl PacketSink for Collect {
    type Error = SegmentError;

    fn max_payload_len(&mut self) -> usize {
        self.max
    }

    fn send_packet(&mut self, header: &EncodedHeader, payload: Option<&Buffer>) -> Result<(), SegmentError> {
        let payload = payload.map(Buffer::to_vec).unwrap_or_default();
        self.packets.push((header.clone(), payload));
        Ok(())
    }
}

fn segment(payload: &[u8], max: usize, start: u32) -> (Collect, u32) {
    let seq = SequenceState::starting_at(start);
    let mut sink = Collect {
        max,
        packets: Vec::new(),
    };
    let report = Segmenter::new(&seq, &DigestTag)
        .send(&mut sink, &Buffer::copy_from_slice(payload), |info| {
            PacketHeader::GenericData(GenericData {
                kind: DataKind::InitData,
                stream_id: 2,
                seq: info.seq,
                payload_length: info.payload_length,
                total_length: info.total_length,
            })
        })
        .unwrap();
    (sink, report.head_seq)
}

fn duration_header(seq: u32) -> PacketHeader {
    PacketHeader::StreamDuration(StreamDuration {
        stream_id: 1,
        seq,
        duration: 0,
    })
}

proptest! {
    #[test]
    fn prop_segments_partition_payload(
        payload in prop::collection::vec(any::<u8>(), 0..3000),
        max in 1usize..700,
        start in any::<u32>(),
    ) {
        let (sink, head_seq) = segment(&payload, max, start);
        prop_assert_eq!(head_seq, start);

        let expected_packets = if payload.len() <= max {
            1
        } else {
            1 + (payload.len() - max + max - 1) / max
        };
        prop_assert_eq!(sink.packets.len(), expected_packets);

        let mut offset = 0usize;
        for (i, (header, data)) in sink.packets.iter().enumerate() {
            let decoded = PacketHeader::decode(header.as_bytes()).unwrap();
            prop_assert_eq!(decoded.seq(), start.wrapping_add(i as u32));
            prop_assert!(data.len() <= max);
            prop_assert_eq!(decoded.payload_len(), data.len());
            prop_assert_eq!(&data[..], &payload[offset..offset + data.len()]);
            if let PacketHeader::GenericSegment(seg) = &decoded {
                prop_assert_eq!(seg.offset as usize, offset);
                prop_assert_eq!(seg.target_seq, start);
                prop_assert_eq!(seg.total_length as usize, payload.len());
            }
            offset += data.len();
        }
        prop_assert_eq!(offset, payload.len());
    }

    #[test]
    fn prop_reassembly_in_any_order(
        payload in prop::collection::vec(any::<u8>(), 1..2000),
        max in 16usize..300,
        rotate in any::<usize>(),
    ) {
        let (sink, head_seq) = segment(&payload, max, 1000);
        let mut packets = sink.packets;
        let shift = rotate % packets.len();
        packets.rotate_left(shift);

        let mut reassembler = Reassembler::default();
        let mut completed = Vec::new();
        for (header, data) in &packets {
            if let Some(done) = reassembler.push(header.as_bytes(), Buffer::from_vec(data.clone())).unwrap() {
                completed.push(done);
            }
        }

        prop_assert_eq!(completed.len(), 1);
        prop_assert_eq!(completed[0].header.seq(), head_seq);
        prop_assert_eq!(completed[0].payload.to_vec(), payload);
        prop_assert_eq!(reassembler.pending_count(), 0);
    }

    #[test]
    fn prop_digest_tag_detects_bit_flip(
        seq in any::<u32>(),
        pts in any::<i64>(),
        bit in 0usize..(28 * 8),
    ) {
        let header = PacketHeader::StreamData(StreamData {
            stream_id: 5,
            seq,
            frame_type: FrameType::Key,
            segmented: false,
            fec_group: false,
            field_id: false,
            compression: Compression::None,
            pts,
            duration: 0,
            data_length: 0,
        });
        let mut bytes = header.encode(&DigestTag).as_bytes().to_vec();
        prop_assert!(PacketHeader::verify(&bytes, &DigestTag).is_ok());

        bytes[bit / 8] ^= 1 << (bit % 8);
        prop_assert!(PacketHeader::verify(&bytes, &DigestTag).is_err());
    }

    #[test]
    fn prop_fifo_drop_by_count(
        lens in prop::collection::vec(0usize..64, 0..20),
        count in 1usize..25,
    ) {
        let mut fifo = PacketFifo::new();
        for (i, &len) in lens.iter().enumerate() {
            fifo.push(duration_header(i as u32), Some(&Buffer::from_vec(vec![0; len]))).unwrap();
        }

        match fifo.drop_tail(count, 0) {
            Ok(removed) => {
                prop_assert!(count <= lens.len());
                prop_assert_eq!(removed, count);
                let seqs: Vec<u32> = fifo.iter().map(|e| e.header.seq()).collect();
                prop_assert_eq!(seqs, (0..(lens.len() - count) as u32).collect::<Vec<_>>());
            }
            Err(_) => {
                prop_assert!(count > lens.len());
                prop_assert_eq!(fifo.len(), lens.len());
            }
        }
    }

    #[test]
    fn prop_fifo_drop_by_size(
        lens in prop::collection::vec(0usize..512, 0..20),
        ceiling in 0usize..8192,
    ) {
        let freed = Arc::new(AtomicUsize::new(0));
        let mut fifo = PacketFifo::new();
        for (i, &len) in lens.iter().enumerate() {
            let counter = Arc::clone(&freed);
            let payload = Buffer::with_free_callback(vec![0; len], move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            fifo.push(duration_header(i as u32), Some(&payload)).unwrap();
        }
        let sizes: Vec<usize> = fifo.iter().map(|e| e.size()).collect();

        let removed = fifo.drop_tail(0, ceiling).unwrap();

        prop_assert!(fifo.size_estimate() <= ceiling || removed == 0);
        prop_assert_eq!(fifo.len() + removed, lens.len());
        prop_assert_eq!(freed.load(Ordering::SeqCst), removed);
        if removed > 0 {
            // the first dropped entry is the one that crossed the ceiling
            prop_assert!(fifo.size_estimate() + sizes[fifo.len()] > ceiling);
        } else {
            prop_assert!(sizes.iter().sum::<usize>() <= ceiling);
        }
    }

    #[test]
    fn prop_buffer_freed_once(
        len in 1usize..256,
        views in prop::collection::vec((0usize..256, 0usize..256), 0..10),
    ) {
        let freed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&freed);
        let buffer = Buffer::with_free_callback(vec![7; len], move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let mut held = Vec::new();
        let mut fifo = PacketFifo::new();
        for (i, &(offset, size)) in views.iter().enumerate() {
            if let Ok(view) = buffer.view(offset, size) {
                prop_assert!(offset + size <= len);
                prop_assert!(view.shares_storage(&buffer));
                fifo.push(duration_header(i as u32), Some(&view)).unwrap();
                held.push(view);
            }
        }
        prop_assert_eq!(buffer.ref_count(), 1 + 2 * held.len());

        drop(buffer);
        drop(held);
        prop_assert_eq!(freed.load(Ordering::SeqCst), 0);
        fifo.clear();
        prop_assert_eq!(freed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn prop_sequence_distance(
        a in any::<u32>(),
        delta in -100_000i32..100_000,
    ) {
        let from = SeqNumber::new(a);
        let to = SeqNumber::new(a.wrapping_add(delta as u32));
        prop_assert_eq!(from.distance_to(to), delta);
        prop_assert_eq!(to.distance_to(from), -delta);
        prop_assert_eq!(from.lt(to), delta > 0);
    }
}
