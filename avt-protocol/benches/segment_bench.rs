use avt_protocol::packet::{Compression, EncodedHeader, FrameType, PacketHeader, StreamData};
use avt_protocol::segment::{HeadInfo, PacketSink, SegmentError, Segmenter};
use avt_protocol::sequence::{SeqNumber, SequenceState};
use avt_protocol::{Buffer, DigestTag, PacketFifo, ZeroTag};
use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

/// Sink that only counts bytes
struct Discard {
    max: usize,
    bytes: usize,
}

impl PacketSink for Discard {
    type Error = SegmentError;

    fn max_payload_len(&mut self) -> usize {
        self.max
    }

    fn send_packet(&mut self, header: &EncodedHeader, payload: Option<&Buffer>) -> Result<(), SegmentError> {
        self.bytes += header.len() + payload.map_or(0, Buffer::len);
        Ok(())
    }
}

fn data_head(info: HeadInfo) -> PacketHeader {
    PacketHeader::StreamData(StreamData {
        stream_id: 1,
        seq: info.seq,
        frame_type: FrameType::Key,
        segmented: info.segmented,
        fec_group: false,
        field_id: false,
        compression: Compression::None,
        pts: 0,
        duration: 3000,
        data_length: info.payload_length,
    })
}

fn bench_segmentation(c: &mut Criterion) {
    let mut group = c.benchmark_group("segmentation");

    for &len in &[1_000usize, 64 * 1024, 1024 * 1024] {
        let payload = Buffer::from_vec(vec![0u8; len]);
        group.throughput(Throughput::Bytes(len as u64));

        group.bench_function(format!("zero_tag_{}", len), |b| {
            let seq = SequenceState::new();
            let segmenter = Segmenter::new(&seq, &ZeroTag);
            let mut sink = Discard { max: 1372, bytes: 0 };
            b.iter(|| {
                let report = segmenter.send(&mut sink, black_box(&payload), data_head).unwrap();
                black_box(report);
            });
        });

        group.bench_function(format!("digest_tag_{}", len), |b| {
            let seq = SequenceState::new();
            let segmenter = Segmenter::new(&seq, &DigestTag);
            let mut sink = Discard { max: 1372, bytes: 0 };
            b.iter(|| {
                let report = segmenter.send(&mut sink, black_box(&payload), data_head).unwrap();
                black_box(report);
            });
        });
    }

    group.finish();
}

fn bench_header_codec(c: &mut Criterion) {
    let header = data_head(HeadInfo {
        seq: 1000,
        payload_length: 1316,
        total_length: 1316,
        segmented: false,
    });
    let encoded = header.encode(&ZeroTag);

    c.bench_function("header_encode", |b| {
        b.iter(|| black_box(black_box(&header).encode(&ZeroTag)));
    });

    c.bench_function("header_decode", |b| {
        b.iter(|| black_box(PacketHeader::decode(black_box(encoded.as_bytes())).unwrap()));
    });
}

fn bench_fifo(c: &mut Criterion) {
    let mut group = c.benchmark_group("fifo");
    let payload = Buffer::from_vec(vec![0u8; 1316]);
    let header = data_head(HeadInfo {
        seq: 0,
        payload_length: 1316,
        total_length: 1316,
        segmented: false,
    });

    group.bench_function("push_pop", |b| {
        let mut fifo = PacketFifo::new();
        b.iter(|| {
            fifo.push(header.clone(), Some(&payload)).unwrap();
            black_box(fifo.pop().unwrap());
        });
    });

    group.bench_function("drop_by_size_1000", |b| {
        b.iter(|| {
            let mut fifo = PacketFifo::new();
            for _ in 0..1000 {
                fifo.push(header.clone(), Some(&payload)).unwrap();
            }
            black_box(fifo.drop_tail(0, 500 * 1400).unwrap());
        });
    });

    group.finish();
}

fn bench_seq_number_ops(c: &mut Criterion) {
    let mut group = c.benchmark_group("sequence_number");

    group.bench_function("next", |b| {
        let seq = SequenceState::new();
        b.iter(|| black_box(seq.next()));
    });

    group.bench_function("distance", |b| {
        let a = SeqNumber::new(u32::MAX - 5);
        let z = SeqNumber::new(1000);
        b.iter(|| black_box(black_box(a).distance_to(black_box(z))));
    });

    group.finish();
}

criterion_group!(benches, bench_segmentation, bench_header_codec, bench_fifo, bench_seq_number_ops);
criterion_main!(benches);
