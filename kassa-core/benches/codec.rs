use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use kassa_core::{checksum, frame, Packet, PacketReader};

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("v3_encode");
    for size in [16usize, 256, 4096] {
        let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let packet = Packet::new(1, payload);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &packet, |b, packet| {
            b.iter(|| black_box(packet.encode()))
        });
    }
    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("v3_decode");
    for size in [16usize, 256, 4096] {
        let payload: Vec<u8> = (0..size).map(|i| i as u8).collect();
        let encoded = Packet::new(1, payload).encode();
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &encoded, |b, encoded| {
            b.iter(|| black_box(Packet::decode(encoded).unwrap()))
        });
    }
    group.finish();
}

fn bench_reader(c: &mut Criterion) {
    let stream: Vec<u8> = (0..64u8)
        .flat_map(|id| Packet::new(id, vec![0xA3, 0xFE, 0xFD, id]).encode())
        .collect();

    c.bench_function("v3_reader_chunked", |b| {
        b.iter(|| {
            let mut reader = PacketReader::new();
            let mut frames = 0;
            for chunk in stream.chunks(7) {
                reader.push(chunk);
                while reader.next_frame().is_some() {
                    frames += 1;
                }
            }
            black_box(frames)
        })
    });
}

fn bench_checksums(c: &mut Criterion) {
    let data = vec![0x5Au8; 1024];
    c.bench_function("crc8_1k", |b| b.iter(|| black_box(checksum::crc8(7, &data))));
    c.bench_function("v2_wrap_1k", |b| b.iter(|| black_box(frame::wrap(&data))));
}

criterion_group!(benches, bench_encode, bench_decode, bench_reader, bench_checksums);
criterion_main!(benches);
