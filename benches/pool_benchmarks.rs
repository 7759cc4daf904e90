// ABOUTME: Benchmarks for the I/O-op pool and the two built-in framers
// ABOUTME: Measures rent/return throughput and per-byte framing cost under steady-state traffic

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use portcullis::framing::{DelimiterFramer, Framer, LengthPrefixFramer};
use portcullis::pool::IOOpPool;
use std::time::Duration;

fn bench_pool_get_put(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_get_put");
    group.measurement_time(Duration::from_secs(5));

    for buffer_size in [256usize, 4096, 65536] {
        group.bench_with_input(BenchmarkId::from_parameter(buffer_size), &buffer_size, |b, &buffer_size| {
            let pool = IOOpPool::new(buffer_size);
            b.iter(|| {
                let op = pool.get().unwrap();
                pool.put(black_box(op)).unwrap();
            })
        });
    }

    group.finish();
}

fn bench_delimiter_framer(c: &mut Criterion) {
    let mut group = c.benchmark_group("delimiter_framer");

    group.bench_function("single_line", |b| {
        b.iter(|| {
            let mut framer = DelimiterFramer::new('\n', 4096).unwrap();
            framer.feed(black_box(b"the quick brown fox jumps over the lazy dog\n")).unwrap();
            black_box(framer.next())
        })
    });

    group.bench_function("many_lines_one_feed", |b| {
        let mut payload = Vec::new();
        for _ in 0..100 {
            payload.extend_from_slice(b"a short message\n");
        }
        b.iter(|| {
            let mut framer = DelimiterFramer::new('\n', 65536).unwrap();
            framer.feed(black_box(&payload)).unwrap();
            let mut count = 0;
            while framer.next().is_some() {
                count += 1;
            }
            black_box(count)
        })
    });

    group.finish();
}

fn bench_length_prefix_framer(c: &mut Criterion) {
    let mut group = c.benchmark_group("length_prefix_framer");

    group.bench_function("single_message", |b| {
        let mut frame = vec![0x00, 0x00, 0x00, 0x20];
        frame.extend_from_slice(&[b'x'; 32]);
        b.iter(|| {
            let mut framer = LengthPrefixFramer::new(4, 4096).unwrap();
            framer.feed(black_box(&frame)).unwrap();
            black_box(framer.next())
        })
    });

    group.bench_function("byte_by_byte", |b| {
        let mut frame = vec![0x00, 0x00, 0x00, 0x08];
        frame.extend_from_slice(b"payload!");
        b.iter(|| {
            let mut framer = LengthPrefixFramer::new(4, 4096).unwrap();
            for byte in &frame {
                framer.feed(black_box(&[*byte])).unwrap();
            }
            black_box(framer.next())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_pool_get_put, bench_delimiter_framer, bench_length_prefix_framer);
criterion_main!(benches);
