//! Segment benchmarks.

use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkId, BatchSize, Criterion,
    Throughput,
};
use proglog_bench::{create_test_record, create_test_segment};
use proglog_log::LogRecord;

/// Records appended per measured batch; each batch gets a fresh segment.
const BATCH: u64 = 1000;

fn bench_segment_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_append");

    for size in [100, 1000, 10000] {
        let record = create_test_record(size);

        group.throughput(Throughput::Elements(BATCH));
        group.bench_with_input(BenchmarkId::new("payload_bytes", size), &record, |b, record| {
            b.iter_batched(
                || create_test_segment(BATCH),
                |(dir, segment)| {
                    for _ in 0..BATCH {
                        let mut record = record.clone();
                        black_box(segment.append(&mut record).unwrap());
                    }
                    (dir, segment)
                },
                BatchSize::PerIteration,
            );
        });
    }

    group.finish();
}

fn bench_segment_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_read");

    for count in [100u64, 10_000] {
        let (_dir, segment) = create_test_segment(count);
        for _ in 0..count {
            segment.append(&mut create_test_record(100)).unwrap();
        }

        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::new("random", count), &count, |b, &count| {
            let mut offset = 0u64;
            b.iter(|| {
                offset = (offset + 7919) % count;
                black_box(segment.read::<LogRecord>(offset).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_segment_reopen(c: &mut Criterion) {
    let mut group = c.benchmark_group("segment_reopen");
    group.sample_size(20);

    let (dir, segment) = create_test_segment(10_000);
    for _ in 0..10_000 {
        segment.append(&mut create_test_record(100)).unwrap();
    }
    let config = proglog_log::Config::new()
        .with_max_store_bytes(u64::MAX)
        .with_max_index_bytes(10_000 * proglog_log::ENTRY_WIDTH);
    segment.close().unwrap();

    group.bench_function("10k_records", |b| {
        b.iter(|| {
            let segment = proglog_log::Segment::open(dir.path(), 0, &config).unwrap();
            black_box(segment.next_offset());
            segment.close().unwrap();
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_segment_append,
    bench_segment_read,
    bench_segment_reopen
);
criterion_main!(benches);
