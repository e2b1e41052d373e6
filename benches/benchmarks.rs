
use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use fluxline::line_protocol::{encode, GlobalTags};
use fluxline::{Client, Transport, TransportError};

use std::time::Duration;

/// Accepts everything without doing any I/O.
struct NullTransport;

impl Transport for NullTransport {
    fn send(&mut self, payload: &str) -> Result<(), TransportError> {
        black_box(payload);
        Ok(())
    }
}

fn bench_encode(c: &mut Criterion) {
    let points = datasets::generate_points(datasets::DEFAULT_SEED, 10_000, 16, 4, 16);
    let mut globals = GlobalTags::default();
    globals.push("host", "bench-1");
    globals.push("region", "eu");

    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("encode_10k_with_global_tags", |b| {
        b.iter(|| {
            for point in &points {
                black_box(encode(black_box(point), &globals));
            }
        })
    });
    group.finish();
}

fn bench_batched_writes(c: &mut Criterion) {
    let points = datasets::generate_points(datasets::DEFAULT_SEED, 20_000, 64, 4, 16);

    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Elements(points.len() as u64));

    for batch_size in [1usize, 100, 5_000] {
        group.bench_function(format!("write_20k_batch_{}", batch_size), |b| {
            b.iter_batched(
                || {
                    let client = Client::new(NullTransport);
                    client
                        .configure(batch_size, Duration::from_secs(60 * 60))
                        .unwrap();
                    (client, points.clone())
                },
                |(client, points)| {
                    for point in points {
                        client.write(black_box(point)).unwrap();
                    }
                    client.flush_now().unwrap();
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.bench_function("write_all_20k_batch_5000", |b| {
        b.iter_batched(
            || {
                let client = Client::new(NullTransport);
                client.configure(5_000, Duration::ZERO).unwrap();
                (client, points.clone())
            },
            |(client, points)| {
                client.write_all(black_box(points)).unwrap();
                client.flush_now().unwrap();
            },
            BatchSize::LargeInput,
        )
    });

    group.finish();
}

fn bench_unbatched_writes(c: &mut Criterion) {
    let points = datasets::generate_points(datasets::DEFAULT_SEED, 1_000, 8, 2, 8);
    let client = Client::new(NullTransport);

    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Elements(points.len() as u64));
    group.bench_function("write_1k_unbatched", |b| {
        b.iter_batched(
            || points.clone(),
            |points| {
                for point in points {
                    client.write(black_box(point)).unwrap();
                }
            },
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

criterion_group!(benches, bench_encode, bench_batched_writes, bench_unbatched_writes);
criterion_main!(benches);
