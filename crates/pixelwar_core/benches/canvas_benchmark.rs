//! # Canvas Cache Benchmark
//!
//! ARCHITECT'S REQUIREMENTS:
//! - Merging a full 1024-wide row: well under a frame
//! - Snapshot of a 1024x1024 canvas: < 10ms
//!
//! Run with: `cargo bench --package pixelwar_core`

// Benchmarks don't need strict docs
#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use pixelwar_core::{decode, encode, CanvasCache, Coord, GridSize, Rgb};

/// Benchmark: color codec.
fn bench_codec(c: &mut Criterion) {
    c.bench_function("encode_color", |b| {
        b.iter(|| black_box(encode(black_box("#A1B2C3"))));
    });
    c.bench_function("decode_color", |b| {
        b.iter(|| black_box(decode(black_box(0xFFA1_B2C3))));
    });
}

/// Benchmark: row merge and snapshot at several canvas sizes.
fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("canvas_cache");

    for side in [30u32, 256, 1024] {
        let size = GridSize::new(side, side).unwrap();
        let row: Vec<Rgb> = (0..side).map(|x| Rgb::from_wire(x * 997)).collect();

        group.bench_with_input(BenchmarkId::new("apply_remote_row", side), &side, |b, _| {
            let mut cache = CanvasCache::new(size, Rgb::BLACK);
            b.iter(|| black_box(cache.apply_remote_row(side / 2, &row)));
        });

        group.bench_with_input(BenchmarkId::new("snapshot", side), &side, |b, _| {
            let mut cache = CanvasCache::new(size, Rgb::BLACK);
            cache.apply_optimistic(Coord::new(0, 0), Rgb::WHITE).unwrap();
            b.iter(|| black_box(cache.snapshot()));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_codec, bench_cache);
criterion_main!(benches);
