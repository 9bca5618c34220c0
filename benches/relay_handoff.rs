//! Benchmarks for the frame hand-off path
//!
//! Covers the per-frame work between decode and the output device:
//! - Placeholder generation at common output resolutions
//! - Submit/take through the single-slot relay
//! - BGR to RGB conversion before delivery

use camrelay::{Frame, FrameRelay, PixelFormat, PlaceholderGenerator, RelayMode};
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;

const RESOLUTIONS: [(u32, u32); 3] = [(640, 480), (1280, 720), (1920, 1080)];

fn bench_placeholder_generation(c: &mut Criterion) {
    let mut group = c.benchmark_group("placeholder_generation");

    for (width, height) in RESOLUTIONS {
        group.throughput(Throughput::Bytes(Frame::byte_len(width, height, PixelFormat::Rgb24) as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &(width, height),
            |b, &(w, h)| b.iter(|| black_box(PlaceholderGenerator::generate(black_box(w), black_box(h)))),
        );
    }

    group.finish();
}

fn bench_relay_handoff(c: &mut Criterion) {
    let relay = FrameRelay::new(1920, 1080);
    relay.set_mode(RelayMode::Live);
    let frame = Frame::solid(1920, 1080, PixelFormat::Bgr24, [10, 20, 30]);

    c.bench_function("relay_submit_take", |b| {
        b.iter(|| {
            relay.submit(black_box(frame.clone()));
            black_box(relay.try_take())
        })
    });

    c.bench_function("relay_submit_overwrite", |b| {
        b.iter(|| {
            relay.submit(black_box(frame.clone()));
            relay.submit(black_box(frame.clone()))
        })
    });
}

fn bench_rgb_conversion(c: &mut Criterion) {
    let mut group = c.benchmark_group("rgb_conversion");

    for (width, height) in RESOLUTIONS {
        let frame = Frame::solid(width, height, PixelFormat::Bgr24, [10, 20, 30]);
        group.throughput(Throughput::Bytes(frame.data().len() as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{width}x{height}")),
            &frame,
            |b, frame| b.iter(|| black_box(frame.to_rgb())),
        );
    }

    group.finish();
}

criterion_group!(benches, bench_placeholder_generation, bench_relay_handoff, bench_rgb_conversion);
criterion_main!(benches);
