//! Benchmarks for trajectory smoothing

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use drawing_decoder::{
    smoothing::{median_smooth, StreamingSmoother},
    trajectory::TrajectoryBuilder,
};
use nalgebra::Point3;

fn noisy_circle(n: usize) -> Vec<Point3<f64>> {
    (0..n)
        .map(|i| {
            let t = i as f64 * 0.01;
            Point3::new(
                10.0 * t.cos() + 0.2 * rand::random::<f64>(),
                -18.0 + 0.2 * rand::random::<f64>(),
                10.0 * t.sin() + 0.2 * rand::random::<f64>(),
            )
        })
        .collect()
}

fn benchmark_median_smooth(c: &mut Criterion) {
    let mut group = c.benchmark_group("median_smooth");
    let points = noisy_circle(10_000);

    for window in [1usize, 5, 10, 25] {
        group.bench_with_input(BenchmarkId::new("batch", window), &window, |b, &window| {
            b.iter(|| black_box(median_smooth(black_box(&points), window)));
        });

        group.bench_with_input(BenchmarkId::new("streaming", window), &window, |b, &window| {
            b.iter(|| {
                let mut smoother = StreamingSmoother::new(window);
                let mut out = Vec::with_capacity(points.len() / window + 1);
                for &p in &points {
                    out.extend(smoother.push(black_box(p)));
                }
                out.extend(smoother.flush());
                black_box(out)
            });
        });
    }

    group.finish();
}

fn benchmark_strokes(c: &mut Criterion) {
    let mut group = c.benchmark_group("trajectory");
    let points = noisy_circle(10_000);

    for per_stroke in [false, true] {
        group.bench_with_input(BenchmarkId::new("finish_per_stroke", per_stroke), &per_stroke, |b, &per_stroke| {
            b.iter(|| {
                let mut builder = TrajectoryBuilder::new();
                for (i, &p) in points.iter().enumerate() {
                    // Lift every 500 points
                    if i % 500 == 0 {
                        builder.lift();
                    }
                    builder.push(p);
                }
                black_box(builder.finish(10, per_stroke))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_median_smooth, benchmark_strokes);
criterion_main!(benches);
