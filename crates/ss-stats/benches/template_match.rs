use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::{Array2, s};
use ss_stats::template::best_match;

fn textured(h: usize, w: usize) -> Array2<f32> {
    Array2::from_shape_fn((h, w), |(y, x)| {
        ((y as f32 * 12.9898 + x as f32 * 78.233).sin() * 437.585)
            .fract()
            .abs()
    })
}

fn bench_best_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("best_match");
    // 256 bins x ~10 s at hop 256 / 22050 Hz
    let reference = textured(256, 860);

    for &(th, tw) in &[(8usize, 12usize), (20, 40), (40, 80)] {
        let templ = reference.slice(s![100..100 + th, 300..300 + tw]).to_owned();
        let region = reference.slice(s![95..105 + th, ..]);
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{th}x{tw}")),
            &templ,
            |b, templ| b.iter(|| best_match(black_box(&region), black_box(&templ.view()))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_best_match);
criterion_main!(benches);
