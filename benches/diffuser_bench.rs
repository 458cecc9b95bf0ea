//! Criterion benchmarks for the VP-SDE diffuser

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{Array1, Array3};
use r3_diffusion::{DiffuserConfig, R3Diffuser, ReverseOptions};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

fn bench_forward_marginal(c: &mut Criterion) {
    let mut group = c.benchmark_group("Forward Marginal");
    let diffuser = R3Diffuser::new(DiffuserConfig::default()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    for n_points in [16, 128, 1024].iter() {
        let x_0 = Array3::from_elem((8, *n_points, 3), 1.0);
        let t = Array1::linspace(0.1, 0.9, 8);

        group.bench_with_input(BenchmarkId::new("points", n_points), &x_0, |b, x_0| {
            b.iter(|| diffuser.forward_marginal(black_box(x_0), &t, &mut rng).unwrap());
        });
    }

    group.finish();
}

fn bench_reverse(c: &mut Criterion) {
    let mut group = c.benchmark_group("Reverse Step");
    let diffuser = R3Diffuser::new(DiffuserConfig::default()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(0);

    for n_points in [16, 128, 1024].iter() {
        let x_t = Array3::from_elem((8, *n_points, 3), 1.0);
        let score_t = Array3::from_elem((8, *n_points, 3), -0.5);

        group.bench_with_input(BenchmarkId::new("points", n_points), &x_t, |b, x_t| {
            b.iter(|| {
                diffuser
                    .reverse(
                        black_box(x_t),
                        &score_t,
                        0.5,
                        0.01,
                        None,
                        ReverseOptions::default(),
                        &mut rng,
                    )
                    .unwrap()
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_forward_marginal, bench_reverse);
criterion_main!(benches);
