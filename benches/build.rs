//! Criterion benchmarks for the ensemble build.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use nefbuild::prelude::*;

fn build_one(ens: &Ensemble) -> Model {
    let mut model = Model::new(ModelConfig::default()).unwrap();
    model.build(ens).expect("benchmark ensemble should build");
    model
}

/// Benchmark a full ensemble build with varying population sizes.
fn bench_build_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_size");

    for n_neurons in [50, 200, 1000, 4000].iter() {
        group.throughput(Throughput::Elements(*n_neurons as u64));

        group.bench_with_input(BenchmarkId::new("lif", n_neurons), n_neurons, |b, &n| {
            let ens = Ensemble::new(EnsembleId(0), n, 4).with_seed(42);
            b.iter(|| black_box(build_one(&ens).operators().len()));
        });
    }

    group.finish();
}

/// Benchmark pass-through against spiking neurons at a fixed size.
fn bench_build_modes(c: &mut Criterion) {
    let mut group = c.benchmark_group("build_mode");
    let n = 500;

    group.bench_function("direct", |b| {
        let ens = Ensemble::new(EnsembleId(0), n, 8)
            .with_neuron_type(Direct)
            .with_seed(7);
        b.iter(|| black_box(build_one(&ens).signals().len()));
    });

    group.bench_function("lif", |b| {
        let ens = Ensemble::new(EnsembleId(0), n, 8).with_seed(7);
        b.iter(|| black_box(build_one(&ens).signals().len()));
    });

    group.bench_function("lif_noise", |b| {
        let ens = Ensemble::new(EnsembleId(0), n, 8)
            .with_noise(WhiteNoise::new(Gaussian::new(0.0, 0.05)))
            .with_seed(7);
        b.iter(|| black_box(build_one(&ens).signals().len()));
    });

    group.finish();
}

/// Benchmark eval point generation alone.
fn bench_eval_points(c: &mut Criterion) {
    let mut group = c.benchmark_group("eval_points");

    for dims in [1, 4, 16].iter() {
        group.bench_with_input(BenchmarkId::new("hypersphere", dims), dims, |b, &d| {
            let ens = Ensemble::new(EnsembleId(0), 100, d);
            let mut rng = nefbuild::rng::rng_from_seed(3);
            b.iter(|| {
                let (points, _) = gen_eval_points(&ens, &ens.eval_points, &mut rng, true).unwrap();
                black_box(points.nrows())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_build_sizes, bench_build_modes, bench_eval_points);
criterion_main!(benches);
