/// Criterion benchmarks for the training inner loop and the Gram analysis.
///
/// Sweeps the feature count at a fixed 4:1 feature/hidden ratio.
///
/// Run: cargo bench --bench train_bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use superposition::{Model, ModelConfig, TrainConfig, Variant};

fn make_model(input_dim: usize, variant: Variant) -> Model {
    let cfg = ModelConfig::new(input_dim, (input_dim / 4).max(1)).with_variant(variant).with_seed(42);
    Model::new(&cfg).expect("valid bench config")
}

fn bench_train_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("train_step");
    for n in [20, 80, 200] {
        for variant in [Variant::Importance, Variant::Sparse] {
            let mut model = make_model(n, variant);
            let train = TrainConfig::for_variant(variant);
            let objective = model.objective(&train);
            let batch = model.generate_batch(64, train.sparsity, train.importance);
            group.bench_with_input(
                BenchmarkId::new(format!("{:?}", variant), format!("n={n}")),
                &n,
                |b, _| b.iter(|| model.train_step(black_box(&batch), 1e-3, &objective)),
            );
        }
    }
    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("analyze_representation");
    for n in [20, 80, 200] {
        let model = make_model(n, Variant::Importance);
        group.bench_with_input(BenchmarkId::new("gram", format!("n={n}")), &n, |b, _| {
            b.iter(|| black_box(model.analyze_representation()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_train_step, bench_analysis);
criterion_main!(benches);
