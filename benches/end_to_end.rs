use ckks_logreg::linalg::{dot, linear_transform};
use ckks_logreg::packing::{RowPacking, encrypt_packed};
use ckks_logreg::{
    CkksBackend, EncryptedDataset, EvalContext, GradientDescentTrainer, NoopObserver,
    SigmoidApproximator, SimulatedCkks, TrainingConfig, TrustedRefresher,
};
use criterion::{Criterion, criterion_group, criterion_main};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use std::hint::black_box;

const RING_DEGREE: usize = 4096;

fn config() -> TrainingConfig {
    TrainingConfig::builder()
        .ring_degree(RING_DEGREE)
        .iterations(1)
        .build()
        .expect("valid config")
}

fn random_matrix(rng: &mut ChaCha20Rng, rows: usize, cols: usize) -> Vec<Vec<f64>> {
    (0..rows)
        .map(|_| (0..cols).map(|_| rng.random_range(-1.0..1.0)).collect())
        .collect()
}

fn bench_primitives(c: &mut Criterion) {
    let mut group = c.benchmark_group("primitives");
    let mut rng = ChaCha20Rng::seed_from_u64(123);
    let backend = SimulatedCkks::with_seed(config().params().expect("params"), 1).expect("backend");
    let keys = backend.generate_keys(&mut rng).expect("keys");
    let ctx = EvalContext::new(&backend, &keys.evaluation, &NoopObserver);

    let values: Vec<f64> = (0..ctx.slot_count()).map(|i| (i as f64) * 0.001).collect();
    group.bench_function("encrypt_decrypt", |b| {
        b.iter(|| {
            let ct = ctx.encrypt_values(black_box(&values), 0).expect("encrypt");
            let pt = backend.decrypt(&ct, &keys.secret).expect("decrypt");
            black_box(backend.decode(&pt).expect("decode"))
        });
    });

    let a = ctx.encrypt_values(&values[..64], 0).expect("encrypt");
    group.bench_function("dot_64", |b| {
        b.iter(|| black_box(dot(&ctx, &a, &a, 64).expect("dot")));
    });

    let sigmoid = SigmoidApproximator::default();
    group.bench_function("sigmoid_degree_3", |b| {
        b.iter(|| black_box(sigmoid.evaluate(&ctx, &a).expect("sigmoid")));
    });

    let matrix = random_matrix(&mut rng, 16, 8);
    let rows = encrypt_packed(&ctx, &RowPacking, &matrix).expect("pack");
    let vector = ctx.encrypt_values(&[0.5; 8], 0).expect("encrypt");
    group.bench_function("linear_transform_16x8", |b| {
        b.iter(|| black_box(linear_transform(&ctx, &rows, &vector, 8, 1.0).expect("transform")));
    });

    group.finish();
}

fn bench_training(c: &mut Criterion) {
    let mut group = c.benchmark_group("training");
    group.sample_size(10);

    let config = config();
    let mut rng = ChaCha20Rng::seed_from_u64(456);
    let backend = SimulatedCkks::with_seed(config.params().expect("params"), 2).expect("backend");
    let keys = backend.generate_keys(&mut rng).expect("keys");
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .expect("trainer");

    for &(rows, cols) in &[(32, 4), (128, 8)] {
        let features = random_matrix(&mut rng, rows, cols);
        let labels: Vec<f64> = (0..rows).map(|i| (i % 2) as f64).collect();
        let data = EncryptedDataset::encrypt(trainer.context(), &features, &labels).expect("data");
        let weights = trainer
            .context()
            .encrypt_values(&vec![0.1; cols], 0)
            .expect("weights");

        group.bench_function(format!("iteration_{rows}x{cols}"), |b| {
            b.iter(|| black_box(trainer.train(&data, weights.clone()).expect("train")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_primitives, bench_training);
criterion_main!(benches);
