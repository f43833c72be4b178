mod common;

use approx::assert_abs_diff_eq;
use ckks_logreg::{
    CkksBackend, Dataset, EncryptedDataset, ErrorKind, EvaluationStrategy, EventLog,
    GradientDescentTrainer, Leveled, PlaintextTrainer, SigmoidDegree, SimulatedCkks, Stage,
    TrainingConfig, TrainingError, TrustedRefresher,
};
use common::reveal;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn features() -> Vec<Vec<f64>> {
    vec![
        vec![1.0, 0.5],
        vec![-0.5, 1.5],
        vec![2.0, -1.0],
        vec![-1.5, -0.5],
    ]
}

const LABELS: [f64; 4] = [1.0, 0.0, 1.0, 0.0];
const WEIGHTS: [f64; 2] = [0.5, -0.25];

fn config(iterations: usize) -> TrainingConfig {
    TrainingConfig::builder()
        .ring_degree(64)
        .learning_rate(0.1)
        .iterations(iterations)
        .build()
        .unwrap()
}

fn setup(config: &TrainingConfig) -> (SimulatedCkks, ckks_logreg::KeySet<SimulatedCkks>) {
    let backend = SimulatedCkks::with_seed(config.params().unwrap(), 3).unwrap();
    let keys = backend
        .generate_keys(&mut ChaCha20Rng::seed_from_u64(4))
        .unwrap();
    (backend, keys)
}

#[test]
fn one_step_matches_plaintext_reference() {
    let config = config(1);
    let (backend, keys) = setup(&config);
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .unwrap();
    let ctx = trainer.context();
    let data = EncryptedDataset::encrypt(ctx, &features(), &LABELS).unwrap();
    let weights = ctx.encrypt_values(&WEIGHTS, 0).unwrap();

    let updated = trainer.step(&data, &weights).unwrap();
    assert_eq!(updated.level(), config.depth_per_iteration());
    assert_eq!(updated.level(), backend.params().max_level());

    let expected =
        PlaintextTrainer::new(config.sigmoid(), 0.1).step(&features(), &LABELS, &WEIGHTS);
    let got = reveal(&backend, &keys, &updated, 2);
    for (g, e) in got.iter().zip(&expected) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-4);
    }
}

#[test]
fn training_refreshes_every_iteration() {
    let config = config(3);
    let (backend, keys) = setup(&config);
    let log = EventLog::new();
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .unwrap()
    .with_observer(&log);
    let ctx = trainer.context();
    let data = EncryptedDataset::encrypt(ctx, &features(), &LABELS).unwrap();
    let weights = ctx.encrypt_values(&WEIGHTS, 0).unwrap();

    let trained = trainer.train(&data, weights).unwrap();
    assert_eq!(trained.level(), 0);
    assert_eq!(trained.scale(), backend.params().base_scale());

    let reports = log.iterations();
    assert_eq!(reports.len(), 3);
    for (i, report) in reports.iter().enumerate() {
        assert_eq!(report.iteration, i);
        assert_eq!(report.level_reached, config.depth_per_iteration());
    }
    assert_eq!(log.levels_for("refresh"), vec![0, 0, 0]);

    let expected =
        PlaintextTrainer::new(config.sigmoid(), 0.1).train(&features(), &LABELS, &WEIGHTS, 3);
    let got = reveal(&backend, &keys, &trained, 32);
    for (g, e) in got.iter().zip(&expected) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-4);
    }
    // Refresh clears every slot past the weights.
    for g in &got[2..] {
        assert_abs_diff_eq!(*g, 0.0, epsilon = 1e-6);
    }
}

#[test]
fn power_tree_sigmoid_trains_too() {
    let config = TrainingConfig::builder()
        .ring_degree(64)
        .sigmoid_degree(SigmoidDegree::Five)
        .strategy(EvaluationStrategy::PowerTree)
        .iterations(2)
        .build()
        .unwrap();
    let (backend, keys) = setup(&config);
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .unwrap();
    let ctx = trainer.context();
    let data = EncryptedDataset::encrypt(ctx, &features(), &LABELS).unwrap();
    let weights = ctx.encrypt_values(&WEIGHTS, 0).unwrap();

    let trained = trainer.train(&data, weights).unwrap();
    let expected = PlaintextTrainer::new(config.sigmoid(), config.learning_rate)
        .train(&features(), &LABELS, &WEIGHTS, 2);
    for (g, e) in reveal(&backend, &keys, &trained, 2).iter().zip(&expected) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-4);
    }
}

#[test]
fn shallow_chain_is_rejected_up_front() {
    let config = TrainingConfig::builder()
        .ring_degree(64)
        .modulus_chain([60, 40, 40, 40, 40, 40, 40, 40])
        .build()
        .unwrap();
    let (backend, keys) = setup(&config);
    let err = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .err()
    .unwrap();
    assert!(matches!(err, TrainingError::Configuration(_)));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn late_weights_exhaust_depth_in_the_gradient_stage() {
    let config = config(1);
    let (backend, keys) = setup(&config);
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .unwrap();
    let ctx = trainer.context();
    let data = EncryptedDataset::encrypt(ctx, &features(), &LABELS).unwrap();
    let weights = ctx.encrypt_values(&WEIGHTS, 2).unwrap();

    let err = trainer.step(&data, &weights).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DepthExhaustion);
    assert_eq!(err.stage(), Some(Stage::Gradient));
    match err {
        TrainingError::Stage { operand, level, .. } => {
            assert_eq!(operand, "residual");
            assert_eq!(level, 7);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn oversized_dataset_does_not_fit_the_slots() {
    let config = config(1);
    let (backend, keys) = setup(&config);
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .unwrap();
    let rows = vec![vec![0.1, 0.2]; 17];
    let labels = vec![1.0; 17];
    let err = EncryptedDataset::encrypt(trainer.context(), &rows, &labels)
        .err()
        .unwrap();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn standardized_csv_trains_end_to_end() {
    let csv = "\
x1,x2,y
1.0,10.0,1
2.0,30.0,1
-1.0,5.0,0
-2.0,-20.0,0
0.5,12.0,1
-0.5,-3.0,0
";
    let mut dataset = Dataset::from_csv_reader(csv.as_bytes()).unwrap();
    dataset.standardize();
    let config = config(2);
    let (backend, keys) = setup(&config);
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )
    .unwrap();
    let ctx = trainer.context();
    let data = EncryptedDataset::encrypt(ctx, dataset.features(), dataset.labels()).unwrap();
    assert_eq!((data.rows(), data.cols()), (6, 2));
    let weights = ctx.encrypt_values(&[0.0, 0.0], 0).unwrap();

    let trained = trainer.train(&data, weights).unwrap();
    let expected = PlaintextTrainer::new(config.sigmoid(), config.learning_rate).train(
        dataset.features(),
        dataset.labels(),
        &[0.0, 0.0],
        2,
    );
    let got = reveal(&backend, &keys, &trained, 2);
    for (g, e) in got.iter().zip(&expected) {
        assert_abs_diff_eq!(g, e, epsilon = 1e-4);
    }
    assert!(got.iter().all(|w| *w > 0.0));
}
