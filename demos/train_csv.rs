//! Trains logistic regression on an encrypted CSV dataset and compares the
//! result with plaintext gradient descent on the same polynomial sigmoid.
//!
//! ```text
//! cargo run --release --example train_csv -- data.csv --iterations 5 --max-rows 128
//! ```

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

use ckks_logreg::dataset::initial_weights;
use ckks_logreg::reference::{accuracy, max_abs_diff};
use ckks_logreg::{
    CkksBackend, Dataset, EncryptedDataset, EvaluationStrategy, GradientDescentTrainer,
    PlaintextTrainer, SigmoidDegree, SimulatedCkks, TracingObserver, TrainingConfig,
    TrustedRefresher,
};
use clap::{Parser, ValueEnum};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::{Level, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    Horner,
    Tree,
}

impl From<Strategy> for EvaluationStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Horner => EvaluationStrategy::Horner,
            Strategy::Tree => EvaluationStrategy::PowerTree,
        }
    }
}

#[derive(Parser)]
#[command(name = "train_csv")]
#[command(about = "Encrypted logistic-regression training on a CSV file")]
struct Cli {
    /// CSV file with a header row; the last column is the 0/1 label
    path: PathBuf,

    /// Gradient-descent iterations
    #[arg(short, long, default_value = "5")]
    iterations: usize,

    /// Learning rate
    #[arg(long, default_value = "0.1")]
    learning_rate: f64,

    /// Sigmoid polynomial degree (3, 5 or 7)
    #[arg(short, long, default_value = "3")]
    degree: usize,

    /// Polynomial evaluation strategy
    #[arg(long, value_enum, default_value = "horner")]
    strategy: Strategy,

    /// Ring degree N (slots = N / 2)
    #[arg(long, default_value = "16384")]
    ring_degree: usize,

    /// Use at most this many rows
    #[arg(long)]
    max_rows: Option<usize>,

    /// Random seed for keys, noise and initial weights
    #[arg(long)]
    seed: Option<u64>,

    /// Log every level change
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    #[cfg(feature = "dhat-heap")]
    let _dhat = dhat::Profiler::new_heap();

    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();
    let seed = cli.seed.unwrap_or_else(rand::random);

    let mut dataset = Dataset::from_csv_path(&cli.path)?;
    if let Some(rows) = cli.max_rows {
        dataset.truncate(rows);
    }
    dataset.standardize();
    info!(rows = dataset.rows(), cols = dataset.cols(), "dataset loaded");

    let config = TrainingConfig::builder()
        .ring_degree(cli.ring_degree)
        .sigmoid_degree(SigmoidDegree::try_from(cli.degree)?)
        .strategy(cli.strategy.into())
        .learning_rate(cli.learning_rate)
        .iterations(cli.iterations)
        .dataset_path(&cli.path)
        .seed(seed)
        .build()?;
    let params = config.params()?;
    println!("{params}");

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let backend = SimulatedCkks::with_seed(params, seed)?;
    let keys = backend.generate_keys(&mut rng)?;
    let observer = TracingObserver;
    let trainer = GradientDescentTrainer::new(
        &backend,
        &keys.evaluation,
        TrustedRefresher::from_keys(&backend, &keys),
        &config,
    )?
    .with_observer(&observer);

    let initial = initial_weights(dataset.cols(), config.weight_bound, &mut rng)?;
    let started = Instant::now();
    let data = EncryptedDataset::encrypt(trainer.context(), dataset.features(), dataset.labels())?;
    let weights = trainer.context().encrypt_values(&initial, 0)?;
    info!(elapsed = ?started.elapsed(), "dataset encrypted");

    let started = Instant::now();
    let trained = trainer.train(&data, weights)?;
    let elapsed = started.elapsed();
    let encrypted = TrustedRefresher::from_keys(&backend, &keys).reveal(&trained, dataset.cols())?;

    let plain = PlaintextTrainer::new(config.sigmoid(), config.learning_rate).train(
        dataset.features(),
        dataset.labels(),
        &initial,
        config.iterations,
    );

    println!("training time:        {elapsed:?}");
    println!("encrypted weights:    {encrypted:.5?}");
    println!("plaintext weights:    {plain:.5?}");
    println!("max weight deviation: {:.3e}", max_abs_diff(&encrypted, &plain));
    println!(
        "accuracy (encrypted): {:.2}%",
        100.0 * accuracy(dataset.features(), dataset.labels(), &encrypted)
    );
    println!(
        "accuracy (plaintext): {:.2}%",
        100.0 * accuracy(dataset.features(), dataset.labels(), &plain)
    );
    Ok(())
}
