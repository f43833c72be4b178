//! Compares the encrypted sigmoid approximations with the exact logistic
//! function for every supported degree and both evaluation strategies.

use ckks_logreg::sigmoid::logistic;
use ckks_logreg::{
    CkksBackend, CkksParams, EvalContext, EvaluationStrategy, EventLog, Leveled,
    SigmoidApproximator, SigmoidDegree, SimulatedCkks,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().init();

    let params = CkksParams::builder()
        .ring_degree(1 << 12)
        .modulus_chain([60, 40, 40, 40, 40, 40, 40, 40])
        .build()?;
    let backend = SimulatedCkks::with_seed(params, 2024)?;
    let keys = backend.generate_keys(&mut ChaCha20Rng::seed_from_u64(2024))?;

    let scores: Vec<f64> = (-16..=16).map(|i| i as f64 * 0.5).collect();
    println!("{} sample scores in [-8, 8]", scores.len());

    for degree in [SigmoidDegree::Three, SigmoidDegree::Five, SigmoidDegree::Seven] {
        for strategy in [EvaluationStrategy::Horner, EvaluationStrategy::PowerTree] {
            let sigmoid = SigmoidApproximator::new(degree, strategy);
            let log = EventLog::new();
            let ctx = EvalContext::new(&backend, &keys.evaluation, &log);

            let scaled: Vec<f64> = scores.iter().map(|z| z / sigmoid.input_divisor()).collect();
            let x = ctx.encrypt_values(&scaled, 0)?;
            let y = sigmoid.evaluate(&ctx, &x)?;
            let decoded = backend.decode(&backend.decrypt(&y, &keys.secret)?)?;

            let mut ckks_error = 0.0f64;
            let mut fit_error = 0.0f64;
            for (z, got) in scores.iter().zip(&decoded) {
                ckks_error = ckks_error.max((got - sigmoid.approximate(*z)).abs());
                fit_error = fit_error.max((got - logistic(*z)).abs());
            }
            println!(
                "degree {} {:?}: levels {} ({} events), CKKS error {:.2e}, max |p - sigmoid| {:.4}",
                degree.as_usize(),
                strategy,
                y.level(),
                log.level_changes().len(),
                ckks_error,
                fit_error,
            );
        }
    }
    Ok(())
}
