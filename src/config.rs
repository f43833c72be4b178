//! Training configuration with defaults sized for the sigmoid depth.

use std::path::PathBuf;

use crate::errors::{CkksError, CkksResult};
use crate::params::CkksParams;
use crate::poly::EvaluationStrategy;
use crate::sigmoid::{SigmoidApproximator, SigmoidDegree};

/// Rescales spent outside the sigmoid in one iteration: two for the linear
/// transform, two for the gradient, one for the update.
pub const NON_SIGMOID_DEPTH: usize = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingConfig {
    pub ring_degree: usize,
    pub modulus_chain: Vec<u32>,
    pub special_modulus_bits: u32,
    pub scale_bits: u32,
    pub error_std: f64,
    pub sigmoid_degree: SigmoidDegree,
    pub strategy: EvaluationStrategy,
    pub learning_rate: f64,
    pub iterations: usize,
    pub dataset_path: Option<PathBuf>,
    pub weight_bound: f64,
    pub seed: Option<u64>,
    pub precision_tolerance: f64,
}

#[derive(Debug, Default)]
pub struct TrainingConfigBuilder {
    ring_degree: Option<usize>,
    modulus_chain: Option<Vec<u32>>,
    special_modulus_bits: Option<u32>,
    scale_bits: Option<u32>,
    error_std: Option<f64>,
    sigmoid_degree: Option<SigmoidDegree>,
    strategy: Option<EvaluationStrategy>,
    learning_rate: Option<f64>,
    iterations: Option<usize>,
    dataset_path: Option<PathBuf>,
    weight_bound: Option<f64>,
    seed: Option<u64>,
    precision_tolerance: Option<f64>,
}

impl TrainingConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ring_degree(mut self, degree: usize) -> Self {
        self.ring_degree = Some(degree);
        self
    }

    pub fn modulus_chain(mut self, bits: impl Into<Vec<u32>>) -> Self {
        self.modulus_chain = Some(bits.into());
        self
    }

    pub fn special_modulus_bits(mut self, bits: u32) -> Self {
        self.special_modulus_bits = Some(bits);
        self
    }

    pub fn scale_bits(mut self, bits: u32) -> Self {
        self.scale_bits = Some(bits);
        self
    }

    pub fn error_std(mut self, std: f64) -> Self {
        self.error_std = Some(std);
        self
    }

    pub fn sigmoid_degree(mut self, degree: SigmoidDegree) -> Self {
        self.sigmoid_degree = Some(degree);
        self
    }

    pub fn strategy(mut self, strategy: EvaluationStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn learning_rate(mut self, rate: f64) -> Self {
        self.learning_rate = Some(rate);
        self
    }

    pub fn iterations(mut self, iterations: usize) -> Self {
        self.iterations = Some(iterations);
        self
    }

    pub fn dataset_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.dataset_path = Some(path.into());
        self
    }

    pub fn weight_bound(mut self, bound: f64) -> Self {
        self.weight_bound = Some(bound);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn precision_tolerance(mut self, tolerance: f64) -> Self {
        self.precision_tolerance = Some(tolerance);
        self
    }

    pub fn build(self) -> CkksResult<TrainingConfig> {
        let sigmoid_degree = self.sigmoid_degree.unwrap_or_default();
        let strategy = self.strategy.unwrap_or_default();
        let scale_bits = self.scale_bits.unwrap_or(40);
        let modulus_chain = self.modulus_chain.unwrap_or_else(|| {
            let rescales = strategy.depth(sigmoid_degree.as_usize()) + NON_SIGMOID_DEPTH;
            let mut chain = vec![60];
            chain.extend(std::iter::repeat_n(scale_bits, rescales));
            chain
        });

        let config = TrainingConfig {
            ring_degree: self.ring_degree.unwrap_or(16384),
            modulus_chain,
            special_modulus_bits: self.special_modulus_bits.unwrap_or(60),
            scale_bits,
            error_std: self.error_std.unwrap_or(3.2),
            sigmoid_degree,
            strategy,
            learning_rate: self.learning_rate.unwrap_or(0.1),
            iterations: self.iterations.unwrap_or(10),
            dataset_path: self.dataset_path,
            weight_bound: self.weight_bound.unwrap_or(2.0),
            seed: self.seed,
            precision_tolerance: self.precision_tolerance.unwrap_or(1e-3),
        };
        config.validate()?;
        Ok(config)
    }
}

impl TrainingConfig {
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::new()
    }

    fn validate(&self) -> CkksResult<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(CkksError::invalid(format!(
                "learning rate {} must be finite and positive",
                self.learning_rate
            )));
        }
        if self.iterations == 0 {
            return Err(CkksError::invalid("iterations must be at least 1"));
        }
        if !(self.weight_bound.is_finite() && self.weight_bound >= 0.0) {
            return Err(CkksError::invalid(format!(
                "weight bound {} must be finite and non-negative",
                self.weight_bound
            )));
        }
        if !(self.precision_tolerance.is_finite() && self.precision_tolerance > 0.0) {
            return Err(CkksError::invalid("precision tolerance must be positive"));
        }
        Ok(())
    }

    pub fn params(&self) -> CkksResult<CkksParams> {
        CkksParams::builder()
            .ring_degree(self.ring_degree)
            .modulus_chain(self.modulus_chain.clone())
            .special_modulus_bits(self.special_modulus_bits)
            .scale_bits(self.scale_bits)
            .error_std(self.error_std)
            .build()
    }

    pub fn sigmoid(&self) -> SigmoidApproximator {
        SigmoidApproximator::new(self.sigmoid_degree, self.strategy)
    }

    /// Rescales one iteration needs before the refresh.
    pub fn depth_per_iteration(&self) -> usize {
        self.sigmoid().depth() + NON_SIGMOID_DEPTH
    }
}
