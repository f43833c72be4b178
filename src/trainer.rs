//! Encrypted logistic-regression training by gradient descent.
//!
//! One iteration runs `Predict -> Residual -> Gradient -> Update -> Refresh`:
//!
//! 1. scores `Xw / 8` with [`linear_transform`] (the `1/8` rides on the masks),
//!    then the sigmoid polynomial;
//! 2. `prediction - labels`;
//! 3. `X^T residual` with another [`linear_transform`] over the transposed
//!    features;
//! 4. `w - lr / n * gradient`;
//! 5. a trusted decrypt/re-encrypt that resets the weights to level 0.
//!
//! Steps 1 to 4 spend `sigmoid depth + 5` levels, which the modulus chain must
//! provide.

use std::fmt;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::backend::{CkksBackend, EvalContext, EvaluationKeys, KeySet, Leveled};
use crate::config::{NON_SIGMOID_DEPTH, TrainingConfig};
use crate::errors::{CkksError, CkksResult, ErrorKind};
use crate::linalg::linear_transform;
use crate::observer::{IterationReport, NoopObserver, TrainingObserver};
use crate::packing::{RowPacking, encrypt_packed};
use crate::precision::ErrorEnvelope;
use crate::sigmoid::SigmoidApproximator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Predict,
    Residual,
    Gradient,
    Update,
    Refresh,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Predict => "predict",
            Stage::Residual => "residual",
            Stage::Gradient => "gradient",
            Stage::Update => "update",
            Stage::Refresh => "refresh",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum TrainingError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] CkksError),

    #[error("{stage} stage failed on {operand} at level {level} (scale {scale:e}): {source}")]
    Stage {
        stage: Stage,
        operand: &'static str,
        level: usize,
        scale: f64,
        source: CkksError,
    },
}

impl TrainingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrainingError::Configuration(_) => ErrorKind::Configuration,
            TrainingError::Stage { source, .. } => source.kind(),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            TrainingError::Stage { stage, .. } => Some(*stage),
            TrainingError::Configuration(_) => None,
        }
    }
}

fn failed_at<C: Leveled>(
    stage: Stage,
    operand: &'static str,
    ct: &C,
) -> impl FnOnce(CkksError) -> TrainingError + use<C> {
    let level = ct.level();
    let scale = ct.scale();
    move |source| TrainingError::Stage {
        stage,
        operand,
        level,
        scale,
        source,
    }
}

/// Row-packed features, their transpose and the labels, all encrypted at
/// level 0.
pub struct EncryptedDataset<C> {
    features: Vec<C>,
    features_t: Vec<C>,
    labels: C,
    rows: usize,
    cols: usize,
}

impl<C> EncryptedDataset<C> {
    pub fn encrypt<B>(
        ctx: &EvalContext<'_, B>,
        features: &[Vec<f64>],
        labels: &[f64],
    ) -> CkksResult<Self>
    where
        B: CkksBackend<Ciphertext = C>,
    {
        let rows = features.len();
        let cols = features.first().map_or(0, Vec::len);
        if rows == 0 || cols == 0 {
            return Err(CkksError::invalid("dataset is empty"));
        }
        if labels.len() != rows {
            return Err(CkksError::invalid(format!(
                "{} labels for {rows} rows",
                labels.len()
            )));
        }
        check_dimensions(rows, cols, ctx.slot_count())?;

        let transposed = crate::dataset::transpose(features);
        Ok(Self {
            features: encrypt_packed(ctx, &RowPacking, features)?,
            features_t: encrypt_packed(ctx, &RowPacking, &transposed)?,
            labels: ctx.encrypt_values(labels, 0)?,
            rows,
            cols,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

fn check_dimensions(rows: usize, cols: usize, slots: usize) -> CkksResult<()> {
    let span = rows.max(cols);
    if 2 * span > slots {
        return Err(CkksError::invalid(format!(
            "{rows}x{cols} data needs {} slots, only {slots} available",
            2 * span
        )));
    }
    Ok(())
}

/// The trust boundary: holds the secret key and turns an exhausted
/// ciphertext back into a fresh one. Whoever runs this sees the plaintext
/// weights.
pub struct TrustedRefresher<'a, B: CkksBackend> {
    backend: &'a B,
    secret: &'a B::SecretKey,
    public: &'a B::PublicKey,
}

impl<'a, B: CkksBackend> TrustedRefresher<'a, B> {
    pub fn new(backend: &'a B, secret: &'a B::SecretKey, public: &'a B::PublicKey) -> Self {
        Self {
            backend,
            secret,
            public,
        }
    }

    pub fn from_keys(backend: &'a B, keys: &'a KeySet<B>) -> Self {
        Self::new(backend, &keys.secret, &keys.evaluation.public)
    }

    /// First `width` slots of `ct`.
    pub fn reveal(&self, ct: &B::Ciphertext, width: usize) -> CkksResult<Vec<f64>> {
        let pt = self.backend.decrypt(ct, self.secret)?;
        let mut values = self.backend.decode(&pt)?;
        values.truncate(width);
        Ok(values)
    }

    /// Decrypt, zero every slot from `width` on, re-encrypt at level 0 and
    /// the base scale.
    pub fn refresh(&self, ct: &B::Ciphertext, width: usize) -> CkksResult<B::Ciphertext> {
        let values = self.reveal(ct, width)?;
        let scale = self.backend.params().base_scale();
        let pt = self.backend.encode(&values, scale, 0)?;
        self.backend.encrypt(&pt, self.public)
    }
}

pub struct GradientDescentTrainer<'a, B: CkksBackend> {
    ctx: EvalContext<'a, B>,
    refresher: TrustedRefresher<'a, B>,
    sigmoid: SigmoidApproximator,
    learning_rate: f64,
    iterations: usize,
    precision_tolerance: f64,
}

impl<'a, B: CkksBackend> GradientDescentTrainer<'a, B> {
    pub fn new(
        backend: &'a B,
        keys: &'a EvaluationKeys<B>,
        refresher: TrustedRefresher<'a, B>,
        config: &TrainingConfig,
    ) -> Result<Self, TrainingError> {
        let sigmoid = config.sigmoid();
        let required = sigmoid.depth() + NON_SIGMOID_DEPTH;
        let available = backend.params().max_level();
        if required > available {
            return Err(CkksError::invalid(format!(
                "modulus chain allows {available} rescales per iteration, {required} needed \
                 (sigmoid {} + {NON_SIGMOID_DEPTH})",
                sigmoid.depth()
            ))
            .into());
        }
        Ok(Self {
            ctx: EvalContext::new(backend, keys, &NoopObserver),
            refresher,
            sigmoid,
            learning_rate: config.learning_rate,
            iterations: config.iterations,
            precision_tolerance: config.precision_tolerance,
        })
    }

    pub fn with_observer(mut self, observer: &'a dyn TrainingObserver) -> Self {
        self.ctx.observer = observer;
        self
    }

    pub fn context(&self) -> &EvalContext<'a, B> {
        &self.ctx
    }

    pub fn sigmoid(&self) -> &SigmoidApproximator {
        &self.sigmoid
    }

    /// Expected slot error of one iteration on `cols` features.
    pub fn error_envelope(&self, cols: usize) -> ErrorEnvelope {
        ErrorEnvelope::new(
            self.ctx.params(),
            self.sigmoid.depth() + NON_SIGMOID_DEPTH,
            cols,
        )
    }

    /// Approximate sigmoid of every row score, one per slot.
    pub fn predict(
        &self,
        data: &EncryptedDataset<B::Ciphertext>,
        weights: &B::Ciphertext,
    ) -> Result<B::Ciphertext, TrainingError> {
        let weight = 1.0 / self.sigmoid.input_divisor();
        let scores = linear_transform(&self.ctx, &data.features, weights, data.cols, weight)
            .map_err(failed_at(Stage::Predict, "weights", weights))?;
        self.sigmoid
            .evaluate(&self.ctx, &scores)
            .map_err(failed_at(Stage::Predict, "scores", &scores))
    }

    /// One gradient step without the refresh; the result sits
    /// `sigmoid depth + 5` levels below `weights`.
    #[instrument(skip_all, fields(rows = data.rows, cols = data.cols))]
    pub fn step(
        &self,
        data: &EncryptedDataset<B::Ciphertext>,
        weights: &B::Ciphertext,
    ) -> Result<B::Ciphertext, TrainingError> {
        let backend = self.ctx.backend;

        let prediction = self.predict(data, weights)?;
        debug!(level = prediction.level(), "prediction ready");

        let labels = self
            .ctx
            .switch_to(&data.labels, prediction.level())
            .map_err(failed_at(Stage::Residual, "labels", &data.labels))?;
        let residual = backend
            .sub(&prediction, &labels)
            .map_err(failed_at(Stage::Residual, "prediction", &prediction))?;
        self.ctx.record("residual", &residual);

        let gradient = linear_transform(&self.ctx, &data.features_t, &residual, data.rows, 1.0)
            .map_err(failed_at(Stage::Gradient, "residual", &residual))?;

        let rate = self.learning_rate / data.rows as f64;
        let step = self
            .ctx
            .encode_at(&vec![rate; self.ctx.slot_count()], gradient.level())
            .map_err(failed_at(Stage::Update, "gradient", &gradient))?;
        let scaled = backend
            .multiply_plain(&gradient, &step)
            .and_then(|g| self.ctx.rescale_normalized(&g))
            .map_err(failed_at(Stage::Update, "gradient", &gradient))?;
        let aligned = self
            .ctx
            .switch_to(weights, scaled.level())
            .map_err(failed_at(Stage::Update, "weights", weights))?;
        let updated = backend
            .sub(&scaled, &aligned)
            .and_then(|diff| backend.negate(&diff))
            .map_err(failed_at(Stage::Update, "weights", &aligned))?;
        self.ctx.record("update", &updated);
        Ok(updated)
    }

    /// Runs the configured number of iterations from `initial` and returns
    /// the refreshed final weights.
    #[instrument(skip_all, fields(iterations = self.iterations))]
    pub fn train(
        &self,
        data: &EncryptedDataset<B::Ciphertext>,
        initial: B::Ciphertext,
    ) -> Result<B::Ciphertext, TrainingError> {
        check_dimensions(data.rows, data.cols, self.ctx.slot_count())?;
        self.error_envelope(data.cols)
            .warn_if_exceeds(self.precision_tolerance);

        let mut weights = initial;
        for iteration in 0..self.iterations {
            let started = Instant::now();
            let updated = self.step(data, &weights)?;
            let level_reached = updated.level();
            weights = self
                .refresher
                .refresh(&updated, data.cols)
                .map_err(failed_at(Stage::Refresh, "weights", &updated))?;
            self.ctx.record("refresh", &weights);
            self.ctx.observer.on_iteration_complete(&IterationReport {
                iteration,
                level_reached,
                elapsed: started.elapsed(),
            });
        }
        info!(iterations = self.iterations, "training finished");
        Ok(weights)
    }
}
