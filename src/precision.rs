//! Rough a-priori bound on the absolute slot error of an encrypted pipeline.

use tracing::warn;

use crate::params::CkksParams;

/// Heuristic error model: fresh encryption noise `sigma * sqrt(N)` in the
/// slot domain, scaled down by the base scale, grows linearly with every
/// rescaled multiplication and with the number of summed columns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorEnvelope {
    pub base_scale: f64,
    pub ring_degree: usize,
    pub error_std: f64,
    pub multiplications: usize,
    pub columns: usize,
}

impl ErrorEnvelope {
    pub fn new(params: &CkksParams, multiplications: usize, columns: usize) -> Self {
        Self {
            base_scale: params.base_scale(),
            ring_degree: params.ring_degree(),
            error_std: params.error_std(),
            multiplications,
            columns,
        }
    }

    /// Expected absolute error in one output slot.
    pub fn estimate(&self) -> f64 {
        let fresh = self.error_std * (self.ring_degree as f64).sqrt() / self.base_scale;
        // Rescale rounding contributes about sqrt(N / 12) per division.
        let rounding = (self.ring_degree as f64 / 12.0).sqrt() / self.base_scale;
        let growth = (1 + self.multiplications) as f64 * self.columns.max(1) as f64;
        (fresh + rounding * self.multiplications as f64) * growth
    }

    /// Logs a warning and returns `true` when the estimate exceeds `tolerance`.
    pub fn warn_if_exceeds(&self, tolerance: f64) -> bool {
        let estimate = self.estimate();
        if estimate > tolerance {
            warn!(
                estimate,
                tolerance,
                scale_bits = self.base_scale.log2(),
                multiplications = self.multiplications,
                "expected CKKS error exceeds tolerance"
            );
            return true;
        }
        false
    }
}
