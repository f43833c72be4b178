//! Low-degree polynomial stand-ins for the logistic function.
//!
//! The tables are least-squares fits of `1 / (1 + e^(-8x))` on `x in [-1, 1]`,
//! i.e. of the sigmoid at `z = 8x`. Callers pre-scale the linear score by
//! [`SigmoidApproximator::input_divisor`] (the trainer folds it into the
//! selection masks) and evaluate the table as is.

use crate::backend::{CkksBackend, EvalContext};
use crate::errors::{CkksError, CkksResult};
use crate::poly::{self, EvaluationStrategy, Polynomial};

const INPUT_DIVISOR: f64 = 8.0;

const DEGREE_3: [f64; 4] = [0.5, 1.20069, 0.00001, -0.81562];
const DEGREE_5: [f64; 6] = [0.5, 1.53048, 0.00001, -2.3533056, 0.00001, 1.3511295];
const DEGREE_7: [f64; 8] = [
    0.5, 1.73496, 0.00001, -4.19407, 0.00001, 5.43402, 0.00001, -2.50739,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SigmoidDegree {
    #[default]
    Three,
    Five,
    Seven,
}

impl SigmoidDegree {
    pub fn as_usize(self) -> usize {
        match self {
            SigmoidDegree::Three => 3,
            SigmoidDegree::Five => 5,
            SigmoidDegree::Seven => 7,
        }
    }

    fn table(self) -> &'static [f64] {
        match self {
            SigmoidDegree::Three => &DEGREE_3,
            SigmoidDegree::Five => &DEGREE_5,
            SigmoidDegree::Seven => &DEGREE_7,
        }
    }
}

impl TryFrom<usize> for SigmoidDegree {
    type Error = CkksError;

    fn try_from(degree: usize) -> CkksResult<Self> {
        match degree {
            3 => Ok(SigmoidDegree::Three),
            5 => Ok(SigmoidDegree::Five),
            7 => Ok(SigmoidDegree::Seven),
            other => Err(CkksError::invalid(format!(
                "unsupported sigmoid degree {other}, expected 3, 5 or 7"
            ))),
        }
    }
}

/// The exact logistic function.
pub fn logistic(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, PartialEq)]
pub struct SigmoidApproximator {
    degree: SigmoidDegree,
    strategy: EvaluationStrategy,
    polynomial: Polynomial,
}

impl SigmoidApproximator {
    pub fn new(degree: SigmoidDegree, strategy: EvaluationStrategy) -> Self {
        Self {
            degree,
            strategy,
            polynomial: Polynomial::from_dense(degree.table()),
        }
    }

    pub fn degree(&self) -> SigmoidDegree {
        self.degree
    }

    pub fn strategy(&self) -> EvaluationStrategy {
        self.strategy
    }

    /// Polynomial in the pre-scaled variable `x = z / input_divisor`.
    pub fn polynomial(&self) -> &Polynomial {
        &self.polynomial
    }

    pub fn input_divisor(&self) -> f64 {
        INPUT_DIVISOR
    }

    /// The same approximation as a polynomial in the raw score `z`.
    pub fn raw_input_polynomial(&self) -> Polynomial {
        self.polynomial.compose_scaled(1.0 / INPUT_DIVISOR)
    }

    /// Levels consumed by [`evaluate`](Self::evaluate).
    pub fn depth(&self) -> usize {
        self.strategy.depth(self.degree.as_usize())
    }

    /// Plaintext value of the approximation at the raw score `z`.
    pub fn approximate(&self, z: f64) -> f64 {
        self.polynomial.evaluate(z / INPUT_DIVISOR)
    }

    /// Evaluates the approximation on a ciphertext that already holds
    /// `z / input_divisor`.
    pub fn evaluate<B: CkksBackend>(
        &self,
        ctx: &EvalContext<'_, B>,
        scaled: &B::Ciphertext,
    ) -> CkksResult<B::Ciphertext> {
        poly::evaluate(ctx, scaled, &self.polynomial, self.strategy)
    }
}

impl Default for SigmoidApproximator {
    fn default() -> Self {
        Self::new(SigmoidDegree::default(), EvaluationStrategy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn degree_from_number() {
        assert_eq!(SigmoidDegree::try_from(5).unwrap(), SigmoidDegree::Five);
        for bad in [0, 1, 2, 4, 6, 9] {
            assert!(SigmoidDegree::try_from(bad).is_err(), "degree {bad}");
        }
    }

    #[test]
    fn tables_are_stored_sparsely_with_full_degree() {
        for degree in [SigmoidDegree::Three, SigmoidDegree::Five, SigmoidDegree::Seven] {
            let approx = SigmoidApproximator::new(degree, EvaluationStrategy::Horner);
            assert_eq!(approx.polynomial().degree(), degree.as_usize());
            assert_eq!(approx.polynomial().coefficient(0), Some(0.5));
        }
    }

    #[test]
    fn approximations_track_logistic() {
        let grid = [-6.0, -4.0, -2.0, -0.5, 0.0, 0.5, 2.0, 4.0, 6.0];
        let mut previous = f64::INFINITY;
        for degree in [SigmoidDegree::Three, SigmoidDegree::Five, SigmoidDegree::Seven] {
            let approx = SigmoidApproximator::new(degree, EvaluationStrategy::PowerTree);
            let worst = grid
                .iter()
                .map(|&z| (approx.approximate(z) - logistic(z)).abs())
                .fold(0.0, f64::max);
            assert!(worst < 0.1, "degree {degree:?}: worst error {worst}");
            assert!(worst < previous, "degree {degree:?} did not improve");
            previous = worst;
        }
    }

    #[test]
    fn raw_polynomial_matches_scaled_table() {
        let approx = SigmoidApproximator::new(SigmoidDegree::Seven, EvaluationStrategy::Horner);
        let raw = approx.raw_input_polynomial();
        for z in [-3.0, 0.25, 4.0] {
            assert_relative_eq!(raw.evaluate(z), approx.approximate(z), epsilon = 1e-12);
        }
        assert_relative_eq!(raw.coefficient(1).unwrap(), 1.73496 / 8.0);
    }

    #[test]
    fn depth_follows_strategy() {
        let horner = SigmoidApproximator::new(SigmoidDegree::Seven, EvaluationStrategy::Horner);
        let tree = SigmoidApproximator::new(SigmoidDegree::Seven, EvaluationStrategy::PowerTree);
        assert_eq!(horner.depth(), 7);
        assert_eq!(tree.depth(), 4);
    }

    #[test]
    fn default_is_cubic_horner() {
        let approx = SigmoidApproximator::default();
        assert_eq!(approx.degree(), SigmoidDegree::Three);
        assert_eq!(approx.strategy(), EvaluationStrategy::Horner);
        assert_eq!(approx.depth(), 3);
    }

    #[test]
    fn logistic_reference_points() {
        assert_relative_eq!(logistic(0.0), 0.5);
        assert_relative_eq!(logistic(2.0) + logistic(-2.0), 1.0, epsilon = 1e-12);
    }
}
