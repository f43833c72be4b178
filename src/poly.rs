//! Encrypted polynomial evaluation under a depth budget.
//!
//! Two strategies are offered:
//!
//! - [`EvaluationStrategy::Horner`] folds from the leading coefficient and
//!   consumes exactly `d` levels for degree `d`.
//! - [`EvaluationStrategy::PowerTree`] first builds every power `x^i` with a
//!   depth-optimal product tree (`x^i` at relative depth `ceil(log2 i)`), then
//!   multiplies each by its coefficient: `ceil(log2 d) + 1` levels.
//!
//! Both check the remaining budget before touching the ciphertext.

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::backend::{CkksBackend, EvalContext, Leveled};
use crate::errors::{CkksError, CkksResult};

/// Sparse real polynomial; zero coefficients are not stored.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polynomial {
    coeffs: BTreeMap<usize, f64>,
}

impl Polynomial {
    pub fn new() -> Self {
        Self::default()
    }

    /// `coeffs[k]` is the coefficient of `x^k`.
    pub fn from_dense(coeffs: &[f64]) -> Self {
        let mut p = Self::new();
        for (k, &c) in coeffs.iter().enumerate() {
            p.set(k, c);
        }
        p
    }

    pub fn with_term(mut self, exponent: usize, coefficient: f64) -> Self {
        self.set(exponent, coefficient);
        self
    }

    pub fn set(&mut self, exponent: usize, coefficient: f64) {
        if coefficient == 0.0 {
            self.coeffs.remove(&exponent);
        } else {
            self.coeffs.insert(exponent, coefficient);
        }
    }

    pub fn coefficient(&self, exponent: usize) -> Option<f64> {
        self.coeffs.get(&exponent).copied()
    }

    /// Highest stored exponent; 0 for the zero polynomial.
    pub fn degree(&self) -> usize {
        self.coeffs.keys().next_back().copied().unwrap_or(0)
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    pub fn terms(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.coeffs.iter().map(|(&k, &c)| (k, c))
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        let mut acc = 0.0;
        for k in (0..=self.degree()).rev() {
            acc = acc * x + self.coefficient(k).unwrap_or(0.0);
        }
        acc
    }

    /// `q(x) = p(factor * x)`.
    pub fn compose_scaled(&self, factor: f64) -> Self {
        let mut out = Self::new();
        for (k, c) in self.terms() {
            out.set(k, c * factor.powi(k as i32));
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvaluationStrategy {
    #[default]
    Horner,
    PowerTree,
}

impl EvaluationStrategy {
    /// Levels consumed for a polynomial of `degree`.
    pub fn depth(self, degree: usize) -> usize {
        match (self, degree) {
            (_, 0) => 0,
            (EvaluationStrategy::Horner, d) => d,
            (EvaluationStrategy::PowerTree, d) => ceil_log2(d) + 1,
        }
    }
}

pub fn ceil_log2(n: usize) -> usize {
    match n {
        0 | 1 => 0,
        n => (usize::BITS - (n - 1).leading_zeros()) as usize,
    }
}

/// Relative level and split of every power up to `degree`.
///
/// Entry `i` holds `(j, level)`: `x^i = x^j * x^(i - j)` lands `level` levels
/// below `x`. The first `j` in `[1, i/2]` with the smallest level wins.
/// Entry 0 is unused and entry 1 is `(0, 0)`.
pub fn power_plan(degree: usize) -> CkksResult<Vec<(usize, usize)>> {
    if degree == 0 {
        return Err(CkksError::invalid("power plan needs degree >= 1"));
    }
    let mut plan = vec![(0usize, 0usize); degree + 1];
    for i in 2..=degree {
        let mut best: Option<(usize, usize)> = None;
        for j in 1..=i / 2 {
            let level = plan[j].1.max(plan[i - j].1) + 1;
            if best.is_none_or(|(_, l)| level < l) {
                best = Some((j, level));
            }
        }
        plan[i] = best.ok_or_else(|| {
            CkksError::invalid(format!("no split found for power {i}"))
        })?;
    }
    Ok(plan)
}

/// `x^1 ..= x^d`.
#[derive(Debug, Clone)]
pub struct Powers<C> {
    powers: Vec<C>,
}

impl<C> Powers<C> {
    /// `x^i` for `1 <= i <= max_degree`.
    pub fn power(&self, i: usize) -> Option<&C> {
        i.checked_sub(1).and_then(|idx| self.powers.get(idx))
    }

    pub fn max_degree(&self) -> usize {
        self.powers.len()
    }
}

#[instrument(skip_all, fields(degree = degree))]
pub fn compute_all_powers<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    x: &B::Ciphertext,
    degree: usize,
) -> CkksResult<Powers<B::Ciphertext>> {
    let plan = power_plan(degree)?;
    ctx.params().ensure_depth(x.level(), ceil_log2(degree))?;

    let mut powers: Vec<B::Ciphertext> = Vec::with_capacity(degree);
    powers.push(x.clone());
    for (i, &(j, _)) in plan.iter().enumerate().skip(2) {
        let product = ctx.multiply_rescaled(&powers[j - 1], &powers[i - j - 1])?;
        ctx.record("power", &product);
        powers.push(product);
    }
    Ok(Powers { powers })
}

fn constant<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    value: f64,
    scale: f64,
    level: usize,
) -> CkksResult<B::Plaintext> {
    ctx.backend
        .encode(&vec![value; ctx.slot_count()], scale, level)
}

/// Encrypts the constant polynomial at `x`'s level.
fn constant_ciphertext<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    value: f64,
    level: usize,
) -> CkksResult<B::Ciphertext> {
    let ct = ctx.encrypt_values(&vec![value; ctx.slot_count()], 0)?;
    ctx.switch_to(&ct, level)
}

/// Horner's rule: `acc = c_d; acc = acc * x + c_i` for `i = d-1 ..= 0`.
///
/// Each fold consumes one level and resets the accumulator to the base
/// scale, so the result sits exactly `d` levels below `x`.
#[instrument(skip_all, fields(degree = poly.degree()))]
pub fn horner_evaluate<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    x: &B::Ciphertext,
    poly: &Polynomial,
) -> CkksResult<B::Ciphertext> {
    let degree = poly.degree();
    ctx.params().ensure_depth(x.level(), degree)?;

    let leading = poly.coefficient(degree).unwrap_or(0.0);
    let mut acc = constant_ciphertext(ctx, leading, x.level())?;
    for i in (0..degree).rev() {
        acc = ctx.multiply_rescaled(&acc, x)?;
        acc.set_scale(ctx.base_scale());
        if let Some(c) = poly.coefficient(i) {
            let c = constant::<B>(ctx, c, acc.scale(), acc.level())?;
            acc = ctx.backend.add_plain(&acc, &c)?;
        }
        ctx.record("horner", &acc);
    }
    debug!(level = acc.level(), "horner done");
    Ok(acc)
}

/// Sum of `c_i * x^i` over the stored coefficients, powers from
/// [`compute_all_powers`].
#[instrument(skip_all, fields(degree = poly.degree()))]
pub fn power_tree_evaluate<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    x: &B::Ciphertext,
    poly: &Polynomial,
) -> CkksResult<B::Ciphertext> {
    let degree = poly.degree();
    if degree == 0 {
        return constant_ciphertext(ctx, poly.coefficient(0).unwrap_or(0.0), x.level());
    }
    ctx.params()
        .ensure_depth(x.level(), EvaluationStrategy::PowerTree.depth(degree))?;

    let powers = compute_all_powers(ctx, x, degree)?;
    let mut terms = Vec::new();
    for (i, c) in poly.terms().filter(|&(i, _)| i > 0) {
        let power = powers
            .power(i)
            .ok_or_else(|| CkksError::invalid(format!("power {i} was not computed")))?;
        let coefficient = constant::<B>(ctx, c, ctx.base_scale(), power.level())?;
        let term = ctx.backend.multiply_plain(power, &coefficient)?;
        terms.push(ctx.rescale_normalized(&term)?);
    }

    let level = terms.iter().map(Leveled::level).max().unwrap_or(x.level());
    let aligned = terms
        .iter()
        .map(|t| ctx.switch_to(t, level))
        .collect::<CkksResult<Vec<_>>>()?;
    let mut sum = ctx.backend.add_many(&aligned)?;
    if let Some(c0) = poly.coefficient(0) {
        let c0 = constant::<B>(ctx, c0, sum.scale(), level)?;
        sum = ctx.backend.add_plain(&sum, &c0)?;
    }
    ctx.record("power_tree", &sum);
    Ok(sum)
}

pub fn evaluate<B: CkksBackend>(
    ctx: &EvalContext<'_, B>,
    x: &B::Ciphertext,
    poly: &Polynomial,
    strategy: EvaluationStrategy,
) -> CkksResult<B::Ciphertext> {
    match strategy {
        EvaluationStrategy::Horner => horner_evaluate(ctx, x, poly),
        EvaluationStrategy::PowerTree => power_tree_evaluate(ctx, x, poly),
    }
}
