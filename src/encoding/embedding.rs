//! Canonical embedding of `R[X]/(X^n + 1)` into `C^(n/2)`.
//!
//! A real polynomial `m` is identified with its evaluations at the primitive
//! `2n`-th roots of unity `zeta^(2t+1)`, `zeta = e^(i*pi/n)`. Twisting the
//! coefficients by `zeta^i` turns those evaluations into a plain length-`n`
//! DFT, which `rustfft` computes in `O(n log n)`.
//!
//! Slot `j` lives at the root `zeta^(5^j mod 2n)`; its conjugate partner at
//! `zeta^(-5^j)` carries the complex conjugate so that coefficients stay real.
//! With this ordering the automorphism `X -> X^(5^r)` rotates slots left by
//! `r`, and products of polynomials in the negacyclic ring are slot-wise
//! products.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use num_complex::Complex64;
use rustfft::{Fft, FftPlanner};

use crate::errors::{CkksError, CkksResult};
use crate::math::primes::mod_pow;

pub struct CanonicalEmbedding {
    degree: usize,
    twist: Vec<Complex64>,
    slot_roots: Vec<usize>,
    conjugate_roots: Vec<usize>,
    forward: Arc<dyn Fft<f64>>,
    inverse: Arc<dyn Fft<f64>>,
}

impl fmt::Debug for CanonicalEmbedding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CanonicalEmbedding")
            .field("degree", &self.degree)
            .field("slots", &self.slot_count())
            .finish()
    }
}

impl CanonicalEmbedding {
    pub fn new(degree: usize) -> CkksResult<Self> {
        if degree < 4 || !degree.is_power_of_two() {
            return Err(CkksError::invalid(format!(
                "ring degree {degree} must be a power of two >= 4"
            )));
        }
        let two_n = 2 * degree as u64;
        let twist = (0..degree)
            .map(|i| Complex64::from_polar(1.0, PI * i as f64 / degree as f64))
            .collect();

        let mut slot_roots = Vec::with_capacity(degree / 2);
        let mut conjugate_roots = Vec::with_capacity(degree / 2);
        let mut exponent = 1u64;
        for _ in 0..degree / 2 {
            slot_roots.push(((exponent - 1) / 2) as usize);
            conjugate_roots.push(((two_n - exponent - 1) / 2) as usize);
            exponent = exponent * 5 % two_n;
        }

        let mut planner = FftPlanner::new();
        Ok(Self {
            degree,
            twist,
            slot_roots,
            conjugate_roots,
            forward: planner.plan_fft_forward(degree),
            inverse: planner.plan_fft_inverse(degree),
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn slot_count(&self) -> usize {
        self.degree / 2
    }

    // ── Evaluation and interpolation ─────────────────────────────────

    /// `m(zeta^(2t+1))` for every `t in [0, n)`.
    pub fn evaluate(&self, coeffs: &[f64]) -> Vec<Complex64> {
        let mut buffer: Vec<Complex64> = self
            .twist
            .iter()
            .zip(coeffs.iter().chain(std::iter::repeat(&0.0)))
            .map(|(w, &c)| *w * c)
            .collect();
        self.inverse.process(&mut buffer);
        buffer
    }

    /// Inverse of [`evaluate`](Self::evaluate); keeps only the real part.
    pub fn interpolate(&self, mut evaluations: Vec<Complex64>) -> Vec<f64> {
        self.forward.process(&mut evaluations);
        let n = self.degree as f64;
        evaluations
            .iter()
            .zip(&self.twist)
            .map(|(e, w)| (*e * w.conj()).re / n)
            .collect()
    }

    // ── Encoding ─────────────────────────────────────────────────────

    /// Packs `values` into the first slots, scales by `scale` and rounds the
    /// resulting coefficients. Unused slots encode zero.
    pub fn encode(&self, values: &[f64], scale: f64) -> CkksResult<Vec<f64>> {
        let slots = self.slot_count();
        if values.len() > slots {
            return Err(CkksError::InputTooLong {
                got: values.len(),
                max: slots,
            });
        }
        let mut evaluations = vec![Complex64::new(0.0, 0.0); self.degree];
        for (j, &value) in values.iter().enumerate() {
            let scaled = Complex64::new(value * scale, 0.0);
            evaluations[self.slot_roots[j]] = scaled;
            evaluations[self.conjugate_roots[j]] = scaled.conj();
        }
        Ok(self
            .interpolate(evaluations)
            .into_iter()
            .map(f64::round)
            .collect())
    }

    pub fn decode(&self, coeffs: &[f64], scale: f64) -> Vec<f64> {
        let evaluations = self.evaluate(coeffs);
        self.slot_roots
            .iter()
            .map(|&t| evaluations[t].re / scale)
            .collect()
    }

    // ── Ring operations ──────────────────────────────────────────────

    /// Product in `R[X]/(X^n + 1)`, computed slot-wise.
    pub fn negacyclic_product(&self, a: &[f64], b: &[f64]) -> Vec<f64> {
        let ea = self.evaluate(a);
        let eb = self.evaluate(b);
        let product = ea.iter().zip(&eb).map(|(x, y)| *x * *y).collect();
        self.interpolate(product)
    }

    /// Galois element `5^(steps mod slots) mod 2n` for a left rotation.
    pub fn galois_element(&self, steps: i64) -> u64 {
        let slots = self.slot_count() as i64;
        let exponent = steps.rem_euclid(slots) as u64;
        mod_pow(5, exponent, 2 * self.degree as u64)
    }

    /// Applies `X -> X^k` for an odd `k`.
    pub fn apply_galois(&self, coeffs: &[f64], k: u64) -> Vec<f64> {
        let n = self.degree;
        let two_n = 2 * n as u64;
        let mut out = vec![0.0; n];
        for (i, &c) in coeffs.iter().enumerate().take(n) {
            let target = (i as u64 * k % two_n) as usize;
            if target >= n {
                out[target - n] -= c;
            } else {
                out[target] += c;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn schoolbook_negacyclic(a: &[f64], b: &[f64]) -> Vec<f64> {
        let n = a.len();
        let mut out = vec![0.0; n];
        for i in 0..n {
            for j in 0..n {
                let k = i + j;
                if k < n {
                    out[k] += a[i] * b[j];
                } else {
                    out[k - n] -= a[i] * b[j];
                }
            }
        }
        out
    }

    #[test]
    fn encode_decode_preserves_values() {
        let embedding = CanonicalEmbedding::new(16).unwrap();
        let values = [1.5, -2.25, 3.0, 0.125, -7.75];
        let coeffs = embedding.encode(&values, 2f64.powi(30)).unwrap();
        let decoded = embedding.decode(&coeffs, 2f64.powi(30));
        for (orig, dec) in values.iter().zip(&decoded) {
            assert_relative_eq!(orig, dec, epsilon = 1e-6);
        }
        for dec in &decoded[values.len()..] {
            assert!(dec.abs() < 1e-6);
        }
    }

    #[test]
    fn constant_encodes_to_constant_polynomial() {
        let embedding = CanonicalEmbedding::new(8).unwrap();
        let coeffs = embedding.encode(&[3.0; 4], 1024.0).unwrap();
        assert_relative_eq!(coeffs[0], 3072.0, epsilon = 1e-9);
        for c in &coeffs[1..] {
            assert!(c.abs() < 1e-9);
        }
    }

    #[test]
    fn input_longer_than_slots_is_rejected() {
        let embedding = CanonicalEmbedding::new(8).unwrap();
        let err = embedding.encode(&[1.0; 5], 1.0).unwrap_err();
        assert_eq!(err, CkksError::InputTooLong { got: 5, max: 4 });
    }

    #[test]
    fn rejects_non_power_of_two() {
        assert!(CanonicalEmbedding::new(12).is_err());
        assert!(CanonicalEmbedding::new(2).is_err());
    }

    #[test]
    fn product_matches_schoolbook() {
        let embedding = CanonicalEmbedding::new(8).unwrap();
        let a = [1.0, 2.0, 0.0, -1.0, 3.0, 0.0, 0.0, 5.0];
        let b = [0.0, 1.0, 4.0, 0.0, 0.0, -2.0, 1.0, 0.0];
        let fast = embedding.negacyclic_product(&a, &b);
        let slow = schoolbook_negacyclic(&a, &b);
        for (x, y) in fast.iter().zip(&slow) {
            assert_relative_eq!(x, y, epsilon = 1e-9);
        }
    }

    #[test]
    fn product_is_slotwise() {
        let embedding = CanonicalEmbedding::new(16).unwrap();
        let scale = 2f64.powi(20);
        let a = embedding.encode(&[1.0, 2.0, 3.0], scale).unwrap();
        let b = embedding.encode(&[4.0, 5.0, 6.0], scale).unwrap();
        let product = embedding.negacyclic_product(&a, &b);
        let decoded = embedding.decode(&product, scale * scale);
        assert_relative_eq!(decoded[0], 4.0, epsilon = 1e-4);
        assert_relative_eq!(decoded[1], 10.0, epsilon = 1e-4);
        assert_relative_eq!(decoded[2], 18.0, epsilon = 1e-4);
    }

    #[test]
    fn galois_rotates_left() {
        let embedding = CanonicalEmbedding::new(16).unwrap();
        let scale = 2f64.powi(30);
        let values: Vec<f64> = (0..8).map(|v| v as f64).collect();
        let coeffs = embedding.encode(&values, scale).unwrap();

        for steps in [1i64, 3, -2] {
            let k = embedding.galois_element(steps);
            let rotated = embedding.decode(&embedding.apply_galois(&coeffs, k), scale);
            for (j, value) in rotated.iter().enumerate() {
                let source = (j as i64 + steps).rem_euclid(8) as usize;
                assert_relative_eq!(*value, values[source], epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn identity_rotation_element() {
        let embedding = CanonicalEmbedding::new(16).unwrap();
        assert_eq!(embedding.galois_element(0), 1);
        assert_eq!(embedding.galois_element(8), 1);
        assert_eq!(embedding.galois_element(1), 5);
    }
}
