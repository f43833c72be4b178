//! Plaintext gradient descent with the same sigmoid polynomial the encrypted
//! trainer evaluates. Used to measure the error CKKS adds.

use crate::sigmoid::{SigmoidApproximator, logistic};

#[derive(Debug, Clone)]
pub struct PlaintextTrainer {
    sigmoid: SigmoidApproximator,
    learning_rate: f64,
}

impl PlaintextTrainer {
    pub fn new(sigmoid: SigmoidApproximator, learning_rate: f64) -> Self {
        Self {
            sigmoid,
            learning_rate,
        }
    }

    /// Approximated sigmoid of every linear score.
    pub fn predict(&self, features: &[Vec<f64>], weights: &[f64]) -> Vec<f64> {
        features
            .iter()
            .map(|row| self.sigmoid.approximate(linear_score(row, weights)))
            .collect()
    }

    /// `w - lr / n * X^T (p(Xw / 8) - y)`.
    pub fn step(&self, features: &[Vec<f64>], labels: &[f64], weights: &[f64]) -> Vec<f64> {
        let n = features.len() as f64;
        let residual: Vec<f64> = self
            .predict(features, weights)
            .iter()
            .zip(labels)
            .map(|(p, y)| p - y)
            .collect();
        weights
            .iter()
            .enumerate()
            .map(|(j, w)| {
                let gradient: f64 = features
                    .iter()
                    .zip(&residual)
                    .map(|(row, r)| row[j] * r)
                    .sum();
                w - self.learning_rate / n * gradient
            })
            .collect()
    }

    pub fn train(
        &self,
        features: &[Vec<f64>],
        labels: &[f64],
        weights: &[f64],
        iterations: usize,
    ) -> Vec<f64> {
        (0..iterations).fold(weights.to_vec(), |w, _| self.step(features, labels, &w))
    }
}

pub fn linear_score(row: &[f64], weights: &[f64]) -> f64 {
    row.iter().zip(weights).map(|(x, w)| x * w).sum()
}

/// Fraction of rows whose exact-sigmoid prediction rounds to the label.
pub fn accuracy(features: &[Vec<f64>], labels: &[f64], weights: &[f64]) -> f64 {
    if features.is_empty() {
        return 0.0;
    }
    let correct = features
        .iter()
        .zip(labels)
        .filter(|(row, y)| {
            let predicted = if logistic(linear_score(row, weights)) >= 0.5 {
                1.0
            } else {
                0.0
            };
            predicted == **y
        })
        .count();
    correct as f64 / features.len() as f64
}

/// Largest absolute difference between two weight vectors.
pub fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
