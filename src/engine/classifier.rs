//! Per-bucket binary classifiers.
//!
//! Buckets only see the [`Trainer`] and [`Model`] traits; the default
//! implementation is a linear SVM with squared hinge loss, solved by dual
//! coordinate descent with the bias folded into the weight vector.

use std::fmt::Debug;

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rayon::prelude::*;

use crate::config::SvmConfig;
use crate::dataset::FeatureMatrix;
use crate::error::{Result, SieveError};

/// A trained discriminant; larger margins mean "more relevant".
pub trait Model: Send + Sync + Debug {
    fn score(&self, row: &[f32]) -> f64;

    fn score_matrix(&self, matrix: &FeatureMatrix) -> Vec<f64> {
        matrix.par_rows().map(|row| self.score(row)).collect()
    }
}

pub trait Trainer: Send + Sync + Debug {
    /// Fits a model on rows labelled `+1.0` (positive) or `-1.0`.
    fn train(&self, features: &FeatureMatrix, labels: &[f64]) -> Result<Box<dyn Model>>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearModel {
    pub weights: Vec<f64>,
    pub bias: f64,
}

impl Model for LinearModel {
    fn score(&self, row: &[f32]) -> f64 {
        self.weights
            .iter()
            .zip(row)
            .fold(self.bias, |acc, (&w, &x)| w.mul_add(f64::from(x), acc))
    }
}

/// Seed for the coordinate visiting order, fixed so retraining on the same
/// data yields the same model.
const ORDER_SEED: u64 = 0x5eed;

#[derive(Debug, Clone)]
pub struct LinearSvm {
    c: f64,
    max_iterations: usize,
    tolerance: f64,
}

impl LinearSvm {
    #[must_use]
    pub const fn new(config: &SvmConfig) -> Self {
        Self {
            c: config.c,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
        }
    }
}

impl Default for LinearSvm {
    fn default() -> Self {
        Self::new(&SvmConfig::default())
    }
}

impl Trainer for LinearSvm {
    fn train(&self, features: &FeatureMatrix, labels: &[f64]) -> Result<Box<dyn Model>> {
        let n = features.n_rows();
        if n == 0 {
            return Err(SieveError::Training("no training rows".to_string()));
        }
        if labels.len() != n {
            return Err(SieveError::Training(format!(
                "{n} rows but {} labels",
                labels.len()
            )));
        }
        if labels.iter().any(|&y| y != 1.0 && y != -1.0) {
            return Err(SieveError::Training("labels must be +1 or -1".to_string()));
        }

        let dim = features.dim();
        // Squared hinge: no upper bound on alpha, diagonal shift 1/(2C).
        let diag = 0.5 / self.c;
        let q_diag: Vec<f64> = features
            .rows()
            .map(|row| row.iter().map(|&x| f64::from(x).powi(2)).sum::<f64>() + 1.0 + diag)
            .collect();

        let mut weights = vec![0.0_f64; dim];
        let mut bias = 0.0;
        let mut alpha = vec![0.0; n];
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(ORDER_SEED);

        let mut iterations = 0;
        while iterations < self.max_iterations {
            order.shuffle(&mut rng);
            let mut max_pg = f64::NEG_INFINITY;
            let mut min_pg = f64::INFINITY;

            for &i in &order {
                let row = features.row(i);
                let y = labels[i];
                let margin = weights
                    .iter()
                    .zip(row)
                    .fold(bias, |acc, (&w, &x)| w.mul_add(f64::from(x), acc));
                let gradient = y.mul_add(margin, -1.0) + diag * alpha[i];
                let projected = if alpha[i] == 0.0 {
                    gradient.min(0.0)
                } else {
                    gradient
                };
                max_pg = max_pg.max(projected);
                min_pg = min_pg.min(projected);

                if projected.abs() > 1e-12 {
                    let old = alpha[i];
                    alpha[i] = (old - gradient / q_diag[i]).max(0.0);
                    let step = (alpha[i] - old) * y;
                    for (w, &x) in weights.iter_mut().zip(row) {
                        *w = step.mul_add(f64::from(x), *w);
                    }
                    bias += step;
                }
            }

            iterations += 1;
            if max_pg - min_pg <= self.tolerance {
                break;
            }
        }

        tracing::trace!(rows = n, dim, iterations, "linear svm trained");
        Ok(Box::new(LinearModel { weights, bias }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn separable() -> (FeatureMatrix, Vec<f64>) {
        let rows = vec![
            vec![2.0, 2.0],
            vec![3.0, 2.5],
            vec![2.5, 3.0],
            vec![-2.0, -2.0],
            vec![-3.0, -2.5],
            vec![-2.5, -3.0],
        ];
        let labels = vec![1.0, 1.0, 1.0, -1.0, -1.0, -1.0];
        (FeatureMatrix::from_rows(2, rows).unwrap(), labels)
    }

    #[test]
    fn separates_linearly_separable_data() {
        let (x, y) = separable();
        let model = LinearSvm::default().train(&x, &y).unwrap();
        let scores = model.score_matrix(&x);
        for (score, label) in scores.iter().zip(&y) {
            assert!(score * label > 0.0, "score {score} label {label}");
        }
        assert!(model.score(&[5.0, 5.0]) > model.score(&[2.0, 2.0]));
    }

    #[test]
    fn training_is_deterministic() {
        let (x, y) = separable();
        let a = LinearSvm::default().train(&x, &y).unwrap().score_matrix(&x);
        let b = LinearSvm::default().train(&x, &y).unwrap().score_matrix(&x);
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_bad_labels() {
        let (x, _) = separable();
        let err = LinearSvm::default().train(&x, &[1.0; 5]).unwrap_err();
        assert!(matches!(err, SieveError::Training(_)));
        let err = LinearSvm::default()
            .train(&x, &[1.0, 0.0, 1.0, 1.0, 1.0, 1.0])
            .unwrap_err();
        assert!(matches!(err, SieveError::Training(_)));
    }

    #[test]
    fn linear_model_scores_are_affine() {
        let model = LinearModel {
            weights: vec![1.0, -2.0],
            bias: 0.5,
        };
        assert!((model.score(&[3.0, 1.0]) - 1.5).abs() < 1e-12);
    }
}
