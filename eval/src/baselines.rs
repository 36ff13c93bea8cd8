// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Unmitigated baseline classifiers
//!
//! Implements:
//! - Logistic regression (batch gradient descent, L2, optional sample weights)
//! - Majority class baseline
//!
//! Sample weights are part of `fit` because reweighting mitigators drive the
//! estimator through them.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Estimator with a fit/predict capability over dense feature rows
pub trait Classifier: Send + Sync {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8], sample_weight: Option<&[f64]>) -> Result<()>;

    /// Probability of the positive class for each row
    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64>;

    /// 0/1 labels at a 0.5 threshold
    fn predict(&self, x: &[Vec<f64>]) -> Vec<u8> {
        self.predict_proba(x).into_iter().map(|p| u8::from(p > 0.5)).collect()
    }

    fn name(&self) -> &str;

    fn description(&self) -> &str;
}

fn check_inputs(x: &[Vec<f64>], y: &[u8], sample_weight: Option<&[f64]>) -> Result<Vec<f64>> {
    if x.is_empty() {
        bail!("cannot fit on zero rows");
    }
    if x.len() != y.len() {
        bail!("feature rows ({}) and labels ({}) differ in length", x.len(), y.len());
    }
    let weights = match sample_weight {
        Some(w) if w.len() != y.len() => {
            bail!("sample weights ({}) and labels ({}) differ in length", w.len(), y.len())
        }
        Some(w) => w.to_vec(),
        None => vec![1.0; y.len()],
    };
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        bail!("sample weights must be finite and non-negative");
    }
    if weights.iter().sum::<f64>() <= 0.0 {
        bail!("sample weights sum to zero");
    }
    Ok(weights)
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegressionConfig {
    pub learning_rate: f64,
    pub max_iter: usize,
    /// L2 penalty strength
    pub l2: f64,
    pub fit_intercept: bool,
    /// Stop once the largest gradient component falls below this
    pub tol: f64,
}

impl Default for LogisticRegressionConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            max_iter: 500,
            l2: 1e-3,
            fit_intercept: true,
            tol: 1e-6,
        }
    }
}

/// Binary logistic regression, serializable as a registry artifact
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub config: LogisticRegressionConfig,
    pub weights: Vec<f64>,
    pub intercept: f64,
    /// Gradient steps taken by the last fit
    pub n_iter: usize,
}

impl LogisticRegression {
    pub fn new(config: LogisticRegressionConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    fn decision(&self, row: &[f64]) -> f64 {
        self.intercept + self.weights.iter().zip(row.iter()).map(|(w, x)| w * x).sum::<f64>()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write model: {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read model: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse model: {}", path.display()))
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8], sample_weight: Option<&[f64]>) -> Result<()> {
        let weights = check_inputs(x, y, sample_weight)?;
        let n_features = x[0].len();
        if let Some(bad) = x.iter().position(|row| row.len() != n_features) {
            bail!("row {} has {} features, expected {}", bad, x[bad].len(), n_features);
        }

        let total_weight: f64 = weights.iter().sum();
        self.weights = vec![0.0; n_features];
        self.intercept = 0.0;
        self.n_iter = 0;

        for _ in 0..self.config.max_iter {
            let mut grad_w = vec![0.0; n_features];
            let mut grad_b = 0.0;

            for ((row, &label), &sw) in x.iter().zip(y.iter()).zip(weights.iter()) {
                let residual = (sigmoid(self.decision(row)) - f64::from(label.min(1))) * sw;
                for (g, xi) in grad_w.iter_mut().zip(row.iter()) {
                    *g += residual * xi;
                }
                grad_b += residual;
            }

            for (g, w) in grad_w.iter_mut().zip(self.weights.iter()) {
                *g = *g / total_weight + self.config.l2 * w;
            }
            grad_b /= total_weight;
            if !self.config.fit_intercept {
                grad_b = 0.0;
            }

            for (w, g) in self.weights.iter_mut().zip(grad_w.iter()) {
                *w -= self.config.learning_rate * g;
            }
            self.intercept -= self.config.learning_rate * grad_b;
            self.n_iter += 1;

            let max_grad = grad_w.iter().fold(grad_b.abs(), |m, g| m.max(g.abs()));
            if max_grad < self.config.tol {
                break;
            }
        }

        tracing::debug!("Logistic regression converged after {} iterations", self.n_iter);
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        x.iter().map(|row| sigmoid(self.decision(row))).collect()
    }

    fn name(&self) -> &str {
        "LogisticRegression"
    }

    fn description(&self) -> &str {
        "L2-regularised logistic regression trained by batch gradient descent"
    }
}

/// Always predicts the (weighted) majority class
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MajorityBaseline {
    positive_rate: f64,
}

impl MajorityBaseline {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Classifier for MajorityBaseline {
    fn fit(&mut self, x: &[Vec<f64>], y: &[u8], sample_weight: Option<&[f64]>) -> Result<()> {
        let weights = check_inputs(x, y, sample_weight)?;
        let positive: f64 = y.iter().zip(weights.iter()).filter(|(l, _)| **l != 0).map(|(_, w)| *w).sum();
        self.positive_rate = positive / weights.iter().sum::<f64>();
        Ok(())
    }

    fn predict_proba(&self, x: &[Vec<f64>]) -> Vec<f64> {
        vec![self.positive_rate; x.len()]
    }

    fn name(&self) -> &str {
        "Majority"
    }

    fn description(&self) -> &str {
        "Always predicts the majority class from training data"
    }
}

/// Factory for every available baseline
pub fn all_baselines() -> Vec<Box<dyn Classifier>> {
    vec![
        Box::new(LogisticRegression::new(LogisticRegressionConfig::default())),
        Box::new(MajorityBaseline::new()),
    ]
}
