// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Column selection and encoding for the census table
//!
//! Sensitive attributes are pulled out as string columns, optionally dropped
//! from the model features, categorical columns are one-hot encoded and every
//! resulting column is standard scaled. The split is stratified on the label
//! and seeded so the same config always yields the same rows.

use crate::datasets::{CensusDataset, FeatureValue};
use anyhow::{bail, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessConfig {
    /// Columns reported to the dashboard as sensitive features
    pub sensitive_features: Vec<String>,
    /// Columns excluded from the model input
    pub drop_from_features: Vec<String>,
    /// Fraction of rows held out for evaluation
    pub test_size: f64,
    pub seed: u64,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            sensitive_features: vec!["sex".to_string(), "race".to_string()],
            drop_from_features: vec!["sex".to_string()],
            test_size: 0.2,
            seed: 0,
        }
    }
}

/// Rows, labels and sensitive columns of one split, row-aligned
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Split {
    pub x: Vec<Vec<f64>>,
    pub y: Vec<u8>,
    pub sensitive: BTreeMap<String, Vec<String>>,
}

impl Split {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparedData {
    pub feature_names: Vec<String>,
    pub train: Split,
    pub test: Split,
}

enum ColumnEncoding {
    Numeric(String),
    OneHot(String, Vec<String>),
}

/// Encode, scale and split a census dataset
pub fn prepare(dataset: &CensusDataset, config: &PreprocessConfig) -> Result<PreparedData> {
    if dataset.is_empty() {
        bail!("cannot preprocess an empty dataset");
    }
    if !(config.test_size > 0.0 && config.test_size < 1.0) {
        bail!("test_size must be in (0, 1), got {}", config.test_size);
    }

    let columns: BTreeSet<&String> = dataset.records.iter().flat_map(|r| r.features.keys()).collect();
    for name in config.sensitive_features.iter().chain(config.drop_from_features.iter()) {
        if !columns.contains(name) {
            bail!("column '{}' not present in dataset {}", name, dataset.info.id);
        }
    }

    let sensitive: BTreeMap<String, Vec<String>> = config
        .sensitive_features
        .iter()
        .map(|name| (name.clone(), dataset.column(name)))
        .collect();

    let encodings: Vec<ColumnEncoding> = columns
        .into_iter()
        .filter(|name| !config.drop_from_features.contains(*name))
        .map(|name| encoding_for(dataset, name))
        .collect();

    let feature_names: Vec<String> = encodings
        .iter()
        .flat_map(|enc| match enc {
            ColumnEncoding::Numeric(name) => vec![name.clone()],
            ColumnEncoding::OneHot(name, categories) => {
                categories.iter().map(|c| format!("{name}={c}")).collect()
            }
        })
        .collect();

    let mut rows: Vec<Vec<f64>> = dataset
        .records
        .iter()
        .map(|record| {
            let mut row = Vec::with_capacity(feature_names.len());
            for enc in &encodings {
                match enc {
                    ColumnEncoding::Numeric(name) => {
                        row.push(record.features.get(name).and_then(FeatureValue::as_f64).unwrap_or(0.0));
                    }
                    ColumnEncoding::OneHot(name, categories) => {
                        let value = record.features.get(name).map(FeatureValue::as_category);
                        for category in categories {
                            row.push(if value.as_ref() == Some(category) { 1.0 } else { 0.0 });
                        }
                    }
                }
            }
            row
        })
        .collect();

    standard_scale(&mut rows);

    let labels = dataset.labels();
    let (train_idx, test_idx) = stratified_split(&labels, config.test_size, config.seed);

    tracing::info!(
        "Preprocessed {} rows into {} features (train={}, test={})",
        rows.len(),
        feature_names.len(),
        train_idx.len(),
        test_idx.len()
    );

    Ok(PreparedData {
        feature_names,
        train: take_rows(&rows, &labels, &sensitive, &train_idx),
        test: take_rows(&rows, &labels, &sensitive, &test_idx),
    })
}

fn encoding_for(dataset: &CensusDataset, name: &str) -> ColumnEncoding {
    let all_numeric = dataset
        .records
        .iter()
        .all(|r| matches!(r.features.get(name), Some(FeatureValue::Numeric(_))));

    if all_numeric {
        ColumnEncoding::Numeric(name.to_string())
    } else {
        let categories: BTreeSet<String> = dataset.column(name).into_iter().collect();
        ColumnEncoding::OneHot(name.to_string(), categories.into_iter().collect())
    }
}

/// Scale each column to zero mean and unit variance; constant columns only
/// get centred
pub fn standard_scale(rows: &mut [Vec<f64>]) {
    let Some(width) = rows.first().map(Vec::len) else {
        return;
    };
    let n = rows.len() as f64;

    for col in 0..width {
        let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
        let var = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
        let std = if var > 0.0 { var.sqrt() } else { 1.0 };
        for row in rows.iter_mut() {
            row[col] = (row[col] - mean) / std;
        }
    }
}

/// Shuffle each label's indices and hold out `test_size` of each, rounded up
pub fn stratified_split(labels: &[u8], test_size: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    let classes: BTreeSet<u8> = labels.iter().copied().collect();
    for class in classes {
        let mut idx: Vec<usize> = (0..labels.len()).filter(|&i| labels[i] == class).collect();
        idx.shuffle(&mut rng);
        let n_test = ((idx.len() as f64) * test_size).ceil() as usize;
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

fn take_rows(
    rows: &[Vec<f64>],
    labels: &[u8],
    sensitive: &BTreeMap<String, Vec<String>>,
    idx: &[usize],
) -> Split {
    Split {
        x: idx.iter().map(|&i| rows[i].clone()).collect(),
        y: idx.iter().map(|&i| labels[i]).collect(),
        sensitive: sensitive
            .iter()
            .map(|(name, values)| (name.clone(), idx.iter().map(|&i| values[i].clone()).collect()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepare_drops_configured_columns() {
        let dataset = CensusDataset::load_synthetic(200, 1);
        let prepared = prepare(&dataset, &PreprocessConfig::default()).unwrap();

        assert!(prepared.feature_names.iter().all(|f| !f.starts_with("sex")));
        assert!(prepared.feature_names.iter().any(|f| f.starts_with("race=")));
        assert!(prepared.feature_names.contains(&"age".to_string()));
        assert_eq!(prepared.train.len() + prepared.test.len(), 200);
        assert_eq!(prepared.test.sensitive["sex"].len(), prepared.test.len());
        assert!(prepared.train.x.iter().all(|r| r.len() == prepared.feature_names.len()));
    }

    #[test]
    fn test_missing_sensitive_column_rejected() {
        let dataset = CensusDataset::load_synthetic(20, 1);
        let config = PreprocessConfig {
            sensitive_features: vec!["religion".to_string()],
            ..Default::default()
        };
        assert!(prepare(&dataset, &config).is_err());
    }

    #[test]
    fn test_stratified_split_keeps_class_ratio() {
        let labels: Vec<u8> = (0..100).map(|i| u8::from(i < 30)).collect();
        let (train, test) = stratified_split(&labels, 0.2, 3);

        assert_eq!(test.len(), 20);
        assert_eq!(train.len(), 80);
        assert_eq!(test.iter().filter(|&&i| labels[i] == 1).count(), 6);
    }

    #[test]
    fn test_split_is_seeded() {
        let labels: Vec<u8> = (0..50).map(|i| (i % 3 == 0) as u8).collect();
        assert_eq!(stratified_split(&labels, 0.3, 9), stratified_split(&labels, 0.3, 9));
    }

    #[test]
    fn test_standard_scale() {
        let mut rows = vec![vec![1.0, 5.0], vec![3.0, 5.0]];
        standard_scale(&mut rows);

        assert!((rows[0][0] + 1.0).abs() < 1e-9);
        assert!((rows[1][0] - 1.0).abs() < 1e-9);
        assert_eq!(rows[0][1], 0.0);
    }
}
