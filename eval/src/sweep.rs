// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Mitigation sweep results produced by an external grid search
//!
//! Each grid point arrives with its error rate and demographic-parity
//! disparity already computed. Test-set predictions and a serialized model
//! artifact are optional; the pipeline uses them for the dashboard and the
//! registry when present.

use crate::dominance::Candidate;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};

/// One grid point of the sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepCandidate {
    pub id: String,
    pub error: f64,
    pub disparity: f64,
    /// 0/1 predictions on the evaluation split
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub predictions: Option<Vec<u8>>,
    /// Serialized model for registration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepResults {
    /// Fairness constraint the disparities were measured under
    #[serde(default = "default_constraint")]
    pub constraint: String,
    pub candidates: Vec<SweepCandidate>,
}

fn default_constraint() -> String {
    "demographic_parity".to_string()
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    id: String,
    error: f64,
    disparity: f64,
    #[serde(default)]
    artifact: Option<PathBuf>,
}

impl SweepResults {
    pub fn new(candidates: Vec<SweepCandidate>) -> Self {
        Self {
            constraint: default_constraint(),
            candidates,
        }
    }

    /// Load from `.json` or `.csv`, chosen by extension
    pub fn load(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("csv") => Self::from_csv(path),
            _ => Self::from_json(path),
        }
    }

    pub fn from_json(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open sweep file: {}", path.display()))?;
        let mut results: Self = serde_json::from_reader(file)
            .with_context(|| format!("Failed to parse sweep JSON: {}", path.display()))?;
        results.resolve_artifacts(path);
        results
            .validate()
            .with_context(|| format!("Invalid sweep file: {}", path.display()))?;
        Ok(results)
    }

    /// CSV with an `id,error,disparity[,artifact]` header; no predictions
    pub fn from_csv(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open sweep file: {}", path.display()))?;
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let mut candidates = Vec::new();
        for (idx, row) in reader.deserialize::<CsvRow>().enumerate() {
            let row = row.with_context(|| format!("Failed to read row {} in {}", idx, path.display()))?;
            candidates.push(SweepCandidate {
                id: row.id,
                error: row.error,
                disparity: row.disparity,
                predictions: None,
                artifact: row.artifact,
            });
        }

        let mut results = Self::new(candidates);
        results.resolve_artifacts(path);
        results
            .validate()
            .with_context(|| format!("Invalid sweep file: {}", path.display()))?;
        Ok(results)
    }

    /// Relative artifact paths are taken relative to the sweep file
    fn resolve_artifacts(&mut self, sweep_path: &Path) {
        let base = sweep_path.parent().unwrap_or(Path::new("."));
        for c in &mut self.candidates {
            if let Some(artifact) = c.artifact.as_mut() {
                if artifact.is_relative() {
                    *artifact = base.join(&*artifact);
                }
            }
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write sweep file: {}", path.display()))?;
        Ok(())
    }

    /// Check the preconditions the dominance filter relies on
    pub fn validate(&self) -> Result<()> {
        if self.candidates.is_empty() {
            bail!("sweep contains no candidates");
        }

        let mut seen = HashSet::new();
        let mut prediction_len = None;

        for (idx, c) in self.candidates.iter().enumerate() {
            if !seen.insert(c.id.as_str()) {
                bail!("duplicate candidate id '{}' at position {}", c.id, idx);
            }
            if !c.error.is_finite() || c.error < 0.0 {
                bail!("candidate '{}' has invalid error {}", c.id, c.error);
            }
            if !c.disparity.is_finite() || c.disparity < 0.0 {
                bail!("candidate '{}' has invalid disparity {}", c.id, c.disparity);
            }
            if let Some(ref preds) = c.predictions {
                if let Some(bad) = preds.iter().find(|&&p| p > 1) {
                    bail!("candidate '{}' has non-binary prediction {}", c.id, bad);
                }
                match prediction_len {
                    None => prediction_len = Some(preds.len()),
                    Some(n) if n != preds.len() => bail!(
                        "candidate '{}' has {} predictions, expected {}",
                        c.id,
                        preds.len(),
                        n
                    ),
                    _ => {}
                }
            }
        }

        Ok(())
    }

    /// Candidates in file order, borrowing each grid point as the handle
    pub fn candidates(&self) -> Vec<Candidate<&SweepCandidate>> {
        self.candidates
            .iter()
            .map(|c| Candidate::new(c, c.error, c.disparity))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn point(id: &str, error: f64, disparity: f64) -> SweepCandidate {
        SweepCandidate {
            id: id.to_string(),
            error,
            disparity,
            predictions: None,
            artifact: None,
        }
    }

    #[test]
    fn test_validate_rejects_negative_and_nan() {
        assert!(SweepResults::new(vec![point("a", -0.1, 0.2)]).validate().is_err());
        assert!(SweepResults::new(vec![point("a", 0.1, f64::NAN)]).validate().is_err());
        assert!(SweepResults::new(vec![]).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_ids() {
        let sweep = SweepResults::new(vec![point("a", 0.1, 0.2), point("a", 0.2, 0.1)]);
        let err = sweep.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn test_validate_prediction_lengths() {
        let mut a = point("a", 0.1, 0.2);
        a.predictions = Some(vec![0, 1, 1]);
        let mut b = point("b", 0.2, 0.1);
        b.predictions = Some(vec![0, 1]);
        assert!(SweepResults::new(vec![a.clone(), b]).validate().is_err());

        let mut c = point("c", 0.2, 0.1);
        c.predictions = Some(vec![0, 2, 1]);
        assert!(SweepResults::new(vec![a, c]).validate().is_err());
    }

    #[test]
    fn test_load_csv() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "id,error,disparity").unwrap();
        writeln!(file, "grid_0, 0.20, 0.30").unwrap();
        writeln!(file, "grid_1, 0.15, 0.30").unwrap();
        file.flush().unwrap();

        let sweep = SweepResults::load(file.path()).unwrap();
        assert_eq!(sweep.len(), 2);
        assert_eq!(sweep.candidates[1].id, "grid_1");
        assert_eq!(sweep.constraint, "demographic_parity");
    }

    #[test]
    fn test_relative_artifacts_resolve_against_sweep_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.csv");
        std::fs::write(&path, "id,error,disparity,artifact\ngrid_0,0.2,0.1,models/grid_0.json\n").unwrap();

        let sweep = SweepResults::load(&path).unwrap();
        assert_eq!(sweep.candidates[0].artifact, Some(dir.path().join("models/grid_0.json")));
    }

    #[test]
    fn test_json_round_trip_through_file() {
        let mut a = point("a", 0.1, 0.2);
        a.predictions = Some(vec![1, 0]);
        let sweep = SweepResults::new(vec![a, point("b", 0.3, 0.0)]);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sweep.json");
        sweep.save_json(&path).unwrap();

        assert_eq!(SweepResults::load(&path).unwrap(), sweep);
    }

    #[test]
    fn test_candidates_keep_file_order() {
        let sweep = SweepResults::new(vec![point("x", 0.3, 0.1), point("y", 0.1, 0.4)]);
        let ids: Vec<_> = sweep.candidates().iter().map(|c| c.handle.id.clone()).collect();
        assert_eq!(ids, vec!["x", "y"]);
    }
}
