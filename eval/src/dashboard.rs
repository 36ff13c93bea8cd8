// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Precomputed fairness dashboard payloads and their upload store
//!
//! A payload carries the true labels, one prediction column per model id and
//! the sensitive-feature columns. Rendering happens elsewhere; this module only
//! validates, persists and retrieves payloads by upload id.

use crate::run::RunGuard;
use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionType {
    BinaryClassification,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardPayload {
    pub schema_version: u32,
    pub name: String,
    pub prediction_type: PredictionType,
    pub y_true: Vec<u8>,
    /// Model ids, parallel to `y_pred`
    pub model_ids: Vec<String>,
    pub y_pred: Vec<Vec<u8>>,
    pub sensitive_features: BTreeMap<String, Vec<String>>,
}

impl DashboardPayload {
    pub fn new(
        name: &str,
        y_true: Vec<u8>,
        predictions: Vec<(String, Vec<u8>)>,
        sensitive_features: BTreeMap<String, Vec<String>>,
    ) -> Result<Self> {
        let (model_ids, y_pred) = predictions.into_iter().unzip();
        let payload = Self {
            schema_version: 1,
            name: name.to_string(),
            prediction_type: PredictionType::BinaryClassification,
            y_true,
            model_ids,
            y_pred,
            sensitive_features,
        };
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<()> {
        let n = self.y_true.len();
        if n == 0 {
            bail!("dashboard '{}' has no rows", self.name);
        }
        if self.model_ids.is_empty() {
            bail!("dashboard '{}' has no models", self.name);
        }
        if self.model_ids.len() != self.y_pred.len() {
            bail!("dashboard '{}' has {} model ids but {} prediction columns", self.name, self.model_ids.len(), self.y_pred.len());
        }

        let mut seen = HashSet::new();
        for (id, preds) in self.model_ids.iter().zip(self.y_pred.iter()) {
            if !seen.insert(id) {
                bail!("duplicate model id '{}' in dashboard '{}'", id, self.name);
            }
            if preds.len() != n {
                bail!("model '{}' has {} predictions, expected {}", id, preds.len(), n);
            }
        }

        if self.y_true.iter().chain(self.y_pred.iter().flatten()).any(|&v| v > 1) {
            bail!("dashboard '{}' contains non-binary labels", self.name);
        }

        for (feature, values) in &self.sensitive_features {
            if values.len() != n {
                bail!("sensitive feature '{}' has {} values, expected {}", feature, values.len(), n);
            }
        }
        Ok(())
    }

    /// (model id, predictions) in insertion order
    pub fn predictions(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.model_ids.iter().map(String::as_str).zip(self.y_pred.iter().map(Vec::as_slice))
    }

    pub fn predictions_for(&self, model_id: &str) -> Option<&[u8]> {
        self.predictions().find(|(id, _)| *id == model_id).map(|(_, p)| p)
    }
}

/// Content-derived identifier of an uploaded payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(String);

impl UploadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != 64 || !s.chars().all(|c| c.is_ascii_hexdigit()) {
            bail!("'{}' is not a dashboard upload id", s);
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait DashboardStore {
    /// Persist `payload` under the active run
    fn upload(&self, run: &RunGuard, payload: &DashboardPayload) -> Result<UploadId>;

    fn download(&self, run_id: &str, upload_id: &UploadId) -> Result<DashboardPayload>;

    fn list(&self, run_id: &str) -> Result<Vec<UploadId>>;
}

/// Store under `<workspace>/dashboards/<run id>/<upload id>.json`
#[derive(Debug, Clone)]
pub struct LocalDashboardStore {
    root: PathBuf,
}

impl LocalDashboardStore {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            root: workspace.dashboards_dir(),
        }
    }

    fn path(&self, run_id: &str, upload_id: &UploadId) -> PathBuf {
        self.root.join(run_id).join(format!("{}.json", upload_id))
    }
}

fn content_id(json: &str) -> UploadId {
    UploadId(hex::encode(Sha256::digest(json.as_bytes())))
}

impl DashboardStore for LocalDashboardStore {
    fn upload(&self, run: &RunGuard, payload: &DashboardPayload) -> Result<UploadId> {
        payload.validate()?;
        let json = serde_json::to_string(payload)?;
        let upload_id = content_id(&json);

        let path = self.path(run.id(), &upload_id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, &json).with_context(|| format!("Failed to write dashboard {}", path.display()))?;

        tracing::info!(
            "Uploaded dashboard '{}' ({} models, {} rows) as {}",
            payload.name,
            payload.model_ids.len(),
            payload.y_true.len(),
            upload_id
        );
        Ok(upload_id)
    }

    fn download(&self, run_id: &str, upload_id: &UploadId) -> Result<DashboardPayload> {
        let path = self.path(run_id, upload_id);
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Dashboard {} not found in run {}", upload_id, run_id))?;
        if content_id(&json) != *upload_id {
            bail!("dashboard {} failed integrity check", upload_id);
        }
        let payload: DashboardPayload = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse dashboard {}", path.display()))?;
        Ok(payload)
    }

    fn list(&self, run_id: &str) -> Result<Vec<UploadId>> {
        let dir = self.root.join(run_id);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids: Vec<UploadId> = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name();
                let stem = name.to_str()?.strip_suffix(".json")?;
                UploadId::parse(stem).ok()
            })
            .collect();
        ids.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::Experiment;

    fn payload() -> DashboardPayload {
        let mut sensitive = BTreeMap::new();
        sensitive.insert("sex".to_string(), vec!["Male".to_string(), "Female".to_string(), "Female".to_string()]);
        DashboardPayload::new(
            "Dominant Models",
            vec![1, 0, 1],
            vec![
                ("census_unmitigated:1".to_string(), vec![1, 0, 0]),
                ("census_gs_model_4:1".to_string(), vec![1, 1, 1]),
            ],
            sensitive,
        )
        .unwrap()
    }

    #[test]
    fn test_payload_keeps_model_order() {
        let p = payload();
        let ids: Vec<_> = p.predictions().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["census_unmitigated:1", "census_gs_model_4:1"]);
        assert_eq!(p.predictions_for("census_gs_model_4:1"), Some(&[1u8, 1, 1][..]));
    }

    #[test]
    fn test_payload_validation() {
        let sensitive = BTreeMap::new();
        assert!(DashboardPayload::new("d", vec![1, 0], vec![], sensitive.clone()).is_err());
        assert!(DashboardPayload::new("d", vec![1, 0], vec![("m".to_string(), vec![1])], sensitive.clone()).is_err());
        assert!(DashboardPayload::new("d", vec![1, 0], vec![("m".to_string(), vec![1, 2])], sensitive.clone()).is_err());
        assert!(DashboardPayload::new(
            "d",
            vec![1, 0],
            vec![("m".to_string(), vec![1, 0]), ("m".to_string(), vec![0, 0])],
            sensitive
        )
        .is_err());

        let mut short = BTreeMap::new();
        short.insert("race".to_string(), vec!["White".to_string()]);
        assert!(DashboardPayload::new("d", vec![1, 0], vec![("m".to_string(), vec![1, 0])], short).is_err());
    }

    #[test]
    fn test_upload_download_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::local("test", dir.path()).unwrap();
        let store = LocalDashboardStore::new(&ws);
        let exp = Experiment::new(&ws, "dash").unwrap();

        let original = payload();
        let run = exp.start_logging().unwrap();
        let upload_id = store.upload(&run, &original).unwrap();
        let downloaded = store.download(run.id(), &upload_id).unwrap();

        assert_eq!(downloaded, original);
        assert_eq!(store.list(run.id()).unwrap(), vec![upload_id.clone()]);
        assert_eq!(UploadId::parse(upload_id.as_str()).unwrap(), upload_id);
        run.complete().unwrap();
    }

    #[test]
    fn test_tampered_upload_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::local("test", dir.path()).unwrap();
        let store = LocalDashboardStore::new(&ws);
        let exp = Experiment::new(&ws, "dash").unwrap();
        let run = exp.start_logging().unwrap();

        let upload_id = store.upload(&run, &payload()).unwrap();
        let path = store.path(run.id(), &upload_id);
        let json = std::fs::read_to_string(&path).unwrap().replace("Dominant Models", "Edited");
        std::fs::write(&path, json).unwrap();

        assert!(store.download(run.id(), &upload_id).is_err());
    }

    #[test]
    fn test_upload_id_parse_rejects_garbage() {
        assert!(UploadId::parse("abc").is_err());
        assert!(UploadId::parse(&"z".repeat(64)).is_err());
    }
}
