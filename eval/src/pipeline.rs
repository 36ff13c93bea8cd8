// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! End-to-end fairness mitigation workflow
//!
//! Orchestrates:
//! - Census loading and preprocessing
//! - Unmitigated baseline training, artifact and model card
//! - Dominance filtering of the sweep and registration of the survivors
//! - Dashboard upload and round-trip check inside an experiment run
//! - Results serialization and the markdown report

use crate::baselines::{Classifier, LogisticRegression, LogisticRegressionConfig};
use crate::dashboard::{DashboardPayload, DashboardStore, LocalDashboardStore};
use crate::datasets::CensusDataset;
use crate::dominance::{dominated_by, is_dominant, select_dominant_with, NameFormat};
use crate::metrics::ClassificationReport;
use crate::model_card::{ModelCard, ModelCardBuilder};
use crate::preprocess::{prepare, PreprocessConfig};
use crate::registry::{LocalRegistry, ModelRegistry};
use crate::run::Experiment;
use crate::sweep::{SweepCandidate, SweepResults};
use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Seed for the synthetic dataset
    pub seed: u64,
    /// Adult CSV; synthetic data is generated when unset
    pub dataset_path: Option<PathBuf>,
    pub synthetic_size: usize,
    pub preprocess: PreprocessConfig,
    pub model: LogisticRegressionConfig,
    pub experiment: String,
    /// Prefix of registered model names
    pub model_prefix: String,
    pub dashboard_name: String,
    pub output_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            dataset_path: None,
            synthetic_size: 1000,
            preprocess: PreprocessConfig::default(),
            model: LogisticRegressionConfig::default(),
            experiment: "Test_Fairness_Census_Demo".to_string(),
            model_prefix: "census".to_string(),
            dashboard_name: "Fairness Census Demo".to_string(),
            output_dir: PathBuf::from("results"),
        }
    }
}

impl PipelineConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline config: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse pipeline config: {}", path.display()))
    }

    pub fn unmitigated_name(&self) -> String {
        format!("{}_unmitigated", self.model_prefix)
    }

    pub fn name_format(&self) -> NameFormat {
        NameFormat::new(format!("{}_gs_model", self.model_prefix))
    }

    /// Seed both the synthetic data and the train/test split
    pub fn set_seed(&mut self, seed: u64) {
        self.seed = seed;
        self.preprocess.seed = seed;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub id: String,
    pub name: String,
    pub total_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    pub n_features: usize,
    pub positive_rate: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnmitigatedResult {
    pub model_id: String,
    pub artifact: PathBuf,
    pub report: ClassificationReport,
}

/// A sweep model that survived the dominance filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DominantResult {
    pub name: String,
    pub candidate_id: String,
    pub error: f64,
    pub disparity: f64,
    /// Registry id, when the candidate shipped an artifact
    pub model_id: Option<String>,
    pub on_dashboard: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedResult {
    pub candidate_id: String,
    pub error: f64,
    pub disparity: f64,
    pub dominated_by: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardResult {
    pub run_id: String,
    pub upload_id: String,
    pub models: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResults {
    pub config: PipelineConfig,
    pub workspace: String,
    pub dataset: DatasetSummary,
    pub unmitigated: UnmitigatedResult,
    pub constraint: String,
    pub sweep_size: usize,
    pub dominant: Vec<DominantResult>,
    pub dropped: Vec<DroppedResult>,
    pub dashboard: DashboardResult,
    pub timestamp: DateTime<Utc>,
    pub version: String,
}

pub struct FairnessPipeline {
    config: PipelineConfig,
}

impl FairnessPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn load_dataset(&self) -> Result<CensusDataset> {
        let dataset = match self.config.dataset_path {
            Some(ref path) => {
                tracing::info!("Loading census data from {}", path.display());
                CensusDataset::load_csv(path)?
            }
            None => {
                tracing::info!(
                    "Generating synthetic census data ({} rows, seed {})",
                    self.config.synthetic_size,
                    self.config.seed
                );
                CensusDataset::load_synthetic(self.config.synthetic_size, self.config.seed)
            }
        };
        if dataset.is_empty() {
            bail!("dataset '{}' has no usable rows", dataset.info.name);
        }
        Ok(dataset)
    }

    /// Run against the workspace's local registry and dashboard store
    pub fn run(&self, workspace: &Workspace, sweep: &SweepResults) -> Result<PipelineResults> {
        let registry = LocalRegistry::new(workspace);
        let store = LocalDashboardStore::new(workspace);
        self.run_with(workspace, sweep, &registry, &store)
    }

    pub fn run_with(
        &self,
        workspace: &Workspace,
        sweep: &SweepResults,
        registry: &dyn ModelRegistry,
        store: &dyn DashboardStore,
    ) -> Result<PipelineResults> {
        sweep.validate()?;

        let dataset = self.load_dataset()?;
        let data = prepare(&dataset, &self.config.preprocess)?;
        let positives = data.train.y.iter().chain(data.test.y.iter()).filter(|&&y| y != 0).count();
        let dataset_summary = DatasetSummary {
            id: dataset.info.id.clone(),
            name: dataset.info.name.clone(),
            total_samples: dataset.len(),
            train_samples: data.train.len(),
            test_samples: data.test.len(),
            n_features: data.feature_names.len(),
            positive_rate: positives as f64 / dataset.len() as f64,
        };
        tracing::info!(
            "Prepared {} features (train={}, test={})",
            dataset_summary.n_features,
            dataset_summary.train_samples,
            dataset_summary.test_samples
        );

        // Unmitigated baseline
        let mut model = LogisticRegression::new(self.config.model.clone());
        model.fit(&data.train.x, &data.train.y, None)?;
        let y_pred = model.predict(&data.test.x);
        let report = ClassificationReport::from_scores(&y_pred, &data.test.y, &model.predict_proba(&data.test.x));
        tracing::info!("Unmitigated error rate: {:.4}", report.error_rate);

        let models_dir = self.config.output_dir.join("models");
        std::fs::create_dir_all(&models_dir)
            .with_context(|| format!("Failed to create {}", models_dir.display()))?;
        let unmitigated_name = self.config.unmitigated_name();
        let artifact = models_dir.join(format!("{}.json", unmitigated_name));
        model.save(&artifact)?;
        let unmitigated_id = registry.register(&unmitigated_name, &artifact)?;

        let card = ModelCardBuilder::new(&unmitigated_name, model.name())
            .description(model.description())
            .registry_id(&unmitigated_id.to_string())
            .performance(&report)
            .sensitive_features(self.config.preprocess.sensitive_features.clone())
            .dataset(&dataset.info.name)
            .split_sizes(data.train.len(), data.test.len())
            .preprocessing(preprocessing_steps(&self.config.preprocess))
            .build();
        save_model_card(&card, &self.config.output_dir)?;

        // Dominance filter over the sweep
        let candidates = sweep.candidates();
        let dominant = select_dominant_with(&candidates, &self.config.name_format());
        tracing::info!("{} of {} sweep models are dominant", dominant.len(), sweep.len());

        let dropped: Vec<DroppedResult> = candidates
            .iter()
            .enumerate()
            .filter(|&(i, _)| !is_dominant(&candidates, i))
            .map(|(i, c)| DroppedResult {
                candidate_id: c.handle.id.clone(),
                error: c.error,
                disparity: c.disparity,
                dominated_by: dominated_by(&candidates, i).map(|j| candidates[j].handle.id.clone()),
            })
            .collect();

        let mut predictions = vec![(unmitigated_id.to_string(), y_pred)];
        let registered = dominant.try_map(|name, candidate| -> Result<DominantResult> {
            let model_id = match candidate.artifact {
                Some(ref path) => Some(registry.register(name, path)?.to_string()),
                None => None,
            };

            let on_dashboard = match self.candidate_predictions(candidate, &data.test.x, data.feature_names.len()) {
                Some(preds) if preds.len() != data.test.len() => bail!(
                    "sweep model '{}' has {} predictions but the test split has {} rows",
                    candidate.id,
                    preds.len(),
                    data.test.len()
                ),
                Some(preds) => {
                    let key = model_id.clone().unwrap_or_else(|| name.to_string());
                    predictions.push((key, preds));
                    true
                }
                None => {
                    tracing::warn!("Sweep model '{}' has no predictions; left off the dashboard", candidate.id);
                    false
                }
            };

            Ok(DominantResult {
                name: name.to_string(),
                candidate_id: candidate.id.clone(),
                error: candidate.error,
                disparity: candidate.disparity,
                model_id,
                on_dashboard,
            })
        })?;

        // Dashboard upload inside a run scope
        let payload = DashboardPayload::new(
            &self.config.dashboard_name,
            data.test.y.clone(),
            predictions,
            data.test.sensitive.clone(),
        )?;
        let experiment = Experiment::new(workspace, &self.config.experiment)?;
        let dashboard = experiment.with_run(|run| {
            let upload_id = store.upload(run, &payload)?;
            let downloaded = store.download(run.id(), &upload_id)?;
            if downloaded != payload {
                bail!("dashboard {} does not match the uploaded payload", upload_id);
            }
            Ok(DashboardResult {
                run_id: run.id().to_string(),
                upload_id: upload_id.to_string(),
                models: payload.model_ids.clone(),
            })
        })?;

        Ok(PipelineResults {
            config: self.config.clone(),
            workspace: workspace.name().to_string(),
            dataset: dataset_summary,
            unmitigated: UnmitigatedResult {
                model_id: unmitigated_id.to_string(),
                artifact,
                report,
            },
            constraint: sweep.constraint.clone(),
            sweep_size: sweep.len(),
            dominant: registered.into_inner().into_iter().map(|(_, r)| r).collect(),
            dropped,
            dashboard,
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Shipped predictions, else predictions of a logistic-regression artifact
    fn candidate_predictions(&self, candidate: &SweepCandidate, x: &[Vec<f64>], n_features: usize) -> Option<Vec<u8>> {
        if let Some(ref preds) = candidate.predictions {
            return Some(preds.clone());
        }
        let path = candidate.artifact.as_ref()?;
        match LogisticRegression::load(path) {
            Ok(model) if model.weights.len() == n_features => Some(model.predict(x)),
            Ok(model) => {
                tracing::warn!(
                    "Artifact {} expects {} features, data has {}",
                    path.display(),
                    model.weights.len(),
                    n_features
                );
                None
            }
            Err(err) => {
                tracing::warn!("Cannot score artifact {}: {:#}", path.display(), err);
                None
            }
        }
    }

    pub fn save_results(results: &PipelineResults, output_path: &Path) -> Result<()> {
        std::fs::create_dir_all(output_path.parent().unwrap_or(Path::new(".")))?;
        let json = serde_json::to_string_pretty(results)?;
        std::fs::write(output_path, json)
            .with_context(|| format!("Failed to write results: {}", output_path.display()))?;
        tracing::info!("Results saved to {}", output_path.display());
        Ok(())
    }

    pub fn generate_report(results: &PipelineResults) -> String {
        let mut report = String::new();

        report.push_str("# Fairness Mitigation Report\n\n");
        report.push_str(&format!("**Generated:** {}\n\n", results.timestamp.format("%Y-%m-%d %H:%M:%S UTC")));
        report.push_str(&format!("**Version:** {}\n\n", results.version));
        report.push_str(&format!("**Workspace:** {}\n\n", results.workspace));

        report.push_str("## Dataset\n\n");
        report.push_str(&format!("- **ID:** {}\n", results.dataset.id));
        report.push_str(&format!("- **Name:** {}\n", results.dataset.name));
        report.push_str(&format!("- **Total Samples:** {}\n", results.dataset.total_samples));
        report.push_str(&format!(
            "- **Split Sizes:** Train={}, Test={}\n",
            results.dataset.train_samples, results.dataset.test_samples
        ));
        report.push_str(&format!("- **Features:** {}\n", results.dataset.n_features));
        report.push_str(&format!("- **Positive Rate:** {:.4}\n\n", results.dataset.positive_rate));

        report.push_str("## Unmitigated Model\n\n");
        report.push_str(&format!("**Registered as:** {}\n\n", results.unmitigated.model_id));
        report.push_str(&format!("```\n{}\n```\n\n", results.unmitigated.report.format()));

        report.push_str("## Dominant Models\n\n");
        report.push_str(&format!(
            "{} of {} sweep models are dominant under {}.\n\n",
            results.dominant.len(),
            results.sweep_size,
            results.constraint
        ));
        report.push_str("| Name | Candidate | Error | Disparity | Model ID | Dashboard |\n");
        report.push_str("|------|-----------|-------|-----------|----------|-----------|\n");
        for d in &results.dominant {
            report.push_str(&format!(
                "| {} | {} | {:.4} | {:.4} | {} | {} |\n",
                d.name,
                d.candidate_id,
                d.error,
                d.disparity,
                d.model_id.as_deref().unwrap_or("-"),
                if d.on_dashboard { "yes" } else { "-" }
            ));
        }

        if !results.dropped.is_empty() {
            report.push_str("\n### Dropped\n\n");
            report.push_str("| Candidate | Error | Disparity | Dominated By |\n");
            report.push_str("|-----------|-------|-----------|--------------|\n");
            for d in &results.dropped {
                report.push_str(&format!(
                    "| {} | {:.4} | {:.4} | {} |\n",
                    d.candidate_id,
                    d.error,
                    d.disparity,
                    d.dominated_by.as_deref().unwrap_or("-")
                ));
            }
        }

        report.push_str("\n## Dashboard\n\n");
        report.push_str(&format!("- **Run:** {}\n", results.dashboard.run_id));
        report.push_str(&format!("- **Upload ID:** {}\n", results.dashboard.upload_id));
        report.push_str("- **Models:**\n");
        for m in &results.dashboard.models {
            report.push_str(&format!("  - {}\n", m));
        }

        report.push_str("\n## Configuration\n\n");
        report.push_str(&format!(
            "```json\n{}\n```\n",
            serde_json::to_string_pretty(&results.config).unwrap_or_default()
        ));

        report
    }
}

fn preprocessing_steps(config: &PreprocessConfig) -> Vec<String> {
    vec![
        format!("Sensitive features extracted: {}", config.sensitive_features.join(", ")),
        format!("Dropped from model input: {}", config.drop_from_features.join(", ")),
        "Categorical columns one-hot encoded, all columns standard scaled".to_string(),
        format!("Stratified split, test size {} (seed {})", config.test_size, config.seed),
    ]
}

/// Write a card as markdown and JSON under `<output>/model_cards/`
pub fn save_model_card(card: &ModelCard, output_dir: &Path) -> Result<Vec<PathBuf>> {
    let cards_dir = output_dir.join("model_cards");
    std::fs::create_dir_all(&cards_dir)?;

    let stem = card.model_details.name.to_lowercase().replace(' ', "_");
    let md_path = cards_dir.join(format!("{}_model_card.md", stem));
    card.save(&md_path)?;
    let json_path = cards_dir.join(format!("{}_model_card.json", stem));
    card.save_json(&json_path)?;

    tracing::info!("Model card saved: {}", md_path.display());
    Ok(vec![md_path, json_path])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run::RunStatus;

    struct Fixture {
        _dir: tempfile::TempDir,
        workspace: Workspace,
        config: PipelineConfig,
        sweep: SweepResults,
    }

    /// Four grid points: two with artifacts, one with shipped predictions
    /// that is dominated, one with neither
    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::local("test", &dir.path().join("ws")).unwrap();
        let config = PipelineConfig {
            synthetic_size: 300,
            output_dir: dir.path().join("out"),
            model: LogisticRegressionConfig {
                max_iter: 100,
                ..Default::default()
            },
            ..Default::default()
        };

        let dataset = CensusDataset::load_synthetic(config.synthetic_size, config.seed);
        let data = prepare(&dataset, &config.preprocess).unwrap();

        let artifacts_dir = dir.path().join("grid");
        std::fs::create_dir_all(&artifacts_dir).unwrap();
        let mut artifacts = Vec::new();
        for (i, l2) in [0.1, 0.01].iter().enumerate() {
            let mut model = LogisticRegression::new(LogisticRegressionConfig {
                l2: *l2,
                max_iter: 50,
                ..Default::default()
            });
            model.fit(&data.train.x, &data.train.y, None).unwrap();
            let path = artifacts_dir.join(format!("grid_{}.json", i));
            model.save(&path).unwrap();
            artifacts.push(path);
        }

        let sweep = SweepResults::new(vec![
            SweepCandidate {
                id: "grid_0".to_string(),
                error: 0.20,
                disparity: 0.02,
                predictions: None,
                artifact: Some(artifacts[0].clone()),
            },
            SweepCandidate {
                id: "grid_1".to_string(),
                error: 0.18,
                disparity: 0.05,
                predictions: None,
                artifact: Some(artifacts[1].clone()),
            },
            SweepCandidate {
                id: "grid_2".to_string(),
                error: 0.25,
                disparity: 0.05,
                predictions: Some(vec![0; data.test.len()]),
                artifact: None,
            },
            SweepCandidate {
                id: "grid_3".to_string(),
                error: 0.30,
                disparity: 0.01,
                predictions: None,
                artifact: None,
            },
        ]);

        Fixture {
            _dir: dir,
            workspace,
            config,
            sweep,
        }
    }

    #[test]
    fn test_pipeline_end_to_end() {
        let f = fixture();
        let pipeline = FairnessPipeline::new(f.config.clone());
        let results = pipeline.run(&f.workspace, &f.sweep).unwrap();

        assert_eq!(results.unmitigated.model_id, "census_unmitigated:1");
        assert!((0.0..=1.0).contains(&results.unmitigated.report.error_rate));

        let names: Vec<_> = results.dominant.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["census_gs_model_0", "census_gs_model_1", "census_gs_model_3"]);
        assert_eq!(results.dominant[0].model_id.as_deref(), Some("census_gs_model_0:1"));
        assert!(!results.dominant[2].on_dashboard);

        assert_eq!(results.dropped.len(), 1);
        assert_eq!(results.dropped[0].candidate_id, "grid_2");
        assert!(results.dropped[0].dominated_by.is_some());

        assert_eq!(
            results.dashboard.models,
            vec!["census_unmitigated:1", "census_gs_model_0:1", "census_gs_model_1:1"]
        );

        let experiment = Experiment::new(&f.workspace, &f.config.experiment).unwrap();
        assert_eq!(experiment.load_run(&results.dashboard.run_id).unwrap().status, RunStatus::Completed);
        assert!(f.config.output_dir.join("model_cards/census_unmitigated_model_card.md").is_file());
    }

    #[test]
    fn test_rerun_bumps_versions() {
        let f = fixture();
        let pipeline = FairnessPipeline::new(f.config.clone());
        pipeline.run(&f.workspace, &f.sweep).unwrap();
        let second = pipeline.run(&f.workspace, &f.sweep).unwrap();

        assert_eq!(second.unmitigated.model_id, "census_unmitigated:2");
        assert_eq!(second.dominant[1].model_id.as_deref(), Some("census_gs_model_1:2"));
    }

    #[test]
    fn test_prediction_length_mismatch_fails() {
        let mut f = fixture();
        f.sweep.candidates[2].predictions = None;
        f.sweep.candidates[3].predictions = Some(vec![1, 0]);
        let pipeline = FairnessPipeline::new(f.config.clone());

        let err = pipeline.run(&f.workspace, &f.sweep).unwrap_err();
        assert!(format!("{err:#}").contains("test split"));
    }

    #[test]
    fn test_generate_report() {
        let f = fixture();
        let pipeline = FairnessPipeline::new(f.config.clone());
        let results = pipeline.run(&f.workspace, &f.sweep).unwrap();

        let report = FairnessPipeline::generate_report(&results);
        assert!(report.contains("# Fairness Mitigation Report"));
        assert!(report.contains("census_gs_model_1:1"));
        assert!(report.contains("### Dropped"));
        assert!(report.contains(&results.dashboard.upload_id));

        let path = f.config.output_dir.join("results.json");
        FairnessPipeline::save_results(&results, &path).unwrap();
        assert!(path.is_file());
    }

    #[test]
    fn test_config_from_partial_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        std::fs::write(&path, r#"{"model_prefix": "adult", "synthetic_size": 50}"#).unwrap();

        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.unmitigated_name(), "adult_unmitigated");
        assert_eq!(config.name_format().name(2), "adult_gs_model_2");
        assert_eq!(config.experiment, "Test_Fairness_Census_Demo");
    }

    #[test]
    fn test_set_seed_changes_split() {
        let mut a = PipelineConfig { synthetic_size: 200, ..Default::default() };
        let mut b = a.clone();
        a.set_seed(1);
        b.set_seed(2);
        assert_eq!(a.preprocess.seed, 1);

        let dataset = CensusDataset::load_synthetic(a.synthetic_size, 7);
        let split_a = prepare(&dataset, &a.preprocess).unwrap();
        let split_b = prepare(&dataset, &b.preprocess).unwrap();
        assert_ne!(split_a.test.x, split_b.test.x);
    }
}
