// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Fairness mitigation sweep evaluation
//!
//! This crate provides:
//! - Pareto-dominance selection over (error, disparity) sweep results
//! - Sweep result loading (JSON, CSV) with validation
//! - Census dataset loading, synthetic generation and preprocessing
//! - Unmitigated baselines and classification metrics
//! - Model cards with a fairness section
//! - A workspace context with experiment runs, a model registry and a
//!   dashboard store
//! - The end-to-end pipeline tying these together

pub mod baselines;
pub mod dashboard;
pub mod datasets;
pub mod dominance;
pub mod metrics;
pub mod model_card;
pub mod pipeline;
pub mod preprocess;
pub mod registry;
pub mod run;
pub mod sweep;
pub mod workspace;

pub use baselines::{Classifier, LogisticRegression, LogisticRegressionConfig, MajorityBaseline};
pub use dashboard::{DashboardPayload, DashboardStore, LocalDashboardStore, UploadId};
pub use datasets::{CensusDataset, CensusRecord, FeatureValue};
pub use dominance::{select_dominant, select_dominant_with, Candidate, DominantModels, NameFormat};
pub use metrics::{ClassificationReport, ConfusionMatrix};
pub use model_card::{ModelCard, ModelCardBuilder};
pub use pipeline::{FairnessPipeline, PipelineConfig, PipelineResults};
pub use preprocess::{PreparedData, PreprocessConfig};
pub use registry::{LocalRegistry, ModelId, ModelRegistry};
pub use run::{Experiment, RunGuard, RunStatus};
pub use sweep::{SweepCandidate, SweepResults};
pub use workspace::{Workspace, WorkspaceConfig};
