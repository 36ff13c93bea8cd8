// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Model cards for registered census models
//!
//! Follows the Model Card framework (Mitchell et al., 2019) with a fairness
//! section carrying the constraint, the sensitive features and the disparity
//! measured for the model, when one is known.

use crate::metrics::ClassificationReport;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelCard {
    pub model_details: ModelDetails,
    pub intended_use: IntendedUse,
    pub performance: PerformanceMetrics,
    pub fairness: FairnessSection,
    pub data: DataSection,
    pub caveats: Vec<String>,
    pub card_metadata: CardMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDetails {
    pub name: String,
    /// Registry id (`<name>:<version>`) once registered
    pub registry_id: Option<String>,
    pub model_type: String,
    pub description: String,
    pub license: String,
    pub date: DateTime<Utc>,
    pub framework: String,
}

impl Default for ModelDetails {
    fn default() -> Self {
        Self {
            name: "Unnamed Model".to_string(),
            registry_id: None,
            model_type: "Unknown".to_string(),
            description: String::new(),
            license: "AGPL-3.0-or-later".to_string(),
            date: Utc::now(),
            framework: "Rust".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntendedUse {
    pub primary_uses: Vec<String>,
    pub out_of_scope_uses: Vec<String>,
}

impl Default for IntendedUse {
    fn default() -> Self {
        Self {
            primary_uses: vec![
                "Demonstrating fairness mitigation on census income prediction".to_string(),
                "Comparing error/disparity trade-offs between model variants".to_string(),
            ],
            out_of_scope_uses: vec![
                "Credit, hiring or housing decisions about real individuals".to_string(),
                "Any use where income predictions affect a person without review".to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub error_rate: f64,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub auc_roc: Option<f64>,
    pub support: usize,
}

impl From<&ClassificationReport> for PerformanceMetrics {
    fn from(report: &ClassificationReport) -> Self {
        Self {
            error_rate: report.error_rate,
            accuracy: report.accuracy,
            precision: report.precision,
            recall: report.recall,
            f1_score: report.f1_score,
            auc_roc: report.auc_roc,
            support: report.support,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FairnessSection {
    pub constraint: String,
    pub sensitive_features: Vec<String>,
    /// Disparity under `constraint`, when measured
    pub disparity: Option<f64>,
    /// Mitigation applied; `None` for an unmitigated model
    pub mitigation: Option<String>,
    pub notes: Vec<String>,
}

impl Default for FairnessSection {
    fn default() -> Self {
        Self {
            constraint: "demographic parity".to_string(),
            sensitive_features: vec!["sex".to_string(), "race".to_string()],
            disparity: None,
            mitigation: None,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataSection {
    pub dataset: String,
    pub training_size: Option<usize>,
    pub evaluation_size: Option<usize>,
    pub preprocessing: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardMetadata {
    pub schema_version: String,
    pub created: DateTime<Utc>,
}

impl Default for CardMetadata {
    fn default() -> Self {
        Self {
            schema_version: "1.0.0".to_string(),
            created: Utc::now(),
        }
    }
}

fn default_caveats() -> Vec<String> {
    vec![
        "Census labels reflect historical income disparities".to_string(),
        "Dropping a sensitive column does not remove its proxies".to_string(),
    ]
}

impl ModelCard {
    pub fn new(name: &str, model_type: &str) -> Self {
        Self {
            model_details: ModelDetails {
                name: name.to_string(),
                model_type: model_type.to_string(),
                ..Default::default()
            },
            intended_use: IntendedUse::default(),
            performance: PerformanceMetrics::default(),
            fairness: FairnessSection::default(),
            data: DataSection::default(),
            caveats: default_caveats(),
            card_metadata: CardMetadata::default(),
        }
    }

    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!("# Model Card: {}\n\n", self.model_details.name));

        md.push_str("## Model Details\n\n");
        if let Some(ref id) = self.model_details.registry_id {
            md.push_str(&format!("- **Registry ID:** {}\n", id));
        }
        md.push_str(&format!("- **Type:** {}\n", self.model_details.model_type));
        md.push_str(&format!("- **Framework:** {}\n", self.model_details.framework));
        md.push_str(&format!("- **License:** {}\n", self.model_details.license));
        md.push_str(&format!("- **Date:** {}\n", self.model_details.date.format("%Y-%m-%d")));
        if !self.model_details.description.is_empty() {
            md.push_str(&format!("\n{}\n", self.model_details.description));
        }
        md.push('\n');

        md.push_str("## Intended Use\n\n");
        for use_case in &self.intended_use.primary_uses {
            md.push_str(&format!("- {}\n", use_case));
        }
        md.push_str("\n**Out of scope:**\n\n");
        for oos in &self.intended_use.out_of_scope_uses {
            md.push_str(&format!("- {}\n", oos));
        }
        md.push('\n');

        md.push_str("## Performance\n\n");
        md.push_str("| Metric | Value |\n");
        md.push_str("|--------|-------|\n");
        md.push_str(&format!("| Error Rate | {:.4} |\n", self.performance.error_rate));
        md.push_str(&format!("| Accuracy | {:.4} |\n", self.performance.accuracy));
        md.push_str(&format!("| Precision | {:.4} |\n", self.performance.precision));
        md.push_str(&format!("| Recall | {:.4} |\n", self.performance.recall));
        md.push_str(&format!("| F1 Score | {:.4} |\n", self.performance.f1_score));
        if let Some(auc) = self.performance.auc_roc {
            md.push_str(&format!("| AUC-ROC | {:.4} |\n", auc));
        }
        md.push_str(&format!("| Support | {} |\n", self.performance.support));
        md.push('\n');

        md.push_str("## Fairness\n\n");
        md.push_str(&format!("- **Constraint:** {}\n", self.fairness.constraint));
        md.push_str(&format!(
            "- **Sensitive features:** {}\n",
            self.fairness.sensitive_features.join(", ")
        ));
        match self.fairness.disparity {
            Some(d) => md.push_str(&format!("- **Disparity:** {:.4}\n", d)),
            None => md.push_str("- **Disparity:** not measured\n"),
        }
        md.push_str(&format!(
            "- **Mitigation:** {}\n",
            self.fairness.mitigation.as_deref().unwrap_or("none (unmitigated)")
        ));
        for note in &self.fairness.notes {
            md.push_str(&format!("\n{}\n", note));
        }
        md.push('\n');

        md.push_str("## Data\n\n");
        if !self.data.dataset.is_empty() {
            md.push_str(&format!("- **Dataset:** {}\n", self.data.dataset));
        }
        if let Some(n) = self.data.training_size {
            md.push_str(&format!("- **Training rows:** {}\n", n));
        }
        if let Some(n) = self.data.evaluation_size {
            md.push_str(&format!("- **Evaluation rows:** {}\n", n));
        }
        for step in &self.data.preprocessing {
            md.push_str(&format!("- {}\n", step));
        }
        md.push('\n');

        md.push_str("## Caveats\n\n");
        for caveat in &self.caveats {
            md.push_str(&format!("- {}\n", caveat));
        }
        md.push('\n');

        md.push_str("---\n\n");
        md.push_str(&format!(
            "*Model Card generated on {} (schema v{})*\n",
            self.card_metadata.created.format("%Y-%m-%d"),
            self.card_metadata.schema_version
        ));

        md
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        std::fs::write(path, self.to_markdown())
            .with_context(|| format!("Failed to write model card: {}", path.display()))?;
        Ok(())
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write model card: {}", path.display()))?;
        Ok(())
    }
}

/// Builder for creating model cards
pub struct ModelCardBuilder {
    card: ModelCard,
}

impl ModelCardBuilder {
    pub fn new(name: &str, model_type: &str) -> Self {
        Self {
            card: ModelCard::new(name, model_type),
        }
    }

    pub fn description(mut self, desc: &str) -> Self {
        self.card.model_details.description = desc.to_string();
        self
    }

    pub fn registry_id(mut self, id: &str) -> Self {
        self.card.model_details.registry_id = Some(id.to_string());
        self
    }

    pub fn performance(mut self, report: &ClassificationReport) -> Self {
        self.card.performance = PerformanceMetrics::from(report);
        self
    }

    pub fn constraint(mut self, constraint: &str) -> Self {
        self.card.fairness.constraint = constraint.to_string();
        self
    }

    pub fn sensitive_features(mut self, features: Vec<String>) -> Self {
        self.card.fairness.sensitive_features = features;
        self
    }

    pub fn disparity(mut self, disparity: f64) -> Self {
        self.card.fairness.disparity = Some(disparity);
        self
    }

    pub fn mitigation(mut self, method: &str) -> Self {
        self.card.fairness.mitigation = Some(method.to_string());
        self
    }

    pub fn dataset(mut self, name: &str) -> Self {
        self.card.data.dataset = name.to_string();
        self
    }

    pub fn split_sizes(mut self, train: usize, test: usize) -> Self {
        self.card.data.training_size = Some(train);
        self.card.data.evaluation_size = Some(test);
        self
    }

    pub fn preprocessing(mut self, steps: Vec<String>) -> Self {
        self.card.data.preprocessing = steps;
        self
    }

    pub fn add_caveat(mut self, caveat: &str) -> Self {
        self.card.caveats.push(caveat.to_string());
        self
    }

    pub fn build(self) -> ModelCard {
        self.card
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_card_builder() {
        let card = ModelCardBuilder::new("census_unmitigated", "LogisticRegression")
            .description("Unmitigated baseline")
            .registry_id("census_unmitigated:1")
            .dataset("UCI Adult")
            .split_sizes(800, 200)
            .add_caveat("Synthetic test data")
            .build();

        assert_eq!(card.model_details.name, "census_unmitigated");
        assert_eq!(card.model_details.registry_id.as_deref(), Some("census_unmitigated:1"));
        assert_eq!(card.data.training_size, Some(800));
        assert_eq!(card.caveats.len(), 3);
    }

    #[test]
    fn test_markdown_unmitigated() {
        let card = ModelCard::new("census_unmitigated", "LogisticRegression");
        let md = card.to_markdown();

        assert!(md.contains("# Model Card: census_unmitigated"));
        assert!(md.contains("## Fairness"));
        assert!(md.contains("demographic parity"));
        assert!(md.contains("not measured"));
        assert!(md.contains("none (unmitigated)"));
    }

    #[test]
    fn test_markdown_mitigated() {
        let card = ModelCardBuilder::new("census_gs_model_3", "LogisticRegression")
            .disparity(0.0412)
            .mitigation("grid search (demographic parity)")
            .build();
        let md = card.to_markdown();

        assert!(md.contains("**Disparity:** 0.0412"));
        assert!(md.contains("grid search (demographic parity)"));
    }

    #[test]
    fn test_performance_from_report() {
        let report = ClassificationReport::from_predictions(&[1, 0, 1, 1], &[1, 0, 0, 1]);
        let perf = PerformanceMetrics::from(&report);

        assert_eq!(perf.accuracy, 0.75);
        assert_eq!(perf.error_rate, 0.25);
        assert_eq!(perf.support, 4);
    }

    #[test]
    fn test_save_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("card.json");
        ModelCard::new("m", "Majority").save_json(&path).unwrap();

        let loaded: ModelCard = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.model_details.name, "m");
    }
}
