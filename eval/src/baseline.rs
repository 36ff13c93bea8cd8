// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone baseline model runner
//!
//! Trains the unmitigated baselines on census data and prints their test-set
//! performance. With `--register`, the logistic regression is saved and
//! registered in the workspace.

use anyhow::Result;
use clap::Parser;
use fairsweep_eval::baselines::{all_baselines, Classifier, LogisticRegression, LogisticRegressionConfig};
use fairsweep_eval::datasets::CensusDataset;
use fairsweep_eval::metrics::ClassificationReport;
use fairsweep_eval::preprocess::{prepare, PreprocessConfig};
use fairsweep_eval::registry::{validate_name, LocalRegistry, ModelRegistry};
use fairsweep_eval::workspace::Workspace;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "run-baseline")]
#[command(about = "Train and evaluate unmitigated baselines")]
#[command(version)]
struct Args {
    /// Baseline model to run (LogisticRegression, Majority)
    #[arg(short, long)]
    model: Option<String>,

    /// Adult CSV file; synthetic data is used when omitted
    #[arg(short, long)]
    path: Option<PathBuf>,

    /// Random seed
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Number of samples for synthetic dataset
    #[arg(short, long, default_value_t = 1000)]
    num_samples: usize,

    /// Register the logistic regression in the workspace from this config.json
    #[arg(long)]
    register: Option<PathBuf>,

    /// Registered model name
    #[arg(long, default_value = "census_unmitigated")]
    name: String,

    /// List available baselines
    #[arg(long)]
    list: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    if args.list {
        println!("Available baseline models:");
        println!("--------------------------");
        for baseline in all_baselines() {
            println!("  {}: {}", baseline.name(), baseline.description());
        }
        return Ok(());
    }

    let dataset = match args.path {
        Some(ref path) => CensusDataset::load_csv(path)?,
        None => {
            tracing::info!("Generating synthetic dataset ({} samples, seed={})", args.num_samples, args.seed);
            CensusDataset::load_synthetic(args.num_samples, args.seed)
        }
    };

    let config = PreprocessConfig {
        seed: args.seed,
        ..Default::default()
    };
    let data = prepare(&dataset, &config)?;

    println!("\nDataset: {}", dataset.info.name);
    println!("  Train samples: {}", data.train.len());
    println!("  Test samples: {}", data.test.len());
    println!("  Features: {}", data.feature_names.len());

    let dist = dataset.label_distribution();
    for (label, name) in [(true, ">50K"), (false, "<=50K")] {
        let count = dist.get(&label).copied().unwrap_or(0);
        println!("  {}: {} ({:.1}%)", name, count, count as f64 / dataset.len() as f64 * 100.0);
    }

    let filter_model = args.model.as_deref();

    println!("\n{}", "=".repeat(70));
    println!("BASELINE EVALUATION");
    println!("{}", "=".repeat(70));

    for mut baseline in all_baselines() {
        if let Some(filter) = filter_model {
            if !baseline.name().eq_ignore_ascii_case(filter) {
                continue;
            }
        }

        println!("\n## {} ##", baseline.name());
        println!("{}", baseline.description());
        println!("{}", "-".repeat(50));

        baseline.fit(&data.train.x, &data.train.y, None)?;

        let predictions = baseline.predict(&data.test.x);
        let probabilities = baseline.predict_proba(&data.test.x);
        let report = ClassificationReport::from_scores(&predictions, &data.test.y, &probabilities);

        println!("{}", report.format());
    }

    if let Some(ref config_path) = args.register {
        validate_name(&args.name)?;
        let workspace = Workspace::from_config_file(config_path)?;
        let mut model = LogisticRegression::new(LogisticRegressionConfig::default());
        model.fit(&data.train.x, &data.train.y, None)?;

        // Removed with the directory on every exit path
        let scratch = tempfile::tempdir()?;
        let artifact = scratch.path().join(format!("{}.json", args.name));
        model.save(&artifact)?;
        let id = LocalRegistry::new(&workspace).register(&args.name, &artifact)?;

        println!("\nRegistered {} in workspace {}", id, workspace.name());
    }

    println!("\n{}", "=".repeat(70));
    println!("Evaluation complete!");

    Ok(())
}
