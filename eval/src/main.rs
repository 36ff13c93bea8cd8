// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Fairness mitigation pipeline CLI
//!
//! Usage:
//!   fairsweep --workspace config.json --sweep sweep.json
//!   fairsweep --workspace config.json --sweep sweep.csv --dataset ./datasets/adult/adult.data

use anyhow::Result;
use clap::{Parser, ValueEnum};
use fairsweep_eval::pipeline::{FairnessPipeline, PipelineConfig};
use fairsweep_eval::sweep::SweepResults;
use fairsweep_eval::workspace::Workspace;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fairsweep")]
#[command(about = "Select dominant fairness-mitigated models, register them and upload a dashboard")]
#[command(version)]
struct Args {
    /// Workspace config.json
    #[arg(short, long, default_value = "config.json")]
    workspace: PathBuf,

    /// Sweep results (.json or .csv)
    #[arg(short, long)]
    sweep: PathBuf,

    /// Pipeline config JSON; defaults apply to anything it leaves out
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Adult CSV file; synthetic data is used when omitted
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Seed for synthetic data and the train/test split
    #[arg(long)]
    seed: Option<u64>,

    /// Experiment name for the dashboard run
    #[arg(short, long)]
    experiment: Option<String>,

    /// Output directory for artifacts, model cards and reports
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Both)]
    format: OutputFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Markdown,
    Both,
}

impl OutputFormat {
    fn json(self) -> bool {
        matches!(self, Self::Json | Self::Both)
    }

    fn markdown(self) -> bool {
        matches!(self, Self::Markdown | Self::Both)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match args.config {
        Some(ref path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    };
    if args.dataset.is_some() {
        config.dataset_path = args.dataset;
    }
    if let Some(seed) = args.seed {
        config.set_seed(seed);
    }
    if let Some(experiment) = args.experiment {
        config.experiment = experiment;
    }
    if let Some(output) = args.output {
        config.output_dir = output;
    }

    tracing::info!("Fairness Mitigation Pipeline");
    tracing::info!("============================");
    tracing::info!("Sweep: {}", args.sweep.display());
    tracing::info!("Experiment: {}", config.experiment);

    let workspace = Workspace::from_config_file(&args.workspace)?;
    let sweep = SweepResults::load(&args.sweep)?;

    let pipeline = FairnessPipeline::new(config);
    let results = pipeline.run(&workspace, &sweep)?;

    println!("\n{}", "=".repeat(70));
    println!("FAIRNESS MITIGATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!(
        "\nUnmitigated: {} (error rate {:.4})",
        results.unmitigated.model_id, results.unmitigated.report.error_rate
    );
    println!(
        "\nDominant models ({} of {}, {}):",
        results.dominant.len(),
        results.sweep_size,
        results.constraint
    );
    println!("{:-<70}", "");
    println!("{:<22} {:>10} {:>10} {:<24}", "Name", "Error", "Disparity", "Model ID");
    println!("{:-<70}", "");
    for d in &results.dominant {
        println!(
            "{:<22} {:>10.4} {:>10.4} {:<24}",
            d.name,
            d.error,
            d.disparity,
            d.model_id.as_deref().unwrap_or("-")
        );
    }
    println!("{:-<70}", "");
    println!("\nDashboard upload: {} (run {})", results.dashboard.upload_id, results.dashboard.run_id);

    let output_dir = &pipeline.config().output_dir;
    std::fs::create_dir_all(output_dir)?;
    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");

    if args.format.json() {
        let json_path = output_dir.join(format!("fairsweep_{}.json", timestamp));
        FairnessPipeline::save_results(&results, &json_path)?;
        println!("\nJSON results saved to: {}", json_path.display());
    }

    if args.format.markdown() {
        let report = FairnessPipeline::generate_report(&results);
        let md_path = output_dir.join(format!("fairsweep_{}.md", timestamp));
        std::fs::write(&md_path, report)?;
        println!("Markdown report saved to: {}", md_path.display());
    }

    println!("\nPipeline complete!");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rejects_unknown_value() {
        assert!(Args::try_parse_from(["fairsweep", "--sweep", "s.json", "--format", "md"]).is_err());
    }

    #[test]
    fn test_format_parses() {
        let args = Args::try_parse_from(["fairsweep", "--sweep", "s.json"]).unwrap();
        assert_eq!(args.format, OutputFormat::Both);

        let args = Args::try_parse_from(["fairsweep", "--sweep", "s.json", "--format", "markdown"]).unwrap();
        assert!(args.format.markdown());
        assert!(!args.format.json());
    }
}
