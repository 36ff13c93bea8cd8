// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Standalone dominance filter
//!
//! Reads a sweep file and prints which grid points survive, with the
//! candidate that dominates each dropped one.

use anyhow::Result;
use clap::Parser;
use fairsweep_eval::dominance::{dominated_by, is_dominant, select_dominant_with, NameFormat};
use fairsweep_eval::sweep::SweepResults;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "select-dominant")]
#[command(about = "Select Pareto-dominant models from a sweep by error and disparity")]
#[command(version)]
struct Args {
    /// Sweep results (.json or .csv)
    sweep: PathBuf,

    /// Prefix of the synthetic model names
    #[arg(short, long, default_value = "census_gs_model")]
    prefix: String,

    /// Write the retained name -> candidate id mapping as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let sweep = SweepResults::load(&args.sweep)?;
    let candidates = sweep.candidates();
    let dominant = select_dominant_with(&candidates, &NameFormat::new(args.prefix.as_str()));

    println!("\nSweep: {} ({} candidates, {})", args.sweep.display(), sweep.len(), sweep.constraint);
    println!("{:-<78}", "");
    println!("{:<6} {:<20} {:>10} {:>10}  {:<26}", "Index", "Candidate", "Error", "Disparity", "Result");
    println!("{:-<78}", "");

    for (i, c) in candidates.iter().enumerate() {
        let result = if is_dominant(&candidates, i) {
            format!("kept as {}_{}", args.prefix, i)
        } else {
            match dominated_by(&candidates, i) {
                Some(j) => format!("dominated by {}", candidates[j].handle.id),
                None => "dropped".to_string(),
            }
        };
        println!("{:<6} {:<20} {:>10.4} {:>10.4}  {:<26}", i, c.handle.id, c.error, c.disparity, result);
    }
    println!("{:-<78}", "");
    println!("{} of {} candidates are dominant", dominant.len(), sweep.len());

    if let Some(ref path) = args.output {
        let ids = dominant.map(|_, c| c.id.clone());
        let json = serde_json::to_string_pretty(&ids)?;
        std::fs::write(path, json)?;
        println!("\nDominant models saved to: {}", path.display());
    }

    Ok(())
}
