// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Census dataset download utility
//!
//! Fetches the UCI Adult archive and extracts `adult.data` / `adult.test`.

use anyhow::{bail, Context, Result};
use clap::Parser;
use fairsweep_eval::registry::sha256_file;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const ADULT_URL: &str = "https://archive.ics.uci.edu/static/public/2/adult.zip";

#[derive(Parser, Debug)]
#[command(name = "download-census")]
#[command(about = "Download the UCI Adult census dataset")]
#[command(version)]
struct Args {
    /// Output directory
    #[arg(short, long, default_value = "datasets")]
    output: PathBuf,

    /// Archive URL
    #[arg(long, default_value = ADULT_URL)]
    url: String,

    /// Expected sha256 of the archive
    #[arg(long)]
    sha256: Option<String>,

    /// Force re-download even if files exist
    #[arg(short, long)]
    force: bool,
}

fn download_file(url: &str, output_path: &Path) -> Result<()> {
    tracing::info!("Downloading from: {}", url);

    let mut response = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(600))
        .build()?
        .get(url)
        .send()
        .context("Failed to send request")?;

    if !response.status().is_success() {
        bail!("Download failed with status: {}", response.status());
    }

    let total_size = response.content_length().unwrap_or(0);

    let pb = ProgressBar::new(total_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );

    let mut file = File::create(output_path).context("Failed to create output file")?;
    let mut buffer = [0u8; 8192];
    loop {
        let n = response.read(&mut buffer).context("Failed to read response")?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
        pb.inc(n as u64);
    }

    pb.finish_with_message("Downloaded");
    Ok(())
}

fn extract_zip(archive_path: &Path, output_dir: &Path) -> Result<Vec<PathBuf>> {
    tracing::info!("Extracting ZIP archive...");

    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let pb = ProgressBar::new(archive.len() as u64);
    pb.set_style(ProgressStyle::default_bar().template("{spinner:.green} Extracting: [{wide_bar:.cyan/blue}] {pos}/{len}")?);

    let mut extracted = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        let Some(relative) = file.enclosed_name() else {
            tracing::warn!("Skipping unsafe archive entry: {}", file.name());
            continue;
        };
        let outpath = output_dir.join(relative);

        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
        } else {
            if let Some(parent) = outpath.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&outpath)?;
            std::io::copy(&mut file, &mut outfile)?;
            extracted.push(outpath);
        }

        pb.inc(1);
    }

    pb.finish_with_message("Extracted");
    Ok(extracted)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let dataset_dir = args.output.join("adult");
    let archive_path = args.output.join("adult.zip");

    if dataset_dir.join("adult.data").is_file() && !args.force {
        tracing::info!("Dataset already present: {}", dataset_dir.display());
        tracing::info!("Use --force to re-download");
        return Ok(());
    }

    std::fs::create_dir_all(&dataset_dir)?;

    if !archive_path.exists() || args.force {
        download_file(&args.url, &archive_path)?;
    } else {
        tracing::info!("Archive already exists: {}", archive_path.display());
    }

    let actual = sha256_file(&archive_path)?;
    match args.sha256 {
        Some(ref expected) if !expected.eq_ignore_ascii_case(&actual) => {
            bail!("Checksum mismatch for {}: expected {}, got {}", archive_path.display(), expected, actual);
        }
        Some(_) => tracing::info!("Checksum verified: {}", actual),
        None => tracing::info!("Archive sha256: {}", actual),
    }

    let files = extract_zip(&archive_path, &dataset_dir)?;

    println!("\n{}", "=".repeat(60));
    println!("Census Dataset Ready");
    println!("{}", "=".repeat(60));
    for path in &files {
        println!("  - {}", path.display());
    }
    println!("\nRun the pipeline with: fairsweep --sweep <sweep.json> --dataset {}", dataset_dir.join("adult.data").display());

    Ok(())
}
