// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Experiment runs with guaranteed completion
//!
//! [`Experiment::start_logging`] hands out a [`RunGuard`]. Whatever path the
//! caller leaves by, the run record ends in a terminal state: an explicit
//! [`RunGuard::complete`] / [`RunGuard::fail`], or the guard's `Drop`, which
//! completes the run, or marks it failed while unwinding from a panic.

use crate::workspace::Workspace;
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// Persisted state of one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub experiment: String,
    pub status: RunStatus,
    pub started: DateTime<Utc>,
    pub finished: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Named group of runs inside a workspace
#[derive(Debug, Clone)]
pub struct Experiment {
    name: String,
    runs_dir: PathBuf,
}

impl Experiment {
    pub fn new(workspace: &Workspace, name: &str) -> Result<Self> {
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || "_-.".contains(c)) {
            bail!("invalid experiment name '{}'", name);
        }
        let runs_dir = workspace.experiments_dir().join(name).join("runs");
        std::fs::create_dir_all(&runs_dir)
            .with_context(|| format!("Failed to create experiment directory: {}", runs_dir.display()))?;
        Ok(Self {
            name: name.to_string(),
            runs_dir,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Start a run; it is completed when the guard goes away
    pub fn start_logging(&self) -> Result<RunGuard> {
        let record = RunRecord {
            id: Uuid::new_v4().to_string(),
            experiment: self.name.clone(),
            status: RunStatus::Running,
            started: Utc::now(),
            finished: None,
            error: None,
        };
        let path = self.runs_dir.join(format!("{}.json", record.id));
        write_record(&path, &record)?;
        tracing::info!("Started run {} in experiment {}", record.id, self.name);

        Ok(RunGuard {
            record,
            path,
            finished: false,
        })
    }

    /// Run `f` inside a run scope; an `Err` marks the run failed and is returned
    pub fn with_run<T>(&self, f: impl FnOnce(&RunGuard) -> Result<T>) -> Result<T> {
        let run = self.start_logging()?;
        match f(&run) {
            Ok(value) => {
                run.complete()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(finish_err) = run.fail(&format!("{err:#}")) {
                    tracing::error!("Failed to record run failure: {:#}", finish_err);
                }
                Err(err)
            }
        }
    }

    pub fn load_run(&self, id: &str) -> Result<RunRecord> {
        let path = self.runs_dir.join(format!("{id}.json"));
        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read run record: {}", path.display()))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse run record: {}", path.display()))
    }
}

/// An active run; completes on every exit path
#[derive(Debug)]
pub struct RunGuard {
    record: RunRecord,
    path: PathBuf,
    finished: bool,
}

impl RunGuard {
    pub fn id(&self) -> &str {
        &self.record.id
    }

    pub fn experiment(&self) -> &str {
        &self.record.experiment
    }

    pub fn complete(mut self) -> Result<()> {
        self.finish(RunStatus::Completed, None)
    }

    pub fn fail(mut self, reason: &str) -> Result<()> {
        self.finish(RunStatus::Failed, Some(reason.to_string()))
    }

    fn finish(&mut self, status: RunStatus, error: Option<String>) -> Result<()> {
        self.record.status = status;
        self.record.finished = Some(Utc::now());
        self.record.error = error;
        write_record(&self.path, &self.record)?;
        self.finished = true;
        tracing::info!("Run {} finished: {:?}", self.record.id, status);
        Ok(())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        let result = if std::thread::panicking() {
            self.finish(RunStatus::Failed, Some("panicked".to_string()))
        } else {
            self.finish(RunStatus::Completed, None)
        };
        if let Err(err) = result {
            tracing::error!("Failed to complete run {}: {:#}", self.record.id, err);
        }
    }
}

fn write_record(path: &Path, record: &RunRecord) -> Result<()> {
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write run record: {}", path.display()))?;
    Ok(())
}
