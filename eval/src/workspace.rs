// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! ML workspace context
//!
//! A [`Workspace`] is built once from a `config.json` and passed by reference
//! to everything that talks to the workspace (registry, runs, dashboards).
//! Storage lives under the workspace root directory.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of a workspace `config.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceConfig {
    pub subscription_id: String,
    pub resource_group: String,
    pub workspace_name: String,
    /// Storage root; defaults to `.fairsweep/<workspace_name>` next to the config
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
}

impl WorkspaceConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read workspace config: {}", path.display()))?;
        let mut config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse workspace config: {}", path.display()))?;
        config.validate()?;

        if config.root.is_none() {
            let base = path.parent().unwrap_or(Path::new("."));
            config.root = Some(base.join(".fairsweep").join(&config.workspace_name));
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("subscription_id", &self.subscription_id),
            ("resource_group", &self.resource_group),
            ("workspace_name", &self.workspace_name),
        ] {
            if value.trim().is_empty() {
                bail!("workspace config field '{}' is empty", field);
            }
        }
        if self.workspace_name.contains(['/', '\\']) {
            bail!("workspace name '{}' must not contain path separators", self.workspace_name);
        }
        Ok(())
    }
}

/// Handle to an opened workspace
#[derive(Debug, Clone)]
pub struct Workspace {
    config: WorkspaceConfig,
    root: PathBuf,
}

impl Workspace {
    /// Open a workspace, creating its storage root
    pub fn open(config: WorkspaceConfig) -> Result<Self> {
        config.validate()?;
        let root = config
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(".fairsweep").join(&config.workspace_name));
        std::fs::create_dir_all(&root)
            .with_context(|| format!("Failed to create workspace root: {}", root.display()))?;

        tracing::info!(
            "Workspace {} (resource group {}) at {}",
            config.workspace_name,
            config.resource_group,
            root.display()
        );

        Ok(Self { config, root })
    }

    pub fn from_config_file(path: &Path) -> Result<Self> {
        Self::open(WorkspaceConfig::from_file(path)?)
    }

    /// Workspace rooted at `root` with placeholder account fields
    pub fn local(name: &str, root: &Path) -> Result<Self> {
        Self::open(WorkspaceConfig {
            subscription_id: "local".to_string(),
            resource_group: "local".to_string(),
            workspace_name: name.to_string(),
            root: Some(root.to_path_buf()),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.workspace_name
    }

    pub fn config(&self) -> &WorkspaceConfig {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn experiments_dir(&self) -> PathBuf {
        self.root.join("experiments")
    }

    pub fn dashboards_dir(&self) -> PathBuf {
        self.root.join("dashboards")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults_root_next_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"subscription_id": "sub", "resource_group": "rg", "workspace_name": "census"}"#,
        )
        .unwrap();

        let config = WorkspaceConfig::from_file(&path).unwrap();
        assert_eq!(config.root, Some(dir.path().join(".fairsweep").join("census")));

        let ws = Workspace::open(config).unwrap();
        assert!(ws.root().is_dir());
        assert_eq!(ws.name(), "census");
    }

    #[test]
    fn test_config_rejects_empty_fields() {
        let config = WorkspaceConfig {
            subscription_id: "sub".to_string(),
            resource_group: " ".to_string(),
            workspace_name: "ws".to_string(),
            root: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_separator_in_name() {
        let config = WorkspaceConfig {
            subscription_id: "sub".to_string(),
            resource_group: "rg".to_string(),
            workspace_name: "../escape".to_string(),
            root: None,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_local_workspace_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::local("test", dir.path()).unwrap();

        assert_eq!(ws.models_dir(), dir.path().join("models"));
        assert_eq!(ws.dashboards_dir(), dir.path().join("dashboards"));
    }
}
