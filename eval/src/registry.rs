// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Versioned model registry
//!
//! Registering an artifact under a name yields a [`ModelId`] of the form
//! `<name>:<version>`. Versions start at 1 and grow by one per name.

use crate::workspace::Workspace;
use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Registered model identifier, displayed as `<name>:<version>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModelId {
    pub name: String,
    pub version: u32,
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.version)
    }
}

impl FromStr for ModelId {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (name, version) = s
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("model id '{}' is not of the form <name>:<version>", s))?;
        validate_name(name)?;
        let version: u32 = version
            .parse()
            .with_context(|| format!("model id '{}' has a non-numeric version", s))?;
        if version == 0 {
            bail!("model id '{}' has version 0", s);
        }
        Ok(Self {
            name: name.to_string(),
            version,
        })
    }
}

/// Stored metadata of one registered version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: ModelId,
    pub artifact: PathBuf,
    pub sha256: String,
    pub size_bytes: u64,
    pub registered: DateTime<Utc>,
}

pub trait ModelRegistry {
    /// Store `artifact` as the next version of `name`
    fn register(&self, name: &str, artifact: &Path) -> Result<ModelId>;

    fn get(&self, id: &ModelId) -> Result<ModelEntry>;

    /// All versions of `name`, oldest first
    fn list(&self, name: &str) -> Result<Vec<ModelEntry>>;
}

/// Model names become directory names, so only a safe character set is accepted
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || "_-.".contains(c)) {
        bail!("invalid model name '{}': use letters, digits, '_', '-' or '.'", name);
    }
    if name == "." || name == ".." {
        bail!("invalid model name '{}'", name);
    }
    Ok(())
}

/// Registry kept under `<workspace>/models/<name>/<version>/`
#[derive(Debug, Clone)]
pub struct LocalRegistry {
    root: PathBuf,
}

impl LocalRegistry {
    pub fn new(workspace: &Workspace) -> Self {
        Self {
            root: workspace.models_dir(),
        }
    }

    fn versions(&self, name: &str) -> Result<Vec<u32>> {
        let dir = self.root.join(name);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut versions: Vec<u32> = std::fs::read_dir(&dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join("entry.json").is_file())
            .filter_map(|entry| entry.file_name().to_str().and_then(|s| s.parse().ok()))
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }
}

impl ModelRegistry for LocalRegistry {
    fn register(&self, name: &str, artifact: &Path) -> Result<ModelId> {
        validate_name(name)?;
        if !artifact.is_file() {
            bail!("model artifact not found: {}", artifact.display());
        }

        let version = self.versions(name)?.last().copied().unwrap_or(0) + 1;
        let id = ModelId {
            name: name.to_string(),
            version,
        };

        let dir = self.root.join(name).join(version.to_string());
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;

        // Kept apart from entry.json so an artifact of any file name survives
        let artifact_dir = dir.join("artifact");
        std::fs::create_dir_all(&artifact_dir)
            .with_context(|| format!("Failed to create {}", artifact_dir.display()))?;
        let file_name = artifact.file_name().map_or_else(|| "model".into(), |n| n.to_os_string());
        let stored = artifact_dir.join(file_name);
        let size_bytes = std::fs::copy(artifact, &stored)
            .with_context(|| format!("Failed to copy artifact {}", artifact.display()))?;

        let entry = ModelEntry {
            id: id.clone(),
            artifact: stored.clone(),
            sha256: sha256_file(&stored)?,
            size_bytes,
            registered: Utc::now(),
        };
        let json = serde_json::to_string_pretty(&entry)?;
        std::fs::write(dir.join("entry.json"), json)?;

        tracing::info!("Registered model {} ({} bytes)", id, size_bytes);
        Ok(id)
    }

    fn get(&self, id: &ModelId) -> Result<ModelEntry> {
        let path = self.root.join(&id.name).join(id.version.to_string()).join("entry.json");
        let json = std::fs::read_to_string(&path).with_context(|| format!("Model {} is not registered", id))?;
        serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn list(&self, name: &str) -> Result<Vec<ModelEntry>> {
        validate_name(name)?;
        self.versions(name)?
            .into_iter()
            .map(|version| {
                self.get(&ModelId {
                    name: name.to_string(),
                    version,
                })
            })
            .collect()
    }
}

/// Hex sha256 of a file's contents
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (tempfile::TempDir, LocalRegistry, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::local("test", &dir.path().join("ws")).unwrap();
        let artifact = dir.path().join("census_unmitigated.json");
        std::fs::write(&artifact, b"{\"weights\": [0.5]}").unwrap();
        (dir, LocalRegistry::new(&ws), artifact)
    }

    #[test]
    fn test_versions_increment() {
        let (_dir, registry, artifact) = registry();

        let first = registry.register("census_unmitigated", &artifact).unwrap();
        let second = registry.register("census_unmitigated", &artifact).unwrap();
        let other = registry.register("census_gs_model_3", &artifact).unwrap();

        assert_eq!(first.to_string(), "census_unmitigated:1");
        assert_eq!(second.to_string(), "census_unmitigated:2");
        assert_eq!(other.to_string(), "census_gs_model_3:1");
        assert_eq!(registry.list("census_unmitigated").unwrap().len(), 2);
    }

    #[test]
    fn test_entry_records_checksum() {
        let (_dir, registry, artifact) = registry();
        let id = registry.register("m", &artifact).unwrap();
        let entry = registry.get(&id).unwrap();

        assert_eq!(entry.sha256, sha256_file(&artifact).unwrap());
        assert_eq!(entry.size_bytes, std::fs::metadata(&artifact).unwrap().len());
        assert!(entry.artifact.is_file());
    }

    #[test]
    fn test_register_rejects_bad_input() {
        let (dir, registry, artifact) = registry();

        assert!(registry.register("bad name", &artifact).is_err());
        assert!(registry.register("..", &artifact).is_err());
        assert!(registry.register("m", &dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_artifact_named_entry_json_survives() {
        let (dir, registry, _artifact) = registry();
        let artifact = dir.path().join("entry.json");
        std::fs::write(&artifact, b"{\"weights\": [1.5, -2.0]}").unwrap();

        let id = registry.register("m", &artifact).unwrap();
        let entry = registry.get(&id).unwrap();

        assert_eq!(entry.sha256, sha256_file(&entry.artifact).unwrap());
        assert_eq!(std::fs::read(&entry.artifact).unwrap(), std::fs::read(&artifact).unwrap());
        assert_eq!(registry.list("m").unwrap().len(), 1);
    }

    #[test]
    fn test_validate_name_rejects_paths() {
        assert!(validate_name("../x").is_err());
        assert!(validate_name("a/b").is_err());
        assert!(validate_name("").is_err());
        assert!(validate_name("census_unmitigated").is_ok());
    }

    #[test]
    fn test_model_id_parse() {
        let id: ModelId = "census_gs_model_12:4".parse().unwrap();
        assert_eq!(id, ModelId { name: "census_gs_model_12".to_string(), version: 4 });

        assert!("no_version".parse::<ModelId>().is_err());
        assert!("m:zero".parse::<ModelId>().is_err());
        assert!("m:0".parse::<ModelId>().is_err());
    }

    #[test]
    fn test_get_unknown_version() {
        let (_dir, registry, _artifact) = registry();
        let id = ModelId { name: "m".to_string(), version: 9 };
        assert!(registry.get(&id).is_err());
    }
}
