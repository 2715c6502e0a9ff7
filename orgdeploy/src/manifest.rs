//! Build manifest: one record per completed stage.
//!
//! The manifest is the auditable form of the image layer state. It is
//! rewritten after every stage via a temp file in the target directory and
//! an atomic rename, so readers see either the previous or the new version.

use crate::context::Identity;
use chrono::{DateTime, Utc};
use orgdeploy_shared::errors::{DeployError, DeployResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

/// State left behind by one stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerRecord {
    pub stage: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Identity the stage ran as.
    pub identity: Identity,
    /// Postcondition the stage established.
    pub summary: String,
    /// Machine-readable outputs (e.g. `location` for assets).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildManifest {
    pub layers: Vec<LayerRecord>,
}

impl BuildManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: LayerRecord) {
        self.layers.push(record);
    }

    pub fn layer(&self, stage: &str) -> Option<&LayerRecord> {
        self.layers.iter().find(|l| l.stage == stage)
    }

    /// Output `key` of `stage`, if recorded.
    pub fn output(&self, stage: &str, key: &str) -> Option<&str> {
        self.layer(stage)
            .and_then(|l| l.outputs.get(key))
            .map(String::as_str)
    }

    pub fn stages(&self) -> Vec<&str> {
        self.layers.iter().map(|l| l.stage.as_str()).collect()
    }

    pub fn load(path: &Path) -> DeployResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Storage(format!("failed to read manifest {}: {}", path.display(), e))
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Write atomically next to `path`.
    pub fn persist(&self, path: &Path) -> DeployResult<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent).map_err(|e| {
            DeployError::Storage(format!(
                "failed to create manifest directory {}: {}",
                parent.display(),
                e
            ))
        })?;

        let json = serde_json::to_vec_pretty(self)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| {
            DeployError::Storage(format!("failed to create temp file in {}: {}", parent.display(), e))
        })?;
        tmp.write_all(&json)
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| DeployError::Storage(format!("failed to write manifest: {e}")))?;
        tmp.persist(path).map_err(|e| {
            DeployError::Storage(format!("failed to persist manifest {}: {}", path.display(), e))
        })?;

        tracing::debug!(path = %path.display(), layers = self.layers.len(), "Manifest written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stage: &str) -> LayerRecord {
        let now = Utc::now();
        LayerRecord {
            stage: stage.to_string(),
            started_at: now,
            finished_at: now,
            identity: Identity::ROOT,
            summary: format!("{stage} done"),
            outputs: BTreeMap::from([("location".to_string(), format!("/{stage}"))]),
        }
    }

    #[test]
    fn test_persist_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state/manifest.json");

        let mut manifest = BuildManifest::new();
        manifest.push(record("provision"));
        manifest.push(record("assets"));
        manifest.persist(&path).unwrap();

        let loaded = BuildManifest::load(&path).unwrap();
        assert_eq!(loaded, manifest);
        assert_eq!(loaded.stages(), ["provision", "assets"]);
        assert_eq!(loaded.output("assets", "location"), Some("/assets"));
        assert_eq!(loaded.output("launch", "location"), None);
    }

    #[test]
    fn test_persist_replaces_previous() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");

        let mut manifest = BuildManifest::new();
        manifest.push(record("provision"));
        manifest.persist(&path).unwrap();
        manifest.push(record("assets"));
        manifest.persist(&path).unwrap();

        assert_eq!(BuildManifest::load(&path).unwrap().layers.len(), 2);
        // Only the manifest remains, no stray temp files
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_load_corrupt_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(matches!(
            BuildManifest::load(&path),
            Err(DeployError::Storage(_))
        ));
    }
}
