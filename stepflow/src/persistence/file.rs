//! Directory-backed snapshot store.

use super::SnapshotStore;
use crate::errors::StepflowError;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Encoding of a snapshot file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    /// `.json`
    Json,
    /// `.yaml` or `.yml`
    Yaml,
}

impl SnapshotFormat {
    /// Picks the format from a file extension.
    ///
    /// # Errors
    ///
    /// `Serialization` for any other extension.
    pub fn from_path(path: &Path) -> Result<Self, StepflowError> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("yaml" | "yml") => Ok(Self::Yaml),
            _ => Err(StepflowError::Serialization(format!(
                "unsupported snapshot file extension: {}",
                path.display()
            ))),
        }
    }

    fn encode(self, snapshot: &Snapshot) -> Result<String, StepflowError> {
        match self {
            Self::Json => snapshot.to_json(),
            Self::Yaml => snapshot.to_yaml(),
        }
    }

    fn decode(self, raw: &str) -> Result<Snapshot, StepflowError> {
        match self {
            Self::Json => Snapshot::from_json(raw),
            Self::Yaml => Snapshot::from_yaml(raw),
        }
    }
}

/// Writes each snapshot to `<root>/<key>`; the key's extension selects
/// the encoding.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    root: PathBuf,
}

impl FileSnapshotStore {
    /// Creates a store rooted at `root`. The directory is created on first
    /// save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the path a key maps to.
    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn save(&self, snapshot: &Snapshot, key: &str) -> Result<(), StepflowError> {
        let path = self.path_for(key);
        let encoded = SnapshotFormat::from_path(&path)?.encode(snapshot)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, encoded).await?;
        debug!(path = %path.display(), cursor = snapshot.cursor, "Snapshot saved");
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Snapshot, StepflowError> {
        let path = self.path_for(key);
        let format = SnapshotFormat::from_path(&path)?;
        let raw = tokio::fs::read_to_string(&path).await?;
        let snapshot = format.decode(&raw)?;
        debug!(path = %path.display(), cursor = snapshot.cursor, "Snapshot loaded");
        Ok(snapshot)
    }

    async fn exists(&self, key: &str) -> bool {
        tokio::fs::try_exists(self.path_for(key))
            .await
            .unwrap_or(false)
    }

    async fn delete(&self, key: &str) -> Result<(), StepflowError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err.into()),
            _ => Ok(()),
        }
    }
}
