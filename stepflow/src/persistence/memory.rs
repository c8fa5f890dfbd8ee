//! In-memory snapshot store.

use super::SnapshotStore;
use crate::errors::StepflowError;
use crate::snapshot::Snapshot;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

/// Keeps snapshots in a map. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemorySnapshotStore {
    entries: Arc<Mutex<HashMap<String, Snapshot>>>,
}

impl InMemorySnapshotStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Returns the stored keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.entries.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl SnapshotStore for InMemorySnapshotStore {
    async fn save(&self, snapshot: &Snapshot, key: &str) -> Result<(), StepflowError> {
        self.entries.lock().insert(key.to_string(), snapshot.clone());
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Snapshot, StepflowError> {
        self.entries.lock().get(key).cloned().ok_or_else(|| {
            StepflowError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no snapshot stored under '{key}'"),
            ))
        })
    }

    async fn exists(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    async fn delete(&self, key: &str) -> Result<(), StepflowError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}
