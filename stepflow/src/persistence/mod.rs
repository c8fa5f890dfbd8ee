//! Snapshot storage.
//!
//! Stores only ever see [`Snapshot`] values; how a run is rebuilt from one
//! is the controller's business.

mod file;
mod memory;

pub use file::{FileSnapshotStore, SnapshotFormat};
pub use memory::InMemorySnapshotStore;

use crate::errors::StepflowError;
use crate::snapshot::Snapshot;
use async_trait::async_trait;

/// Trait for snapshot persistence backends.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Stores a snapshot under `key`, replacing any previous one.
    async fn save(&self, snapshot: &Snapshot, key: &str) -> Result<(), StepflowError>;

    /// Loads the snapshot stored under `key`.
    async fn load(&self, key: &str) -> Result<Snapshot, StepflowError>;

    /// Returns true if a snapshot is stored under `key`.
    async fn exists(&self, key: &str) -> bool;

    /// Removes the snapshot under `key`. Missing keys are not an error.
    async fn delete(&self, key: &str) -> Result<(), StepflowError>;
}
