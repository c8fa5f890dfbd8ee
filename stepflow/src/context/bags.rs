//! Thread-safe context bag.

use super::{ContextUpdate, ContextView};
use crate::errors::MissingKeyError;
use parking_lot::RwLock;
use std::collections::HashMap;

/// The shared, mutable key-value store of a run.
///
/// Writes never conflict: merging an existing key overwrites it
/// (last write wins). Keys are never removed during a run.
#[derive(Debug, Default)]
pub struct ContextBag {
    data: RwLock<HashMap<String, serde_json::Value>>,
}

impl ContextBag {
    /// Creates a new empty context bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context bag from existing data.
    #[must_use]
    pub fn from_data(data: HashMap<String, serde_json::Value>) -> Self {
        Self {
            data: RwLock::new(data),
        }
    }

    /// Gets a value from the bag.
    ///
    /// # Errors
    ///
    /// Returns `MissingKeyError` if the key was never written.
    pub fn get(&self, key: &str) -> Result<serde_json::Value, MissingKeyError> {
        self.data
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| MissingKeyError::new(key))
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.read().contains_key(key)
    }

    /// Applies a partial update, overwriting existing keys.
    pub fn merge(&self, partial: ContextUpdate) {
        self.data.write().extend(partial);
    }

    /// Replaces the whole contents, used when a new run reseeds its inputs.
    pub fn replace_all(&self, data: HashMap<String, serde_json::Value>) {
        *self.data.write() = data;
    }

    /// Returns an immutable copy of the current contents.
    #[must_use]
    pub fn snapshot_view(&self) -> ContextView {
        ContextView::new(self.data.read().clone())
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns true if the bag is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Returns all keys.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data.read().keys().cloned().collect()
    }
}

impl Clone for ContextBag {
    fn clone(&self) -> Self {
        Self {
            data: RwLock::new(self.data.read().clone()),
        }
    }
}

impl From<ContextView> for ContextBag {
    fn from(view: ContextView) -> Self {
        Self::from_data(view.into_inner())
    }
}
