//! Immutable context views.

use crate::errors::MissingKeyError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A read-only copy of a run's context at one point in time.
///
/// Stages receive a view rather than the live bag, so nothing they do
/// can race with the controller's merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextView {
    data: HashMap<String, serde_json::Value>,
}

impl ContextView {
    /// Wraps existing data.
    #[must_use]
    pub fn new(data: HashMap<String, serde_json::Value>) -> Self {
        Self { data }
    }

    /// Gets a value.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.get(key)
    }

    /// Gets a string value.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(serde_json::Value::as_str)
    }

    /// Gets a value that must be present.
    ///
    /// # Errors
    ///
    /// Returns `MissingKeyError` if the key is absent.
    pub fn require(&self, key: &str) -> Result<&serde_json::Value, MissingKeyError> {
        self.data.get(key).ok_or_else(|| MissingKeyError::new(key))
    }

    /// Checks if a key exists.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Restricts the view to the given keys.
    ///
    /// # Errors
    ///
    /// Returns `MissingKeyError` for the first key that is absent.
    pub fn select<S: AsRef<str>>(
        &self,
        keys: &[S],
    ) -> Result<HashMap<String, serde_json::Value>, MissingKeyError> {
        keys.iter()
            .map(|key| {
                let key = key.as_ref();
                self.require(key).map(|v| (key.to_string(), v.clone()))
            })
            .collect()
    }

    /// Returns the keys not present in this view.
    #[must_use]
    pub fn missing<S: AsRef<str>>(&self, keys: &[S]) -> Vec<String> {
        keys.iter()
            .map(AsRef::as_ref)
            .filter(|k| !self.data.contains_key(*k))
            .map(ToString::to_string)
            .collect()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrows the underlying map.
    #[must_use]
    pub fn as_map(&self) -> &HashMap<String, serde_json::Value> {
        &self.data
    }

    /// Consumes the view, returning the underlying map.
    #[must_use]
    pub fn into_inner(self) -> HashMap<String, serde_json::Value> {
        self.data
    }
}

impl From<HashMap<String, serde_json::Value>> for ContextView {
    fn from(data: HashMap<String, serde_json::Value>) -> Self {
        Self::new(data)
    }
}
