//! Stage output type with factory methods.

use super::StageStatus;
use crate::context::ContextUpdate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// The output of a stage execution.
///
/// On success `data` holds the partial context update; on failure `error`
/// holds the reason and nothing is merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// The status of the stage execution.
    pub status: StageStatus,

    /// The partial context update (for successful executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ContextUpdate>,

    /// Free-form details about the call, carried in the `stage.completed`
    /// event payload. Never merged into the context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,

    /// Error message (for failed executions).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StageOutput {
    /// Creates a successful output with data.
    #[must_use]
    pub fn ok(data: ContextUpdate) -> Self {
        Self {
            status: StageStatus::Ok,
            data: Some(data),
            metadata: HashMap::new(),
            error: None,
        }
    }

    /// Creates a successful output with no data.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::default()
    }

    /// Creates a successful output with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut data = HashMap::new();
        data.insert(key.into(), value);
        Self::ok(data)
    }

    /// Creates a failure output with an error message.
    #[must_use]
    pub fn fail(error: impl Into<String>) -> Self {
        Self {
            status: StageStatus::Fail,
            data: None,
            metadata: HashMap::new(),
            error: Some(error.into()),
        }
    }

    /// Adds a single metadata entry.
    #[must_use]
    pub fn add_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns true if the output indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the output indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Consumes the output, returning its data.
    #[must_use]
    pub fn into_data(self) -> ContextUpdate {
        self.data.unwrap_or_default()
    }

    /// Returns the keys this output would write.
    #[must_use]
    pub fn keys(&self) -> Vec<String> {
        self.data
            .as_ref()
            .map(|d| d.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Gets a value from the data.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.data.as_ref().and_then(|d| d.get(key))
    }
}
