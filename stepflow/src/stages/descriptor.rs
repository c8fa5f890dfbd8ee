//! Serializable stage descriptions.

use serde::{Deserialize, Serialize};

/// Everything needed to rebind a stage after a snapshot round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDescriptor {
    /// The stage name.
    pub name: String,
    /// Registry kind used to pick a factory.
    pub kind: String,
    /// Declared input keys.
    #[serde(default)]
    pub input_keys: Vec<String>,
    /// Declared output keys.
    #[serde(default)]
    pub output_keys: Vec<String>,
    /// Kind-specific construction parameters.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub params: serde_json::Value,
}

impl StageDescriptor {
    /// Creates a descriptor with no declared keys or parameters.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            input_keys: Vec::new(),
            output_keys: Vec::new(),
            params: serde_json::Value::Null,
        }
    }

    /// Sets the parameters.
    #[must_use]
    pub fn with_params(mut self, params: serde_json::Value) -> Self {
        self.params = params;
        self
    }

    /// Reads a string parameter.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(serde_json::Value::as_str)
    }
}
