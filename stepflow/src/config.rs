//! Runtime configuration for runs and logging.
//!
//! Both configs deserialize from any serde format and can be overridden
//! from the environment.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`RunConfig::step_delay_ms`].
pub const ENV_STEP_DELAY_MS: &str = "STEPFLOW_STEP_DELAY_MS";
/// Environment variable overriding [`LogConfig::filter`].
pub const ENV_LOG: &str = "STEPFLOW_LOG";
/// Environment variable enabling JSON log output.
pub const ENV_LOG_JSON: &str = "STEPFLOW_LOG_JSON";

/// Configuration for the stepper loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Delay after each step before the loop checks the gate again.
    pub step_delay_ms: u64,
    /// Whether the controller reports events to its sink.
    pub emit_events: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: 500,
            emit_events: true,
        }
    }
}

impl RunConfig {
    /// Creates a new run config.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a config from defaults overridden by the environment.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = std::env::var(ENV_STEP_DELAY_MS) {
            match raw.trim().parse() {
                Ok(ms) => config.step_delay_ms = ms,
                Err(_) => tracing::warn!(value = %raw, "Ignoring invalid {}", ENV_STEP_DELAY_MS),
            }
        }
        config
    }

    /// Sets the post-step delay.
    #[must_use]
    pub fn with_step_delay_ms(mut self, delay: u64) -> Self {
        self.step_delay_ms = delay;
        self
    }

    /// Enables or disables event emission.
    #[must_use]
    pub fn with_emit_events(mut self, emit: bool) -> Self {
        self.emit_events = emit;
        self
    }

    /// Returns the post-step delay as a duration.
    #[must_use]
    pub fn step_delay(&self) -> Duration {
        Duration::from_millis(self.step_delay_ms)
    }
}

/// Configuration for the tracing subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// An `EnvFilter` directive string.
    pub filter: String,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl LogConfig {
    /// Builds a config from defaults overridden by the environment.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(filter) = std::env::var(ENV_LOG) {
            config.filter = filter;
        }
        if let Ok(json) = std::env::var(ENV_LOG_JSON) {
            config.json = matches!(json.trim(), "1" | "true" | "yes");
        }
        config
    }

    /// Sets the filter directive.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }
}
