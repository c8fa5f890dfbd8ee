//! Tracing subscriber setup and step timing.

use crate::config::LogConfig;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Installs a global `tracing` subscriber described by `config`.
///
/// Returns `false` when a global subscriber was already installed, which
/// leaves the existing one in place.
pub fn init_tracing(config: &LogConfig) -> bool {
    let filter = EnvFilter::try_new(&config.filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = if config.json {
        builder.json().try_init().is_ok()
    } else {
        builder.try_init().is_ok()
    };

    if installed {
        tracing::debug!(filter = %config.filter, json = config.json, "Tracing initialised");
    }
    installed
}

/// Simple timing helper for a single stage invocation.
#[derive(Debug)]
pub struct StepTimer {
    start: Instant,
    index: usize,
}

impl StepTimer {
    /// Starts timing the step at `index`.
    #[must_use]
    pub fn start(index: usize) -> Self {
        Self {
            start: Instant::now(),
            index,
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the index of the timed step.
    #[must_use]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Finishes timing and returns the duration.
    #[must_use]
    pub fn finish(self) -> f64 {
        self.elapsed_ms()
    }
}
