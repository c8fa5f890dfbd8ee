//! Context management for pipeline execution.
//!
//! This module provides:
//! - A thread-safe mutable bag that accumulates stage outputs
//! - Immutable views handed to stages and external readers

mod bags;
mod view;

pub use bags::ContextBag;
pub use view::ContextView;

/// A partial set of key-value pairs produced by a stage.
pub type ContextUpdate = std::collections::HashMap<String, serde_json::Value>;
