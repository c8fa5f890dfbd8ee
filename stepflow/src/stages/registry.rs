//! Stage registry for rebinding snapshot descriptors.

use super::{NoOpStage, Stage, StageDescriptor, TemplateStage};
use crate::errors::StepflowError;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Factory function type for rebuilding stages from descriptors.
pub type StageFactory =
    Box<dyn Fn(&StageDescriptor) -> Result<Arc<dyn Stage>, StepflowError> + Send + Sync>;

/// Registry of stage instances and factories.
///
/// Resolution checks named instances first, then factories keyed by
/// descriptor kind.
#[derive(Default)]
pub struct StageRegistry {
    /// Registered stage instances, keyed by stage name.
    instances: RwLock<HashMap<String, Arc<dyn Stage>>>,
    /// Registered factories, keyed by kind.
    factories: RwLock<HashMap<String, StageFactory>>,
}

impl StageRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with factories for the built-in stage kinds.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register_factory(
            TemplateStage::KIND,
            Box::new(|d: &StageDescriptor| {
                TemplateStage::from_descriptor(d).map(|s| Arc::new(s) as Arc<dyn Stage>)
            }),
        );
        registry.register_factory(
            NoOpStage::KIND,
            Box::new(|d: &StageDescriptor| Ok(Arc::new(NoOpStage::new(&d.name)) as Arc<dyn Stage>)),
        );
        registry
    }

    /// Registers a stage instance under its own name.
    pub fn register(&self, stage: Arc<dyn Stage>) {
        let name = stage.name().to_string();
        self.instances.write().insert(name, stage);
    }

    /// Registers every stage in a sequence.
    pub fn register_all<'a>(&self, stages: impl IntoIterator<Item = &'a Arc<dyn Stage>>) {
        let mut instances = self.instances.write();
        for stage in stages {
            instances.insert(stage.name().to_string(), Arc::clone(stage));
        }
    }

    /// Registers a factory for a stage kind.
    pub fn register_factory(&self, kind: impl Into<String>, factory: StageFactory) {
        self.factories.write().insert(kind.into(), factory);
    }

    /// Resolves a descriptor to a stage implementation.
    ///
    /// # Errors
    ///
    /// Returns `UnknownStage` when neither an instance nor a factory
    /// matches, or whatever the factory reports.
    pub fn resolve(&self, descriptor: &StageDescriptor) -> Result<Arc<dyn Stage>, StepflowError> {
        if let Some(stage) = self.instances.read().get(&descriptor.name) {
            return Ok(Arc::clone(stage));
        }

        let factories = self.factories.read();
        match factories.get(&descriptor.kind) {
            Some(factory) => factory(descriptor),
            None => Err(StepflowError::UnknownStage {
                name: descriptor.name.clone(),
                kind: descriptor.kind.clone(),
            }),
        }
    }

    /// Resolves an ordered list of descriptors.
    ///
    /// # Errors
    ///
    /// Fails on the first descriptor that cannot be resolved.
    pub fn resolve_all(
        &self,
        descriptors: &[StageDescriptor],
    ) -> Result<Vec<Arc<dyn Stage>>, StepflowError> {
        descriptors.iter().map(|d| self.resolve(d)).collect()
    }

    /// Checks if a descriptor can be resolved without invoking a factory.
    #[must_use]
    pub fn can_resolve(&self, descriptor: &StageDescriptor) -> bool {
        self.instances.read().contains_key(&descriptor.name)
            || self.factories.read().contains_key(&descriptor.kind)
    }

    /// Lists registered stage instance names.
    #[must_use]
    pub fn list_stages(&self) -> Vec<String> {
        self.instances.read().keys().cloned().collect()
    }

    /// Lists registered factory kinds.
    #[must_use]
    pub fn list_kinds(&self) -> Vec<String> {
        self.factories.read().keys().cloned().collect()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("instances", &self.list_stages())
            .field("kinds", &self.list_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::CUSTOM_KIND;

    #[test]
    fn test_builtins_resolve_template() {
        let registry = StageRegistry::with_builtins();
        let descriptor = TemplateStage::new("name", "{product} Co", "name").descriptor();

        let stage = registry.resolve(&descriptor).unwrap();
        assert_eq!(stage.name(), "name");
        assert_eq!(stage.kind(), TemplateStage::KIND);
    }

    #[test]
    fn test_builtins_resolve_noop() {
        let registry = StageRegistry::with_builtins();
        let stage = registry
            .resolve(&StageDescriptor::new("idle", NoOpStage::KIND))
            .unwrap();
        assert_eq!(stage.name(), "idle");
    }

    #[test]
    fn test_instance_takes_priority() {
        let registry = StageRegistry::with_builtins();
        registry.register(Arc::new(NoOpStage::new("name")));

        let descriptor = TemplateStage::new("name", "{product} Co", "name").descriptor();
        let stage = registry.resolve(&descriptor).unwrap();
        assert_eq!(stage.kind(), NoOpStage::KIND);
    }

    #[test]
    fn test_unknown_custom_stage() {
        let registry = StageRegistry::with_builtins();
        let descriptor = StageDescriptor::new("mystery", CUSTOM_KIND);

        assert!(!registry.can_resolve(&descriptor));
        let err = registry.resolve(&descriptor).unwrap_err();
        assert!(matches!(err, StepflowError::UnknownStage { ref name, .. } if name == "mystery"));
    }

    #[test]
    fn test_resolve_all_preserves_order() {
        let registry = StageRegistry::with_builtins();
        let descriptors = vec![
            StageDescriptor::new("first", NoOpStage::KIND),
            StageDescriptor::new("second", NoOpStage::KIND),
        ];

        let stages = registry.resolve_all(&descriptors).unwrap();
        let names: Vec<_> = stages.iter().map(|s| s.name().to_string()).collect();
        assert_eq!(names, vec!["first", "second"]);
    }
}
