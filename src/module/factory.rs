// ABOUTME: ModuleFactories - the explicit mapping from module id to the
// ABOUTME: constructor that builds its implementation.

use std::collections::HashMap;
use std::sync::Arc;

use super::{Module, ModuleDefinition};

/// Builds a live module instance from its definition.
pub type ModuleFactory =
    Arc<dyn Fn(&ModuleDefinition) -> Result<Arc<dyn Module>, anyhow::Error> + Send + Sync>;

/// Id-keyed table of module constructors, assembled at the composition root.
#[derive(Clone, Default)]
pub struct ModuleFactories {
    factories: HashMap<String, ModuleFactory>,
}

impl ModuleFactories {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a factory for `id`, replacing any previous one.
    pub fn with<F>(mut self, id: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ModuleDefinition) -> Result<Arc<dyn Module>, anyhow::Error> + Send + Sync + 'static,
    {
        self.insert(id, factory);
        self
    }

    /// Add a factory for `id`, replacing any previous one.
    pub fn insert<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn(&ModuleDefinition) -> Result<Arc<dyn Module>, anyhow::Error> + Send + Sync + 'static,
    {
        self.factories.insert(id.into(), Arc::new(factory));
    }

    pub fn get(&self, id: &str) -> Option<&ModuleFactory> {
        self.factories.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.factories.keys().cloned().collect();
        ids.sort();
        ids
    }
}

impl std::fmt::Debug for ModuleFactories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleFactories")
            .field("ids", &self.ids())
            .finish()
    }
}
