// ABOUTME: Static module descriptors and the registry that indexes them.
// ABOUTME: Definitions are immutable once the registry is built.

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;

/// Declarative description of a module: a bundle of tools sharing a lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDefinition {
    /// Unique module id.
    pub id: String,

    /// Display name.
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Profiles this module declares membership of.
    #[serde(default)]
    pub profiles: BTreeSet<String>,

    /// Higher priority loads earlier among modules with no ordering constraint.
    #[serde(default)]
    pub priority: i32,

    /// Ids of modules that must be loaded before this one.
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// Tools whose expensive setup is deferred until first invocation.
    #[serde(default, alias = "lazy_tools")]
    pub lazy_tools: Vec<String>,

    /// Tools this module is known to provide.
    /// Used to resolve a profile's additional tools back to modules.
    #[serde(default)]
    pub tools: Vec<String>,

    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl ModuleDefinition {
    /// Create a definition with the given id; the name defaults to the id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
            profiles: BTreeSet::new(),
            priority: 0,
            dependencies: Vec::new(),
            lazy_tools: Vec::new(),
            tools: Vec::new(),
            version: default_version(),
        }
    }

    /// Set the display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the load priority.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Add dependencies.
    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Declare profile membership.
    pub fn in_profiles<I, S>(mut self, profiles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.profiles.extend(profiles.into_iter().map(Into::into));
        self
    }

    /// Mark tools as lazily initialized.
    pub fn lazy_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.lazy_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Declare the tools this module provides.
    pub fn tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools.extend(tools.into_iter().map(Into::into));
        self
    }

    /// Set the version string.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Whether `tool` is initialized on first use.
    pub fn is_lazy(&self, tool: &str) -> bool {
        self.lazy_tools.iter().any(|t| t == tool)
    }
}

/// The static, id-indexed list of module definitions.
#[derive(Debug, Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<ModuleDefinition>,
    index: HashMap<String, usize>,
}

impl ModuleRegistry {
    /// Build a registry, rejecting duplicate ids.
    pub fn new(modules: Vec<ModuleDefinition>) -> Result<Self, RegistryError> {
        let mut index = HashMap::with_capacity(modules.len());
        for (i, module) in modules.iter().enumerate() {
            if index.insert(module.id.clone(), i).is_some() {
                return Err(RegistryError::DuplicateModule(module.id.clone()));
            }
        }
        Ok(Self { modules, index })
    }

    /// Look up a definition by id.
    pub fn get(&self, id: &str) -> Option<&ModuleDefinition> {
        self.index.get(id).map(|&i| &self.modules[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// All definitions in declaration order.
    pub fn all(&self) -> &[ModuleDefinition] {
        &self.modules
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Modules that declare membership of `profile`, in declaration order.
    pub fn modules_in_profile(&self, profile: &str) -> Vec<&ModuleDefinition> {
        self.modules
            .iter()
            .filter(|m| m.profiles.contains(profile))
            .collect()
    }

    /// The first module (in declaration order) that declares `tool`.
    pub fn module_providing(&self, tool: &str) -> Option<&ModuleDefinition> {
        self.modules
            .iter()
            .find(|m| m.tools.iter().any(|t| t == tool) || m.is_lazy(tool))
    }
}
