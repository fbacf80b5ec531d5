// ABOUTME: Profile configuration types handed in by a collaborator, and the
// ABOUTME: transitive `extends` resolution of a profile to its module ids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ProfileError;
use crate::module::ModuleRegistry;

/// Informational performance targets of a profile. Never enforced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceTargets {
    pub max_startup_ms: Option<u64>,
    pub max_memory_mb: Option<u64>,
    pub max_tools: Option<usize>,
}

/// A named, resolvable set of modules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileDefinition {
    /// Filled from the map key when deserialized inside a [`ProfileConfig`].
    pub name: String,
    pub description: String,
    /// Explicit module ids.
    pub modules: Vec<String>,
    /// Parent profile whose modules this profile inherits.
    pub extends: Option<String>,
    /// Extra tools; each pulls in the module that declares it.
    #[serde(alias = "additional_tools")]
    pub additional_tools: Vec<String>,
    /// Tool overrides, treated like `additional_tools`.
    pub tools: Vec<String>,
    pub performance: Option<PerformanceTargets>,
}

impl ProfileDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add module ids.
    pub fn modules<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.modules.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Inherit the modules of `parent`.
    pub fn extends(mut self, parent: impl Into<String>) -> Self {
        self.extends = Some(parent.into());
        self
    }

    /// Add tools that pull in their declaring modules.
    pub fn additional_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.additional_tools.extend(tools.into_iter().map(Into::into));
        self
    }

    pub fn performance(mut self, targets: PerformanceTargets) -> Self {
        self.performance = Some(targets);
        self
    }
}

/// Heuristic tables used by profile recommendation, keyed by profile name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionHeuristics {
    /// Glob patterns matched against recently touched file paths.
    pub file_patterns: BTreeMap<String, Vec<String>>,
    /// Keywords matched against the current task's keywords.
    pub task_keywords: BTreeMap<String, Vec<String>>,
}

/// Weight of each signal in the recommendation score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionWeights {
    /// Added per recent file matching one of a profile's patterns.
    pub file_pattern: f64,
    /// Added per profile keyword found in the task keywords.
    pub task_keyword: f64,
    /// Added once when the calling agent is mapped to the profile.
    pub agent_override: f64,
}

impl Default for DetectionWeights {
    fn default() -> Self {
        Self {
            file_pattern: 1.0,
            task_keyword: 2.0,
            agent_override: 3.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileDetection {
    pub enabled: bool,
    pub heuristics: DetectionHeuristics,
    pub weights: DetectionWeights,
}

impl Default for ProfileDetection {
    fn default() -> Self {
        Self {
            enabled: true,
            heuristics: DetectionHeuristics::default(),
            weights: DetectionWeights::default(),
        }
    }
}

/// Switch behaviour settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceConfig {
    /// Time budget for a whole profile switch, including loads and unloads.
    #[serde(alias = "switch_timeout_ms")]
    pub switch_timeout_ms: u64,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            switch_timeout_ms: 30_000,
        }
    }
}

/// All profile-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileConfig {
    pub profiles: BTreeMap<String, ProfileDefinition>,
    /// Agent id to the profile that agent should run with.
    #[serde(alias = "agent_overrides")]
    pub agent_overrides: BTreeMap<String, String>,
    #[serde(alias = "profile_detection")]
    pub profile_detection: ProfileDetection,
    pub performance: PerformanceConfig,
    #[serde(alias = "default_profile")]
    pub default_profile: Option<String>,
}

/// A profile resolved through its `extends` chain.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedProfile {
    pub name: String,
    /// The `extends` chain, root ancestor first, ending with `name`.
    pub chain: Vec<String>,
    /// Module ids in first-seen order, ancestors first.
    pub modules: Vec<String>,
    /// Additional tools no registered module declares.
    pub unresolved_tools: Vec<String>,
}

impl ProfileConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a profile, keyed by its name.
    pub fn profile(mut self, profile: ProfileDefinition) -> Self {
        self.profiles.insert(profile.name.clone(), profile);
        self
    }

    /// Map an agent id to a profile.
    pub fn agent_override(mut self, agent: impl Into<String>, profile: impl Into<String>) -> Self {
        self.agent_overrides.insert(agent.into(), profile.into());
        self
    }

    pub fn default_profile(mut self, profile: impl Into<String>) -> Self {
        self.default_profile = Some(profile.into());
        self
    }

    pub fn switch_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.performance.switch_timeout_ms = timeout_ms;
        self
    }

    pub fn detection(mut self, detection: ProfileDetection) -> Self {
        self.profile_detection = detection;
        self
    }

    /// Fill empty profile names from their map keys.
    ///
    /// Call after deserializing, where names usually appear only as keys.
    pub fn normalized(mut self) -> Self {
        for (key, profile) in self.profiles.iter_mut() {
            if profile.name.is_empty() {
                profile.name = key.clone();
            }
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&ProfileDefinition> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    /// Profile names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    /// Resolve a profile to its module ids.
    ///
    /// The result is the union of every ancestor's modules and the profile's
    /// own, plus the modules declaring its additional tools. A profile with
    /// no explicit modules falls back to the modules that declare membership
    /// of it in the registry.
    pub fn resolve(
        &self,
        name: &str,
        registry: &ModuleRegistry,
    ) -> Result<ResolvedProfile, ProfileError> {
        let mut chain: Vec<String> = Vec::new();
        let mut current = Some(name.to_string());
        while let Some(profile) = current {
            if chain.contains(&profile) {
                chain.push(profile);
                return Err(ProfileError::ExtendsCycle { chain });
            }
            let definition = self
                .profiles
                .get(&profile)
                .ok_or_else(|| ProfileError::UnknownProfile(profile.clone()))?;
            current = definition.extends.clone();
            chain.push(profile);
        }
        chain.reverse();

        let mut resolved = ResolvedProfile {
            name: name.to_string(),
            ..Default::default()
        };

        for profile in &chain {
            let Some(definition) = self.profiles.get(profile) else {
                continue;
            };

            if definition.modules.is_empty() && definition.extends.is_none() {
                for module in registry.modules_in_profile(profile) {
                    push_unique(&mut resolved.modules, &module.id);
                }
            }
            for id in &definition.modules {
                push_unique(&mut resolved.modules, id);
            }
            for tool in definition.additional_tools.iter().chain(&definition.tools) {
                match registry.module_providing(tool) {
                    Some(module) => push_unique(&mut resolved.modules, &module.id),
                    None => push_unique(&mut resolved.unresolved_tools, tool),
                }
            }
        }

        resolved.chain = chain;
        Ok(resolved)
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|v| v == value) {
        list.push(value.to_string());
    }
}
