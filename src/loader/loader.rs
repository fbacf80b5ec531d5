// ABOUTME: ModuleLoader - loads modules in dependency order, unloads them
// ABOUTME: safely, and is the single writer of the loaded-module table.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use async_recursion::async_recursion;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::order::{dependency_closure, find_cycle, topological_order};
use super::result::{
    LoadStatistics, LoadedModuleRecord, ModuleLoadResult, ModuleStatistics, ProfileLoadResult,
};
use crate::error::{LoaderError, ProfileError};
use crate::module::{
    Module, ModuleBase, ModuleDefinition, ModuleFactories, ModuleRegistry, ToolOwnership,
};
use crate::profile::ProfileConfig;
use crate::tool::ToolHost;

#[derive(Default)]
struct LoaderState {
    records: HashMap<String, LoadedModuleRecord>,
    /// Loaded ids in the order they were loaded.
    order: Vec<String>,
    /// Records whose teardown started but never finished. Their `cleanup`
    /// has run, so the instance must not serve again.
    unloading: BTreeSet<String>,
}

/// Brings modules in and out of the active set.
///
/// Every public mutating operation takes the operation lock for its whole
/// duration, so loads and unloads never interleave. Read accessors never take
/// the operation lock.
pub struct ModuleLoader {
    modules: Arc<ModuleRegistry>,
    factories: ModuleFactories,
    profiles: Arc<ProfileConfig>,
    host: Arc<dyn ToolHost>,
    ownership: ToolOwnership,
    state: RwLock<LoaderState>,
    op_lock: Mutex<()>,
}

impl ModuleLoader {
    /// Create a loader over a module registry and its factories.
    pub fn new(
        modules: ModuleRegistry,
        factories: ModuleFactories,
        host: Arc<dyn ToolHost>,
        ownership: ToolOwnership,
    ) -> Self {
        Self {
            modules: Arc::new(modules),
            factories,
            profiles: Arc::new(ProfileConfig::default()),
            host,
            ownership,
            state: RwLock::new(LoaderState::default()),
            op_lock: Mutex::new(()),
        }
    }

    /// Set the profile configuration used by `load_profile`.
    pub fn with_profiles(mut self, profiles: ProfileConfig) -> Self {
        self.profiles = Arc::new(profiles);
        self
    }

    pub fn module_registry(&self) -> &ModuleRegistry {
        &self.modules
    }

    pub fn profile_config(&self) -> &ProfileConfig {
        &self.profiles
    }

    pub fn ownership(&self) -> &ToolOwnership {
        &self.ownership
    }

    /// Load one module, loading its dependencies first.
    ///
    /// Never returns early with an error: failures are reported in the result.
    pub async fn load_module(&self, id: &str) -> ModuleLoadResult {
        let _op = self.op_lock.lock().await;
        let mut stack = Vec::new();
        self.load_locked(id, &mut stack).await
    }

    /// Load every module of a profile.
    ///
    /// Fails only if the profile itself cannot be resolved; module failures
    /// are collected in the result without stopping the others.
    pub async fn load_profile(&self, profile: &str) -> Result<ProfileLoadResult, ProfileError> {
        let resolved = self.profiles.resolve(profile, &self.modules)?;
        let mut result = self.load_modules(profile, &resolved.modules).await;

        for tool in &resolved.unresolved_tools {
            result
                .warnings
                .push(format!("tool '{tool}' is not provided by any module"));
        }
        for id in &resolved.modules {
            let Some(definition) = self.modules.get(id) else {
                continue;
            };
            let declared = definition.profiles.is_empty()
                || resolved.chain.iter().any(|p| definition.profiles.contains(p));
            if !declared {
                result.warnings.push(format!(
                    "module '{id}' does not declare membership of profile '{profile}'"
                ));
            }
        }
        for warning in &result.warnings {
            warn!(profile = %profile, "{warning}");
        }

        info!(
            profile = %profile,
            loaded = result.modules_loaded,
            skipped = result.modules_skipped,
            tools = result.tools_registered,
            errors = result.errors.len(),
            elapsed_ms = result.total_time_ms,
            "profile loaded"
        );
        Ok(result)
    }

    /// Load an explicit set of modules (and their dependencies) in order.
    ///
    /// `label` names the load in the result and in logs.
    pub async fn load_modules(&self, label: &str, ids: &[String]) -> ProfileLoadResult {
        let _op = self.op_lock.lock().await;
        let start = Instant::now();
        let mut result = ProfileLoadResult {
            profile: label.to_string(),
            ..Default::default()
        };

        let closure = dependency_closure(&self.modules, ids);
        for id in &closure.unknown {
            result.record(ModuleLoadResult::failed(
                id,
                LoaderError::UnknownModule(id.clone()),
            ));
        }

        let ordered = topological_order(&self.modules, &closure.modules);
        debug!(label = %label, order = ?ordered.order, "computed load order");
        result.load_order = ordered.order.clone();

        for id in &ordered.order {
            let mut stack = Vec::new();
            let module_result = self.load_locked(id, &mut stack).await;
            result.record(module_result);
        }

        if !ordered.blocked.is_empty() {
            let cycle = find_cycle(&self.modules, &ordered.blocked)
                .unwrap_or_else(|| ordered.blocked.clone());
            for id in &ordered.blocked {
                result.record(ModuleLoadResult::failed(
                    id,
                    LoaderError::DependencyCycle {
                        cycle: cycle.clone(),
                    },
                ));
            }
        }

        result.total_time_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Unload a module.
    ///
    /// Refused while loaded modules depend on it, unless `force` is set, in
    /// which case those dependents are unloaded first. Returns the ids that
    /// were unloaded, in unload order; empty if `id` was not loaded.
    pub async fn unload_module(&self, id: &str, force: bool) -> Result<Vec<String>, LoaderError> {
        let _op = self.op_lock.lock().await;
        self.unload_locked(id, force).await
    }

    /// Unload everything in reverse load order.
    pub async fn unload_all(&self) -> Vec<String> {
        let _op = self.op_lock.lock().await;
        let ids: Vec<String> = self.state.read().await.order.iter().rev().cloned().collect();
        let mut unloaded = Vec::new();
        for id in ids {
            match self.unload_locked(&id, true).await {
                Ok(ids) => unloaded.extend(ids),
                Err(err) => error!(module = %id, error = %err, "forced unload failed"),
            }
        }
        unloaded
    }

    /// Finish every unload that was cancelled after `cleanup` started.
    ///
    /// Such records are torn down without calling `cleanup` again. Returns
    /// the ids removed, dependents included.
    pub async fn finish_interrupted_unloads(&self) -> Vec<String> {
        let _op = self.op_lock.lock().await;
        let ids: Vec<String> = self.state.read().await.unloading.iter().cloned().collect();
        let mut finished = Vec::new();
        for id in ids {
            match self.unload_locked(&id, true).await {
                Ok(ids) => finished.extend(ids),
                Err(err) => error!(module = %id, error = %err, "could not finish unload"),
            }
        }
        finished
    }

    /// Loaded modules whose unload was interrupted after `cleanup` started.
    pub async fn interrupted_unloads(&self) -> Vec<String> {
        self.state.read().await.unloading.iter().cloned().collect()
    }

    async fn is_unloading(&self, id: &str) -> bool {
        self.state.read().await.unloading.contains(id)
    }

    pub async fn is_module_loaded(&self, id: &str) -> bool {
        self.state.read().await.records.contains_key(id)
    }

    /// The live instance of a loaded module.
    pub async fn get_module(&self, id: &str) -> Option<Arc<dyn Module>> {
        let state = self.state.read().await;
        state.records.get(id).map(|r| Arc::clone(&r.instance))
    }

    /// The record of a loaded module.
    pub async fn get_record(&self, id: &str) -> Option<LoadedModuleRecord> {
        self.state.read().await.records.get(id).cloned()
    }

    /// Loaded module ids, sorted.
    pub async fn get_loaded_modules(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.state.read().await.records.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Loaded module ids in the order they were loaded.
    pub async fn load_order(&self) -> Vec<String> {
        self.state.read().await.order.clone()
    }

    /// Tool name to owning module id, for every registered tool.
    pub async fn get_registered_tools(&self) -> BTreeMap<String, String> {
        self.ownership.snapshot().await
    }

    /// Loaded modules that list `id` among their dependencies, most recently
    /// loaded first.
    pub async fn loaded_dependents(&self, id: &str) -> Vec<String> {
        let state = self.state.read().await;
        state
            .order
            .iter()
            .rev()
            .filter(|loaded| {
                self.modules
                    .get(loaded.as_str())
                    .is_some_and(|d| d.dependencies.iter().any(|dep| dep == id))
            })
            .cloned()
            .collect()
    }

    pub async fn get_load_statistics(&self) -> LoadStatistics {
        let state = self.state.read().await;
        let mut stats = LoadStatistics::default();
        for id in &state.order {
            let Some(record) = state.records.get(id) else {
                continue;
            };
            let tools = record.base.tool_count().await;
            stats.loaded_modules += 1;
            stats.total_tools += tools;
            stats.total_load_time_ms += record.load_time_ms;
            stats.modules.push(ModuleStatistics {
                module_id: id.clone(),
                version: record.base.definition().version.clone(),
                tools_registered: tools,
                load_time_ms: record.load_time_ms,
            });
        }
        stats
    }

    #[async_recursion]
    async fn load_locked(&self, id: &str, stack: &mut Vec<String>) -> ModuleLoadResult {
        if self.is_unloading(id).await {
            if let Err(err) = self.unload_locked(id, true).await {
                return ModuleLoadResult::failed(id, err);
            }
        } else if self.is_module_loaded(id).await {
            return ModuleLoadResult::skipped(id);
        }

        if let Some(pos) = stack.iter().position(|s| s == id) {
            let mut cycle = stack[pos..].to_vec();
            cycle.push(id.to_string());
            warn!(module = %id, cycle = ?cycle, "dependency cycle");
            return ModuleLoadResult::failed(id, LoaderError::DependencyCycle { cycle });
        }

        let Some(definition) = self.modules.get(id) else {
            return ModuleLoadResult::failed(id, LoaderError::UnknownModule(id.to_string()));
        };

        stack.push(id.to_string());
        for dep in &definition.dependencies {
            if !self.modules.contains(dep) {
                stack.pop();
                warn!(module = %id, dependency = %dep, "missing dependency");
                return ModuleLoadResult::failed(
                    id,
                    LoaderError::MissingDependency {
                        module: id.to_string(),
                        dependency: dep.clone(),
                    },
                );
            }

            let dep_result = self.load_locked(dep, stack).await;
            if let Some(err) = dep_result.error {
                stack.pop();
                let err = match err {
                    cycle @ LoaderError::DependencyCycle { .. } => cycle,
                    other => LoaderError::DependencyFailed {
                        module: id.to_string(),
                        dependency: dep.clone(),
                        reason: other.to_string(),
                    },
                };
                return ModuleLoadResult::failed(id, err);
            }
        }
        stack.pop();

        self.instantiate(definition).await
    }

    async fn instantiate(&self, definition: &ModuleDefinition) -> ModuleLoadResult {
        let id = definition.id.as_str();
        let start = Instant::now();

        let Some(factory) = self.factories.get(id) else {
            error!(module = %id, "no factory registered");
            return ModuleLoadResult::failed(id, LoaderError::NoFactory(id.to_string()));
        };

        let instance = match factory(definition) {
            Ok(instance) => instance,
            Err(err) => {
                error!(module = %id, error = %err, "module construction failed");
                return ModuleLoadResult::failed(
                    id,
                    LoaderError::ModuleLoad {
                        module: id.to_string(),
                        message: format!("{err:#}"),
                    },
                );
            }
        };

        let base = Arc::new(ModuleBase::new(
            Arc::new(definition.clone()),
            Arc::clone(&instance),
            Arc::clone(&self.host),
            self.ownership.clone(),
        ));

        // Recorded before registration: if this future is dropped mid-way the
        // record still points at whatever tools were claimed, and a later
        // unload releases them.
        {
            let mut state = self.state.write().await;
            state.records.insert(
                id.to_string(),
                LoadedModuleRecord {
                    module_id: id.to_string(),
                    instance: Arc::clone(&instance),
                    base: Arc::clone(&base),
                    tools_registered: 0,
                    load_time_ms: 0,
                },
            );
            state.order.push(id.to_string());
        }

        if let Err(err) = instance.register_tools(&base).await {
            let released = base.release_all().await;
            if let Err(cleanup_err) = instance.cleanup().await {
                warn!(module = %id, error = %cleanup_err, "cleanup after failed load failed");
            }
            self.remove_record(id).await;
            error!(
                module = %id,
                error = %err,
                released = released.len(),
                "module registration failed"
            );
            return ModuleLoadResult::failed(
                id,
                LoaderError::ModuleLoad {
                    module: id.to_string(),
                    message: format!("{err:#}"),
                },
            );
        }

        let tools = base.tool_count().await;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        if let Some(record) = self.state.write().await.records.get_mut(id) {
            record.tools_registered = tools;
            record.load_time_ms = elapsed_ms;
        }

        info!(module = %id, tools, elapsed_ms, "module loaded");
        ModuleLoadResult::success(id, tools, elapsed_ms)
    }

    #[async_recursion]
    async fn unload_locked(&self, id: &str, force: bool) -> Result<Vec<String>, LoaderError> {
        let Some(record) = self.get_record(id).await else {
            return Ok(Vec::new());
        };

        let mut unloaded = Vec::new();
        let dependents = self.loaded_dependents(id).await;
        if !dependents.is_empty() {
            if !force {
                warn!(module = %id, dependents = ?dependents, "unload blocked");
                return Err(LoaderError::UnloadBlocked {
                    module: id.to_string(),
                    dependents,
                });
            }
            for dependent in &dependents {
                unloaded.extend(self.unload_locked(dependent, true).await?);
            }
        }

        // A record in `unloading` has started cleanup and is never served again.
        let resumed = !self.state.write().await.unloading.insert(id.to_string());
        if resumed {
            warn!(module = %id, "finishing interrupted unload, cleanup not repeated");
        } else if let Err(err) = record.instance.cleanup().await {
            warn!(module = %id, error = %err, "module cleanup failed, unloading anyway");
        }
        let released = record.base.release_all().await;
        self.remove_record(id).await;

        info!(module = %id, tools = released.len(), "module unloaded");
        unloaded.push(id.to_string());
        Ok(unloaded)
    }

    async fn remove_record(&self, id: &str) {
        let mut state = self.state.write().await;
        state.records.remove(id);
        state.order.retain(|loaded| loaded != id);
        state.unloading.remove(id);
    }
}
