// ABOUTME: Result and statistics types produced by the module loader.
// ABOUTME: Per-module outcomes roll up into a ProfileLoadResult.

use std::sync::Arc;

use serde::Serialize;

use crate::error::LoaderError;
use crate::module::{Module, ModuleBase};

/// Outcome class of a single module load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Success,
    Failed,
    /// Already loaded; nothing was done.
    Skipped,
}

/// Result of loading one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleLoadResult {
    pub module_id: String,
    pub status: LoadStatus,
    pub tools_registered: usize,
    pub load_time_ms: u64,
    pub error: Option<LoaderError>,
}

impl ModuleLoadResult {
    pub(crate) fn success(module_id: &str, tools_registered: usize, load_time_ms: u64) -> Self {
        Self {
            module_id: module_id.to_string(),
            status: LoadStatus::Success,
            tools_registered,
            load_time_ms,
            error: None,
        }
    }

    pub(crate) fn skipped(module_id: &str) -> Self {
        Self {
            module_id: module_id.to_string(),
            status: LoadStatus::Skipped,
            tools_registered: 0,
            load_time_ms: 0,
            error: None,
        }
    }

    pub(crate) fn failed(module_id: &str, error: LoaderError) -> Self {
        Self {
            module_id: module_id.to_string(),
            status: LoadStatus::Failed,
            tools_registered: 0,
            load_time_ms: 0,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LoadStatus::Success
    }

    pub fn is_failed(&self) -> bool {
        self.status == LoadStatus::Failed
    }
}

/// A module that failed during a multi-module load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleFailure {
    pub module_id: String,
    pub error: LoaderError,
}

impl std::fmt::Display for ModuleFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.module_id, self.error)
    }
}

/// Aggregate result of loading a profile or an explicit module set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileLoadResult {
    /// Profile name, or the label the caller supplied.
    pub profile: String,
    /// The computed dependency order, including already-loaded modules.
    pub load_order: Vec<String>,
    pub results: Vec<ModuleLoadResult>,
    /// Modules newly loaded by this call.
    pub modules_loaded: usize,
    /// Modules that were already loaded.
    pub modules_skipped: usize,
    pub tools_registered: usize,
    pub total_time_ms: u64,
    pub errors: Vec<ModuleFailure>,
    pub warnings: Vec<String>,
}

impl ProfileLoadResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Ids that were newly loaded, in load order.
    pub fn loaded_ids(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.module_id.clone())
            .collect()
    }

    pub(crate) fn record(&mut self, result: ModuleLoadResult) {
        match result.status {
            LoadStatus::Success => {
                self.modules_loaded += 1;
                self.tools_registered += result.tools_registered;
            }
            LoadStatus::Skipped => self.modules_skipped += 1,
            LoadStatus::Failed => {
                if let Some(error) = &result.error {
                    self.errors.push(ModuleFailure {
                        module_id: result.module_id.clone(),
                        error: error.clone(),
                    });
                }
            }
        }
        self.results.push(result);
    }
}

/// A module that is currently active.
#[derive(Clone)]
pub struct LoadedModuleRecord {
    pub module_id: String,
    pub instance: Arc<dyn Module>,
    pub base: Arc<ModuleBase>,
    pub tools_registered: usize,
    pub load_time_ms: u64,
}

impl std::fmt::Debug for LoadedModuleRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModuleRecord")
            .field("module_id", &self.module_id)
            .field("tools_registered", &self.tools_registered)
            .field("load_time_ms", &self.load_time_ms)
            .finish()
    }
}

/// Per-module line of [`LoadStatistics`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleStatistics {
    pub module_id: String,
    pub version: String,
    pub tools_registered: usize,
    pub load_time_ms: u64,
}

/// Read-only snapshot of loader state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadStatistics {
    pub loaded_modules: usize,
    pub total_tools: usize,
    pub total_load_time_ms: u64,
    /// Loaded modules in load order.
    pub modules: Vec<ModuleStatistics>,
}
