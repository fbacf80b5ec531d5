// ABOUTME: ProfileManager - switches the active module set between profiles
// ABOUTME: with a non-blocking switch lock, a time budget, and rollback.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::recommend::{ProfileRecommendation, RecommendationContext, recommend_profile};
use crate::error::ProfileError;
use crate::loader::{ModuleLoader, dependency_closure, topological_order};

/// Lifecycle of the manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ManagerState {
    Idle,
    Switching { to: String },
    /// A rollback failed. Switching is refused until `clear_error` is called.
    Error { reason: String },
}

/// Outcome of one `switch_profile` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileSwitchResult {
    /// Correlates the log lines of one switch.
    pub switch_id: Uuid,
    pub from_profile: Option<String>,
    pub to_profile: String,
    pub modules_kept: usize,
    pub modules_unloaded: usize,
    pub modules_loaded: usize,
    pub switch_time_ms: u64,
    /// Set when the switch failed and was rolled back.
    pub error: Option<ProfileError>,
    pub rolled_back: bool,
    pub kept: Vec<String>,
    pub unloaded: Vec<String>,
    pub loaded: Vec<String>,
}

impl ProfileSwitchResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

struct SwitchPlan {
    kept: Vec<String>,
    unload_order: Vec<String>,
    to_load: Vec<String>,
}

/// Drives the loader between named profiles.
///
/// Holds only the active profile name, the state machine, and the switch
/// lock; every module mutation goes through the [`ModuleLoader`].
pub struct ProfileManager {
    loader: Arc<ModuleLoader>,
    switch_timeout: Duration,
    active: RwLock<Option<String>>,
    state: RwLock<ManagerState>,
    switch_lock: Mutex<()>,
}

impl ProfileManager {
    /// Create a manager; the switch budget comes from the loader's profile
    /// configuration.
    pub fn new(loader: Arc<ModuleLoader>) -> Self {
        let timeout_ms = loader.profile_config().performance.switch_timeout_ms;
        Self {
            loader,
            switch_timeout: Duration::from_millis(timeout_ms),
            active: RwLock::new(None),
            state: RwLock::new(ManagerState::Idle),
            switch_lock: Mutex::new(()),
        }
    }

    /// Override the switch time budget.
    pub fn with_switch_timeout(mut self, timeout: Duration) -> Self {
        self.switch_timeout = timeout;
        self
    }

    pub fn loader(&self) -> &Arc<ModuleLoader> {
        &self.loader
    }

    pub async fn active_profile(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    pub async fn state(&self) -> ManagerState {
        self.state.read().await.clone()
    }

    /// Configured profile names, sorted.
    pub fn available_profiles(&self) -> Vec<String> {
        self.loader.profile_config().names()
    }

    /// Leave the `Error` state after manual intervention.
    pub async fn clear_error(&self) {
        let mut state = self.state.write().await;
        if let ManagerState::Error { reason } = &*state {
            info!(previous_error = %reason, "profile manager error cleared");
            *state = ManagerState::Idle;
        }
    }

    /// Module ids of a profile, with `extends` resolved transitively.
    pub fn get_modules_for_profile(&self, profile: &str) -> Result<Vec<String>, ProfileError> {
        let resolved = self
            .loader
            .profile_config()
            .resolve(profile, self.loader.module_registry())?;
        Ok(resolved.modules)
    }

    /// Recommend a profile from contextual signals.
    pub async fn recommend_profile(
        &self,
        context: &RecommendationContext,
    ) -> Option<ProfileRecommendation> {
        let active = self.active_profile().await;
        recommend_profile(self.loader.profile_config(), context, active.as_deref())
    }

    /// Load the first profile. Same guarantees as [`Self::switch_profile`].
    pub async fn activate(&self, profile: &str) -> Result<ProfileSwitchResult, ProfileError> {
        self.switch_profile(profile, false).await
    }

    /// Activate the configured default profile, if there is one.
    pub async fn activate_default(&self) -> Result<Option<ProfileSwitchResult>, ProfileError> {
        match self.loader.profile_config().default_profile.clone() {
            Some(profile) => self.activate(&profile).await.map(Some),
            None => Ok(None),
        }
    }

    /// Switch the active module set to `target`.
    ///
    /// Modules serving both profiles are kept untouched. Modules only the
    /// current profile needs are unloaded first (reverse dependency order,
    /// `force` cascades blocked unloads), then the new ones are loaded. If any
    /// step fails or the time budget runs out, the pre-switch module set is
    /// restored and the result carries the error.
    ///
    /// Returns `Err` when the switch is refused (another switch running,
    /// unknown profile, manager in `Error`) or when rollback itself fails.
    pub async fn switch_profile(
        &self,
        target: &str,
        force: bool,
    ) -> Result<ProfileSwitchResult, ProfileError> {
        let Ok(_guard) = self.switch_lock.try_lock() else {
            let in_progress = match &*self.state.read().await {
                ManagerState::Switching { to } => to.clone(),
                _ => "unknown".to_string(),
            };
            return Err(ProfileError::SwitchInProgress {
                requested: target.to_string(),
                in_progress,
            });
        };

        if let ManagerState::Error { reason } = &*self.state.read().await {
            return Err(ProfileError::Unrecoverable {
                reason: reason.clone(),
            });
        }

        let registry = self.loader.module_registry();
        let resolved = self.loader.profile_config().resolve(target, registry)?;

        let switch_id = Uuid::new_v4();
        let start = Instant::now();
        let from = self.active_profile().await;
        let current = self.current_set(from.as_deref()).await;

        if from.as_deref() == Some(target) {
            info!(%switch_id, profile = %target, "already on profile, nothing to switch");
            return Ok(ProfileSwitchResult {
                switch_id,
                from_profile: from,
                to_profile: target.to_string(),
                modules_kept: current.len(),
                modules_unloaded: 0,
                modules_loaded: 0,
                switch_time_ms: start.elapsed().as_millis() as u64,
                error: None,
                rolled_back: false,
                kept: current.into_iter().collect(),
                unloaded: Vec::new(),
                loaded: Vec::new(),
            });
        }

        let target_set: BTreeSet<String> = dependency_closure(registry, &resolved.modules)
            .modules
            .into_iter()
            .collect();
        let plan = self.plan(&current, &target_set, &resolved.modules);
        let before: BTreeSet<String> = self.loader.get_loaded_modules().await.into_iter().collect();

        *self.state.write().await = ManagerState::Switching {
            to: target.to_string(),
        };
        info!(
            %switch_id,
            from = ?from,
            to = %target,
            kept = plan.kept.len(),
            unload = plan.unload_order.len(),
            load = plan.to_load.len(),
            "switching profile"
        );

        let outcome = tokio::time::timeout(
            self.switch_timeout,
            self.execute(&plan, target, force),
        )
        .await
        .unwrap_or_else(|_| {
            Err(ProfileError::Timeout {
                profile: target.to_string(),
                timeout_ms: self.switch_timeout.as_millis() as u64,
            })
        });

        match outcome {
            Ok((unloaded, loaded)) => {
                *self.active.write().await = Some(target.to_string());
                *self.state.write().await = ManagerState::Idle;
                let switch_time_ms = start.elapsed().as_millis() as u64;
                info!(
                    %switch_id,
                    to = %target,
                    unloaded = unloaded.len(),
                    loaded = loaded.len(),
                    elapsed_ms = switch_time_ms,
                    "profile switched"
                );
                Ok(ProfileSwitchResult {
                    switch_id,
                    from_profile: from,
                    to_profile: target.to_string(),
                    modules_kept: plan.kept.len(),
                    modules_unloaded: unloaded.len(),
                    modules_loaded: loaded.len(),
                    switch_time_ms,
                    error: None,
                    rolled_back: false,
                    kept: plan.kept,
                    unloaded,
                    loaded,
                })
            }
            Err(err) => {
                warn!(%switch_id, to = %target, error = %err, "profile switch failed, rolling back");
                if let Err(reason) = self.rollback(&before).await {
                    error!(%switch_id, to = %target, reason = %reason, "rollback failed");
                    *self.state.write().await = ManagerState::Error {
                        reason: reason.clone(),
                    };
                    return Err(ProfileError::RollbackFailed {
                        profile: target.to_string(),
                        reason,
                    });
                }
                *self.state.write().await = ManagerState::Idle;
                info!(%switch_id, profile = ?from, "rollback complete");
                Ok(ProfileSwitchResult {
                    switch_id,
                    from_profile: from.clone(),
                    to_profile: target.to_string(),
                    modules_kept: plan.kept.len(),
                    modules_unloaded: 0,
                    modules_loaded: 0,
                    switch_time_ms: start.elapsed().as_millis() as u64,
                    error: Some(err),
                    rolled_back: true,
                    kept: plan.kept,
                    unloaded: Vec::new(),
                    loaded: Vec::new(),
                })
            }
        }
    }

    /// Loaded modules that belong to the active profile.
    async fn current_set(&self, active: Option<&str>) -> BTreeSet<String> {
        let Some(active) = active else {
            return BTreeSet::new();
        };
        let registry = self.loader.module_registry();
        let Ok(resolved) = self.loader.profile_config().resolve(active, registry) else {
            return BTreeSet::new();
        };
        let mut set = BTreeSet::new();
        for id in dependency_closure(registry, &resolved.modules).modules {
            if self.loader.is_module_loaded(&id).await {
                set.insert(id);
            }
        }
        set
    }

    fn plan(
        &self,
        current: &BTreeSet<String>,
        target: &BTreeSet<String>,
        requested: &[String],
    ) -> SwitchPlan {
        let registry = self.loader.module_registry();
        let kept: Vec<String> = current.intersection(target).cloned().collect();
        let to_unload: Vec<String> = current.difference(target).cloned().collect();

        let mut unload_order = topological_order(registry, &to_unload).order;
        unload_order.reverse();

        // Keep the profile's own ids first so unknown ids still reach the
        // loader and get reported.
        let to_load: Vec<String> = requested
            .iter()
            .chain(target.iter())
            .filter(|id| !current.contains(*id))
            .fold(Vec::new(), |mut acc, id| {
                if !acc.contains(id) {
                    acc.push(id.clone());
                }
                acc
            });

        SwitchPlan {
            kept,
            unload_order,
            to_load,
        }
    }

    async fn execute(
        &self,
        plan: &SwitchPlan,
        target: &str,
        force: bool,
    ) -> Result<(Vec<String>, Vec<String>), ProfileError> {
        let mut unloaded = Vec::new();
        for id in &plan.unload_order {
            unloaded.extend(self.loader.unload_module(id, force).await?);
        }

        let result = self.loader.load_modules(target, &plan.to_load).await;
        if !result.is_success() {
            return Err(ProfileError::ModulesFailed {
                profile: target.to_string(),
                failures: result.errors.iter().map(ToString::to_string).collect(),
            });
        }
        Ok((unloaded, result.loaded_ids()))
    }

    /// Restore exactly the modules that were loaded before the switch.
    ///
    /// Modules whose unload was cut off by the time budget are discarded and
    /// rebuilt from their factories.
    async fn rollback(&self, before: &BTreeSet<String>) -> Result<(), String> {
        let finished = self.loader.finish_interrupted_unloads().await;
        if !finished.is_empty() {
            warn!(modules = ?finished, "discarded modules whose unload was interrupted");
        }

        let extras: Vec<String> = self
            .loader
            .load_order()
            .await
            .into_iter()
            .rev()
            .filter(|id| !before.contains(id))
            .collect();
        for id in extras {
            self.loader
                .unload_module(&id, true)
                .await
                .map_err(|err| format!("could not unload '{id}': {err}"))?;
        }

        let loaded: BTreeSet<String> = self.loader.get_loaded_modules().await.into_iter().collect();
        let missing: Vec<String> = before.difference(&loaded).cloned().collect();
        if !missing.is_empty() {
            let result = self.loader.load_modules("rollback", &missing).await;
            if !result.is_success() {
                let failures: Vec<String> = result.errors.iter().map(ToString::to_string).collect();
                return Err(format!("could not reload: {}", failures.join("; ")));
            }
        }

        let restored: BTreeSet<String> =
            self.loader.get_loaded_modules().await.into_iter().collect();
        if &restored != before {
            return Err(format!(
                "loaded modules {restored:?} differ from pre-switch set {before:?}"
            ));
        }
        Ok(())
    }
}
