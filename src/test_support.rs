// ABOUTME: Shared fixtures for unit tests: a recording mock module and a
// ABOUTME: builder that wires registry, host, ownership, and loader together.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::ToolInitError;
use crate::loader::ModuleLoader;
use crate::module::{Module, ModuleBase, ModuleDefinition, ModuleFactories, ModuleRegistry, ToolOwnership};
use crate::profile::ProfileConfig;
use crate::tool::{Registry, ToolResult};

/// Ordered record of lifecycle events ("load:x", "init:t", "cleanup:x").
#[derive(Clone, Default)]
pub(crate) struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub(crate) fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn count(&self, event: &str) -> usize {
        self.0.lock().unwrap().iter().filter(|e| *e == event).count()
    }
}

/// Module that registers one tool per declared name and records its lifecycle.
pub(crate) struct TestModule {
    id: String,
    tools: Vec<String>,
    events: EventLog,
    fail_register: bool,
    delay: Option<Duration>,
    cleanup_delay: Option<Duration>,
}

impl TestModule {
    pub(crate) fn new(definition: &ModuleDefinition, events: EventLog) -> Self {
        let mut tools = definition.tools.clone();
        if tools.is_empty() {
            tools.push(format!("{}_tool", definition.id));
        }
        for lazy in &definition.lazy_tools {
            if !tools.contains(lazy) {
                tools.push(lazy.clone());
            }
        }
        Self {
            id: definition.id.clone(),
            tools,
            events,
            fail_register: false,
            delay: None,
            cleanup_delay: None,
        }
    }
}

#[async_trait]
impl Module for TestModule {
    async fn register_tools(&self, base: &ModuleBase) -> Result<(), anyhow::Error> {
        self.events.push(format!("load:{}", self.id));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        for (i, tool) in self.tools.iter().enumerate() {
            let reply = format!("{tool} ok");
            base.register_fn(tool.clone(), "test tool", serde_json::json!({}), move |_| {
                let reply = reply.clone();
                async move { Ok(ToolResult::text(reply)) }
            })
            .await?;
            if self.fail_register && i == 0 {
                anyhow::bail!("registration of {} exploded", self.id);
            }
        }
        Ok(())
    }

    async fn initialize_tool(&self, tool: &str) -> Result<(), ToolInitError> {
        self.events.push(format!("init:{tool}"));
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), anyhow::Error> {
        self.events.push(format!("cleanup:{}", self.id));
        if let Some(delay) = self.cleanup_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }
}

/// A wired-up loader over test modules.
pub(crate) struct Harness {
    pub host: Registry,
    pub ownership: ToolOwnership,
    pub loader: Arc<ModuleLoader>,
    pub events: EventLog,
}

#[derive(Default)]
pub(crate) struct HarnessBuilder {
    modules: Vec<ModuleDefinition>,
    profiles: ProfileConfig,
    failing: HashSet<String>,
    slow: HashMap<String, Duration>,
    slow_cleanup: HashMap<String, Duration>,
    unbuildable: HashSet<String>,
    single_build: HashSet<String>,
}

impl HarnessBuilder {
    pub(crate) fn module(mut self, definition: ModuleDefinition) -> Self {
        self.modules.push(definition);
        self
    }

    pub(crate) fn profiles(mut self, profiles: ProfileConfig) -> Self {
        self.profiles = profiles;
        self
    }

    /// Make a module's registration fail after its first tool.
    pub(crate) fn failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    /// Delay a module's registration.
    pub(crate) fn slow(mut self, id: &str, delay: Duration) -> Self {
        self.slow.insert(id.to_string(), delay);
        self
    }

    /// Delay a module's cleanup, after its "cleanup:" event is recorded.
    pub(crate) fn slow_cleanup(mut self, id: &str, delay: Duration) -> Self {
        self.slow_cleanup.insert(id.to_string(), delay);
        self
    }

    /// Make a module's factory refuse every build after the first.
    pub(crate) fn single_build(mut self, id: &str) -> Self {
        self.single_build.insert(id.to_string());
        self
    }

    /// Leave a module without a factory.
    pub(crate) fn without_factory(mut self, id: &str) -> Self {
        self.unbuildable.insert(id.to_string());
        self
    }

    pub(crate) fn build(self) -> Harness {
        let events = EventLog::default();
        let mut factories = ModuleFactories::new();
        for definition in &self.modules {
            if self.unbuildable.contains(&definition.id) {
                continue;
            }
            let events = events.clone();
            let fail_register = self.failing.contains(&definition.id);
            let delay = self.slow.get(&definition.id).copied();
            let cleanup_delay = self.slow_cleanup.get(&definition.id).copied();
            let single_build = self.single_build.contains(&definition.id);
            let builds = Arc::new(AtomicUsize::new(0));
            factories.insert(definition.id.clone(), move |def: &ModuleDefinition| {
                if builds.fetch_add(1, Ordering::SeqCst) > 0 && single_build {
                    anyhow::bail!("{} cannot be built twice", def.id);
                }
                let mut module = TestModule::new(def, events.clone());
                module.fail_register = fail_register;
                module.delay = delay;
                module.cleanup_delay = cleanup_delay;
                Ok(Arc::new(module) as Arc<dyn Module>)
            });
        }

        let host = Registry::new();
        let ownership = ToolOwnership::new();
        let registry = ModuleRegistry::new(self.modules).unwrap();
        let loader = ModuleLoader::new(
            registry,
            factories,
            Arc::new(host.clone()),
            ownership.clone(),
        )
        .with_profiles(self.profiles);

        Harness {
            host,
            ownership,
            loader: Arc::new(loader),
            events,
        }
    }
}

pub(crate) fn harness() -> HarnessBuilder {
    HarnessBuilder::default()
}

/// `core` (priority 10) <- `quality` (5), plus independent `research` and
/// profiles `minimal`, `testing`, `full`.
pub(crate) fn standard_harness() -> HarnessBuilder {
    harness()
        .module(ModuleDefinition::new("core").priority(10).in_profiles(["minimal", "testing", "full"]))
        .module(
            ModuleDefinition::new("quality")
                .priority(5)
                .depends_on(["core"])
                .in_profiles(["testing", "full"]),
        )
        .module(ModuleDefinition::new("research").priority(1).depends_on(["core"]).in_profiles(["full"]))
        .profiles(
            ProfileConfig::new()
                .profile(crate::profile::ProfileDefinition::new("minimal").modules(["core"]))
                .profile(crate::profile::ProfileDefinition::new("testing").modules(["quality"]))
                .profile(
                    crate::profile::ProfileDefinition::new("full")
                        .modules(["core", "quality", "research"]),
                ),
        )
}
