// ABOUTME: The Module trait and ModuleBase - the per-instance registration
// ABOUTME: context that enforces tool-name uniqueness and wires lazy tools.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use super::lazy::LazyTool;
use super::ownership::{Claim, ToolOwnership};
use super::ModuleDefinition;
use crate::error::{ToolError, ToolInitError};
use crate::tool::{FnTool, Tool, ToolHost, ToolResult};

/// A loadable bundle of tools sharing one lifecycle.
#[async_trait]
pub trait Module: Send + Sync {
    /// Register this module's tools through `base`.
    ///
    /// Returning `Err` fails the load; tools registered before the failure are
    /// released by the loader.
    async fn register_tools(&self, base: &ModuleBase) -> Result<(), anyhow::Error>;

    /// Build the resources behind a lazy tool. Called once before its first
    /// successful invocation; a failure is retried on the next call.
    async fn initialize_tool(&self, tool: &str) -> Result<(), ToolInitError> {
        let _ = tool;
        Ok(())
    }

    /// Release anything built in `initialize_tool`. Awaited during unload.
    async fn cleanup(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}

/// What happened to a single `register_tool` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    /// The tool is registered and owned by this module.
    Registered { lazy: bool },
    /// Another module already owns the name; nothing was registered.
    Skipped { owner: String },
}

/// Registration context handed to a module instance by the loader.
///
/// Owns the instance's `registered_tools` and lazy-initialization state.
pub struct ModuleBase {
    definition: Arc<ModuleDefinition>,
    module: Arc<dyn Module>,
    host: Arc<dyn ToolHost>,
    ownership: ToolOwnership,
    registered: Mutex<BTreeSet<String>>,
    lazy: Mutex<HashMap<String, Arc<OnceCell<()>>>>,
}

impl ModuleBase {
    pub(crate) fn new(
        definition: Arc<ModuleDefinition>,
        module: Arc<dyn Module>,
        host: Arc<dyn ToolHost>,
        ownership: ToolOwnership,
    ) -> Self {
        Self {
            definition,
            module,
            host,
            ownership,
            registered: Mutex::new(BTreeSet::new()),
            lazy: Mutex::new(HashMap::new()),
        }
    }

    /// The id of the module this context belongs to.
    pub fn module_id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &ModuleDefinition {
        &self.definition
    }

    /// Register a tool with the host on behalf of this module.
    ///
    /// A name already owned by any module is skipped with a warning. Tools
    /// listed in the definition's `lazy_tools` are wrapped so that
    /// `Module::initialize_tool` runs before their first call.
    pub async fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<Registration, ToolError> {
        let name = tool.name().to_string();
        let module_id = self.module_id();

        // Held for the whole registration so `registered` never lags the
        // ownership table.
        let mut registered = self.registered.lock().await;

        if let Claim::Taken { owner } = self.ownership.claim(&name, module_id).await {
            warn!(
                tool = %name,
                module = %module_id,
                owner = %owner,
                "tool name already registered, skipping"
            );
            return Ok(Registration::Skipped { owner });
        }

        let lazy = self.definition.is_lazy(&name);
        let hosted: Arc<dyn Tool> = if lazy {
            let cell = Arc::new(OnceCell::new());
            self.lazy.lock().await.insert(name.clone(), Arc::clone(&cell));
            Arc::new(LazyTool::new(tool, Arc::clone(&self.module), cell))
        } else {
            tool
        };

        if let Err(err) = self.host.register_tool(hosted).await {
            self.ownership.release(&name, module_id).await;
            self.lazy.lock().await.remove(&name);
            return Err(err);
        }

        registered.insert(name.clone());
        debug!(tool = %name, module = %module_id, lazy, "tool registered");
        Ok(Registration::Registered { lazy })
    }

    /// Register a tool built from a name, schema and async handler.
    pub async fn register_fn<F, Fut>(
        &self,
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        handler: F,
    ) -> Result<Registration, ToolError>
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<ToolResult, anyhow::Error>> + Send + 'static,
    {
        let tool = FnTool::new(name, description, schema, handler);
        self.register_tool(Arc::new(tool)).await
    }

    /// Names this instance currently owns, sorted.
    pub async fn registered_tools(&self) -> Vec<String> {
        self.registered.lock().await.iter().cloned().collect()
    }

    pub async fn tool_count(&self) -> usize {
        self.registered.lock().await.len()
    }

    /// Lazy tools whose first-use initialization has completed, sorted.
    pub async fn initialized_tools(&self) -> Vec<String> {
        let lazy = self.lazy.lock().await;
        let mut names: Vec<_> = lazy
            .iter()
            .filter(|(_, cell)| cell.initialized())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Give every owned name back to the ownership table and the host.
    ///
    /// Also sweeps names the table attributes to this module id but that never
    /// reached `registered`, which happens when a registration is cancelled
    /// between the claim and the host call.
    pub(crate) async fn release_all(&self) -> Vec<String> {
        let mut registered = self.registered.lock().await;
        let module_id = self.module_id();
        let mut names: BTreeSet<String> = registered.iter().cloned().collect();
        names.extend(self.ownership.tools_of(module_id).await);
        let names: Vec<String> = names.into_iter().collect();
        for name in &names {
            self.ownership.release(name, module_id).await;
            self.host.unregister_tool(name).await;
        }
        registered.clear();
        self.lazy.lock().await.clear();
        names
    }
}

impl std::fmt::Debug for ModuleBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleBase")
            .field("module_id", &self.definition.id)
            .finish_non_exhaustive()
    }
}
