// ABOUTME: Implements the ToolHost seam and Registry - a thread-safe in-memory
// ABOUTME: host that accepts tool registrations and dispatches calls to them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{Tool, ToolAnnotations, ToolResult};
use crate::error::ToolError;

/// The capability modules register their tools against.
///
/// The loader only ever calls these two methods; dispatching calls and
/// draining in-flight work before unload is the host's business.
#[async_trait]
pub trait ToolHost: Send + Sync {
    /// Register a tool under its name.
    async fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError>;

    /// Remove a tool whose owning module is being unloaded.
    async fn unregister_tool(&self, name: &str) {
        let _ = name;
    }
}

/// Serializable description of a registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    #[serde(default)]
    pub annotations: ToolAnnotations,
}

/// A thread-safe registry of tools.
#[derive(Default)]
pub struct Registry {
    tools: Arc<RwLock<HashMap<String, Arc<dyn Tool>>>>,
}

impl Registry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a tool by name.
    pub async fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        let tools = self.tools.read().await;
        tools.get(name).cloned()
    }

    /// List all tool names, sorted alphabetically.
    pub async fn list(&self) -> Vec<String> {
        let tools = self.tools.read().await;
        let mut names: Vec<_> = tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Get the number of registered tools.
    pub async fn count(&self) -> usize {
        let tools = self.tools.read().await;
        tools.len()
    }

    /// Describe all tools, sorted by name.
    pub async fn to_definitions(&self) -> Vec<ToolDefinition> {
        let tools = self.tools.read().await;
        let mut defs: Vec<_> = tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.schema(),
                annotations: t.annotations(),
            })
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    /// Invoke a tool by name.
    ///
    /// The registry lock is released before the handler runs, so calls never
    /// block registration.
    pub async fn call(
        &self,
        name: &str,
        params: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let tool = self
            .get(name)
            .await
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        tool.execute(params).await.map_err(ToolError::Execution)
    }
}

#[async_trait]
impl ToolHost for Registry {
    async fn register_tool(&self, tool: Arc<dyn Tool>) -> Result<(), ToolError> {
        let mut tools = self.tools.write().await;
        let name = tool.name().to_string();
        if tools.contains_key(&name) {
            return Err(ToolError::AlreadyRegistered(name));
        }
        tools.insert(name, tool);
        Ok(())
    }

    async fn unregister_tool(&self, name: &str) {
        let mut tools = self.tools.write().await;
        tools.remove(name);
    }
}

impl Clone for Registry {
    fn clone(&self) -> Self {
        Self {
            tools: Arc::clone(&self.tools),
        }
    }
}
