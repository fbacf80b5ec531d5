// ABOUTME: FnModule - a declarative module built from a list of tools plus
// ABOUTME: optional initialize/cleanup callbacks.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::{Module, ModuleBase};
use crate::error::ToolInitError;
use crate::tool::Tool;

type InitFn = Arc<dyn Fn(String) -> BoxFuture<'static, Result<(), anyhow::Error>> + Send + Sync>;
type CleanupFn = Arc<dyn Fn() -> BoxFuture<'static, Result<(), anyhow::Error>> + Send + Sync>;

/// A module whose tools and lifecycle hooks are supplied as values.
#[derive(Clone, Default)]
pub struct FnModule {
    tools: Vec<Arc<dyn Tool>>,
    initializer: Option<InitFn>,
    cleanup: Option<CleanupFn>,
}

impl FnModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool.
    pub fn tool(mut self, tool: impl Tool + 'static) -> Self {
        self.tools.push(Arc::new(tool));
        self
    }

    /// Add a shared tool.
    pub fn tool_arc(mut self, tool: Arc<dyn Tool>) -> Self {
        self.tools.push(tool);
        self
    }

    /// Run `f(tool_name)` before the first call of each lazy tool.
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.initializer = Some(Arc::new(move |name| Box::pin(f(name))));
        self
    }

    /// Run `f()` when the module is unloaded.
    pub fn on_cleanup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), anyhow::Error>> + Send + 'static,
    {
        self.cleanup = Some(Arc::new(move || Box::pin(f())));
        self
    }
}

#[async_trait]
impl Module for FnModule {
    async fn register_tools(&self, base: &ModuleBase) -> Result<(), anyhow::Error> {
        for tool in &self.tools {
            base.register_tool(Arc::clone(tool)).await?;
        }
        Ok(())
    }

    async fn initialize_tool(&self, tool: &str) -> Result<(), ToolInitError> {
        match &self.initializer {
            Some(init) => init(tool.to_string())
                .await
                .map_err(|err| ToolInitError::new(tool, err)),
            None => Ok(()),
        }
    }

    async fn cleanup(&self) -> Result<(), anyhow::Error> {
        match &self.cleanup {
            Some(cleanup) => cleanup().await,
            None => Ok(()),
        }
    }
}
