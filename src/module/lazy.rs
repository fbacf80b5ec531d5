// ABOUTME: LazyTool - wraps a tool so its module's initialize_tool runs once,
// ABOUTME: on first invocation, before the real handler.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use super::Module;
use crate::tool::{Tool, ToolAnnotations, ToolResult};

/// Lazy-initialization adapter around a registered tool.
///
/// The once-cell makes concurrent first calls share one initialization. A
/// failed initialization leaves the cell empty, so the next call retries.
pub(crate) struct LazyTool {
    inner: Arc<dyn Tool>,
    module: Arc<dyn Module>,
    init: Arc<OnceCell<()>>,
}

impl LazyTool {
    pub(crate) fn new(inner: Arc<dyn Tool>, module: Arc<dyn Module>, init: Arc<OnceCell<()>>) -> Self {
        Self {
            inner,
            module,
            init,
        }
    }
}

#[async_trait]
impl Tool for LazyTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn schema(&self) -> serde_json::Value {
        self.inner.schema()
    }

    fn annotations(&self) -> ToolAnnotations {
        self.inner.annotations()
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, anyhow::Error> {
        self.init
            .get_or_try_init(|| async {
                debug!(tool = %self.inner.name(), "initializing lazy tool");
                self.module.initialize_tool(self.inner.name()).await
            })
            .await
            .map_err(anyhow::Error::new)?;
        self.inner.execute(params).await
    }
}
