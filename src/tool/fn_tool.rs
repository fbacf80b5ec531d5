// ABOUTME: FnTool - a tool assembled from a name, schema, and async closure.
// ABOUTME: Lets modules declare tools without writing a struct per tool.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use super::{Tool, ToolAnnotations, ToolResult};

/// Boxed async handler behind an [`FnTool`].
pub type ToolHandler = Arc<
    dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<ToolResult, anyhow::Error>>
        + Send
        + Sync,
>;

/// A tool whose behaviour is an async closure.
#[derive(Clone)]
pub struct FnTool {
    name: String,
    description: String,
    schema: serde_json::Value,
    annotations: ToolAnnotations,
    handler: ToolHandler,
}

impl FnTool {
    /// Create a tool from its metadata and handler.
    pub fn new<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: serde_json::Value,
        handler: F,
    ) -> Self
    where
        F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<ToolResult, anyhow::Error>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            schema,
            annotations: ToolAnnotations::default(),
            handler: Arc::new(move |params| Box::pin(handler(params))),
        }
    }

    /// Attach behavioural hints.
    pub fn with_annotations(mut self, annotations: ToolAnnotations) -> Self {
        self.annotations = annotations;
        self
    }
}

impl std::fmt::Debug for FnTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("annotations", &self.annotations)
            .finish()
    }
}

#[async_trait]
impl Tool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> serde_json::Value {
        self.schema.clone()
    }

    fn annotations(&self) -> ToolAnnotations {
        self.annotations
    }

    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, anyhow::Error> {
        (self.handler)(params).await
    }
}
