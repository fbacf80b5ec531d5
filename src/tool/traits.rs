// ABOUTME: Defines the Tool trait - the unit of capability a module exposes.
// ABOUTME: Tools have a name, description, schema, hints, and an async execute method.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ToolResult;

/// Behavioural hints a host may surface alongside a tool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolAnnotations {
    /// The tool does not modify its environment.
    pub read_only: bool,
    /// The tool may perform destructive updates.
    pub destructive: bool,
    /// Repeated calls with the same arguments have no additional effect.
    pub idempotent: bool,
    /// The tool interacts with external entities.
    pub open_world: bool,
}

/// A tool that can be registered with a host and invoked by an external caller.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the unique name of this tool.
    fn name(&self) -> &str;

    /// Returns a human-readable description.
    fn description(&self) -> &str;

    /// Returns the JSON Schema for the tool's input parameters.
    fn schema(&self) -> serde_json::Value;

    /// Returns behavioural hints for this tool.
    fn annotations(&self) -> ToolAnnotations {
        ToolAnnotations::default()
    }

    /// Execute the tool with the given parameters.
    async fn execute(&self, params: serde_json::Value) -> Result<ToolResult, anyhow::Error>;
}
