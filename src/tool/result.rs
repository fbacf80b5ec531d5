// ABOUTME: Defines the ToolResult type returned by tool handlers: text
// ABOUTME: content, an error flag, optional structured output, and metadata.

use std::collections::HashMap;

use serde::Serialize;

/// Outcome of a tool invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// The output content.
    pub content: String,

    /// Whether this result represents a tool-level error.
    pub is_error: bool,

    /// Structured output, when the handler produced JSON.
    pub structured: Option<serde_json::Value>,

    /// Metadata about the invocation (timings, cache hits, owning module).
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ToolResult {
    /// Create a successful text result.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
            structured: None,
            metadata: HashMap::new(),
        }
    }

    /// Create a successful result carrying JSON output.
    ///
    /// `content` holds the compact rendering of the same value.
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            content: value.to_string(),
            is_error: false,
            structured: Some(value),
            metadata: HashMap::new(),
        }
    }

    /// Create an error result.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: message.into(),
            is_error: true,
            structured: None,
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the result.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(v) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), v);
        }
        self
    }
}

impl Default for ToolResult {
    fn default() -> Self {
        Self::text("")
    }
}
