// ABOUTME: Tests for the in-memory tool host - registration, dispatch,
// ABOUTME: duplicate rejection, and shared state across clones.

use std::sync::Arc;

use super::*;
use crate::error::ToolError;

fn echo_tool(name: &str) -> Arc<dyn Tool> {
    Arc::new(FnTool::new(
        name,
        "Echoes input back",
        serde_json::json!({
            "type": "object",
            "properties": { "message": { "type": "string" } },
            "required": ["message"]
        }),
        |params| async move {
            let message = params["message"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::text(message))
        },
    ))
}

#[tokio::test]
async fn test_register_and_get() {
    let registry = Registry::new();
    registry.register_tool(echo_tool("echo")).await.unwrap();

    let tool = registry.get("echo").await;
    assert_eq!(tool.unwrap().name(), "echo");
}

#[tokio::test]
async fn test_duplicate_registration_rejected() {
    let registry = Registry::new();
    registry.register_tool(echo_tool("echo")).await.unwrap();

    let err = registry.register_tool(echo_tool("echo")).await.unwrap_err();
    assert!(matches!(err, ToolError::AlreadyRegistered(name) if name == "echo"));
    assert_eq!(registry.count().await, 1);
}

#[tokio::test]
async fn test_unregister() {
    let registry = Registry::new();
    registry.register_tool(echo_tool("echo")).await.unwrap();

    registry.unregister_tool("echo").await;
    assert_eq!(registry.count().await, 0);
    assert!(registry.get("echo").await.is_none());
}

#[tokio::test]
async fn test_call_dispatches_to_handler() {
    let registry = Registry::new();
    registry.register_tool(echo_tool("echo")).await.unwrap();

    let result = registry
        .call("echo", serde_json::json!({"message": "hi"}))
        .await
        .unwrap();
    assert_eq!(result.content, "hi");
}

#[tokio::test]
async fn test_call_unknown_tool() {
    let registry = Registry::new();
    let err = registry.call("missing", serde_json::json!({})).await.unwrap_err();
    assert!(matches!(err, ToolError::NotFound(_)));
}

#[tokio::test]
async fn test_to_definitions_sorted_with_annotations() {
    let registry = Registry::new();
    registry.register_tool(echo_tool("zeta")).await.unwrap();
    let annotated = FnTool::new("alpha", "Reads", serde_json::json!({}), |_| async {
        Ok(ToolResult::default())
    })
    .with_annotations(ToolAnnotations {
        read_only: true,
        ..Default::default()
    });
    registry.register_tool(Arc::new(annotated)).await.unwrap();

    let defs = registry.to_definitions().await;
    assert_eq!(defs[0].name, "alpha");
    assert!(defs[0].annotations.read_only);
    assert_eq!(defs[1].name, "zeta");
    assert!(defs[1].input_schema["properties"]["message"].is_object());
}

#[tokio::test]
async fn test_clone_shares_state() {
    let registry = Registry::new();
    let clone = registry.clone();

    registry.register_tool(echo_tool("echo")).await.unwrap();
    assert_eq!(clone.count().await, 1);
    assert_eq!(clone.list().await, vec!["echo"]);
}
