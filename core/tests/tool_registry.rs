//! Integration tests for the tool registry: registration, execution wrapping,
//! parallel ordering, permission gating and MCP server removal.

mod init_logging;

use std::sync::Arc;

use async_trait::async_trait;
use qwen_tui_core::{
    PermissionChecker, PermissionVerdict, Tool, ToolCall, ToolError, ToolRegistry, ToolStatus,
};
use qwen_tui_core::tools::ToolOutput;
use serde_json::{json, Map, Value};

struct StubTool {
    name: String,
    reply: String,
    delay_ms: u64,
    fail: bool,
}

impl StubTool {
    fn new(name: &str, reply: &str) -> Self {
        Self {
            name: name.to_string(),
            reply: reply.to_string(),
            delay_ms: 0,
            fail: false,
        }
    }
}

#[async_trait]
impl Tool for StubTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        "stub tool"
    }

    fn schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }

    async fn execute(&self, _args: Value) -> Result<ToolOutput, ToolError> {
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(ToolError::Parameter("stub failure".to_string()));
        }
        Ok(ToolOutput::text(self.reply.clone()))
    }
}

fn call(name: &str) -> ToolCall {
    ToolCall::new(format!("id-{}", name), name, Map::new())
}

#[tokio::test]
async fn register_then_execute() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(StubTool::new("Echo", "ok")));

    assert_eq!(registry.list_tools(), vec!["Echo".to_string()]);
    let result = registry.execute("Echo", json!({})).await;
    assert!(result.is_success());
    assert_eq!(result.result.unwrap(), json!("ok"));
    assert!(result.execution_time_seconds >= 0.0);
}

#[tokio::test]
async fn unknown_tool_is_an_error_result_not_a_panic() {
    let registry = ToolRegistry::new();
    let result = registry.execute("Nope", json!({})).await;
    assert_eq!(result.status, ToolStatus::Error);
    assert!(result.error.unwrap().contains("Tool not found"));
}

#[tokio::test]
async fn tool_failure_becomes_error_result() {
    let registry = ToolRegistry::new();
    let mut tool = StubTool::new("Flaky", "never");
    tool.fail = true;
    registry.register(Arc::new(tool));

    let result = registry.execute("Flaky", json!({})).await;
    assert_eq!(result.status, ToolStatus::Error);
    assert!(result.error.unwrap().contains("stub failure"));
}

/// **Invariant**: `execute_parallel` result order matches input order even
/// when later calls finish first.
#[tokio::test]
async fn execute_parallel_preserves_input_order() {
    let registry = ToolRegistry::new();
    let mut slow = StubTool::new("Slow", "slow-reply");
    slow.delay_ms = 100;
    registry.register(Arc::new(slow));
    registry.register(Arc::new(StubTool::new("Fast", "fast-reply")));

    let calls = vec![call("Slow"), call("Fast"), call("Missing")];
    let results = registry.execute_parallel(&calls).await;

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].tool_name, "Slow");
    assert_eq!(results[1].tool_name, "Fast");
    assert_eq!(results[2].tool_name, "Missing");
    assert!(results[0].is_success());
    assert!(results[1].is_success());
    assert_eq!(results[2].status, ToolStatus::Error);
}

struct DenyAll;

#[async_trait]
impl PermissionChecker for DenyAll {
    async fn check_tool(&self, _tool_name: &str, _args: &Value) -> PermissionVerdict {
        PermissionVerdict::Denied {
            reason: "policy".to_string(),
        }
    }
}

/// **Invariant**: a denied tool never produces `status = completed`.
#[tokio::test]
async fn denied_tool_reports_permission_denied() {
    let registry = ToolRegistry::with_permissions(Arc::new(DenyAll));
    registry.register(Arc::new(StubTool::new("Echo", "ok")));

    let result = registry.execute("Echo", json!({})).await;
    assert_eq!(result.status, ToolStatus::Error);
    assert_eq!(result.error.as_deref(), Some("Permission denied by user"));
}

/// **Invariant**: registering a server's tools and then removing them restores
/// the registry to its pre-registration observable state.
#[tokio::test]
async fn remove_server_tools_restores_registry() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(StubTool::new("Local", "here")));
    let before = registry.list_tools();

    registry.register_server_tool("srv", Arc::new(StubTool::new("mcp_srv_a", "a")));
    registry.register_server_tool("srv", Arc::new(StubTool::new("mcp_srv_b", "b")));
    assert_eq!(registry.list_tools().len(), 3);
    assert!(registry.get("mcp_srv_a").is_some());

    let removed = registry.remove_server_tools("srv");
    assert_eq!(removed, 2);
    assert_eq!(registry.list_tools(), before);
    assert!(registry.get("mcp_srv_a").is_none());
    assert!(registry.get("Local").is_some());
}

#[tokio::test]
async fn openai_function_schemas_have_function_shape() {
    let registry = ToolRegistry::new();
    registry.register(Arc::new(StubTool::new("Echo", "ok")));

    let schemas = registry.openai_function_schemas();
    assert_eq!(schemas.len(), 1);
    assert_eq!(schemas[0]["type"], "function");
    assert_eq!(schemas[0]["function"]["name"], "Echo");
    assert!(schemas[0]["function"]["parameters"].is_object());
}
