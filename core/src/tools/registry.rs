//! Tool registry: name -> tool map with permission-gated execution.
//!
//! The registry is read-heavy (every turn lists schemas and resolves names);
//! writers are rare (MCP register/unregister). `DashMap` keeps readers lock-free
//! against the occasional map mutation. The permission layer is reached through
//! the [`PermissionChecker`] handle so the registry never depends on the engine
//! type directly.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Map, Value};

use crate::error::ToolError;
use crate::tools::{
    BashTool, EditTool, GlobTool, GrepTool, LsTool, MultiEditTool, ReadTool, TaskTool, Tool,
    ToolCall, ToolResult, ToolStatus, WriteTool,
};

/// Outcome of a permission check as the registry sees it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PermissionVerdict {
    Allowed,
    Denied { reason: String },
}

/// Handle into the permission layer.
///
/// Implemented by `PermissionEngine`; the registry holds it as a trait object
/// so the tool side has no compile-time dependency on the engine internals.
#[async_trait]
pub trait PermissionChecker: Send + Sync {
    async fn check_tool(&self, tool_name: &str, args: &Value) -> PermissionVerdict;
}

/// Registry of all available tools, local and MCP.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
    /// MCP tool name -> owning server name, for per-server removal.
    mcp_tools: DashMap<String, String>,
    permissions: Option<Arc<dyn PermissionChecker>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            mcp_tools: DashMap::new(),
            permissions: None,
        }
    }

    /// Registry whose execute path consults the given permission checker.
    pub fn with_permissions(checker: Arc<dyn PermissionChecker>) -> Self {
        Self {
            tools: DashMap::new(),
            mcp_tools: DashMap::new(),
            permissions: Some(checker),
        }
    }

    /// Registers a tool, replacing any existing tool of the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool is being replaced");
        } else {
            tracing::debug!(tool = %name, "registered tool");
        }
    }

    /// Registers an MCP tool adapter and records its owning server.
    pub fn register_server_tool(&self, server_name: &str, tool: Arc<dyn Tool>) {
        self.mcp_tools
            .insert(tool.name().to_string(), server_name.to_string());
        self.register(tool);
    }

    /// Removes every tool registered for `server_name`; returns how many.
    ///
    /// After removal the registry is observationally identical to its
    /// pre-registration state for those names.
    pub fn remove_server_tools(&self, server_name: &str) -> usize {
        let to_remove: Vec<String> = self
            .mcp_tools
            .iter()
            .filter(|e| e.value() == server_name)
            .map(|e| e.key().clone())
            .collect();
        for name in &to_remove {
            self.tools.remove(name);
            self.mcp_tools.remove(name);
        }
        if !to_remove.is_empty() {
            tracing::info!(
                server = server_name,
                count = to_remove.len(),
                "unregistered MCP tools"
            );
        }
        to_remove.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|e| Arc::clone(e.value()))
    }

    /// All registered tool names, sorted.
    pub fn list_tools(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Native schema map: name -> { name, description, parameters }.
    pub fn schemas(&self) -> Map<String, Value> {
        let mut out = Map::new();
        for name in self.list_tools() {
            if let Some(tool) = self.get(&name) {
                out.insert(
                    name.clone(),
                    json!({
                        "name": name,
                        "description": tool.description(),
                        "parameters": tool.schema(),
                    }),
                );
            }
        }
        out
    }

    /// Schemas in OpenAI function-calling shape.
    pub fn openai_function_schemas(&self) -> Vec<Value> {
        self.list_tools()
            .into_iter()
            .filter_map(|name| self.get(&name))
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name(),
                        "description": tool.description(),
                        "parameters": tool.schema(),
                    }
                })
            })
            .collect()
    }

    /// Executes a tool by name. Never returns `Err`: unknown names, permission
    /// denials and tool faults all become error-status results.
    pub async fn execute(&self, name: &str, args: Value) -> ToolResult {
        let Some(tool) = self.get(name) else {
            return ToolResult::error(name, format!("Tool not found: {}", name));
        };

        if let Some(checker) = &self.permissions {
            match checker.check_tool(name, &args).await {
                PermissionVerdict::Allowed => {}
                PermissionVerdict::Denied { reason } => {
                    tracing::info!(tool = name, %reason, "tool call denied");
                    return ToolResult::error(name, "Permission denied by user");
                }
            }
        }

        let start = Instant::now();
        tracing::debug!(tool = name, "executing tool");
        match tool.execute(args).await {
            Ok(output) => ToolResult {
                tool_name: name.to_string(),
                status: ToolStatus::Completed,
                result: Some(output.value),
                error: None,
                metadata: output.metadata,
                execution_time_seconds: start.elapsed().as_secs_f64(),
            },
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool failed");
                ToolResult {
                    tool_name: name.to_string(),
                    status: ToolStatus::Error,
                    result: None,
                    error: Some(e.to_string()),
                    metadata: Map::new(),
                    execution_time_seconds: start.elapsed().as_secs_f64(),
                }
            }
        }
    }

    /// Executes several calls concurrently. Result order matches input order;
    /// a failing call becomes an error result without cancelling its siblings.
    pub async fn execute_parallel(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let futures = calls.iter().map(|call| {
            let args = Value::Object(call.arguments.clone());
            self.execute(&call.name, args)
        });
        futures::future::join_all(futures).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers the built-in tool set rooted at `working_directory`.
pub fn register_default_tools(
    registry: &ToolRegistry,
    working_directory: &Path,
) -> Result<(), ToolError> {
    let root = Arc::new(working_directory.to_path_buf());
    registry.register(Arc::new(ReadTool::new(Arc::clone(&root))));
    registry.register(Arc::new(WriteTool::new(Arc::clone(&root))));
    registry.register(Arc::new(EditTool::new(Arc::clone(&root))));
    registry.register(Arc::new(MultiEditTool::new(Arc::clone(&root))));
    registry.register(Arc::new(GrepTool::new(Arc::clone(&root))));
    registry.register(Arc::new(GlobTool::new(Arc::clone(&root))));
    registry.register(Arc::new(LsTool::new(Arc::clone(&root))));
    registry.register(Arc::new(BashTool::new(Arc::clone(&root))));
    registry.register(Arc::new(TaskTool::new()));
    Ok(())
}
