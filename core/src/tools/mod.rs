//! Tool system: the [`Tool`] contract, result types, and the built-in tool set.
//!
//! Tools are registered with [`ToolRegistry`](crate::tools::ToolRegistry) under
//! their display name (the same names the permission coordinator dispatches on).
//! MCP remote tools enter the same registry through
//! [`McpToolAdapter`](crate::mcp::McpToolAdapter).

pub mod bash;
pub mod file;
mod registry;
pub mod task;
mod r#trait;

pub use bash::{BashTool, TOOL_BASH};
pub use file::{
    EditTool, GlobTool, GrepTool, LsTool, MultiEditTool, ReadTool, WriteTool, TOOL_EDIT,
    TOOL_GLOB, TOOL_GREP, TOOL_LS, TOOL_MULTI_EDIT, TOOL_READ, TOOL_WRITE,
};
pub use registry::{register_default_tools, PermissionChecker, PermissionVerdict, ToolRegistry};
pub use r#trait::Tool;
pub use task::{TaskTool, TOOL_TASK};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One tool invocation requested by the model. `id` is unique within a turn;
/// `name` resolves against the registry at execution time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Status of one tool execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolStatus {
    Pending,
    Running,
    Completed,
    Error,
    Cancelled,
}

/// Result of one tool execution as seen by the agent.
///
/// A result is a *success* iff `status == Completed && error.is_none()`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_name: String,
    pub status: ToolStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub execution_time_seconds: f64,
}

impl ToolResult {
    pub fn is_success(&self) -> bool {
        self.status == ToolStatus::Completed && self.error.is_none()
    }

    pub fn error(tool_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            status: ToolStatus::Error,
            result: None,
            error: Some(error.into()),
            metadata: Map::new(),
            execution_time_seconds: 0.0,
        }
    }
}

/// What a tool returns on success: a result value plus free-form metadata that
/// the registry folds into the [`ToolResult`].
#[derive(Clone, Debug, Default)]
pub struct ToolOutput {
    pub value: Value,
    pub metadata: Map<String, Value>,
}

impl ToolOutput {
    /// Plain-text output.
    pub fn text(s: impl Into<String>) -> Self {
        Self {
            value: Value::String(s.into()),
            metadata: Map::new(),
        }
    }

    /// Structured output.
    pub fn json(value: Value) -> Self {
        Self {
            value,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
