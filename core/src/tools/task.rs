//! Task tool: structured delegation placeholder.
//!
//! Validates the request shape and returns an acknowledgement. Actual sub-agent
//! spawning lives above the core and is intentionally not wired here.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

/// Tool name for task delegation.
pub const TOOL_TASK: &str = "Task";

const MAX_DESCRIPTION_LEN: usize = 100;
const MIN_PROMPT_LEN: usize = 10;

/// Validates `description` (<= 100 chars) and `prompt` (>= 10 chars) and
/// returns a summary of the delegated task.
pub struct TaskTool;

impl TaskTool {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TaskTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for TaskTool {
    fn name(&self) -> &str {
        TOOL_TASK
    }

    fn description(&self) -> &str {
        "Delegate a focused sub-task"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": {
                    "type": "string",
                    "description": "Short description of the task (3-5 words)",
                    "maxLength": MAX_DESCRIPTION_LEN
                },
                "prompt": {
                    "type": "string",
                    "description": "Detailed instructions for the delegated task",
                    "minLength": MIN_PROMPT_LEN
                }
            },
            "required": ["description", "prompt"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let description = args
            .get("description")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing description".to_string()))?;
        let prompt = args
            .get("prompt")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing prompt".to_string()))?;

        if description.chars().count() > MAX_DESCRIPTION_LEN {
            return Err(ToolError::Parameter(format!(
                "description too long ({} chars, max {})",
                description.chars().count(),
                MAX_DESCRIPTION_LEN
            )));
        }
        if prompt.chars().count() < MIN_PROMPT_LEN {
            return Err(ToolError::Parameter(format!(
                "prompt too short ({} chars, min {})",
                prompt.chars().count(),
                MIN_PROMPT_LEN
            )));
        }

        Ok(ToolOutput::text(format!(
            "Task accepted: {}\n\nThe task has been noted for delegation. Prompt length: {} chars.",
            description,
            prompt.chars().count()
        ))
        .with_metadata("description", Value::String(description.to_string())))
    }
}
