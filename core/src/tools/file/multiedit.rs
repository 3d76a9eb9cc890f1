//! MultiEdit tool: several find-and-replace operations on one file, atomically.
//!
//! Edits apply in order against the in-memory content; the file is written once
//! at the end. If any edit fails, nothing is written and the file on disk is
//! unchanged.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

use super::edit::replace;
use super::path::resolve_path;

/// Tool name for multi-edit.
pub const TOOL_MULTI_EDIT: &str = "MultiEdit";

/// Applies a sequence of Edit operations in one call (all-or-nothing).
pub struct MultiEditTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl MultiEditTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

#[async_trait]
impl Tool for MultiEditTool {
    fn name(&self) -> &str {
        TOOL_MULTI_EDIT
    }

    fn description(&self) -> &str {
        "Apply multiple exact-string edits to one file atomically"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to edit"
                },
                "edits": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "old_string": { "type": "string" },
                            "new_string": { "type": "string" },
                            "replace_all": { "type": "boolean", "default": false }
                        },
                        "required": ["old_string", "new_string"]
                    },
                    "description": "Edits applied in order; if any fails the file is unchanged"
                }
            },
            "required": ["file_path", "edits"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let file_path = args
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing file_path".to_string()))?;
        let edits = args
            .get("edits")
            .and_then(|v| v.as_array())
            .ok_or_else(|| ToolError::Parameter("missing or invalid edits array".to_string()))?;
        if edits.is_empty() {
            return Err(ToolError::Parameter("edits must not be empty".to_string()));
        }

        let path = resolve_path(&self.working_directory, file_path)?;
        let mut content = std::fs::read_to_string(&path)
            .map_err(|e| ToolError::FileSystem(format!("failed to read file: {}", e)))?;

        let mut total = 0usize;
        for (i, edit) in edits.iter().enumerate() {
            let obj = edit
                .as_object()
                .ok_or_else(|| ToolError::Parameter("each edit must be an object".to_string()))?;
            let old_string = obj
                .get("old_string")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    ToolError::Parameter(format!("edit {}: missing old_string", i + 1))
                })?;
            let new_string = obj
                .get("new_string")
                .and_then(|v| v.as_str())
                .ok_or_else(|| {
                    ToolError::Parameter(format!("edit {}: missing new_string", i + 1))
                })?;
            let replace_all = obj
                .get("replace_all")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);

            let (next, count) = replace(&content, old_string, new_string, replace_all)
                .map_err(|e| ToolError::Parameter(format!("edit {}: {}", i + 1, e)))?;
            content = next;
            total += count;
        }

        std::fs::write(&path, &content)
            .map_err(|e| ToolError::FileSystem(format!("failed to write file: {}", e)))?;

        Ok(ToolOutput::text(format!(
            "Applied {} edit(s) ({} replacement(s)) to {}",
            edits.len(),
            total,
            path.display()
        ))
        .with_metadata("edits_applied", json!(edits.len()))
        .with_metadata("replacements", json!(total)))
    }
}
