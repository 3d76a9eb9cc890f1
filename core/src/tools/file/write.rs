//! Write tool: create or overwrite a file.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

use super::path::resolve_path;

/// Tool name for writing a file.
pub const TOOL_WRITE: &str = "Write";

/// Writes content to a path, optionally creating parent directories.
/// Reports whether an existing file was overwritten and its original size.
pub struct WriteTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl WriteTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

#[async_trait]
impl Tool for WriteTool {
    fn name(&self) -> &str {
        TOOL_WRITE
    }

    fn description(&self) -> &str {
        "Write content to a file, creating or overwriting it"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write"
                },
                "create_dirs": {
                    "type": "boolean",
                    "description": "Create missing parent directories",
                    "default": false
                }
            },
            "required": ["file_path", "content"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let file_path = args
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing file_path".to_string()))?;
        let content = args
            .get("content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing content".to_string()))?;
        let create_dirs = args
            .get("create_dirs")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let path = resolve_path(&self.working_directory, file_path)?;
        if path.is_dir() {
            return Err(ToolError::Parameter(format!(
                "path is a directory: {}",
                path.display()
            )));
        }

        let (overwrite, original_size) = match std::fs::metadata(&path) {
            Ok(meta) => (true, meta.len()),
            Err(_) => (false, 0),
        };

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if create_dirs {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        ToolError::FileSystem(format!("failed to create parent dirs: {}", e))
                    })?;
                } else {
                    return Err(ToolError::FileSystem(format!(
                        "parent directory does not exist: {} (set create_dirs to create it)",
                        parent.display()
                    )));
                }
            }
        }

        std::fs::write(&path, content)
            .map_err(|e| ToolError::FileSystem(format!("failed to write file: {}", e)))?;

        let message = if overwrite {
            format!(
                "Overwrote {} ({} bytes written, was {} bytes)",
                path.display(),
                content.len(),
                original_size
            )
        } else {
            format!("Created {} ({} bytes written)", path.display(), content.len())
        };

        Ok(ToolOutput::text(message)
            .with_metadata("overwrite", Value::Bool(overwrite))
            .with_metadata("original_size", json!(original_size))
            .with_metadata("bytes_written", json!(content.len())))
    }
}
