//! Read tool: UTF-8 file contents with `cat -n` style line numbers.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

use super::path::resolve_path;

/// Tool name for reading a file.
pub const TOOL_READ: &str = "Read";

const DEFAULT_READ_LIMIT: usize = 2000;
const MAX_LINE_LENGTH: usize = 2000;

/// Reads a UTF-8 file with optional 1-based `offset` and `limit`.
///
/// Lines longer than 2000 characters are truncated with an ellipsis. Reading
/// past EOF succeeds with empty content and an explanatory metadata message.
pub struct ReadTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl ReadTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

#[async_trait]
impl Tool for ReadTool {
    fn name(&self) -> &str {
        TOOL_READ
    }

    fn description(&self) -> &str {
        "Read a file from the filesystem with line numbers"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path to the file (relative to the working directory or absolute)"
                },
                "offset": {
                    "type": "integer",
                    "description": "1-based line number to start reading from",
                    "minimum": 1
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of lines to read (default 2000)",
                    "minimum": 1,
                    "default": DEFAULT_READ_LIMIT
                }
            },
            "required": ["file_path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let file_path = args
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing file_path".to_string()))?;
        let path = resolve_path(&self.working_directory, file_path)?;

        if !path.exists() {
            return Err(ToolError::FileSystem(format!(
                "file not found: {}",
                path.display()
            )));
        }
        if path.is_dir() {
            return Err(ToolError::Parameter(format!(
                "is a directory, not a file: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ToolError::FileSystem(format!("failed to read file: {}", e)))?;

        let offset = args
            .get("offset")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(1)
            .max(1);
        let limit = args
            .get("limit")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_READ_LIMIT);

        let lines: Vec<&str> = content.lines().collect();
        if offset > lines.len() {
            return Ok(ToolOutput::text("").with_metadata(
                "message",
                Value::String("Offset beyond end of file".to_string()),
            ));
        }

        let start = offset - 1;
        let end = (start + limit).min(lines.len());
        let mut out = String::new();
        for (i, line) in lines[start..end].iter().enumerate() {
            let truncated = if line.len() > MAX_LINE_LENGTH {
                // Truncate on a char boundary; long lines are usually minified blobs.
                let cut = line
                    .char_indices()
                    .take_while(|(idx, _)| *idx < MAX_LINE_LENGTH)
                    .last()
                    .map(|(idx, c)| idx + c.len_utf8())
                    .unwrap_or(0);
                format!("{}...", &line[..cut])
            } else {
                (*line).to_string()
            };
            out.push_str(&format!("{:6}\t{}\n", start + i + 1, truncated));
        }

        Ok(ToolOutput::text(out)
            .with_metadata("total_lines", json!(lines.len()))
            .with_metadata("lines_returned", json!(end - start)))
    }
}
