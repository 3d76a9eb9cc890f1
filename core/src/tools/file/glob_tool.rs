//! Glob tool: find files by name pattern.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

use super::path::resolve_path;

/// Tool name for file-pattern search.
pub const TOOL_GLOB: &str = "Glob";

const DEFAULT_MAX_RESULTS: usize = 200;

/// Matches a glob pattern under a root directory, newest files first.
pub struct GlobTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl GlobTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

fn file_mtime(path: &std::path::Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

#[async_trait]
impl Tool for GlobTool {
    fn name(&self) -> &str {
        TOOL_GLOB
    }

    fn description(&self) -> &str {
        "Find files matching a glob pattern"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "pattern": {
                    "type": "string",
                    "description": "Glob pattern, e.g. **/*.rs"
                },
                "path": {
                    "type": "string",
                    "description": "Root directory (default: working directory)"
                },
                "max_results": {
                    "type": "integer",
                    "description": "Maximum number of paths returned",
                    "minimum": 1,
                    "default": DEFAULT_MAX_RESULTS
                }
            },
            "required": ["pattern"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let pattern = args
            .get("pattern")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing pattern".to_string()))?;
        let raw_path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let root = resolve_path(&self.working_directory, raw_path)?;
        if !root.is_dir() {
            return Err(ToolError::FileSystem(format!(
                "not a directory: {}",
                root.display()
            )));
        }
        let max_results = args
            .get("max_results")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_RESULTS);

        let full_pattern = root.join(pattern);
        let full_pattern = full_pattern.to_string_lossy();
        let mut matches: Vec<PathBuf> = glob::glob(&full_pattern)
            .map_err(|e| ToolError::Parameter(format!("invalid glob '{}': {}", pattern, e)))?
            .filter_map(Result::ok)
            .collect();

        let total = matches.len();
        matches.sort_by_key(|p| std::cmp::Reverse(file_mtime(p)));
        matches.truncate(max_results);

        let lines: Vec<String> = matches
            .iter()
            .map(|p| {
                p.strip_prefix(&root)
                    .unwrap_or(p)
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let text = if lines.is_empty() {
            format!("No files matching pattern: {}", pattern)
        } else {
            lines.join("\n")
        };

        Ok(ToolOutput::text(text)
            .with_metadata("total_matches", json!(total))
            .with_metadata("returned", json!(lines.len()))
            .with_metadata("truncated", json!(total > max_results)))
    }
}
