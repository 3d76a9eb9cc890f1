//! LS tool: directory listing with optional bounded recursion.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

use super::path::resolve_path;

/// Tool name for listing a directory.
pub const TOOL_LS: &str = "LS";

const DEFAULT_MAX_DEPTH: usize = 3;

/// Lists a directory. `recursive` descends up to `max_depth` levels (default 3);
/// `ignore` takes glob patterns; hidden entries are skipped unless `show_hidden`.
pub struct LsTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl LsTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with('.'))
        .unwrap_or(false)
}

fn matches_ignore(path: &Path, patterns: &[glob::Pattern]) -> bool {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    patterns.iter().any(|p| p.matches(name))
}

fn list_directory(
    dir: &Path,
    depth: usize,
    max_depth: usize,
    show_hidden: bool,
    ignore: &[glob::Pattern],
    recursive: bool,
    out: &mut String,
    entries_seen: &mut usize,
) -> Result<(), ToolError> {
    let mut entries: Vec<std::fs::DirEntry> = std::fs::read_dir(dir)
        .map_err(|e| ToolError::FileSystem(format!("failed to read directory: {}", e)))?
        .filter_map(Result::ok)
        .collect();
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !show_hidden && is_hidden(&path) {
            continue;
        }
        if matches_ignore(&path, ignore) {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let indent = "  ".repeat(depth);
        if path.is_dir() {
            out.push_str(&format!("{}{}/\n", indent, name));
            *entries_seen += 1;
            if recursive && depth + 1 < max_depth {
                list_directory(
                    &path,
                    depth + 1,
                    max_depth,
                    show_hidden,
                    ignore,
                    recursive,
                    out,
                    entries_seen,
                )?;
            }
        } else {
            out.push_str(&format!("{}{}\n", indent, name));
            *entries_seen += 1;
        }
    }
    Ok(())
}

#[async_trait]
impl Tool for LsTool {
    fn name(&self) -> &str {
        TOOL_LS
    }

    fn description(&self) -> &str {
        "List directory contents, optionally recursive"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Directory to list (default: working directory)"
                },
                "recursive": {
                    "type": "boolean",
                    "description": "Descend into subdirectories",
                    "default": false
                },
                "max_depth": {
                    "type": "integer",
                    "description": "Maximum recursion depth",
                    "minimum": 1,
                    "default": DEFAULT_MAX_DEPTH
                },
                "ignore": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Glob patterns for entries to skip"
                },
                "show_hidden": {
                    "type": "boolean",
                    "description": "Include dotfiles",
                    "default": false
                }
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let raw_path = args.get("path").and_then(|v| v.as_str()).unwrap_or(".");
        let path = resolve_path(&self.working_directory, raw_path)?;
        if !path.is_dir() {
            return Err(ToolError::Parameter(format!(
                "not a directory: {}",
                path.display()
            )));
        }

        let recursive = args
            .get("recursive")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let max_depth = args
            .get("max_depth")
            .and_then(|v| v.as_u64())
            .map(|n| n as usize)
            .unwrap_or(DEFAULT_MAX_DEPTH)
            .max(1);
        let show_hidden = args
            .get("show_hidden")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        let ignore: Vec<glob::Pattern> = args
            .get("ignore")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter_map(|s| glob::Pattern::new(s).ok())
                    .collect()
            })
            .unwrap_or_default();

        let mut out = format!("{}/\n", path.display());
        let mut entries_seen = 0usize;
        list_directory(
            &path,
            0,
            max_depth,
            show_hidden,
            &ignore,
            recursive,
            &mut out,
            &mut entries_seen,
        )?;

        Ok(ToolOutput::text(out).with_metadata("entries", json!(entries_seen)))
    }
}
