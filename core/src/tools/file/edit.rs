//! Edit tool: exact literal find-and-replace in one file.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

use super::path::resolve_path;

/// Tool name for editing a file.
pub const TOOL_EDIT: &str = "Edit";

/// Replaces an exact literal substring.
///
/// With `replace_all = false` the target must occur exactly once; multiple
/// occurrences fail with an "appears N times" error so the caller can
/// disambiguate.
pub struct EditTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl EditTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

/// Applies one replacement to `content`. Shared with MultiEdit.
pub(crate) fn replace(
    content: &str,
    old_string: &str,
    new_string: &str,
    replace_all: bool,
) -> Result<(String, usize), ToolError> {
    if old_string.is_empty() {
        return Err(ToolError::Parameter(
            "old_string must not be empty".to_string(),
        ));
    }
    if old_string == new_string {
        return Err(ToolError::Parameter(
            "old_string and new_string must differ".to_string(),
        ));
    }
    let occurrences = content.matches(old_string).count();
    if occurrences == 0 {
        return Err(ToolError::Parameter(format!(
            "old_string not found in file: {:?}",
            truncate_for_error(old_string)
        )));
    }
    if occurrences > 1 && !replace_all {
        return Err(ToolError::Parameter(format!(
            "old_string appears {} times; pass replace_all=true or make it unique",
            occurrences
        )));
    }
    let (new_content, count) = if replace_all {
        (content.replace(old_string, new_string), occurrences)
    } else {
        (content.replacen(old_string, new_string, 1), 1)
    };
    Ok((new_content, count))
}

fn truncate_for_error(s: &str) -> String {
    if s.len() > 80 {
        let cut = s
            .char_indices()
            .take_while(|(idx, _)| *idx < 80)
            .last()
            .map(|(idx, c)| idx + c.len_utf8())
            .unwrap_or(0);
        format!("{}...", &s[..cut])
    } else {
        s.to_string()
    }
}

#[async_trait]
impl Tool for EditTool {
    fn name(&self) -> &str {
        TOOL_EDIT
    }

    fn description(&self) -> &str {
        "Replace an exact string in a file"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "file_path": {
                    "type": "string",
                    "description": "Path of the file to edit"
                },
                "old_string": {
                    "type": "string",
                    "description": "Exact text to replace"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text"
                },
                "replace_all": {
                    "type": "boolean",
                    "description": "Replace every occurrence instead of requiring a unique match",
                    "default": false
                }
            },
            "required": ["file_path", "old_string", "new_string"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let file_path = args
            .get("file_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing file_path".to_string()))?;
        let old_string = args
            .get("old_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing old_string".to_string()))?;
        let new_string = args
            .get("new_string")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing new_string".to_string()))?;
        let replace_all = args
            .get("replace_all")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        let path = resolve_path(&self.working_directory, file_path)?;
        let content = std::fs::read_to_string(&path)
            .map_err(|e| ToolError::FileSystem(format!("failed to read file: {}", e)))?;

        let (new_content, count) = replace(&content, old_string, new_string, replace_all)?;

        std::fs::write(&path, &new_content)
            .map_err(|e| ToolError::FileSystem(format!("failed to write file: {}", e)))?;

        Ok(
            ToolOutput::text(format!("Replaced {} occurrence(s) in {}", count, path.display()))
                .with_metadata("replacements", json!(count)),
        )
    }
}
