//! Bash tool: run a shell command in a subprocess with a timeout.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::process::Command;

use crate::error::ToolError;
use crate::tools::{Tool, ToolOutput};

/// Tool name for shell execution.
pub const TOOL_BASH: &str = "Bash";

const DEFAULT_TIMEOUT_SECS: f64 = 120.0;
const MAX_TIMEOUT_SECS: f64 = 600.0;

/// Spawns `bash -c <command>` pinned to the working directory.
///
/// The child inherits the process environment plus optional `env` overrides.
/// Stdout is the result; stderr is appended under an `STDERR:` header when
/// non-empty. Non-zero exit and timeouts become error results; on timeout the
/// child is killed and reaped.
pub struct BashTool {
    working_directory: Arc<std::path::PathBuf>,
}

impl BashTool {
    pub fn new(working_directory: Arc<std::path::PathBuf>) -> Self {
        Self { working_directory }
    }
}

#[async_trait]
impl Tool for BashTool {
    fn name(&self) -> &str {
        TOOL_BASH
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its output"
    }

    fn schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "number",
                    "description": "Timeout in seconds (max 600)",
                    "maximum": MAX_TIMEOUT_SECS,
                    "default": DEFAULT_TIMEOUT_SECS
                },
                "description": {
                    "type": "string",
                    "description": "Short description of what this command does"
                },
                "env": {
                    "type": "object",
                    "description": "Extra environment variables for the command",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let command = args
            .get("command")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ToolError::Parameter("missing command".to_string()))?;
        let timeout_secs = args
            .get("timeout")
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_TIMEOUT_SECS)
            .min(MAX_TIMEOUT_SECS);
        if timeout_secs <= 0.0 {
            return Err(ToolError::Parameter("timeout must be positive".to_string()));
        }

        let mut cmd = Command::new("bash");
        cmd.arg("-c")
            .arg(command)
            .current_dir(self.working_directory.as_ref())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(env) = args.get("env").and_then(|v| v.as_object()) {
            for (key, value) in env {
                if let Some(v) = value.as_str() {
                    cmd.env(key, v);
                }
            }
        }

        tracing::debug!(%command, timeout = timeout_secs, "running shell command");

        let mut child = cmd
            .spawn()
            .map_err(|e| ToolError::ShellExecution(format!("failed to spawn: {}", e)))?;

        let output = match tokio::time::timeout(
            Duration::from_secs_f64(timeout_secs),
            child.wait_with_output(),
        )
        .await
        {
            Ok(result) => {
                result.map_err(|e| ToolError::ShellExecution(format!("wait failed: {}", e)))?
            }
            Err(_) => {
                // kill_on_drop reaps the child once the future is dropped.
                return Err(ToolError::ShellExecution(format!(
                    "command timed out after {}s",
                    timeout_secs
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        let mut text = stdout;
        if !stderr.trim().is_empty() {
            if !text.is_empty() && !text.ends_with('\n') {
                text.push('\n');
            }
            text.push_str(&format!("STDERR:\n{}", stderr));
        }

        let exit_code = output.status.code().unwrap_or(-1);
        if !output.status.success() {
            return Err(ToolError::ShellExecution(format!(
                "command failed with exit code {}\n{}",
                exit_code, text
            )));
        }

        Ok(ToolOutput::text(text).with_metadata("exit_code", json!(exit_code)))
    }
}
