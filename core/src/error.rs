//! Error taxonomy for the agent core.
//!
//! One `thiserror` enum per subsystem. Driver-level I/O faults that can be retried
//! surface to the manager ([`BackendError::is_retriable`]); tool faults convert to
//! error-status results at the registry boundary and never cross the agent as
//! errors; MCP transport faults deregister a server's tools and reach the agent
//! step as a connection-category error.

use thiserror::Error;

/// Backend (LLM provider) errors.
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("rate limit exceeded: {0}")]
    RateLimit(String),
    #[error("invalid response from backend: {0}")]
    InvalidResponse(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
    #[error("model '{model}' not found")]
    ModelNotFound {
        model: String,
        available: Vec<String>,
    },
}

impl BackendError {
    /// Whether the manager may retry this request on another driver.
    ///
    /// Connection drops, timeouts, rate limits and plain unavailability are
    /// transient; protocol violations and auth failures are not.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            BackendError::Unavailable(_)
                | BackendError::Connection(_)
                | BackendError::Timeout { .. }
                | BackendError::RateLimit(_)
        )
    }
}

/// Generation-level errors above the driver layer.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation failed: {0}")]
    Generation(String),
    #[error("tool call error: {0}")]
    ToolCall(String),
}

/// Permission-layer errors.
#[derive(Error, Debug)]
pub enum SecurityError {
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("unsafe operation: {0}")]
    UnsafeOperation(String),
    #[error("security policy violation: {0}")]
    PolicyViolation(String),
}

/// Tool execution errors. Converted to `ToolResult { status: Error, .. }` by the
/// registry; they never propagate as `Err` past it.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("tool initialization failed: {0}")]
    Init(String),
    #[error("invalid parameter: {0}")]
    Parameter(String),
    #[error("filesystem error: {0}")]
    FileSystem(String),
    #[error("shell execution failed: {0}")]
    ShellExecution(String),
    /// Faults from MCP-backed tools; the agent treats them like any tool error.
    #[error(transparent)]
    Mcp(#[from] McpError),
}

impl From<std::io::Error> for ToolError {
    fn from(e: std::io::Error) -> Self {
        ToolError::FileSystem(e.to_string())
    }
}

/// MCP plane errors.
#[derive(Error, Debug)]
pub enum McpError {
    #[error("MCP connection error: {0}")]
    Connection(String),
    #[error("MCP protocol error: {0}")]
    Protocol(String),
    #[error("MCP server error {code}: {message}")]
    Server { code: i64, message: String },
    #[error("MCP request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("MCP tool not found: {0}")]
    ToolNotFound(String),
    #[error("MCP tool execution failed: {0}")]
    ToolExecution(String),
    #[error("MCP discovery error: {0}")]
    Discovery(String),
    #[error("MCP validation error: {0}")]
    Validation(String),
}

/// Configuration loading/validation errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Renders a backend error for display: `{Kind}: {reason}\n\nTip: {guidance}`.
///
/// Known sub-kinds get actionable guidance; others render without a tip.
pub fn user_message(error: &BackendError) -> String {
    match error {
        BackendError::ModelNotFound { model, available } => {
            let mut msg = format!("Model not found: '{}' is not loaded", model);
            if !available.is_empty() {
                let shown: Vec<&str> = available.iter().take(3).map(String::as_str).collect();
                msg.push_str(&format!("\n\nTip: available models: {}", shown.join(", ")));
                if available.len() > 3 {
                    msg.push_str(&format!(" (and {} more)", available.len() - 3));
                }
            } else {
                msg.push_str(&format!("\n\nTip: try pulling '{}' first.", model));
            }
            msg
        }
        BackendError::Connection(reason) => format!(
            "Connection error: {}\n\nTip: check that the backend service is running and reachable.",
            reason
        ),
        BackendError::Timeout { seconds } => format!(
            "Timeout: request exceeded {}s\n\nTip: try a shorter prompt or raise the backend timeout.",
            seconds
        ),
        BackendError::Authentication(reason) => format!(
            "Authentication error: {}\n\nTip: verify the API key in your configuration.",
            reason
        ),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retriable_kinds() {
        assert!(BackendError::Connection("refused".into()).is_retriable());
        assert!(BackendError::Timeout { seconds: 5 }.is_retriable());
        assert!(BackendError::RateLimit("slow down".into()).is_retriable());
        assert!(!BackendError::Authentication("bad key".into()).is_retriable());
        assert!(!BackendError::InvalidResponse("garbage".into()).is_retriable());
    }

    #[test]
    fn user_message_model_not_found_lists_models() {
        let err = BackendError::ModelNotFound {
            model: "qwen3:8b".into(),
            available: vec!["a".into(), "b".into(), "c".into(), "d".into()],
        };
        let msg = user_message(&err);
        assert!(msg.contains("Tip: available models: a, b, c"));
        assert!(msg.contains("(and 1 more)"));
    }

    #[test]
    fn user_message_connection_has_tip() {
        let msg = user_message(&BackendError::Connection("refused".into()));
        assert!(msg.contains("\n\nTip:"));
        assert!(msg.contains("service is running"));
    }
}
