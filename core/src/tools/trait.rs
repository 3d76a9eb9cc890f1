use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;
use crate::tools::ToolOutput;

/// A single tool callable by the agent.
///
/// Each tool has a unique name, a description shown to the model, a JSON schema
/// for its arguments, and the call logic. Tools are registered with
/// [`ToolRegistry`](crate::tools::ToolRegistry), which gates every call through
/// the permission layer and wraps the outcome into a
/// [`ToolResult`](crate::tools::ToolResult).
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use serde_json::Value;
/// use qwen_tui_core::error::ToolError;
/// use qwen_tui_core::tools::{Tool, ToolOutput};
///
/// struct EchoTool;
///
/// #[async_trait]
/// impl Tool for EchoTool {
///     fn name(&self) -> &str {
///         "Echo"
///     }
///
///     fn description(&self) -> &str {
///         "Echoes its input back"
///     }
///
///     fn schema(&self) -> Value {
///         serde_json::json!({
///             "type": "object",
///             "properties": { "text": { "type": "string" } },
///             "required": ["text"]
///         })
///     }
///
///     async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
///         let text = args.get("text").and_then(|v| v.as_str()).unwrap_or_default();
///         Ok(ToolOutput::text(text))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name of this tool; also the permission-dispatch key.
    fn name(&self) -> &str;

    /// One-line description for prompt and schema blocks.
    fn description(&self) -> &str;

    /// JSON-Schema for the tool arguments.
    ///
    /// Used by the registry for the native and OpenAI-function schema
    /// enumerations and by the agent's tool block.
    fn schema(&self) -> Value;

    /// Executes the tool with the given arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError`] for invalid arguments, filesystem faults, or shell
    /// failures. The registry converts errors to error-status results; tools do
    /// not need to catch their own faults.
    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError>;
}
