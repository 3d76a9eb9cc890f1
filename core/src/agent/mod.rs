//! Agent layer: the ReAct loop, tool-call extraction and prompt assembly.

pub mod extract;
pub mod prompt;
pub mod react;

pub use extract::{extract_tool_calls, parse_parameters};
pub use prompt::{format_context, format_tool_schemas, REACT_SYSTEM_PROMPT};
pub use react::{ActionKind, AgentAction, AgentMode, ReActAgent, ReasoningPhase};
