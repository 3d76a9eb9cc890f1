//! Event types streamed from the agent to the UI for one turn.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tools::ToolStatus;

/// One chunk of a turn as the UI sees it. Internal reasoning never appears in
/// the `Visible` channel; it is summarized through `Thinking` previews.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// User-visible assistant text (incremental).
    Visible { text: String },
    /// Short preview of in-progress internal reasoning.
    Thinking { preview: String },
    /// Tool execution progress.
    ToolProgress {
        tool: String,
        status: ToolStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        parameters: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
}

impl AgentEvent {
    pub fn visible(text: impl Into<String>) -> Self {
        AgentEvent::Visible { text: text.into() }
    }

    pub fn thinking(preview: impl Into<String>) -> Self {
        AgentEvent::Thinking {
            preview: preview.into(),
        }
    }
}
