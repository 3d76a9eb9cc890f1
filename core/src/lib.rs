//! # qwen-tui-core
//!
//! Agent core for a local coding assistant: routes one conversational
//! interface to any of several LLM providers, augments it with a tool-using
//! ReAct agent, and protects the host through a risk-based permission layer.
//!
//! ## Main modules
//!
//! - [`backend`]: [`BackendDriver`] trait and the four provider drivers
//!   (Ollama JSON-lines, LM Studio / vLLM / OpenRouter SSE), plus
//!   [`BackendManager`] for discovery, health monitoring, routing and
//!   failover.
//! - [`tools`]: the [`Tool`](tools::Tool) contract, [`ToolRegistry`] with
//!   permission-gated execution, and the built-in tool set (Read, Write,
//!   Edit, MultiEdit, Grep, Glob, LS, Bash, Task).
//! - [`permissions`]: command and file-access classifiers, the
//!   [`PermissionEngine`] with YOLO bypass, persistent preferences, prompt
//!   deduplication and the audit log.
//! - [`agent`]: [`ReActAgent`] turn loop, tool-call recognizers and prompt
//!   assembly; events stream as [`AgentEvent`].
//! - [`thinking`]: the `<think>` filter, whole-string and streaming.
//! - [`mcp`]: JSON-RPC-2.0-over-WebSocket client, tool adapter and the
//!   discovery service that mirrors remote tools into the registry.
//! - [`session`]: append-only conversation log with JSON persistence.
//! - [`config`]: typed configuration with `QWEN_TUI_*` environment overrides.
//! - [`error`]: the error taxonomy shared by all of the above.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use qwen_tui_core::{
//!     register_default_tools, BackendManager, Config, PermissionEngine, ReActAgent,
//!     ToolRegistry,
//! };
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = Config::load().unwrap_or_default();
//! let manager = Arc::new(BackendManager::new(config));
//! manager.initialize().await;
//!
//! let working_dir = std::env::current_dir().unwrap();
//! let permissions = Arc::new(PermissionEngine::new(&working_dir));
//! let registry = Arc::new(ToolRegistry::with_permissions(permissions));
//! register_default_tools(&registry, &working_dir).unwrap();
//!
//! let agent = ReActAgent::new(Arc::clone(&manager), Arc::clone(&registry), working_dir);
//! let stream = agent.send_message("list the files in this project");
//! futures::pin_mut!(stream);
//! while let Some(event) = stream.next().await {
//!     println!("{:?}", event);
//! }
//! # }
//! ```

pub mod agent;
pub mod backend;
pub mod config;
pub mod error;
pub mod mcp;
pub mod message;
pub mod permissions;
pub mod session;
pub mod stream;
pub mod thinking;
pub mod tools;

pub use agent::{ActionKind, AgentAction, AgentMode, ReActAgent, ReasoningPhase};
pub use backend::{
    BackendDriver, BackendInfo, BackendKind, BackendManager, BackendStatus, LlmRequest,
    LlmResponse, LmStudioDriver, MockBehavior, MockDriver, ModelInfo, ModelSwitch, OllamaDriver,
    OpenRouterDriver, ResponseStream, Usage, VllmDriver,
};
pub use config::{Config, SecurityProfile};
pub use error::{user_message, BackendError, ConfigError, LlmError, McpError, SecurityError, ToolError};
pub use mcp::{
    McpClient, McpDiscovery, McpServerConfig, McpServerState, McpServerStatus, McpTool,
    McpToolAdapter, RegistryMutator,
};
pub use message::{Message, Role};
pub use permissions::{
    CommandClassifier, DecisionHandler, FileAccessClassifier, FileOperation, PermissionAction,
    PermissionEngine, PermissionRequest, PreferenceChoice, PromptDecision, RiskAssessment,
    RiskLevel,
};
pub use session::{Session, SessionStore};
pub use stream::AgentEvent;
pub use thinking::{filter_thinking, FilterDelta, StreamingThinkFilter};
pub use tools::{
    register_default_tools, PermissionChecker, PermissionVerdict, Tool, ToolCall, ToolRegistry,
    ToolResult, ToolStatus,
};

/// When running `cargo test`, initializes tracing from `RUST_LOG` so unit
/// tests in `src/**` can print logs with `--nocapture`.
#[cfg(test)]
mod test_logging {
    use ctor::ctor;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::Layer;

    #[ctor]
    fn init() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        let _ = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_test_writer()
                    .with_filter(filter),
            )
            .try_init();
    }
}
