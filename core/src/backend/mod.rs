//! Backend abstraction: one driver per LLM provider, plus the manager that
//! discovers, health-checks, routes and fails over across them.

pub mod lm_studio;
pub mod manager;
pub mod mock;
pub mod ollama;
mod openai_compat;
pub mod openrouter;
pub mod vllm;

pub use lm_studio::LmStudioDriver;
pub use manager::{BackendManager, ModelInfo, ModelSwitch, StatusSummary};
pub use mock::{MockBehavior, MockDriver};
pub use ollama::OllamaDriver;
pub use openrouter::OpenRouterDriver;
pub use vllm::VllmDriver;

use std::collections::HashMap;
use std::pin::Pin;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BackendError;
use crate::message::Message;
use crate::tools::ToolCall;

/// Provider identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Ollama,
    LmStudio,
    Vllm,
    OpenRouter,
}

impl BackendKind {
    pub const ALL: [BackendKind; 4] = [
        BackendKind::Ollama,
        BackendKind::LmStudio,
        BackendKind::Vllm,
        BackendKind::OpenRouter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Ollama => "ollama",
            BackendKind::LmStudio => "lm_studio",
            BackendKind::Vllm => "vllm",
            BackendKind::OpenRouter => "openrouter",
        }
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(BackendKind::Ollama),
            "lm_studio" | "lmstudio" | "lm-studio" => Ok(BackendKind::LmStudio),
            "vllm" => Ok(BackendKind::Vllm),
            "openrouter" | "open_router" => Ok(BackendKind::OpenRouter),
            other => Err(format!("unknown backend type: {}", other)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend connection status. A backend whose most recent probe failed is
/// `Unavailable` or `Error` and is excluded from routing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendStatus {
    Unknown,
    Connecting,
    Connected,
    Available,
    Unavailable,
    Error,
    Disconnected,
}

/// Descriptive information about one backend instance.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BackendInfo {
    pub name: String,
    pub kind: BackendKind,
    pub host: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub status: BackendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_check: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// One generation request in the normalized shape all drivers consume.
/// Unset numeric fields inherit backend defaults.
#[derive(Clone, Debug, Default)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub tools: Option<Vec<Value>>,
    pub model: Option<String>,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f64>,
    pub stream: bool,
    pub response_format: Option<Value>,
    pub backend_params: HashMap<String, Value>,
}

/// Normalized token usage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// One element of a generation stream.
///
/// Partial chunks carry `is_partial = true` and the increment in `delta`; the
/// terminal chunk carries `finish_reason` and, when the provider reports it,
/// aggregated `usage`.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    pub content: String,
    pub delta: Option<String>,
    pub is_partial: bool,
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: Option<String>,
    pub usage: Option<Usage>,
    pub model: Option<String>,
    pub response_time: Option<f64>,
    pub backend_metadata: Map<String, Value>,
}

/// Stream of responses from one `generate` call. Dropping the stream releases
/// the underlying HTTP resources.
pub type ResponseStream = Pin<Box<dyn Stream<Item = Result<LlmResponse, BackendError>> + Send>>;

/// One provider-specific LLM adapter.
///
/// Contracts every driver honors:
/// * `initialize` leaves the status `Connected` after a successful probe and
///   releases all resources on any failure path before returning the error.
/// * `generate` yields one `is_partial` element per provider chunk plus exactly
///   one terminal element with `finish_reason` (stream=false: exactly one
///   non-partial element). Consumers may drop the stream at any point.
/// * Model caches are mutex-guarded and time-boxed; after the TTL the next
///   `list_models` re-fetches.
#[async_trait]
pub trait BackendDriver: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn name(&self) -> &str {
        self.kind().as_str()
    }

    fn status(&self) -> BackendStatus;

    async fn initialize(&self) -> Result<(), BackendError>;

    async fn cleanup(&self);

    /// One cheap liveness probe; updates the stored status.
    async fn health_check(&self) -> bool;

    async fn list_models(&self) -> Result<Vec<String>, BackendError>;

    /// The model requests default to when `LlmRequest::model` is unset.
    async fn current_model(&self) -> Option<String>;

    /// Switches the default model. Returns [`ModelSwitch::Live`] when the change
    /// takes effect immediately, [`ModelSwitch::Deferred`] when only the default
    /// was updated.
    async fn switch_model(&self, model_id: &str) -> Result<ModelSwitch, BackendError>;

    async fn generate(&self, request: LlmRequest) -> Result<ResponseStream, BackendError>;

    async fn get_info(&self) -> BackendInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_from_str_accepts_aliases() {
        assert_eq!("ollama".parse::<BackendKind>().unwrap(), BackendKind::Ollama);
        assert_eq!(
            "lm_studio".parse::<BackendKind>().unwrap(),
            BackendKind::LmStudio
        );
        assert_eq!(
            "LM-Studio".parse::<BackendKind>().unwrap(),
            BackendKind::LmStudio
        );
        assert_eq!(
            "openrouter".parse::<BackendKind>().unwrap(),
            BackendKind::OpenRouter
        );
        assert!("gpt4all".parse::<BackendKind>().is_err());
    }

    #[test]
    fn kind_serde_uses_snake_case() {
        let json = serde_json::to_value(BackendKind::LmStudio).unwrap();
        assert_eq!(json, "lm_studio");
    }
}
