//! Mock backend driver for tests and demos.
//!
//! Scripted behaviors: stream a fixed token sequence, fail before the first
//! byte, or fail mid-stream. Used by manager failover tests and agent tests
//! that need a deterministic model.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::BackendError;
use crate::tools::ToolCall;

use super::{
    BackendDriver, BackendInfo, BackendKind, BackendStatus, LlmRequest, LlmResponse, ModelSwitch,
    ResponseStream,
};

/// What a [`MockDriver`] does when `generate` is called.
#[derive(Clone, Debug)]
pub enum MockBehavior {
    /// Stream each token as a partial chunk, then a terminal element.
    StreamTokens(Vec<String>),
    /// Stream tokens, then a terminal element carrying these tool calls.
    StreamThenToolCalls(Vec<String>, Vec<ToolCall>),
    /// Fail before producing any output.
    FailOnStart(String),
    /// Yield one partial token, then raise.
    FailMidStream(String),
}

/// Deterministic driver with a scripted [`MockBehavior`].
pub struct MockDriver {
    kind: BackendKind,
    behavior: MockBehavior,
    models: Vec<String>,
    /// Number of `generate` calls observed; tests assert on routing with this.
    pub generate_calls: AtomicUsize,
    status: Mutex<BackendStatus>,
}

impl MockDriver {
    pub fn new(kind: BackendKind, behavior: MockBehavior) -> Self {
        Self {
            kind,
            behavior,
            models: vec!["mock-model".to_string()],
            generate_calls: AtomicUsize::new(0),
            status: Mutex::new(BackendStatus::Available),
        }
    }

    /// Convenience: stream the given tokens then stop.
    pub fn streaming(kind: BackendKind, tokens: &[&str]) -> Self {
        Self::new(
            kind,
            MockBehavior::StreamTokens(tokens.iter().map(|t| t.to_string()).collect()),
        )
    }

    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    pub fn with_status(self, status: BackendStatus) -> Self {
        *self.status.lock().unwrap() = status;
        self
    }

    fn partial(delta: &str, accumulated: &str) -> LlmResponse {
        LlmResponse {
            content: accumulated.to_string(),
            delta: Some(delta.to_string()),
            is_partial: true,
            ..Default::default()
        }
    }

    fn terminal(content: &str, tool_calls: Option<Vec<ToolCall>>) -> LlmResponse {
        LlmResponse {
            content: content.to_string(),
            is_partial: false,
            tool_calls,
            finish_reason: Some("stop".to_string()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl BackendDriver for MockDriver {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn status(&self) -> BackendStatus {
        *self.status.lock().unwrap()
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        *self.status.lock().unwrap() = BackendStatus::Connected;
        Ok(())
    }

    async fn cleanup(&self) {
        *self.status.lock().unwrap() = BackendStatus::Disconnected;
    }

    async fn health_check(&self) -> bool {
        *self.status.lock().unwrap() = BackendStatus::Available;
        true
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.models.clone())
    }

    async fn current_model(&self) -> Option<String> {
        self.models.first().cloned()
    }

    async fn switch_model(&self, _model_id: &str) -> Result<ModelSwitch, BackendError> {
        Ok(ModelSwitch::Live)
    }

    async fn generate(&self, _request: LlmRequest) -> Result<ResponseStream, BackendError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior.clone() {
            MockBehavior::StreamTokens(tokens) => {
                let stream = async_stream::stream! {
                    let mut accumulated = String::new();
                    for token in &tokens {
                        accumulated.push_str(token);
                        yield Ok(Self::partial(token, &accumulated));
                    }
                    yield Ok(Self::terminal(&accumulated, None));
                };
                Ok(Box::pin(stream))
            }
            MockBehavior::StreamThenToolCalls(tokens, calls) => {
                let stream = async_stream::stream! {
                    let mut accumulated = String::new();
                    for token in &tokens {
                        accumulated.push_str(token);
                        yield Ok(Self::partial(token, &accumulated));
                    }
                    yield Ok(Self::terminal(&accumulated, Some(calls.clone())));
                };
                Ok(Box::pin(stream))
            }
            MockBehavior::FailOnStart(message) => Err(BackendError::Connection(message)),
            MockBehavior::FailMidStream(message) => {
                let stream = async_stream::stream! {
                    yield Ok(Self::partial("partial", "partial"));
                    yield Err(BackendError::Connection(message.clone()));
                };
                Ok(Box::pin(stream))
            }
        }
    }

    async fn get_info(&self) -> BackendInfo {
        BackendInfo {
            name: self.kind.to_string(),
            kind: self.kind,
            host: "mock".to_string(),
            port: 0,
            model: self.current_model().await,
            status: self.status(),
            version: None,
            capabilities: Vec::new(),
            last_check: None,
            error_message: None,
        }
    }
}
