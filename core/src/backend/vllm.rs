//! vLLM driver: OpenAI-compatible SSE against a local vLLM server.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::VllmConfig;
use crate::error::BackendError;

use super::openai_compat::{
    build_request_body, fetch_model_list, parse_completion, post_chat, sse_response_stream,
};
use super::{
    BackendDriver, BackendInfo, BackendKind, BackendStatus, LlmRequest, ModelSwitch,
    ResponseStream,
};

const MODEL_CACHE_TTL: Duration = Duration::from_secs(300);

struct ModelCache {
    models: Vec<String>,
    fetched_at: Option<Instant>,
}

/// Driver for a local vLLM server (`http://host:port/v1`).
///
/// vLLM serves the model it was launched with; `switch_model` can only update
/// the request default, so it always reports a deferred change.
pub struct VllmDriver {
    config: VllmConfig,
    base_url: String,
    client: reqwest::Client,
    status: Mutex<BackendStatus>,
    model_cache: Mutex<ModelCache>,
    default_model: Mutex<String>,
    last_check: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl VllmDriver {
    pub fn new(config: VllmConfig) -> Self {
        let base_url = format!("http://{}:{}/v1", config.host, config.port);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .unwrap_or_default();
        let default_model = config.model.clone();
        Self {
            config,
            base_url,
            client,
            status: Mutex::new(BackendStatus::Unknown),
            model_cache: Mutex::new(ModelCache {
                models: Vec::new(),
                fetched_at: None,
            }),
            default_model: Mutex::new(default_model),
            last_check: Mutex::new(None),
        }
    }

    fn set_status(&self, status: BackendStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl BackendDriver for VllmDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Vllm
    }

    fn status(&self) -> BackendStatus {
        *self.status.lock().unwrap()
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.set_status(BackendStatus::Connecting);
        tracing::info!(host = %self.config.host, port = self.config.port, "initializing vllm backend");
        if self.health_check().await {
            self.set_status(BackendStatus::Connected);
            Ok(())
        } else {
            self.set_status(BackendStatus::Error);
            Err(BackendError::Connection(format!(
                "failed to connect to vLLM at {}",
                self.base_url
            )))
        }
    }

    async fn cleanup(&self) {
        self.set_status(BackendStatus::Disconnected);
    }

    async fn health_check(&self) -> bool {
        let healthy = match self
            .client
            .get(format!("{}/models", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "vllm health check failed");
                false
            }
        };
        self.set_status(if healthy {
            BackendStatus::Available
        } else {
            BackendStatus::Unavailable
        });
        *self.last_check.lock().unwrap() = Some(chrono::Utc::now());
        healthy
    }

    async fn list_models(&self) -> Result<Vec<String>, BackendError> {
        {
            let cache = self.model_cache.lock().unwrap();
            if let Some(at) = cache.fetched_at {
                if at.elapsed() < MODEL_CACHE_TTL && !cache.models.is_empty() {
                    return Ok(cache.models.clone());
                }
            }
        }
        let models = fetch_model_list(&self.client, &self.base_url, "vllm").await?;
        let mut cache = self.model_cache.lock().unwrap();
        cache.models = models.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(models)
    }

    async fn current_model(&self) -> Option<String> {
        Some(self.default_model.lock().unwrap().clone())
    }

    async fn switch_model(&self, model_id: &str) -> Result<ModelSwitch, BackendError> {
        // The served model is fixed at vLLM launch; only the default changes.
        *self.default_model.lock().unwrap() = model_id.to_string();
        Ok(ModelSwitch::Deferred)
    }

    async fn generate(&self, request: LlmRequest) -> Result<ResponseStream, BackendError> {
        let default_model = self.default_model.lock().unwrap().clone();
        let body = build_request_body(
            &request,
            Some(&default_model),
            Some(self.config.temperature),
            Some(self.config.max_tokens),
        )?;
        let started = Instant::now();

        tracing::debug!(messages = request.messages.len(), "sending request to vllm");

        let response = post_chat(
            &self.client,
            &self.base_url,
            "vllm",
            &body,
            self.config.timeout,
        )
        .await?;

        if !request.stream {
            let data: Value = response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse(format!("vllm: {}", e)))?;
            let terminal = parse_completion("vllm", &data, started);
            return Ok(Box::pin(futures::stream::once(async move { Ok(terminal) })));
        }

        Ok(sse_response_stream("vllm", response, started))
    }

    async fn get_info(&self) -> BackendInfo {
        let mut info = BackendInfo {
            name: "vllm".to_string(),
            kind: BackendKind::Vllm,
            host: self.config.host.clone(),
            port: self.config.port,
            model: self.current_model().await,
            status: self.status(),
            version: None,
            capabilities: Vec::new(),
            last_check: *self.last_check.lock().unwrap(),
            error_message: None,
        };
        match self.list_models().await {
            Ok(models) => {
                info.capabilities = std::iter::once(format!("models: {}", models.len()))
                    .chain(models.into_iter().take(5))
                    .collect();
            }
            Err(e) => info.error_message = Some(e.to_string()),
        }
        info
    }
}
