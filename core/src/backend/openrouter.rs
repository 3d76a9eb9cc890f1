//! OpenRouter driver: OpenAI-compatible SSE against the hosted API with
//! bearer authentication.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crate::config::OpenRouterConfig;
use crate::error::BackendError;

use super::openai_compat::{
    build_request_body, fetch_model_list, parse_completion, post_chat, sse_response_stream,
};
use super::{
    BackendDriver, BackendInfo, BackendKind, BackendStatus, LlmRequest, ModelSwitch,
    ResponseStream,
};

/// Remote catalog changes rarely; cache for ten minutes.
const MODEL_CACHE_TTL: Duration = Duration::from_secs(600);

struct ModelCache {
    models: Vec<String>,
    fetched_at: Option<Instant>,
}

/// Driver for OpenRouter (`https://openrouter.ai/api/v1` by default).
pub struct OpenRouterDriver {
    config: OpenRouterConfig,
    base_url: String,
    client: reqwest::Client,
    status: Mutex<BackendStatus>,
    model_cache: Mutex<ModelCache>,
    default_model: Mutex<String>,
    last_check: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl OpenRouterDriver {
    pub fn new(config: OpenRouterConfig) -> Result<Self, BackendError> {
        if config.api_key.trim().is_empty() {
            return Err(BackendError::Authentication(
                "OpenRouter API key is not configured".to_string(),
            ));
        }
        let base_url = config.base_url.trim_end_matches('/').to_string();
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| BackendError::Authentication(format!("invalid API key: {}", e)))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(
            "HTTP-Referer",
            HeaderValue::from_static("https://github.com/qwen-tui/qwen-tui"),
        );
        headers.insert("X-Title", HeaderValue::from_static("qwen-tui"));
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        let default_model = config.model.clone();
        Ok(Self {
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
        })
    }

    fn set_status(&self, status: BackendStatus) {
        *self.status.lock().unwrap() = status;
    }
}

#[async_trait]
impl BackendDriver for OpenRouterDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::OpenRouter
    }

    fn status(&self) -> BackendStatus {
        *self.status.lock().unwrap()
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.set_status(BackendStatus::Connecting);
        tracing::info!(base_url = %self.base_url, "initializing openrouter backend");
        if self.health_check().await {
            self.set_status(BackendStatus::Connected);
            Ok(())
        } else {
            self.set_status(BackendStatus::Error);
            Err(BackendError::Connection(format!(
                "failed to connect to OpenRouter at {}",
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
            .timeout(Duration::from_secs(15))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "openrouter health check failed");
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
        let models = fetch_model_list(&self.client, &self.base_url, "openrouter").await?;
        let mut cache = self.model_cache.lock().unwrap();
        cache.models = models.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(models)
    }

    async fn current_model(&self) -> Option<String> {
        Some(self.default_model.lock().unwrap().clone())
    }

    async fn switch_model(&self, model_id: &str) -> Result<ModelSwitch, BackendError> {
        // OpenRouter routes per request, so a default change is immediately live.
        *self.default_model.lock().unwrap() = model_id.to_string();
        Ok(ModelSwitch::Live)
    }

    async fn generate(&self, request: LlmRequest) -> Result<ResponseStream, BackendError> {
        let default_model = self.default_model.lock().unwrap().clone();
        let body = build_request_body(&request, Some(&default_model), None, None)?;
        let started = Instant::now();

        tracing::debug!(messages = request.messages.len(), "sending request to openrouter");

        let response = post_chat(
            &self.client,
            &self.base_url,
            "openrouter",
            &body,
            self.config.timeout,
        )
        .await?;

        if !request.stream {
            let data: Value = response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse(format!("openrouter: {}", e)))?;
            let terminal = parse_completion("openrouter", &data, started);
            return Ok(Box::pin(futures::stream::once(async move { Ok(terminal) })));
        }

        Ok(sse_response_stream("openrouter", response, started))
    }

    async fn get_info(&self) -> BackendInfo {
        let mut info = BackendInfo {
            name: "openrouter".to_string(),
            kind: BackendKind::OpenRouter,
            host: self.base_url.clone(),
            port: 443,
            model: self.current_model().await,
            status: self.status(),
            version: None,
            capabilities: Vec::new(),
            last_check: *self.last_check.lock().unwrap(),
            error_message: None,
        };
        match self.list_models().await {
            Ok(models) => {
                info.capabilities = vec![format!("models: {}", models.len())];
            }
            Err(e) => info.error_message = Some(e.to_string()),
        }
        info
    }
}
