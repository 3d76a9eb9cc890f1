//! LM Studio driver: OpenAI-compatible SSE with a mutable "current model".
//!
//! LM Studio loads one model at a time in its UI; the driver introspects the
//! loaded model via `/v1/models` (first entry) and caches it for a short TTL
//! since the user can swap models at any time.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;

use crate::config::LmStudioConfig;
use crate::error::BackendError;

use super::openai_compat::{
    build_request_body, fetch_model_list, parse_completion, post_chat, sse_response_stream,
};
use super::{
    BackendDriver, BackendInfo, BackendKind, BackendStatus, LlmRequest, ModelSwitch,
    ResponseStream,
};

/// LM Studio swaps models frequently; keep the cache short.
const MODEL_CACHE_TTL: Duration = Duration::from_secs(60);

struct ModelCache {
    models: Vec<String>,
    current: Option<String>,
    fetched_at: Option<Instant>,
}

/// Driver for a local LM Studio server (`http://host:port/v1`).
pub struct LmStudioDriver {
    config: LmStudioConfig,
    base_url: String,
    client: reqwest::Client,
    status: Mutex<BackendStatus>,
    model_cache: Mutex<ModelCache>,
    /// Preferred model recorded by `switch_model`; LM Studio itself decides
    /// what is actually loaded.
    preferred_model: Mutex<Option<String>>,
    last_check: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl LmStudioDriver {
    pub fn new(config: LmStudioConfig) -> Self {
        let base_url = format!("http://{}:{}/v1", config.host, config.port);
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.api_key {
            if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", key)) {
                headers.insert(AUTHORIZATION, value);
            }
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self {
            config,
            base_url,
            client,
            status: Mutex::new(BackendStatus::Unknown),
            model_cache: Mutex::new(ModelCache {
                models: Vec::new(),
                current: None,
                fetched_at: None,
            }),
            preferred_model: Mutex::new(None),
            last_check: Mutex::new(None),
        }
    }

    fn set_status(&self, status: BackendStatus) {
        *self.status.lock().unwrap() = status;
    }

    /// Refreshes the model cache when the TTL has lapsed.
    async fn refresh_models(&self) -> Result<(Vec<String>, Option<String>), BackendError> {
        {
            let cache = self.model_cache.lock().unwrap();
            if let Some(at) = cache.fetched_at {
                if at.elapsed() < MODEL_CACHE_TTL {
                    return Ok((cache.models.clone(), cache.current.clone()));
                }
            }
        }
        let models = fetch_model_list(&self.client, &self.base_url, "lm_studio").await?;
        let current = models.first().cloned();
        if let Some(model) = &current {
            tracing::debug!(model = %model, "lm_studio current model");
        }
        let mut cache = self.model_cache.lock().unwrap();
        cache.models = models.clone();
        cache.current = current.clone();
        cache.fetched_at = Some(Instant::now());
        Ok((models, current))
    }
}

#[async_trait]
impl BackendDriver for LmStudioDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::LmStudio
    }

    fn status(&self) -> BackendStatus {
        *self.status.lock().unwrap()
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.set_status(BackendStatus::Connecting);
        tracing::info!(host = %self.config.host, port = self.config.port, "initializing lm_studio backend");
        if self.health_check().await {
            self.set_status(BackendStatus::Connected);
            Ok(())
        } else {
            self.set_status(BackendStatus::Error);
            Err(BackendError::Connection(format!(
                "failed to connect to LM Studio at {}",
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
                tracing::debug!(error = %e, "lm_studio health check failed");
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
        Ok(self.refresh_models().await?.0)
    }

    async fn current_model(&self) -> Option<String> {
        match self.refresh_models().await {
            Ok((_, current)) => current,
            Err(_) => self.model_cache.lock().unwrap().current.clone(),
        }
    }

    async fn switch_model(&self, model_id: &str) -> Result<ModelSwitch, BackendError> {
        let (models, current) = self.refresh_models().await?;
        if current.as_deref() == Some(model_id) {
            return Ok(ModelSwitch::Live);
        }
        if !models.iter().any(|m| m == model_id) {
            return Err(BackendError::ModelNotFound {
                model: model_id.to_string(),
                available: models,
            });
        }
        // LM Studio cannot load a model remotely; record the preference and
        // tell the caller the change is deferred to the LM Studio UI.
        *self.preferred_model.lock().unwrap() = Some(model_id.to_string());
        Ok(ModelSwitch::Deferred)
    }

    async fn generate(&self, request: LlmRequest) -> Result<ResponseStream, BackendError> {
        let current = self.current_model().await;
        let default_model = request
            .model
            .clone()
            .or_else(|| self.preferred_model.lock().unwrap().clone())
            .or(current);
        let body = build_request_body(&request, default_model.as_deref(), None, None)?;
        let started = Instant::now();

        tracing::debug!(messages = request.messages.len(), "sending request to lm_studio");

        let response = post_chat(
            &self.client,
            &self.base_url,
            "lm_studio",
            &body,
            self.config.timeout,
        )
        .await?;

        if !request.stream {
            let data: Value = response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse(format!("lm_studio: {}", e)))?;
            let terminal = parse_completion("lm_studio", &data, started);
            return Ok(Box::pin(futures::stream::once(async move { Ok(terminal) })));
        }

        Ok(sse_response_stream("lm_studio", response, started))
    }

    async fn get_info(&self) -> BackendInfo {
        let mut info = BackendInfo {
            name: "lm_studio".to_string(),
            kind: BackendKind::LmStudio,
            host: self.config.host.clone(),
            port: self.config.port,
            model: None,
            status: self.status(),
            version: None,
            capabilities: Vec::new(),
            last_check: *self.last_check.lock().unwrap(),
            error_message: None,
        };
        match self.refresh_models().await {
            Ok((models, current)) => {
                info.model = current;
                info.capabilities = std::iter::once(format!("models: {}", models.len()))
                    .chain(models.into_iter().take(5))
                    .collect();
            }
            Err(e) => info.error_message = Some(e.to_string()),
        }
        info
    }
}
