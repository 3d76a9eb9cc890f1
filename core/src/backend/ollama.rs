//! Ollama driver: JSON-lines streaming over `POST /api/chat`.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use crate::config::OllamaConfig;
use crate::error::BackendError;
use crate::tools::ToolCall;

use super::openai_compat::parse_arguments;
use super::{
    BackendDriver, BackendInfo, BackendKind, BackendStatus, LlmRequest, LlmResponse, ModelSwitch,
    ResponseStream, Usage,
};

const MODEL_CACHE_TTL: Duration = Duration::from_secs(300);

struct ModelCache {
    models: Vec<String>,
    fetched_at: Option<Instant>,
}

/// Driver for a local Ollama server.
pub struct OllamaDriver {
    config: OllamaConfig,
    base_url: String,
    client: reqwest::Client,
    status: Mutex<BackendStatus>,
    /// TTL-bounded model list; every access takes the lock.
    model_cache: Mutex<ModelCache>,
    default_model: Mutex<String>,
    last_check: Mutex<Option<chrono::DateTime<chrono::Utc>>>,
}

impl OllamaDriver {
    pub fn new(config: OllamaConfig) -> Self {
        let base_url = format!("http://{}:{}", config.host, config.port);
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

    async fn fetch_models(&self) -> Result<Vec<String>, BackendError> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .send()
            .await
            .map_err(|e| BackendError::Connection(format!("ollama: {}", e)))?;
        if !response.status().is_success() {
            return Err(BackendError::InvalidResponse(format!(
                "ollama: failed to get models: HTTP {}",
                response.status()
            )));
        }
        let data: Value = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("ollama: {}", e)))?;
        Ok(data
            .get("models")
            .and_then(|m| m.as_array())
            .map(|models| {
                models
                    .iter()
                    .filter_map(|m| m.get("name").and_then(|v| v.as_str()))
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default())
    }

    fn build_body(&self, request: &LlmRequest, model: &str) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| {
                let mut obj = Map::new();
                obj.insert("role".into(), Value::String(m.role.as_str().to_string()));
                obj.insert("content".into(), Value::String(m.content.clone()));
                Value::Object(obj)
            })
            .collect();

        let mut options = Map::new();
        if let Some(t) = request.temperature {
            options.insert("temperature".into(), json!(t));
        }
        if let Some(n) = request.max_tokens {
            options.insert("num_predict".into(), json!(n));
        }
        if let Some(p) = request.top_p {
            options.insert("top_p".into(), json!(p));
        }
        for (key, value) in &request.backend_params {
            options.insert(key.clone(), value.clone());
        }

        let mut body = Map::new();
        body.insert("model".into(), Value::String(model.to_string()));
        body.insert("messages".into(), Value::Array(messages));
        body.insert("stream".into(), Value::Bool(request.stream));
        body.insert("options".into(), Value::Object(options));
        body.insert(
            "keep_alive".into(),
            Value::String(self.config.keep_alive.clone()),
        );
        if let Some(tools) = &request.tools {
            if !tools.is_empty() {
                body.insert("tools".into(), Value::Array(tools.clone()));
            }
        }
        Value::Object(body)
    }
}

/// Converts one Ollama chat chunk into a normalized response.
fn convert_chunk(data: &Value, started: Instant) -> LlmResponse {
    let message = data.get("message").cloned().unwrap_or(Value::Null);
    let done = data.get("done").and_then(|v| v.as_bool()).unwrap_or(false);
    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let tool_calls = message
        .get("tool_calls")
        .and_then(|v| v.as_array())
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    let function = c.get("function").cloned().unwrap_or(Value::Null);
                    let name = function
                        .get("name")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string();
                    let arguments = match function.get("arguments") {
                        Some(Value::Object(map)) => map.clone(),
                        Some(Value::String(s)) => parse_arguments(s),
                        _ => Map::new(),
                    };
                    ToolCall::new(format!("call_{}", i), name, arguments)
                })
                .collect::<Vec<_>>()
        })
        .filter(|calls: &Vec<ToolCall>| !calls.is_empty());

    let usage = if data.get("prompt_eval_count").is_some() || data.get("eval_count").is_some() {
        let prompt = data
            .get("prompt_eval_count")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32;
        let completion = data.get("eval_count").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        })
    } else {
        None
    };

    let mut metadata = Map::new();
    metadata.insert("backend".into(), Value::String("ollama".to_string()));
    for key in ["load_duration", "prompt_eval_duration", "eval_duration", "total_duration"] {
        if let Some(v) = data.get(key) {
            metadata.insert(key.into(), v.clone());
        }
    }

    LlmResponse {
        delta: if done { None } else { Some(content.clone()) },
        is_partial: !done,
        content,
        tool_calls,
        finish_reason: data
            .get("done_reason")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or(if done { Some("stop".to_string()) } else { None }),
        usage,
        model: data.get("model").and_then(|v| v.as_str()).map(String::from),
        response_time: if done {
            Some(started.elapsed().as_secs_f64())
        } else {
            None
        },
        backend_metadata: metadata,
    }
}

#[async_trait]
impl BackendDriver for OllamaDriver {
    fn kind(&self) -> BackendKind {
        BackendKind::Ollama
    }

    fn status(&self) -> BackendStatus {
        *self.status.lock().unwrap()
    }

    async fn initialize(&self) -> Result<(), BackendError> {
        self.set_status(BackendStatus::Connecting);
        tracing::info!(host = %self.config.host, port = self.config.port, "initializing ollama backend");
        if self.health_check().await {
            self.set_status(BackendStatus::Connected);
            Ok(())
        } else {
            self.set_status(BackendStatus::Error);
            Err(BackendError::Connection(format!(
                "failed to connect to Ollama at {}",
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
            .get(format!("{}/api/version", self.base_url))
            .timeout(Duration::from_secs(10))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(error = %e, "ollama health check failed");
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
        let models = self.fetch_models().await?;
        let mut cache = self.model_cache.lock().unwrap();
        cache.models = models.clone();
        cache.fetched_at = Some(Instant::now());
        Ok(models)
    }

    async fn current_model(&self) -> Option<String> {
        Some(self.default_model.lock().unwrap().clone())
    }

    async fn switch_model(&self, model_id: &str) -> Result<ModelSwitch, BackendError> {
        // Ollama loads models per request; updating the default is effective
        // from the next generate call.
        *self.default_model.lock().unwrap() = model_id.to_string();
        Ok(ModelSwitch::Live)
    }

    async fn generate(&self, request: LlmRequest) -> Result<ResponseStream, BackendError> {
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.default_model.lock().unwrap().clone());
        let body = self.build_body(&request, &model);
        let started = Instant::now();

        tracing::debug!(model = %model, messages = request.messages.len(), "sending request to ollama");

        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    BackendError::Timeout {
                        seconds: self.config.timeout,
                    }
                } else {
                    BackendError::Connection(format!("ollama: {}", e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            // 404 with "not found" means the model is not pulled; attach the
            // available list for remediation.
            if status.as_u16() == 404 && text.contains("not found") {
                let available = self.list_models().await.unwrap_or_default();
                return Err(BackendError::ModelNotFound {
                    model,
                    available,
                });
            }
            return Err(BackendError::InvalidResponse(format!(
                "ollama: HTTP {}: {}",
                status, text
            )));
        }

        if !request.stream {
            let data: Value = response
                .json()
                .await
                .map_err(|e| BackendError::InvalidResponse(format!("ollama: {}", e)))?;
            let terminal = convert_chunk(&data, started);
            return Ok(Box::pin(futures::stream::once(async move { Ok(terminal) })));
        }

        // JSON-lines: one object per line, `done: true` on the last.
        let stream = async_stream::try_stream! {
            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();
            let mut accumulated = String::new();
            'outer: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| BackendError::Connection(format!("ollama: {}", e)))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let data: Value = match serde_json::from_str(line) {
                        Ok(v) => v,
                        Err(e) => {
                            tracing::warn!(error = %e, "skipping malformed ollama chunk");
                            continue;
                        }
                    };
                    let mut converted = convert_chunk(&data, started);
                    if converted.is_partial {
                        accumulated.push_str(converted.delta.as_deref().unwrap_or_default());
                        converted.content = accumulated.clone();
                        yield converted;
                    } else {
                        if converted.content.is_empty() {
                            converted.content = accumulated.clone();
                        }
                        yield converted;
                        break 'outer;
                    }
                }
            }
        };
        Ok(Box::pin(stream))
    }

    async fn get_info(&self) -> BackendInfo {
        let mut info = BackendInfo {
            name: "ollama".to_string(),
            kind: BackendKind::Ollama,
            host: self.config.host.clone(),
            port: self.config.port,
            model: self.current_model().await,
            status: self.status(),
            version: None,
            capabilities: Vec::new(),
            last_check: *self.last_check.lock().unwrap(),
            error_message: None,
        };

        if let Ok(response) = self
            .client
            .get(format!("{}/api/version", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            if let Ok(data) = response.json::<Value>().await {
                info.version = data.get("version").and_then(|v| v.as_str()).map(String::from);
            }
        }
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
