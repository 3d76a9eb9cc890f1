//! Shared plumbing for OpenAI-compatible drivers (LM Studio, vLLM, OpenRouter):
//! request body construction, SSE chunk decoding with the `[DONE]` sentinel,
//! streamed tool-call delta assembly, and `/models` parsing.

use std::collections::HashMap;
use std::time::Instant;

use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde_json::{json, Map, Value};

use crate::error::BackendError;
use crate::message::{Message, Role};
use crate::tools::ToolCall;

use super::{LlmRequest, LlmResponse, ResponseStream, Usage};

/// Converts normalized messages to OpenAI chat-completion message objects.
pub fn to_chat_messages(messages: &[Message]) -> Vec<Value> {
    messages
        .iter()
        .map(|m| {
            let mut obj = Map::new();
            obj.insert("role".into(), Value::String(m.role.as_str().to_string()));
            obj.insert("content".into(), Value::String(m.content.clone()));
            if let Some(calls) = &m.tool_calls {
                let calls: Vec<Value> = calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.name,
                                "arguments": Value::Object(c.arguments.clone()).to_string(),
                            }
                        })
                    })
                    .collect();
                obj.insert("tool_calls".into(), Value::Array(calls));
            }
            if m.role == Role::Tool {
                if let Some(id) = &m.tool_call_id {
                    obj.insert("tool_call_id".into(), Value::String(id.clone()));
                }
            }
            Value::Object(obj)
        })
        .collect()
}

/// Builds a chat-completions request body, applying driver defaults for unset
/// fields and folding `backend_params` in last.
pub fn build_request_body(
    request: &LlmRequest,
    default_model: Option<&str>,
    default_temperature: Option<f64>,
    default_max_tokens: Option<u32>,
) -> Result<Value, BackendError> {
    let model = request
        .model
        .clone()
        .or_else(|| default_model.map(String::from))
        .ok_or_else(|| BackendError::InvalidResponse("no model configured".to_string()))?;

    let mut body = Map::new();
    body.insert("model".into(), Value::String(model));
    body.insert(
        "messages".into(),
        Value::Array(to_chat_messages(&request.messages)),
    );
    body.insert("stream".into(), Value::Bool(request.stream));
    if request.stream {
        body.insert("stream_options".into(), json!({ "include_usage": true }));
    }
    if let Some(t) = request.temperature.or(default_temperature) {
        body.insert("temperature".into(), json!(t));
    }
    if let Some(m) = request.max_tokens.or(default_max_tokens) {
        body.insert("max_tokens".into(), json!(m));
    }
    if let Some(p) = request.top_p {
        body.insert("top_p".into(), json!(p));
    }
    if let Some(tools) = &request.tools {
        if !tools.is_empty() {
            body.insert("tools".into(), Value::Array(tools.clone()));
        }
    }
    if let Some(format) = &request.response_format {
        body.insert("response_format".into(), format.clone());
    }
    for (key, value) in &request.backend_params {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

/// Maps a non-2xx HTTP response to the right error sub-kind.
pub async fn error_from_response(backend: &str, response: reqwest::Response) -> BackendError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    match status.as_u16() {
        401 | 403 => BackendError::Authentication(format!("{}: HTTP {}: {}", backend, status, body)),
        429 => BackendError::RateLimit(format!("{}: {}", backend, body)),
        _ => BackendError::InvalidResponse(format!("{}: HTTP {}: {}", backend, status, body)),
    }
}

/// Assembles streamed OpenAI tool-call deltas (keyed by index) into complete
/// calls once the stream terminates.
#[derive(Debug, Default)]
pub struct ToolCallAssembler {
    partial: HashMap<u64, PartialCall>,
}

#[derive(Debug, Default)]
struct PartialCall {
    id: String,
    name: String,
    arguments: String,
}

impl ToolCallAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.partial.is_empty()
    }

    /// Feeds one `choices[].delta.tool_calls[]` entry.
    pub fn process_delta(&mut self, delta: &Value) {
        let index = delta.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
        let entry = self.partial.entry(index).or_default();
        if let Some(id) = delta.get("id").and_then(|v| v.as_str()) {
            entry.id = id.to_string();
        }
        if let Some(function) = delta.get("function") {
            if let Some(name) = function.get("name").and_then(|v| v.as_str()) {
                entry.name.push_str(name);
            }
            if let Some(args) = function.get("arguments").and_then(|v| v.as_str()) {
                entry.arguments.push_str(args);
            }
        }
    }

    /// Completed calls in index order. Unparseable argument blobs become empty
    /// maps with the raw text under `_raw`, so one malformed call never sinks
    /// the turn.
    pub fn into_tool_calls(self) -> Vec<ToolCall> {
        let mut entries: Vec<(u64, PartialCall)> = self.partial.into_iter().collect();
        entries.sort_by_key(|(index, _)| *index);
        entries
            .into_iter()
            .map(|(index, partial)| {
                let arguments = parse_arguments(&partial.arguments);
                let id = if partial.id.is_empty() {
                    format!("call_{}", index)
                } else {
                    partial.id
                };
                ToolCall::new(id, partial.name, arguments)
            })
            .collect()
    }
}

/// Parses a tool-call arguments blob: JSON object preferred, raw fallback.
pub fn parse_arguments(raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Map::new();
            map.insert("_raw".into(), Value::String(raw.to_string()));
            map
        }
    }
}

/// Extracts complete (non-streamed) tool calls from a response message object.
pub fn parse_message_tool_calls(message: &Value) -> Option<Vec<ToolCall>> {
    let calls = message.get("tool_calls")?.as_array()?;
    let parsed: Vec<ToolCall> = calls
        .iter()
        .enumerate()
        .map(|(i, c)| {
            let id = c
                .get("id")
                .and_then(|v| v.as_str())
                .map(String::from)
                .unwrap_or_else(|| format!("call_{}", i));
            let function = c.get("function").cloned().unwrap_or(Value::Null);
            let name = function
                .get("name")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let arguments = match function.get("arguments") {
                Some(Value::String(s)) => parse_arguments(s),
                Some(Value::Object(map)) => map.clone(),
                _ => Map::new(),
            };
            ToolCall::new(id, name, arguments)
        })
        .collect();
    if parsed.is_empty() {
        None
    } else {
        Some(parsed)
    }
}

pub fn parse_usage(value: Option<&Value>) -> Option<Usage> {
    let usage = value?;
    Some(Usage {
        prompt_tokens: usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
        completion_tokens: usage
            .get("completion_tokens")
            .and_then(|v| v.as_u64())
            .unwrap_or(0) as u32,
        total_tokens: usage.get("total_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32,
    })
}

/// Converts a complete (non-streamed) chat completion into one terminal response.
pub fn parse_completion(backend: &str, data: &Value, started: Instant) -> LlmResponse {
    let choice = data
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .cloned()
        .unwrap_or(Value::Null);
    let message = choice.get("message").cloned().unwrap_or(Value::Null);
    let mut metadata = Map::new();
    metadata.insert("backend".into(), Value::String(backend.to_string()));

    LlmResponse {
        content: message
            .get("content")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        delta: None,
        is_partial: false,
        tool_calls: parse_message_tool_calls(&message),
        finish_reason: choice
            .get("finish_reason")
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| Some("stop".to_string())),
        usage: parse_usage(data.get("usage")),
        model: data.get("model").and_then(|v| v.as_str()).map(String::from),
        response_time: Some(started.elapsed().as_secs_f64()),
        backend_metadata: metadata,
    }
}

/// Decodes an SSE chat-completion response into a [`ResponseStream`].
///
/// Yields one partial element per content delta and exactly one terminal
/// element when the provider signals `finish_reason` / `[DONE]`. Usage chunks
/// sent after the finish chunk (stream_options.include_usage) are folded into
/// the terminal element.
pub fn sse_response_stream(
    backend: &'static str,
    response: reqwest::Response,
    started: Instant,
) -> ResponseStream {
    let stream = async_stream::try_stream! {
        let mut events = response.bytes_stream().eventsource();
        let mut content = String::new();
        let mut assembler = ToolCallAssembler::new();
        let mut finish_reason: Option<String> = None;
        let mut usage: Option<Usage> = None;
        let mut model: Option<String> = None;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| BackendError::Connection(format!("{}: {}", backend, e)))?;
            if event.data.trim() == "[DONE]" {
                break;
            }
            let data: Value = match serde_json::from_str(&event.data) {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(backend, error = %e, "skipping malformed SSE chunk");
                    continue;
                }
            };

            if model.is_none() {
                model = data.get("model").and_then(|v| v.as_str()).map(String::from);
            }
            if let Some(u) = parse_usage(data.get("usage")) {
                usage = Some(u);
            }

            let Some(choice) = data
                .get("choices")
                .and_then(|c| c.as_array())
                .and_then(|c| c.first())
            else {
                continue;
            };

            if let Some(reason) = choice.get("finish_reason").and_then(|v| v.as_str()) {
                finish_reason = Some(reason.to_string());
            }

            let delta = choice.get("delta").cloned().unwrap_or(Value::Null);
            if let Some(tool_deltas) = delta.get("tool_calls").and_then(|v| v.as_array()) {
                for td in tool_deltas {
                    assembler.process_delta(td);
                }
            }
            if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    content.push_str(text);
                    let mut metadata = Map::new();
                    metadata.insert("backend".into(), Value::String(backend.to_string()));
                    yield LlmResponse {
                        content: content.clone(),
                        delta: Some(text.to_string()),
                        is_partial: true,
                        tool_calls: None,
                        finish_reason: None,
                        usage: None,
                        model: model.clone(),
                        response_time: None,
                        backend_metadata: metadata,
                    };
                }
            }
        }

        let tool_calls = if assembler.is_empty() {
            None
        } else {
            Some(assembler.into_tool_calls())
        };
        let mut metadata = Map::new();
        metadata.insert("backend".into(), Value::String(backend.to_string()));
        yield LlmResponse {
            content,
            delta: None,
            is_partial: false,
            tool_calls,
            finish_reason: finish_reason.or_else(|| Some("stop".to_string())),
            usage,
            model,
            response_time: Some(started.elapsed().as_secs_f64()),
            backend_metadata: metadata,
        };
    };
    Box::pin(stream)
}

/// POSTs a chat-completions body, mapping transport faults to the right error
/// sub-kind. Non-2xx responses are consumed into an error.
pub async fn post_chat(
    client: &reqwest::Client,
    base_url: &str,
    backend: &'static str,
    body: &Value,
    timeout_secs: u64,
) -> Result<reqwest::Response, BackendError> {
    let response = client
        .post(format!("{}/chat/completions", base_url))
        .json(body)
        .send()
        .await
        .map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout {
                    seconds: timeout_secs,
                }
            } else {
                BackendError::Connection(format!("{}: {}", backend, e))
            }
        })?;
    if !response.status().is_success() {
        return Err(error_from_response(backend, response).await);
    }
    Ok(response)
}

/// GETs `{base}/models` and returns the model ids.
pub async fn fetch_model_list(
    client: &reqwest::Client,
    base_url: &str,
    backend: &'static str,
) -> Result<Vec<String>, BackendError> {
    let response = client
        .get(format!("{}/models", base_url))
        .send()
        .await
        .map_err(|e| BackendError::Connection(format!("{}: {}", backend, e)))?;
    if !response.status().is_success() {
        return Err(error_from_response(backend, response).await);
    }
    let data: Value = response
        .json()
        .await
        .map_err(|e| BackendError::InvalidResponse(format!("{}: {}", backend, e)))?;
    Ok(parse_model_list(&data))
}

/// Parses `GET /models` (`{"data": [{"id": ...}]}`) into model ids.
pub fn parse_model_list(data: &Value) -> Vec<String> {
    data.get("data")
        .and_then(|d| d.as_array())
        .map(|models| {
            models
                .iter()
                .filter_map(|m| m.get("id").and_then(|v| v.as_str()))
                .map(String::from)
                .collect()
        })
        .unwrap_or_default()
}
