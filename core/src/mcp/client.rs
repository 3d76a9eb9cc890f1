//! MCP client: JSON-RPC 2.0 over WebSocket.
//!
//! One client per configured server. A background reader routes responses into
//! per-request oneshot futures by id, hands server notifications to an optional
//! handler, and cancels every outstanding future when the transport drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::McpError;

use super::{methods, McpServerConfig, McpServerInfo, McpTool, McpToolCallResult, MCP_PROTOCOL_VERSION};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Receives server-initiated notifications (no response expected).
pub trait NotificationHandler: Send + Sync {
    fn handle(&self, method: &str, params: Value);
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

struct Connection {
    writer: Mutex<WsSink>,
    reader_task: tokio::task::JoinHandle<()>,
}

/// MCP client for one server.
pub struct McpClient {
    config: McpServerConfig,
    connection: Mutex<Option<Connection>>,
    pending: Arc<DashMap<String, oneshot::Sender<Result<Value, McpError>>>>,
    connected: Arc<AtomicBool>,
    notification_handler: std::sync::Mutex<Option<Arc<dyn NotificationHandler>>>,
    server_info: std::sync::Mutex<Option<McpServerInfo>>,
    tools: std::sync::Mutex<Vec<McpTool>>,
}

impl McpClient {
    pub fn new(config: McpServerConfig) -> Self {
        Self {
            config,
            connection: Mutex::new(None),
            pending: Arc::new(DashMap::new()),
            connected: Arc::new(AtomicBool::new(false)),
            notification_handler: std::sync::Mutex::new(None),
            server_info: std::sync::Mutex::new(None),
            tools: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn server_name(&self) -> &str {
        &self.config.name
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn set_notification_handler(&self, handler: Arc<dyn NotificationHandler>) {
        *self.notification_handler.lock().unwrap() = Some(handler);
    }

    pub fn server_info(&self) -> Option<McpServerInfo> {
        self.server_info.lock().unwrap().clone()
    }

    /// Cached tool list from the last `tools/list`.
    pub fn cached_tools(&self) -> Vec<McpTool> {
        self.tools.lock().unwrap().clone()
    }

    /// Opens the socket and performs the `initialize` handshake.
    pub async fn connect(&self) -> Result<McpServerInfo, McpError> {
        let mut slot = self.connection.lock().await;
        if slot.is_some() && self.is_connected() {
            if let Some(info) = self.server_info() {
                return Ok(info);
            }
        }

        let mut request = self
            .config
            .url
            .clone()
            .into_client_request()
            .map_err(|e| McpError::Connection(format!("{}: invalid url: {}", self.config.name, e)))?;
        if let Some(auth) = &self.config.auth {
            let headers = request.headers_mut();
            for (key, value) in auth {
                let name: tokio_tungstenite::tungstenite::http::HeaderName = key
                    .parse()
                    .map_err(|_| McpError::Connection(format!("invalid auth header: {}", key)))?;
                let value = value
                    .parse()
                    .map_err(|_| McpError::Connection(format!("invalid auth value for {}", key)))?;
                headers.insert(name, value);
            }
        }

        tracing::info!(server = %self.config.name, url = %self.config.url, "connecting to MCP server");

        let (socket, _) = tokio::time::timeout(
            Duration::from_secs(self.config.timeout),
            tokio_tungstenite::connect_async(request),
        )
        .await
        .map_err(|_| McpError::Timeout {
            seconds: self.config.timeout,
        })?
        .map_err(|e| McpError::Connection(format!("{}: {}", self.config.name, e)))?;

        let (writer, mut reader) = socket.split();

        let pending = Arc::clone(&self.pending);
        let connected = Arc::clone(&self.connected);
        let server_name = self.config.name.clone();
        let handler = self.notification_handler.lock().unwrap().clone();
        let reader_task = tokio::spawn(async move {
            while let Some(message) = reader.next().await {
                match message {
                    Ok(WsMessage::Text(text)) => {
                        let parsed: JsonRpcResponse = match serde_json::from_str(&text) {
                            Ok(p) => p,
                            Err(e) => {
                                tracing::warn!(server = %server_name, error = %e, "invalid JSON-RPC message");
                                continue;
                            }
                        };
                        match parsed.id {
                            Some(id) => {
                                let key = id.as_str().map(String::from).unwrap_or_else(|| id.to_string());
                                if let Some((_, sender)) = pending.remove(&key) {
                                    let outcome = match parsed.error {
                                        Some(err) => Err(McpError::Server {
                                            code: err.code,
                                            message: err.message,
                                        }),
                                        None => Ok(parsed.result.unwrap_or(Value::Null)),
                                    };
                                    let _ = sender.send(outcome);
                                }
                            }
                            None => {
                                if let (Some(handler), Some(method)) = (&handler, parsed.method) {
                                    handler.handle(&method, parsed.params.unwrap_or(Value::Null));
                                } else {
                                    tracing::debug!(server = %server_name, "notification ignored");
                                }
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::info!(server = %server_name, "MCP socket closed by server");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(server = %server_name, error = %e, "MCP transport error");
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            // Cancel all outstanding requests; their receivers observe the drop.
            pending.clear();
        });

        *slot = Some(Connection {
            writer: Mutex::new(writer),
            reader_task,
        });
        self.connected.store(true, Ordering::SeqCst);
        drop(slot);

        match self.initialize().await {
            Ok(info) => {
                *self.server_info.lock().unwrap() = Some(info.clone());
                tracing::info!(server = %self.config.name, "connected to MCP server");
                Ok(info)
            }
            Err(e) => {
                self.disconnect().await;
                Err(e)
            }
        }
    }

    /// Closes the socket, sending the `shutdown` notification first.
    pub async fn disconnect(&self) {
        let mut slot = self.connection.lock().await;
        if let Some(connection) = slot.take() {
            {
                let mut writer = connection.writer.lock().await;
                let shutdown = json!({
                    "jsonrpc": "2.0",
                    "method": methods::SHUTDOWN,
                    "params": {}
                });
                let _ = writer.send(WsMessage::Text(shutdown.to_string())).await;
                let _ = writer.close().await;
            }
            connection.reader_task.abort();
        }
        self.connected.store(false, Ordering::SeqCst);
        self.pending.clear();
        tracing::info!(server = %self.config.name, "disconnected from MCP server");
    }

    async fn request(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, McpError> {
        if !self.is_connected() {
            return Err(McpError::Connection(format!(
                "not connected to MCP server {}",
                self.config.name
            )));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(id.clone(), sender);

        let payload = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        {
            let slot = self.connection.lock().await;
            let Some(connection) = slot.as_ref() else {
                self.pending.remove(&id);
                return Err(McpError::Connection(format!(
                    "not connected to MCP server {}",
                    self.config.name
                )));
            };
            let mut writer = connection.writer.lock().await;
            writer
                .send(WsMessage::Text(payload.to_string()))
                .await
                .map_err(|e| {
                    self.pending.remove(&id);
                    McpError::Connection(format!("{}: {}", self.config.name, e))
                })?;
        }

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(McpError::Connection(format!(
                "connection to {} lost while waiting for {}",
                self.config.name, method
            ))),
            Err(_) => {
                self.pending.remove(&id);
                Err(McpError::Timeout {
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    async fn initialize(&self) -> Result<McpServerInfo, McpError> {
        let params = json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "clientInfo": {
                "name": "qwen-tui",
                "version": env!("CARGO_PKG_VERSION"),
            },
            "capabilities": { "tools": { "enabled": true } },
        });
        let result = self
            .request(
                methods::INITIALIZE,
                params,
                Duration::from_secs(self.config.timeout),
            )
            .await?;

        let protocol_version = result
            .get("protocolVersion")
            .and_then(|v| v.as_str())
            .map(String::from);
        if let Some(version) = &protocol_version {
            if version != MCP_PROTOCOL_VERSION {
                return Err(McpError::Protocol(format!(
                    "{}: unsupported protocol version {} (expected {})",
                    self.config.name, version, MCP_PROTOCOL_VERSION
                )));
            }
        }

        let mut info: McpServerInfo = result
            .get("serverInfo")
            .cloned()
            .and_then(|v| serde_json::from_value(v).ok())
            .unwrap_or(McpServerInfo {
                name: self.config.name.clone(),
                version: None,
                protocol_version: None,
            });
        info.protocol_version = protocol_version;
        Ok(info)
    }

    /// `tools/list`, filtered by the configured tool allowlist.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let result = self
            .request(
                methods::TOOLS_LIST,
                json!({}),
                Duration::from_secs(self.config.timeout),
            )
            .await?;
        let tools: Vec<McpTool> = result
            .get("tools")
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| McpError::Protocol(format!("{}: bad tools/list: {}", self.config.name, e)))?
            .unwrap_or_default();

        let tools = match &self.config.tools {
            Some(allowed) => tools
                .into_iter()
                .filter(|t| allowed.contains(&t.name))
                .collect(),
            None => tools,
        };

        tracing::debug!(server = %self.config.name, count = tools.len(), "retrieved MCP tools");
        *self.tools.lock().unwrap() = tools.clone();
        Ok(tools)
    }

    /// `tools/call` against a tool the server advertised.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<McpToolCallResult, McpError> {
        let known = self.cached_tools();
        if !known.is_empty() && !known.iter().any(|t| t.name == name) {
            let available: Vec<String> = known.into_iter().map(|t| t.name).collect();
            return Err(McpError::ToolNotFound(format!(
                "tool '{}' not found on server {}; available: {}",
                name,
                self.config.name,
                available.join(", ")
            )));
        }

        let result = self
            .request(
                methods::TOOLS_CALL,
                json!({ "name": name, "arguments": arguments }),
                Duration::from_secs(self.config.timeout),
            )
            .await
            .map_err(|e| match e {
                McpError::Server { code, message } => McpError::ToolExecution(format!(
                    "tool '{}' failed on {}: {} (code {})",
                    name, self.config.name, message, code
                )),
                other => other,
            })?;

        serde_json::from_value(result)
            .map_err(|e| McpError::Protocol(format!("{}: bad tools/call result: {}", self.config.name, e)))
    }

    /// Liveness probe with a short timeout.
    pub async fn ping(&self) -> bool {
        if !self.is_connected() {
            return false;
        }
        self.request(methods::PING, json!({}), Duration::from_secs(5))
            .await
            .is_ok()
    }
}
