//! MCP plane: JSON-RPC 2.0 over WebSocket to external tool servers.
//!
//! [`McpClient`] speaks the wire protocol, [`McpToolAdapter`] exposes each
//! remote tool behind the local [`Tool`](crate::tools::Tool) contract, and
//! [`McpDiscovery`] keeps server connections alive and the registry in sync.

mod adapter;
mod client;
mod discovery;

pub use adapter::McpToolAdapter;
pub use client::{McpClient, NotificationHandler};
pub use discovery::{McpDiscovery, RegistryMutator};

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version this client implements.
pub const MCP_PROTOCOL_VERSION: &str = "1.0.0";

/// JSON-RPC request methods used by the client.
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
    pub const PING: &str = "ping";
    pub const SHUTDOWN: &str = "shutdown";
}

/// One configured MCP server. Unknown keys here are configuration errors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct McpServerConfig {
    pub name: String,
    pub url: String,
    pub enabled: bool,
    /// When set, only these tools are exposed from the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
    /// Per-request timeout in seconds.
    pub timeout: u64,
    /// Extra headers sent on the WebSocket handshake (e.g. bearer tokens).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth: Option<HashMap<String, String>>,
    pub retry_attempts: u32,
    /// Seconds between reconnect attempts for this server.
    pub retry_delay: u64,
    pub health_check_interval: u64,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            enabled: true,
            tools: None,
            timeout: 30,
            auth: None,
            retry_attempts: 3,
            retry_delay: 5,
            health_check_interval: 60,
        }
    }
}

/// Connection status of one MCP server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum McpServerStatus {
    Disconnected,
    Connecting,
    Connected,
    Error,
    Disabled,
}

/// Server identity returned from `initialize`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McpServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub protocol_version: Option<String>,
}

/// One tool advertised by an MCP server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// JSON-Schema for the tool parameters, as sent by the server.
    #[serde(default, alias = "inputSchema")]
    pub parameters: Value,
}

/// Result of `tools/call`: content blocks plus the error flag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct McpToolCallResult {
    #[serde(default)]
    pub content: Vec<Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

impl McpToolCallResult {
    /// Joined text of all `type: "text"` blocks.
    pub fn text_content(&self) -> String {
        self.content
            .iter()
            .filter(|block| block.get("type").and_then(|t| t.as_str()) == Some("text"))
            .filter_map(|block| block.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Mutable state tracked per configured server.
#[derive(Clone, Debug)]
pub struct McpServerState {
    pub config: McpServerConfig,
    pub status: McpServerStatus,
    pub info: Option<McpServerInfo>,
    pub tools: Vec<McpTool>,
    pub last_error: Option<String>,
    pub last_connected: Option<DateTime<Utc>>,
    pub connection_attempts: u32,
}

impl McpServerState {
    pub fn new(config: McpServerConfig) -> Self {
        let status = if config.enabled {
            McpServerStatus::Disconnected
        } else {
            McpServerStatus::Disabled
        };
        Self {
            config,
            status,
            info: None,
            tools: Vec::new(),
            last_error: None,
            last_connected: None,
            connection_attempts: 0,
        }
    }
}
