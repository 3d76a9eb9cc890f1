//! Integration tests for the MCP plane against a local WebSocket JSON-RPC
//! server: handshake, tools/list, tools/call, adapter registration through
//! discovery, and deregistration on disconnect.

mod init_logging;

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use qwen_tui_core::{
    McpClient, McpDiscovery, McpServerConfig, McpServerStatus, ToolRegistry, ToolStatus,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message as WsMessage;

/// Spawns a fake MCP server speaking JSON-RPC 2.0 over WebSocket. It serves an
/// `echo` tool with `input_text: string` and `uppercase: bool = false`.
async fn spawn_echo_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Serve several connections so reconnect paths work too.
        loop {
            let Ok((stream, _)) = listener.accept().await else {
                break;
            };
            tokio::spawn(async move {
                let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
                    return;
                };
                let (mut writer, mut reader) = ws.split();
                while let Some(Ok(message)) = reader.next().await {
                    let WsMessage::Text(text) = message else {
                        continue;
                    };
                    let request: Value = match serde_json::from_str(&text) {
                        Ok(v) => v,
                        Err(_) => continue,
                    };
                    let method = request.get("method").and_then(|m| m.as_str()).unwrap_or("");
                    let id = request.get("id").cloned();
                    let response = match method {
                        "initialize" => Some(json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "serverInfo": { "name": "echo-server", "version": "0.1.0" },
                                "protocolVersion": "1.0.0"
                            }
                        })),
                        "tools/list" => Some(json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "result": {
                                "tools": [{
                                    "name": "echo",
                                    "description": "Echo the input text",
                                    "inputSchema": {
                                        "type": "object",
                                        "properties": {
                                            "input_text": { "type": "string" },
                                            "uppercase": { "type": "boolean", "default": false }
                                        },
                                        "required": ["input_text"]
                                    }
                                }]
                            }
                        })),
                        "tools/call" => {
                            let params = request.get("params").cloned().unwrap_or(Value::Null);
                            let name = params.get("name").and_then(|n| n.as_str()).unwrap_or("");
                            if name != "echo" {
                                Some(json!({
                                    "jsonrpc": "2.0",
                                    "id": id,
                                    "error": { "code": -32601, "message": "unknown tool" }
                                }))
                            } else {
                                let args = params.get("arguments").cloned().unwrap_or(Value::Null);
                                let text = args
                                    .get("input_text")
                                    .and_then(|t| t.as_str())
                                    .unwrap_or_default();
                                let uppercase = args
                                    .get("uppercase")
                                    .and_then(|u| u.as_bool())
                                    .unwrap_or(false);
                                let reply = if uppercase {
                                    text.to_uppercase()
                                } else {
                                    text.to_string()
                                };
                                Some(json!({
                                    "jsonrpc": "2.0",
                                    "id": id,
                                    "result": {
                                        "content": [{ "type": "text", "text": reply }],
                                        "isError": false
                                    }
                                }))
                            }
                        }
                        "ping" => Some(json!({ "jsonrpc": "2.0", "id": id, "result": {} })),
                        // Shutdown is a notification; nothing to send back.
                        "shutdown" => None,
                        _ => Some(json!({
                            "jsonrpc": "2.0",
                            "id": id,
                            "error": { "code": -32601, "message": "method not found" }
                        })),
                    };
                    if let Some(response) = response {
                        if writer
                            .send(WsMessage::Text(response.to_string()))
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            });
        }
    });
    format!("ws://{}", addr)
}

fn server_config(name: &str, url: &str) -> McpServerConfig {
    McpServerConfig {
        name: name.to_string(),
        url: url.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn client_handshake_and_tool_listing() {
    let url = spawn_echo_server().await;
    let client = McpClient::new(server_config("S", &url));

    let info = client.connect().await.unwrap();
    assert_eq!(info.name, "echo-server");
    assert_eq!(info.protocol_version.as_deref(), Some("1.0.0"));
    assert!(client.is_connected());

    let tools = client.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "echo");
    assert_eq!(tools[0].parameters["properties"]["uppercase"]["default"], json!(false));

    assert!(client.ping().await);
    client.disconnect().await;
    assert!(!client.is_connected());
}

#[tokio::test]
async fn client_call_tool_round_trip() {
    let url = spawn_echo_server().await;
    let client = McpClient::new(server_config("S", &url));
    client.connect().await.unwrap();
    client.list_tools().await.unwrap();

    let result = client
        .call_tool("echo", json!({"input_text": "hello", "uppercase": false}))
        .await
        .unwrap();
    assert!(!result.is_error);
    assert_eq!(result.text_content(), "hello");

    let missing = client.call_tool("nope", json!({})).await;
    assert!(missing.is_err());

    client.disconnect().await;
}

#[tokio::test]
async fn tool_filter_restricts_advertised_tools() {
    let url = spawn_echo_server().await;
    let mut config = server_config("S", &url);
    config.tools = Some(vec!["other".to_string()]);
    let client = McpClient::new(config);
    client.connect().await.unwrap();

    let tools = client.list_tools().await.unwrap();
    assert!(tools.is_empty());
    client.disconnect().await;
}

/// **Scenario**: the registry call `mcp_S_echo(input_text="hi",
/// uppercase=true)` returns a completed result of `"HI"`.
#[tokio::test]
async fn discovery_registers_adapter_and_round_trips() {
    let url = spawn_echo_server().await;
    let registry = Arc::new(ToolRegistry::new());
    let discovery = McpDiscovery::new(
        vec![server_config("S", &url)],
        Arc::clone(&registry) as Arc<dyn qwen_tui_core::RegistryMutator>,
    );

    discovery.start().await;

    let state = discovery.server_status("S").unwrap();
    assert_eq!(state.status, McpServerStatus::Connected);
    assert_eq!(state.tools.len(), 1);
    assert!(registry.get("mcp_S_echo").is_some());

    // String-typed bool exercises the adapter's argument coercion.
    let result = registry
        .execute("mcp_S_echo", json!({"input_text": "hi", "uppercase": "true"}))
        .await;
    assert_eq!(result.status, ToolStatus::Completed);
    assert_eq!(result.result.unwrap(), json!("HI"));
    assert_eq!(result.metadata["server_name"], json!("S"));
    assert_eq!(result.metadata["original_name"], json!("echo"));

    discovery.stop().await;
    assert!(registry.get("mcp_S_echo").is_none());
}

/// **Invariant**: disconnecting a server removes exactly its tools from the
/// registry.
#[tokio::test]
async fn disconnect_deregisters_server_tools() {
    let url = spawn_echo_server().await;
    let registry = Arc::new(ToolRegistry::new());
    let before = registry.list_tools();
    let discovery = McpDiscovery::new(
        vec![server_config("S", &url)],
        Arc::clone(&registry) as Arc<dyn qwen_tui_core::RegistryMutator>,
    );

    discovery.start().await;
    assert!(!registry.list_tools().is_empty());

    discovery.disconnect_server("S").await.unwrap();
    assert_eq!(registry.list_tools(), before);
    let state = discovery.server_status("S").unwrap();
    assert_eq!(state.status, McpServerStatus::Disconnected);

    discovery.stop().await;
}

#[tokio::test]
async fn disabled_server_is_not_connected() {
    let url = spawn_echo_server().await;
    let mut config = server_config("S", &url);
    config.enabled = false;
    let registry = Arc::new(ToolRegistry::new());
    let discovery = McpDiscovery::new(
        vec![config],
        Arc::clone(&registry) as Arc<dyn qwen_tui_core::RegistryMutator>,
    );

    discovery.start().await;
    let state = discovery.server_status("S").unwrap();
    assert_eq!(state.status, McpServerStatus::Disabled);
    assert!(registry.list_tools().is_empty());
    discovery.stop().await;
}

#[tokio::test]
async fn connect_to_dead_server_reports_error_state() {
    // Bind and drop a listener to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = server_config("dead", &format!("ws://{}", addr));
    config.timeout = 2;
    let registry = Arc::new(ToolRegistry::new());
    let discovery = McpDiscovery::new(
        vec![config],
        Arc::clone(&registry) as Arc<dyn qwen_tui_core::RegistryMutator>,
    );

    discovery.start().await;
    let state = discovery.server_status("dead").unwrap();
    assert_eq!(state.status, McpServerStatus::Error);
    assert!(state.last_error.is_some());
    assert!(state.connection_attempts >= 1);
    discovery.stop().await;
}
