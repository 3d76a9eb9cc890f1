//! Adapter exposing one MCP remote tool behind the local [`Tool`] contract.
//!
//! The adapter mangles the name to `mcp_<server>_<tool>` to avoid registry
//! collisions, derives a JSON schema from the MCP parameter description
//! (required, enum and default preserved), coerces arguments before dispatch,
//! and maps the MCP content blocks back into a tool result.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::error::{McpError, ToolError};
use crate::tools::{Tool, ToolOutput};

use super::{McpClient, McpTool, McpToolCallResult};

/// Wraps one MCP tool as a registry tool. Holds a shared, non-owning reference
/// to the server's client; the discovery service owns the client's lifetime.
pub struct McpToolAdapter {
    mangled_name: String,
    description: String,
    mcp_tool: McpTool,
    client: Arc<McpClient>,
    server_name: String,
}

impl McpToolAdapter {
    pub fn new(mcp_tool: McpTool, client: Arc<McpClient>, server_name: impl Into<String>) -> Self {
        let server_name = server_name.into();
        Self {
            mangled_name: format!("mcp_{}_{}", server_name, mcp_tool.name),
            description: format!("[MCP:{}] {}", server_name, mcp_tool.description),
            mcp_tool,
            client,
            server_name,
        }
    }

    /// The tool's name on the server, without the `mcp_<server>_` prefix.
    pub fn original_name(&self) -> &str {
        &self.mcp_tool.name
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    pub fn is_available(&self) -> bool {
        self.client.is_connected()
    }

    /// Coerces arguments against the declared parameter schema: scalar type
    /// conversion plus enum membership. Unknown keys pass through untouched.
    fn coerce_arguments(&self, args: &Value) -> Result<Value, ToolError> {
        let Some(args) = args.as_object() else {
            return Err(ToolError::Parameter("arguments must be an object".to_string()));
        };
        let properties = self
            .mcp_tool
            .parameters
            .get("properties")
            .and_then(|p| p.as_object())
            .cloned()
            .unwrap_or_default();
        let required: Vec<&str> = self
            .mcp_tool
            .parameters
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        for name in &required {
            if !args.contains_key(*name) {
                return Err(ToolError::Parameter(format!(
                    "missing required parameter: {}",
                    name
                )));
            }
        }

        let mut coerced = Map::new();
        for (key, value) in args {
            let Some(schema) = properties.get(key) else {
                coerced.insert(key.clone(), value.clone());
                continue;
            };
            let converted = coerce_value(key, value, schema)?;
            if let Some(allowed) = schema.get("enum").and_then(|e| e.as_array()) {
                if !allowed.contains(&converted) {
                    return Err(ToolError::Parameter(format!(
                        "parameter '{}' must be one of: {}",
                        key,
                        serde_json::to_string(allowed).unwrap_or_default()
                    )));
                }
            }
            coerced.insert(key.clone(), converted);
        }
        Ok(Value::Object(coerced))
    }

    /// Converts MCP content blocks into a tool output: a lone text block
    /// becomes a string, several join with newlines, mixed content becomes a
    /// structured object carrying text, data and all blocks.
    fn convert_result(&self, result: McpToolCallResult) -> Result<ToolOutput, ToolError> {
        if result.is_error {
            let message = result.text_content();
            let message = if message.is_empty() {
                "tool returned an error".to_string()
            } else {
                message
            };
            return Err(ToolError::Mcp(McpError::ToolExecution(message)));
        }

        let text_blocks: Vec<&Value> = result
            .content
            .iter()
            .filter(|b| b.get("type").and_then(|t| t.as_str()) == Some("text"))
            .collect();
        let all_text = text_blocks.len() == result.content.len();

        let value = if result.content.is_empty() {
            Value::String(String::new())
        } else if all_text && text_blocks.len() == 1 {
            Value::String(
                text_blocks[0]
                    .get("text")
                    .and_then(|t| t.as_str())
                    .unwrap_or_default()
                    .to_string(),
            )
        } else if all_text {
            Value::String(result.text_content())
        } else {
            let data: Vec<&Value> = result
                .content
                .iter()
                .filter(|b| b.get("type").and_then(|t| t.as_str()) != Some("text"))
                .collect();
            json!({
                "text": result.text_content(),
                "data": data,
                "all_content": result.content,
            })
        };

        Ok(ToolOutput::json(value)
            .with_metadata("server_name", Value::String(self.server_name.clone()))
            .with_metadata(
                "original_name",
                Value::String(self.mcp_tool.name.clone()),
            ))
    }
}

fn coerce_value(name: &str, value: &Value, schema: &Value) -> Result<Value, ToolError> {
    let expected = schema.get("type").and_then(|t| t.as_str()).unwrap_or("string");
    let coerced = match (expected, value) {
        ("string", Value::String(_)) => value.clone(),
        ("string", other) => Value::String(
            other
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| other.to_string()),
        ),
        ("integer", Value::Number(n)) if n.is_i64() || n.is_u64() => value.clone(),
        ("integer", Value::String(s)) => s
            .parse::<i64>()
            .map(|n| json!(n))
            .map_err(|_| ToolError::Parameter(format!("parameter '{}' must be an integer", name)))?,
        ("number", Value::Number(_)) => value.clone(),
        ("number", Value::String(s)) => s
            .parse::<f64>()
            .map(|n| json!(n))
            .map_err(|_| ToolError::Parameter(format!("parameter '{}' must be a number", name)))?,
        ("boolean", Value::Bool(_)) => value.clone(),
        ("boolean", Value::String(s)) => match s.to_lowercase().as_str() {
            "true" | "1" => Value::Bool(true),
            "false" | "0" => Value::Bool(false),
            _ => {
                return Err(ToolError::Parameter(format!(
                    "parameter '{}' must be a boolean",
                    name
                )))
            }
        },
        ("boolean", Value::Number(n)) => Value::Bool(n.as_i64() == Some(1)),
        _ => value.clone(),
    };
    Ok(coerced)
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.mangled_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn schema(&self) -> Value {
        // Preserve the server's schema; guarantee an object shape.
        if self.mcp_tool.parameters.is_object() {
            self.mcp_tool.parameters.clone()
        } else {
            json!({ "type": "object", "properties": {} })
        }
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput, ToolError> {
        let arguments = self.coerce_arguments(&args)?;
        tracing::debug!(
            tool = %self.mcp_tool.name,
            server = %self.server_name,
            "executing MCP tool"
        );
        let result = self
            .client
            .call_tool(&self.mcp_tool.name, arguments)
            .await
            .map_err(ToolError::Mcp)?;
        self.convert_result(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::McpServerConfig;

    fn adapter(parameters: Value) -> McpToolAdapter {
        let client = Arc::new(McpClient::new(McpServerConfig {
            name: "srv".into(),
            url: "ws://localhost:0".into(),
            ..Default::default()
        }));
        McpToolAdapter::new(
            McpTool {
                name: "echo".into(),
                description: "Echo text".into(),
                parameters,
            },
            client,
            "srv",
        )
    }

    #[test]
    fn name_is_mangled_with_server_prefix() {
        let a = adapter(json!({"type": "object"}));
        assert_eq!(a.name(), "mcp_srv_echo");
        assert_eq!(a.original_name(), "echo");
    }

    #[test]
    fn coerce_converts_scalar_types() {
        let a = adapter(json!({
            "type": "object",
            "properties": {
                "count": {"type": "integer"},
                "upper": {"type": "boolean"},
                "ratio": {"type": "number"}
            },
            "required": ["count"]
        }));
        let coerced = a
            .coerce_arguments(&json!({"count": "5", "upper": "true", "ratio": "0.5"}))
            .unwrap();
        assert_eq!(coerced["count"], json!(5));
        assert_eq!(coerced["upper"], json!(true));
        assert_eq!(coerced["ratio"], json!(0.5));
    }

    #[test]
    fn coerce_rejects_missing_required() {
        let a = adapter(json!({
            "type": "object",
            "properties": { "text": {"type": "string"} },
            "required": ["text"]
        }));
        assert!(a.coerce_arguments(&json!({})).is_err());
    }

    #[test]
    fn coerce_enforces_enum_membership() {
        let a = adapter(json!({
            "type": "object",
            "properties": { "mode": {"type": "string", "enum": ["fast", "slow"]} }
        }));
        assert!(a.coerce_arguments(&json!({"mode": "fast"})).is_ok());
        assert!(a.coerce_arguments(&json!({"mode": "warp"})).is_err());
    }

    #[test]
    fn convert_single_text_block_is_a_string() {
        let a = adapter(json!({"type": "object"}));
        let out = a
            .convert_result(McpToolCallResult {
                content: vec![json!({"type": "text", "text": "HI"})],
                is_error: false,
            })
            .unwrap();
        assert_eq!(out.value, json!("HI"));
        assert_eq!(out.metadata["server_name"], json!("srv"));
        assert_eq!(out.metadata["original_name"], json!("echo"));
    }

    #[test]
    fn convert_many_text_blocks_join() {
        let a = adapter(json!({"type": "object"}));
        let out = a
            .convert_result(McpToolCallResult {
                content: vec![
                    json!({"type": "text", "text": "a"}),
                    json!({"type": "text", "text": "b"}),
                ],
                is_error: false,
            })
            .unwrap();
        assert_eq!(out.value, json!("a\nb"));
    }

    #[test]
    fn convert_mixed_content_is_structured() {
        let a = adapter(json!({"type": "object"}));
        let out = a
            .convert_result(McpToolCallResult {
                content: vec![
                    json!({"type": "text", "text": "caption"}),
                    json!({"type": "image", "data": "xyz"}),
                ],
                is_error: false,
            })
            .unwrap();
        assert_eq!(out.value["text"], json!("caption"));
        assert_eq!(out.value["all_content"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn convert_error_result_is_an_error() {
        let a = adapter(json!({"type": "object"}));
        let err = a.convert_result(McpToolCallResult {
            content: vec![json!({"type": "text", "text": "boom"})],
            is_error: true,
        });
        assert!(err.is_err());
    }
}
