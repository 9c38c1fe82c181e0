//! JSON-RPC message shapes for the tool-server boundary.
//!
//! Tool servers speak MCP: `initialize`, the `notifications/initialized`
//! notification, `tools/list`, and `tools/call`. This module defines just that
//! subset plus the parsing helpers both transports share. The advertised tool
//! list is treated as an opaque capability set -- tool internals are never
//! inspected.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ToolServerError;
use crate::tools::{ToolCapability, ToolDescriptor};

/// MCP protocol revision spoken by this client.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// A request without an id; the server must not answer it.
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: &'static str,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn initialized() -> Self {
        Self {
            jsonrpc: "2.0",
            method: "notifications/initialized".to_string(),
            params: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// Build the `initialize` request parameters.
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": "conductor",
            "version": env!("CARGO_PKG_VERSION"),
        },
    })
}

/// Build the `tools/call` request parameters.
pub fn tools_call_params(name: &str, arguments: Value) -> Value {
    json!({
        "name": name,
        "arguments": arguments,
    })
}

/// Extract the `result` payload or convert a protocol-level error.
pub fn expect_result(
    server_id: &str,
    response: JsonRpcResponse,
) -> Result<Value, ToolServerError> {
    if let Some(err) = response.error {
        return Err(ToolServerError::ProtocolError {
            server_id: server_id.to_string(),
            message: format!("{} (code {})", err.message, err.code),
        });
    }
    response.result.ok_or_else(|| ToolServerError::ProtocolError {
        server_id: server_id.to_string(),
        message: "response carried neither result nor error".to_string(),
    })
}

/// Parse a `tools/list` result into tool descriptors.
///
/// Served tools all grant network-read capability from the supervisor's point
/// of view -- the server executes them remotely on our behalf.
pub fn parse_tools_list(server_id: &str, result: &Value) -> Result<Vec<ToolDescriptor>, ToolServerError> {
    let tools = result
        .get("tools")
        .and_then(|t| t.as_array())
        .ok_or_else(|| ToolServerError::ProtocolError {
            server_id: server_id.to_string(),
            message: "tools/list result missing 'tools' array".to_string(),
        })?;

    let mut descriptors = Vec::with_capacity(tools.len());
    for tool in tools {
        let name = match tool.get("name").and_then(|n| n.as_str()) {
            Some(n) => n.to_string(),
            None => continue, // nameless entries are unusable, skip
        };
        descriptors.push(ToolDescriptor {
            name,
            description: tool
                .get("description")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
            input_schema: tool
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({"type": "object", "properties": {}})),
            capabilities: vec![ToolCapability::NetworkRead],
        });
    }
    Ok(descriptors)
}

/// Flatten a `tools/call` result's content blocks into a single string.
///
/// Text blocks are concatenated; non-text blocks are passed through as raw
/// JSON so the calling agent still sees something actionable. An `isError`
/// flag is surfaced inside the string per the tool contract (the model reacts
/// to failures, the dispatch layer never raises).
pub fn flatten_tool_result(result: &Value) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(content) = result.get("content").and_then(|c| c.as_array()) {
        for block in content {
            match block.get("type").and_then(|t| t.as_str()) {
                Some("text") => {
                    if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                        parts.push(text.to_string());
                    }
                }
                _ => parts.push(block.to_string()),
            }
        }
    }

    let body = if parts.is_empty() {
        result.to_string()
    } else {
        parts.join("\n")
    };

    if result.get("isError").and_then(|e| e.as_bool()).unwrap_or(false) {
        format!("ERROR: {body}")
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_tools_list_extracts_descriptors() {
        let result = json!({
            "tools": [
                {
                    "name": "navigate_page",
                    "description": "Navigate to a URL",
                    "inputSchema": {"type": "object", "properties": {"url": {"type": "string"}}}
                },
                {"name": "take_snapshot"}
            ]
        });

        let tools = parse_tools_list("browser", &result).unwrap();
        assert_eq!(tools.len(), 2);
        assert_eq!(tools[0].name, "navigate_page");
        assert_eq!(tools[0].capabilities, vec![ToolCapability::NetworkRead]);
        assert_eq!(tools[1].description, "");
    }

    #[test]
    fn parse_tools_list_rejects_missing_array() {
        let err = parse_tools_list("browser", &json!({})).unwrap_err();
        assert!(matches!(err, ToolServerError::ProtocolError { .. }));
    }

    #[test]
    fn flatten_tool_result_concatenates_text_blocks() {
        let result = json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "text", "text": "second"}
            ]
        });
        assert_eq!(flatten_tool_result(&result), "first\nsecond");
    }

    #[test]
    fn flatten_tool_result_marks_errors() {
        let result = json!({
            "content": [{"type": "text", "text": "page not found"}],
            "isError": true
        });
        assert_eq!(flatten_tool_result(&result), "ERROR: page not found");
    }

    #[test]
    fn expect_result_converts_protocol_errors() {
        let response = JsonRpcResponse {
            id: Some(json!(1)),
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: "method not found".into(),
            }),
        };
        let err = expect_result("search", response).unwrap_err();
        assert!(err.to_string().contains("method not found"));
    }
}
