//! MCP (Model Context Protocol) JSON-RPC 2.0 message types.

use crate::error::{McpError, McpResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Default protocol version advertised on `initialize` and on every request.
pub const DEFAULT_PROTOCOL_VERSION: &str = "2025-06-18";

/// Header carrying the opaque per-service session token.
pub const SESSION_HEADER: &str = "Mcp-Session-Id";

/// Header carrying the negotiated protocol version.
pub const PROTOCOL_VERSION_HEADER: &str = "MCP-Protocol-Version";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";

/// JSON-RPC 2.0 request. Notifications carry no id.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method: method.into(),
            params,
        }
    }

    pub fn notification(method: impl Into<String>, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method: method.into(),
            params,
        }
    }

    /// Serializes the request as a single JSON document.
    pub fn to_bytes(&self) -> McpResult<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| McpError::Transport(format!("marshal rpc request: {e}")))
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub jsonrpc: String,
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Converts an error object into [`McpError::Rpc`], otherwise yields the
    /// result (null when the server omitted it).
    pub fn into_result(self) -> McpResult<serde_json::Value> {
        if let Some(err) = self.error {
            return Err(McpError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        Ok(self.result.unwrap_or(serde_json::Value::Null))
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Compares a request id with whatever the server echoed back, by string
/// form, so `7` and `"7"` match.
pub fn same_rpc_id(expected: u64, got: Option<&serde_json::Value>) -> bool {
    match got {
        Some(serde_json::Value::String(s)) => s.trim() == expected.to_string(),
        Some(serde_json::Value::Number(n)) => match n.as_u64() {
            Some(id) => id == expected,
            None => n.as_f64().is_some_and(|f| f == expected as f64),
        },
        _ => false,
    }
}

/// Accepts `message` as the reply to `expect_id` (or as any reply when
/// `None`). Messages carrying a `method` are server-initiated requests or
/// notifications and never match.
pub fn match_response(message: serde_json::Value, expect_id: Option<u64>) -> Option<JsonRpcResponse> {
    let obj = message.as_object()?;
    let has_method = obj
        .get("method")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|m| !m.trim().is_empty());
    if has_method {
        return None;
    }
    if let Some(expected) = expect_id {
        if !same_rpc_id(expected, obj.get("id")) {
            return None;
        }
    }
    serde_json::from_value(message).ok()
}

/// Monotonic request id source shared by all transports of one client.
#[derive(Debug, Default)]
pub struct RequestIds(AtomicU64);

impl RequestIds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next id; the first one handed out is `1`.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }
}

/// Client identity and version sent on `initialize`.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub protocol_version: String,
    pub client_name: String,
    pub client_version: String,
}

impl Handshake {
    pub fn initialize_params(&self) -> serde_json::Value {
        serde_json::json!({
            "protocolVersion": self.protocol_version,
            "capabilities": {
                "tools": {}
            },
            "clientInfo": {
                "name": self.client_name,
                "version": self.client_version,
            }
        })
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            protocol_version: DEFAULT_PROTOCOL_VERSION.to_string(),
            client_name: "toolbridge".to_string(),
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// A tool as reported by a service's `tools/list` response.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RemoteTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<serde_json::Value>,
}

/// Payload of a `tools/list` result.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<RemoteTool>,
}

/// MCP tool call result from the `tools/call` response.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolCallResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<McpContent>,
    #[serde(
        default,
        rename = "structuredContent",
        skip_serializing_if = "Option::is_none"
    )]
    pub structured_content: Option<serde_json::Value>,
    #[serde(default, rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Joined non-blank text parts; else the structured content as JSON; else
    /// the whole result as JSON.
    pub fn render(&self) -> String {
        let text: Vec<&str> = self
            .content
            .iter()
            .filter(|c| c.content_type.eq_ignore_ascii_case("text"))
            .filter_map(|c| c.text.as_deref())
            .filter(|t| !t.trim().is_empty())
            .collect();
        if !text.is_empty() {
            return text.join("\n");
        }

        if let Some(structured) = &self.structured_content {
            if let Ok(json) = serde_json::to_string(structured) {
                return json;
            }
        }

        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// MCP content block. Non-text blocks keep their remaining fields so the
/// raw fallback rendering stays faithful.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpContent {
    #[serde(rename = "type", default)]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// MCP initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: String,
    #[serde(default, rename = "serverInfo")]
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[serde(default)]
    pub version: String,
}
