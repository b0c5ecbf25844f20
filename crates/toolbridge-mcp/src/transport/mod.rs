//! Wire transports. HTTP-family transports implement [`RpcTransport`] so the
//! client's session and retry logic is written once; the subprocess
//! transport runs a whole handshake per call and has no session.

pub mod http;
pub mod sse;
pub mod stdio;

pub use http::HttpTransport;
pub use sse::SseTransport;
pub use stdio::StdioTransport;

use crate::error::{McpError, McpResult};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, PROTOCOL_VERSION_HEADER, SESSION_HEADER};
use crate::service::Service;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};

/// `Accept` value for requests that may be answered with JSON or SSE.
pub const ACCEPT_RPC: &str = "application/json, text/event-stream";

/// Outcome of sending one JSON-RPC message.
#[derive(Debug)]
pub struct RpcReply {
    /// Present exactly when a response was expected.
    pub response: Option<JsonRpcResponse>,
    /// Session token the server attached to the exchange, if any.
    pub session_id: Option<String>,
}

/// Sends one JSON-RPC message to a service, optionally awaiting the reply.
#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn send(
        &self,
        service: &Service,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
        expect_response: bool,
    ) -> McpResult<RpcReply>;
}

/// Headers every MCP HTTP request carries.
pub(crate) fn with_mcp_headers(
    builder: RequestBuilder,
    protocol_version: &str,
    service: &Service,
    session_id: Option<&str>,
) -> RequestBuilder {
    let mut builder = builder.header(PROTOCOL_VERSION_HEADER, protocol_version);
    if let Some(token) = service.bearer_token() {
        builder = builder.header(AUTHORIZATION, format!("Bearer {token}"));
    }
    if let Some(sid) = session_id.filter(|s| !s.is_empty()) {
        builder = builder.header(SESSION_HEADER, sid);
    }
    builder
}

pub(crate) fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub(crate) fn content_type(headers: &HeaderMap) -> Option<String> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

pub(crate) fn ensure_success(status: StatusCode, body: &[u8]) -> McpResult<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(status_error(status, body))
}

pub(crate) fn status_error(status: StatusCode, body: &[u8]) -> McpError {
    McpError::Status {
        code: status.as_u16(),
        body: String::from_utf8_lossy(body).trim().to_string(),
    }
}
