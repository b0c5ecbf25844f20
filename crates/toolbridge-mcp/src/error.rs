use crate::service::Transport;
use std::time::Duration;
use thiserror::Error;
use toolbridge_core::ToolbridgeError;

/// A convenience `Result` alias using [`McpError`].
pub type McpResult<T> = Result<T, McpError>;

/// Everything that can go wrong talking to an MCP service or resolving a
/// tool through the registry.
#[derive(Error, Debug)]
pub enum McpError {
    /// Connection or process failure before any response arrived.
    #[error("transport error: {0}")]
    Transport(String),

    /// Non-success HTTP status; the body is kept for diagnostics.
    #[error("mcp status {code}: {body}")]
    Status { code: u16, body: String },

    /// A well-formed JSON-RPC error object.
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    /// Malformed or empty response body.
    #[error("decode rpc response: {0}")]
    Decode(String),

    /// The event or subprocess stream ended before a matching response id.
    #[error("stream exhausted: {0}")]
    StreamExhausted(String),

    /// The request failed on a cached session and re-initializing failed too.
    #[error("rpc failed: {original}; reinitialize failed: {reinit}")]
    Session {
        original: Box<McpError>,
        reinit: Box<McpError>,
    },

    /// The per-call deadline elapsed.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Context attached by the protocol client to any failure.
    #[error("mcp service {service:?} ({transport}) {method}: {source}")]
    Call {
        service: String,
        method: String,
        transport: Transport,
        #[source]
        source: Box<McpError>,
    },

    /// A service definition failed validation or uses an unknown transport.
    #[error("invalid mcp service: {0}")]
    InvalidService(String),

    /// Configuration could not be read or parsed.
    #[error("config error: {0}")]
    Config(String),

    #[error("unknown tool {0:?}")]
    UnknownTool(String),

    #[error("mcp service {0:?} not found")]
    ServiceNotFound(String),

    #[error("mcp service {0:?} is disabled")]
    ServiceDisabled(String),

    #[error("mcp service {service:?} tool {tool:?} is disabled")]
    ToolDisabled { service: String, tool: String },

    #[error("invalid tool arguments for {tool:?}: {reason}")]
    InvalidArguments { tool: String, reason: String },

    /// The remote tool ran but flagged its result as an error.
    #[error("{0}")]
    ToolFailed(String),
}

impl McpError {
    /// Strips [`McpError::Call`] context layers and returns the underlying
    /// failure.
    pub fn root(&self) -> &McpError {
        let mut current = self;
        while let McpError::Call { source, .. } = current {
            current = source;
        }
        current
    }

    pub(crate) fn in_call(self, service: &str, method: &str, transport: &Transport) -> Self {
        McpError::Call {
            service: service.to_string(),
            method: method.to_string(),
            transport: transport.clone(),
            source: Box::new(self),
        }
    }
}

impl From<McpError> for ToolbridgeError {
    fn from(e: McpError) -> Self {
        match e {
            McpError::Config(msg) | McpError::InvalidService(msg) => ToolbridgeError::Config(msg),
            McpError::Transport(msg) => ToolbridgeError::Http(msg),
            other => ToolbridgeError::Tool(other.to_string()),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_context() {
        let err = McpError::Rpc {
            code: -32601,
            message: "Method not found".into(),
        }
        .in_call("weather", "tools/list", &Transport::StreamableHttp);

        assert!(matches!(err.root(), McpError::Rpc { code: -32601, .. }));
        let text = err.to_string();
        assert!(text.contains("\"weather\""));
        assert!(text.contains("tools/list"));
        assert!(text.contains("rpc error -32601: Method not found"));
    }

    #[test]
    fn test_session_error_mentions_both_failures() {
        let err = McpError::Session {
            original: Box::new(McpError::Status {
                code: 404,
                body: "session expired".into(),
            }),
            reinit: Box::new(McpError::Transport("connection refused".into())),
        };
        let text = err.to_string();
        assert!(text.contains("mcp status 404: session expired"));
        assert!(text.contains("reinitialize failed: transport error: connection refused"));
    }

    #[test]
    fn test_into_toolbridge_error() {
        let err: ToolbridgeError = McpError::UnknownTool("nope".into()).into();
        assert!(matches!(err, ToolbridgeError::Tool(ref m) if m == "unknown tool \"nope\""));

        let err: ToolbridgeError = McpError::Config("bad toml".into()).into();
        assert!(matches!(err, ToolbridgeError::Config(_)));
    }
}
