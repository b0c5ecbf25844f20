//! MCP protocol client: tool discovery and invocation over whichever
//! transport a service declares, with lazily established sessions.

use crate::config::McpConfig;
use crate::error::{McpError, McpResult};
use crate::protocol::*;
use crate::service::{Service, Transport};
use crate::session::SessionStore;
use crate::transport::{HttpTransport, RpcTransport, SseTransport, StdioTransport};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// What the registry needs from a protocol client. Kept as a trait so the
/// registry can be exercised without a network.
#[async_trait]
pub trait ToolSource: Send + Sync {
    async fn list_tools(&self, service: &Service) -> McpResult<Vec<RemoteTool>>;

    async fn call_tool(
        &self,
        service: &Service,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> McpResult<ToolCallResult>;
}

/// MCP client shared by every configured service.
pub struct McpClient {
    direct: HttpTransport,
    event_stream: SseTransport,
    stdio: StdioTransport,
    sessions: SessionStore,
    ids: Arc<RequestIds>,
    handshake: Handshake,
    timeout: Duration,
}

impl McpClient {
    pub fn new(config: &McpConfig) -> McpResult<Self> {
        Self::with_handshake(config.handshake(), config.request_timeout())
    }

    pub fn with_handshake(handshake: Handshake, timeout: Duration) -> McpResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| McpError::Config(format!("build http client: {e}")))?;
        let ids = Arc::new(RequestIds::new());

        Ok(Self {
            direct: HttpTransport::new(http.clone(), handshake.protocol_version.clone()),
            event_stream: SseTransport::new(http, handshake.protocol_version.clone()),
            stdio: StdioTransport::new(handshake.clone(), ids.clone()),
            sessions: SessionStore::new(),
            ids,
            handshake,
            timeout,
        })
    }

    /// Session tokens currently held, per service.
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Lists the tools a service exposes via `tools/list`.
    pub async fn list_tools(&self, service: &Service) -> McpResult<Vec<RemoteTool>> {
        let result = self
            .rpc(service, METHOD_TOOLS_LIST, serde_json::json!({}))
            .await?;
        let list: ToolsListResult = serde_json::from_value(result).map_err(|e| {
            McpError::Decode(format!("tools/list result: {e}")).in_call(
                &service.id,
                METHOD_TOOLS_LIST,
                &service.transport,
            )
        })?;
        debug!(service = %service.id, tools = list.tools.len(), "Listed MCP tools");
        Ok(list.tools)
    }

    /// Invokes a remote tool via `tools/call`.
    pub async fn call_tool(
        &self,
        service: &Service,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> McpResult<ToolCallResult> {
        let params = serde_json::json!({
            "name": tool_name,
            "arguments": arguments,
        });
        let result = self.rpc(service, METHOD_TOOLS_CALL, params).await?;
        serde_json::from_value(result).map_err(|e| {
            McpError::Decode(format!("tools/call result: {e}")).in_call(
                &service.id,
                METHOD_TOOLS_CALL,
                &service.transport,
            )
        })
    }

    /// One bounded RPC against `service`. Failures carry the service id,
    /// method and transport.
    async fn rpc(
        &self,
        service: &Service,
        method: &str,
        params: serde_json::Value,
    ) -> McpResult<serde_json::Value> {
        let call = self.dispatch(service, method, params);
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(McpError::Timeout(self.timeout)),
        };
        outcome.map_err(|e| e.in_call(&service.id, method, &service.transport))
    }

    async fn dispatch(
        &self,
        service: &Service,
        method: &str,
        params: serde_json::Value,
    ) -> McpResult<serde_json::Value> {
        service.validate()?;
        match &service.transport {
            Transport::StreamableHttp => {
                self.call_with_session(&self.direct, service, method, params)
                    .await
            }
            Transport::Sse => {
                self.call_with_session(&self.event_stream, service, method, params)
                    .await
            }
            Transport::Stdio => self.stdio.call(service, method, params).await,
            Transport::Unknown(raw) => Err(McpError::InvalidService(format!(
                "unsupported transport {raw:?}"
            ))),
        }
    }

    /// First attempt on the current session; if it fails while a session was
    /// attached, exactly one retry on a freshly initialized session.
    async fn call_with_session(
        &self,
        transport: &dyn RpcTransport,
        service: &Service,
        method: &str,
        params: serde_json::Value,
    ) -> McpResult<serde_json::Value> {
        let session = self.ensure_session(transport, service).await?;
        let original = match self
            .send_request(transport, service, session.as_deref(), method, params.clone())
            .await
        {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let Some(stale) = session else {
            return Err(original);
        };
        warn!(
            service = %service.id,
            method,
            error = %original,
            "MCP request failed on cached session, reinitializing"
        );
        self.sessions.invalidate(&service.id, &stale).await;

        let fresh = match self.ensure_session(transport, service).await {
            Ok(fresh) => fresh,
            Err(reinit) => {
                return Err(McpError::Session {
                    original: Box::new(original),
                    reinit: Box::new(reinit),
                })
            }
        };
        self.send_request(transport, service, fresh.as_deref(), method, params)
            .await
    }

    async fn send_request(
        &self,
        transport: &dyn RpcTransport,
        service: &Service,
        session_id: Option<&str>,
        method: &str,
        params: serde_json::Value,
    ) -> McpResult<serde_json::Value> {
        let request = JsonRpcRequest::new(self.ids.next(), method, Some(params));
        let reply = transport.send(service, session_id, &request, true).await?;
        let result = reply
            .response
            .ok_or_else(|| McpError::Decode("missing rpc response".into()))?
            .into_result()?;

        if let Some(sid) = reply.session_id {
            self.sessions.set(&service.id, sid).await;
        }
        Ok(result)
    }

    /// Returns the cached session, or performs the `initialize` handshake
    /// while holding the service's slot. `None` means the server does not
    /// use sessions.
    async fn ensure_session(
        &self,
        transport: &dyn RpcTransport,
        service: &Service,
    ) -> McpResult<Option<String>> {
        self.sessions
            .get_or_try_init(&service.id, || self.initialize(transport, service))
            .await
    }

    async fn initialize(
        &self,
        transport: &dyn RpcTransport,
        service: &Service,
    ) -> McpResult<Option<String>> {
        let request = JsonRpcRequest::new(
            self.ids.next(),
            METHOD_INITIALIZE,
            Some(self.handshake.initialize_params()),
        );
        let reply = transport.send(service, None, &request, true).await?;
        let result = reply
            .response
            .ok_or_else(|| McpError::Decode("missing initialize response".into()))?
            .into_result()?;
        let session_id = reply.session_id;

        match serde_json::from_value::<InitializeResult>(result) {
            Ok(init) => info!(
                service = %service.id,
                version = %init.protocol_version,
                server = init.server_info.as_ref().map(|s| s.name.as_str()).unwrap_or(""),
                session = session_id.is_some(),
                "MCP session initialized"
            ),
            Err(e) => debug!(service = %service.id, error = %e, "Unrecognized initialize result"),
        }

        let initialized = JsonRpcRequest::notification(METHOD_INITIALIZED, Some(serde_json::json!({})));
        transport
            .send(service, session_id.as_deref(), &initialized, false)
            .await?;
        Ok(session_id)
    }
}

#[async_trait]
impl ToolSource for McpClient {
    async fn list_tools(&self, service: &Service) -> McpResult<Vec<RemoteTool>> {
        McpClient::list_tools(self, service).await
    }

    async fn call_tool(
        &self,
        service: &Service,
        tool_name: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> McpResult<ToolCallResult> {
        McpClient::call_tool(self, service, tool_name, arguments).await
    }
}
