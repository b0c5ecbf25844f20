use super::{
    content_type, ensure_success, session_from_headers, with_mcp_headers, RpcReply, RpcTransport,
    ACCEPT_RPC,
};
use crate::error::{McpError, McpResult};
use crate::protocol::JsonRpcRequest;
use crate::service::Service;
use crate::sse::decode_body;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};

/// Direct request/response transport: one POST per message, answered by a
/// JSON body or an event stream holding the single reply.
pub struct HttpTransport {
    http: reqwest::Client,
    protocol_version: String,
}

impl HttpTransport {
    pub fn new(http: reqwest::Client, protocol_version: impl Into<String>) -> Self {
        Self {
            http,
            protocol_version: protocol_version.into(),
        }
    }
}

#[async_trait]
impl RpcTransport for HttpTransport {
    async fn send(
        &self,
        service: &Service,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
        expect_response: bool,
    ) -> McpResult<RpcReply> {
        let body = request.to_bytes()?;
        let builder = with_mcp_headers(
            self.http.post(&service.endpoint),
            &self.protocol_version,
            service,
            session_id,
        );

        let resp = builder
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, ACCEPT_RPC)
            .body(body)
            .send()
            .await
            .map_err(|e| McpError::Transport(format!("send rpc request: {e}")))?;

        let status = resp.status();
        let session_id = session_from_headers(resp.headers());
        let content_type = content_type(resp.headers());
        let bytes = resp
            .bytes()
            .await
            .map_err(|e| McpError::Transport(format!("read rpc response: {e}")))?;

        ensure_success(status, &bytes)?;
        if !expect_response {
            return Ok(RpcReply {
                response: None,
                session_id,
            });
        }

        let response = decode_body(&bytes, content_type.as_deref(), None).await?;
        Ok(RpcReply {
            response: Some(response),
            session_id,
        })
    }
}
