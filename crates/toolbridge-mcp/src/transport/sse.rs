use super::{
    content_type, ensure_success, session_from_headers, status_error, with_mcp_headers, RpcReply,
    RpcTransport, ACCEPT_RPC,
};
use crate::error::{McpError, McpResult};
use crate::protocol::{same_rpc_id, JsonRpcRequest};
use crate::service::Service;
use crate::sse::{decode_body, SseReader};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use tokio::io::AsyncBufRead;
use tokio_util::io::StreamReader;
use tracing::debug;

/// Event-stream transport: a GET stream announces (via an `endpoint` event)
/// where to POST messages; replies come back inline on the POST or later on
/// the still-open stream.
pub struct SseTransport {
    http: reqwest::Client,
    protocol_version: String,
}

impl SseTransport {
    pub fn new(http: reqwest::Client, protocol_version: impl Into<String>) -> Self {
        Self {
            http,
            protocol_version: protocol_version.into(),
        }
    }
}

/// Resolves the data of an `endpoint` event against the stream URL.
pub fn resolve_endpoint(base: &str, data: &str) -> McpResult<String> {
    let data = data.trim();
    if data.is_empty() {
        return Err(McpError::Transport("empty sse endpoint event".into()));
    }
    let base = Url::parse(base)
        .map_err(|e| McpError::Transport(format!("parse base endpoint {base:?}: {e}")))?;
    let resolved = base
        .join(data)
        .map_err(|e| McpError::Transport(format!("parse sse endpoint {data:?}: {e}")))?;
    Ok(resolved.into())
}

/// Reads events until the server names its POST endpoint. A stream that ends
/// without one leaves requests going to the stream URL itself.
async fn discover_endpoint<R>(events: &mut SseReader<R>, base: &str) -> McpResult<String>
where
    R: AsyncBufRead + Unpin,
{
    while let Some(event) = events
        .next_event()
        .await
        .map_err(|e| McpError::Transport(format!("read sse event: {e}")))?
    {
        if event.name.trim().eq_ignore_ascii_case("endpoint") {
            return resolve_endpoint(base, &event.data);
        }
    }
    debug!(endpoint = %base, "SSE stream ended without an endpoint event");
    Ok(base.to_string())
}

#[async_trait]
impl RpcTransport for SseTransport {
    async fn send(
        &self,
        service: &Service,
        session_id: Option<&str>,
        request: &JsonRpcRequest,
        expect_response: bool,
    ) -> McpResult<RpcReply> {
        let stream_resp = with_mcp_headers(
            self.http.get(&service.endpoint),
            &self.protocol_version,
            service,
            session_id,
        )
        .header(ACCEPT, "text/event-stream")
        .send()
        .await
        .map_err(|e| McpError::Transport(format!("open sse stream: {e}")))?;

        let status = stream_resp.status();
        if !status.is_success() {
            let body = stream_resp.bytes().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }
        let stream_session = session_from_headers(stream_resp.headers());

        let bytes = Box::pin(stream_resp.bytes_stream().map_err(std::io::Error::other));
        let mut events = SseReader::new(StreamReader::new(bytes));
        let post_url = discover_endpoint(&mut events, &service.endpoint).await?;

        let body = request.to_bytes()?;
        let post_resp = with_mcp_headers(
            self.http.post(&post_url),
            &self.protocol_version,
            service,
            session_id,
        )
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, ACCEPT_RPC)
        .body(body)
        .send()
        .await
        .map_err(|e| McpError::Transport(format!("send rpc request: {e}")))?;

        let status = post_resp.status();
        let session_id = session_from_headers(post_resp.headers()).or(stream_session);
        let content_type = content_type(post_resp.headers());
        let post_bytes = post_resp
            .bytes()
            .await
            .map_err(|e| McpError::Transport(format!("read rpc response: {e}")))?;

        ensure_success(status, &post_bytes)?;
        if !expect_response {
            return Ok(RpcReply {
                response: None,
                session_id,
            });
        }

        if !post_bytes.trim_ascii().is_empty() {
            if let Ok(inline) = decode_body(&post_bytes, content_type.as_deref(), request.id).await {
                let matches = request
                    .id
                    .map_or(true, |id| same_rpc_id(id, inline.id.as_ref()));
                if matches {
                    return Ok(RpcReply {
                        response: Some(inline),
                        session_id,
                    });
                }
            }
        }

        let response = events.wait_for_response(request.id).await?;
        Ok(RpcReply {
            response: Some(response),
            session_id,
        })
    }
}
