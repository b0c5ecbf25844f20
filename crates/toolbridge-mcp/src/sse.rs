//! Server-sent event framing and JSON-RPC extraction from event streams.
//!
//! Events are separated by blank lines. `event:` names the event, `data:`
//! lines accumulate (joined with `\n`), and `:`-prefixed lines are comments
//! or heartbeats. Other fields (`id:`, `retry:`) are ignored.

use crate::error::{McpError, McpResult};
use crate::protocol::{match_response, JsonRpcResponse};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// One decoded event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental event reader over any buffered byte source.
pub struct SseReader<R> {
    reader: R,
    line: String,
}

impl<R: AsyncBufRead + Unpin> SseReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: String::new(),
        }
    }

    /// Reads the next event. `Ok(None)` means the stream ended with no event
    /// in progress; an event cut off by end of input is still returned once.
    pub async fn next_event(&mut self) -> std::io::Result<Option<SseEvent>> {
        let mut event = SseEvent::default();
        let mut pending = false;

        loop {
            self.line.clear();
            if self.reader.read_line(&mut self.line).await? == 0 {
                return Ok(pending.then_some(event));
            }

            let line = self.line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                if pending {
                    return Ok(Some(event));
                }
                continue;
            }
            if line.starts_with(':') {
                continue;
            }

            if let Some(name) = line.strip_prefix("event:") {
                event.name = name.trim().to_string();
                pending = true;
            } else if let Some(data) = line.strip_prefix("data:") {
                let part = data.trim();
                if event.data.is_empty() {
                    event.data = part.to_string();
                } else {
                    event.data.push('\n');
                    event.data.push_str(part);
                }
                pending = true;
            }
        }
    }

    /// Skips events until one carries a JSON-RPC response for `expect_id`
    /// (any response when `None`). Server-initiated requests, notifications
    /// and undecodable payloads are ignored.
    pub async fn wait_for_response(&mut self, expect_id: Option<u64>) -> McpResult<JsonRpcResponse> {
        loop {
            let event = self
                .next_event()
                .await
                .map_err(|e| McpError::Transport(format!("read sse event: {e}")))?
                .ok_or_else(|| {
                    McpError::StreamExhausted(match expect_id {
                        Some(id) => format!("no rpc response with id {id} in sse stream"),
                        None => "no rpc message in sse stream".to_string(),
                    })
                })?;

            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            let message: serde_json::Value = match serde_json::from_str(data) {
                Ok(v) => v,
                Err(e) => {
                    debug!(event = %event.name, error = %e, "Skipping non-JSON sse event");
                    continue;
                }
            };
            match match_response(message, expect_id) {
                Some(resp) => return Ok(resp),
                None => debug!(event = %event.name, "Skipping unrelated sse message"),
            }
        }
    }
}

/// Whether a response body should be read as an event stream rather than a
/// plain JSON document.
pub fn looks_like_event_stream(body: &[u8], content_type: Option<&str>) -> bool {
    if content_type.is_some_and(|ct| ct.to_ascii_lowercase().contains("text/event-stream")) {
        return true;
    }
    let trimmed = body.trim_ascii_start();
    trimmed.starts_with(b"event:") || trimmed.starts_with(b"data:")
}

/// Decodes a complete response body: a single JSON-RPC document, or an
/// event stream whose first JSON-RPC message (matching `expect_id` when
/// given) is the reply.
pub async fn decode_body(
    body: &[u8],
    content_type: Option<&str>,
    expect_id: Option<u64>,
) -> McpResult<JsonRpcResponse> {
    let trimmed = body.trim_ascii();
    if trimmed.is_empty() {
        return Err(McpError::Decode("empty response".into()));
    }

    if looks_like_event_stream(trimmed, content_type) {
        return SseReader::new(trimmed)
            .wait_for_response(expect_id)
            .await
            .map_err(|e| match e {
                McpError::StreamExhausted(msg) => McpError::Decode(msg),
                other => other,
            });
    }

    serde_json::from_slice(trimmed).map_err(|e| McpError::Decode(e.to_string()))
}
