//! Subprocess transport: one child process per call, speaking
//! newline-delimited JSON-RPC over stdin/stdout.

use crate::error::{McpError, McpResult};
use crate::protocol::{
    match_response, Handshake, JsonRpcRequest, JsonRpcResponse, RequestIds, METHOD_INITIALIZE,
    METHOD_INITIALIZED,
};
use crate::service::Service;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::task::JoinHandle;
use tracing::debug;

/// How long to wait for the stderr reader after the child has been killed.
const STDERR_DRAIN: Duration = Duration::from_secs(1);

/// Runs `initialize`, `notifications/initialized` and one request against a
/// freshly spawned server, then tears the process down.
pub struct StdioTransport {
    handshake: Handshake,
    ids: Arc<RequestIds>,
}

/// Owns the child for the duration of a call. Dropping it (including when
/// the caller's future is cancelled) kills the process.
struct ChildProcess {
    child: Child,
    stderr: Option<JoinHandle<String>>,
}

impl ChildProcess {
    fn spawn(service: &Service) -> McpResult<(Self, ChildStdin, ChildStdout)> {
        let mut cmd = Command::new(&service.command);
        cmd.args(&service.args)
            .envs(&service.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            McpError::Transport(format!(
                "failed to spawn stdio command '{}': {}",
                service.command, e
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::Transport("stdio server stdin not available".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::Transport("stdio server stdout not available".into()))?;
        let stderr = child.stderr.take().map(|mut pipe| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = pipe.read_to_end(&mut buf).await;
                String::from_utf8_lossy(&buf).trim().to_string()
            })
        });

        Ok((Self { child, stderr }, stdin, stdout))
    }

    /// Kills and reaps the child, returning whatever it wrote to stderr.
    async fn shutdown(&mut self) -> String {
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;
        match self.stderr.take() {
            Some(handle) => match tokio::time::timeout(STDERR_DRAIN, handle).await {
                Ok(Ok(text)) => text,
                _ => String::new(),
            },
            None => String::new(),
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        let _ = self.child.start_kill();
        if let Some(handle) = self.stderr.take() {
            handle.abort();
        }
    }
}

impl StdioTransport {
    pub fn new(handshake: Handshake, ids: Arc<RequestIds>) -> Self {
        Self { handshake, ids }
    }

    /// Spawns the service's command and performs one full exchange. Failures
    /// carry the child's stderr when it wrote any.
    pub async fn call(
        &self,
        service: &Service,
        method: &str,
        params: serde_json::Value,
    ) -> McpResult<serde_json::Value> {
        let (mut process, stdin, stdout) = ChildProcess::spawn(service)?;
        let outcome = self.exchange(stdin, stdout, method, params).await;
        let stderr = process.shutdown().await;

        match outcome {
            Err(e) if !stderr.is_empty() => Err(with_stderr(e, &stderr)),
            other => other,
        }
    }

    async fn exchange(
        &self,
        mut stdin: ChildStdin,
        stdout: ChildStdout,
        method: &str,
        params: serde_json::Value,
    ) -> McpResult<serde_json::Value> {
        let mut lines = BufReader::new(stdout).lines();

        let init_id = self.ids.next();
        let init = JsonRpcRequest::new(
            init_id,
            METHOD_INITIALIZE,
            Some(self.handshake.initialize_params()),
        );
        write_message(&mut stdin, &init).await?;
        read_response(&mut lines, init_id).await?.into_result()?;

        let initialized = JsonRpcRequest::notification(METHOD_INITIALIZED, Some(serde_json::json!({})));
        write_message(&mut stdin, &initialized).await?;

        let id = self.ids.next();
        write_message(&mut stdin, &JsonRpcRequest::new(id, method, Some(params))).await?;
        read_response(&mut lines, id).await?.into_result()
    }
}

async fn write_message(stdin: &mut ChildStdin, request: &JsonRpcRequest) -> McpResult<()> {
    let mut msg = request.to_bytes()?;
    msg.push(b'\n');
    stdin
        .write_all(&msg)
        .await
        .map_err(|e| McpError::Transport(format!("write to stdio server: {e}")))?;
    stdin
        .flush()
        .await
        .map_err(|e| McpError::Transport(format!("flush stdio server stdin: {e}")))
}

/// Reads stdout lines until the response for `id` arrives. Log lines and
/// unrelated messages are skipped.
async fn read_response(
    lines: &mut Lines<BufReader<ChildStdout>>,
    id: u64,
) -> McpResult<JsonRpcResponse> {
    loop {
        let line = lines
            .next_line()
            .await
            .map_err(|e| McpError::Transport(format!("read stdio server stdout: {e}")))?
            .ok_or_else(|| {
                McpError::StreamExhausted(format!("stdio server closed stdout before response {id}"))
            })?;

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let message: serde_json::Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                debug!(line = %trimmed, error = %e, "Non-JSON-RPC line from stdio server");
                continue;
            }
        };
        if let Some(resp) = match_response(message, Some(id)) {
            return Ok(resp);
        }
    }
}

fn with_stderr(err: McpError, stderr: &str) -> McpError {
    match err {
        McpError::Transport(msg) => McpError::Transport(format!("{msg}; stderr: {stderr}")),
        McpError::StreamExhausted(msg) => {
            McpError::StreamExhausted(format!("{msg}; stderr: {stderr}"))
        }
        McpError::Rpc { code, message } => McpError::Rpc {
            code,
            message: format!("{message}; stderr: {stderr}"),
        },
        other => other,
    }
}
