//! TTL-cached registry of the tools every enabled MCP service exposes,
//! flattened into one namespace of `<service>__<tool>` names.

use crate::client::ToolSource;
use crate::error::{McpError, McpResult};
use crate::protocol::RemoteTool;
use crate::service::{Service, ServiceDirectory, Transport};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use toolbridge_core::{ToolCall, ToolDefinition, ToolProvider, ToolResult, ToolbridgeResult};
use tracing::{debug, info, warn};

/// Where an exposed tool name routes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolBinding {
    pub service_id: String,
    pub tool_name: String,
}

/// Per-service view for an administration surface.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service_id: String,
    pub service_name: String,
    pub transport: Transport,
    pub enabled: bool,
    pub connected: bool,
    /// Number of tools currently enabled.
    pub tool_count: usize,
    pub tools: Vec<ServiceToolStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceToolStatus {
    pub name: String,
    pub description: String,
    pub enabled: bool,
}

#[derive(Default)]
struct Snapshot {
    tools: Vec<ToolDefinition>,
    bindings: HashMap<String, ToolBinding>,
    expires_at: Option<Instant>,
}

impl Snapshot {
    fn is_fresh(&self) -> bool {
        !self.tools.is_empty() && self.expires_at.is_some_and(|at| Instant::now() < at)
    }
}

/// Aggregates remote tools across services and routes calls back to them.
pub struct ToolRegistry {
    directory: Arc<dyn ServiceDirectory>,
    source: Arc<dyn ToolSource>,
    ttl: Duration,
    snapshot: RwLock<Snapshot>,
}

impl ToolRegistry {
    pub fn new(
        directory: Arc<dyn ServiceDirectory>,
        source: Arc<dyn ToolSource>,
        ttl: Duration,
    ) -> Self {
        Self {
            directory,
            source,
            ttl,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Cached definitions while the cache is populated and unexpired;
    /// otherwise a full refresh.
    pub async fn list_tools(&self) -> Vec<ToolDefinition> {
        {
            let snapshot = self.snapshot.read().await;
            if snapshot.is_fresh() {
                return snapshot.tools.clone();
            }
        }
        self.refresh_tools().await
    }

    /// Rediscovers every enabled service and swaps in the new table. A
    /// service that fails discovery is left out; it never blocks the rest.
    pub async fn refresh_tools(&self) -> Vec<ToolDefinition> {
        let services = self.directory.list_enabled_services();
        let results = join_all(services.iter().map(|s| self.source.list_tools(s))).await;

        let mut discovered = Vec::with_capacity(services.len());
        for (service, result) in services.into_iter().zip(results) {
            match result {
                Ok(tools) => discovered.push((service, tools)),
                Err(e) => warn!(service = %service.id, error = %e, "MCP tool discovery failed, skipping service"),
            }
        }

        let (tools, bindings) = assemble(&discovered);
        {
            let mut snapshot = self.snapshot.write().await;
            *snapshot = Snapshot {
                tools: tools.clone(),
                bindings,
                expires_at: Some(Instant::now() + self.ttl),
            };
        }
        info!(services = discovered.len(), tools = tools.len(), "MCP tool registry refreshed");
        tools
    }

    /// Resolves an exposed name, re-checks that the route is still allowed,
    /// and returns the rendered result text.
    pub async fn call_tool(&self, call: &ToolCall) -> McpResult<String> {
        let binding = match self.lookup(&call.name).await {
            Some(binding) => binding,
            None => {
                debug!(tool = %call.name, "Unknown MCP tool, refreshing registry");
                self.refresh_tools().await;
                self.lookup(&call.name)
                    .await
                    .ok_or_else(|| McpError::UnknownTool(call.name.clone()))?
            }
        };

        let service = self
            .directory
            .get_service(&binding.service_id)
            .ok_or_else(|| McpError::ServiceNotFound(binding.service_id.clone()))?;
        if !service.enabled {
            return Err(McpError::ServiceDisabled(binding.service_id));
        }
        if !self
            .directory
            .is_tool_enabled(&binding.service_id, &binding.tool_name)
        {
            return Err(McpError::ToolDisabled {
                service: binding.service_id,
                tool: binding.tool_name,
            });
        }

        let arguments = parse_arguments(&call.name, &call.arguments)?;
        let result = self
            .source
            .call_tool(&service, &binding.tool_name, arguments)
            .await?;

        let rendered = result.render();
        if result.is_error {
            return Err(McpError::ToolFailed(rendered.trim().to_string()));
        }
        Ok(rendered)
    }

    /// Status of every configured service, enabled or not, sorted by id.
    /// Enabled services are probed live.
    pub async fn list_service_statuses(&self) -> Vec<ServiceStatus> {
        let services = self.directory.list_services();
        let probes = services.iter().map(|service| async move {
            if !service.enabled {
                return None;
            }
            Some(self.source.list_tools(service).await)
        });
        let results = join_all(probes).await;

        let mut statuses: Vec<ServiceStatus> = services
            .iter()
            .zip(results)
            .map(|(service, probe)| status_for(service, probe))
            .collect();
        statuses.sort_by(|a, b| a.service_id.cmp(&b.service_id));
        statuses
    }

    /// Forces the next [`ToolRegistry::list_tools`] to refresh.
    pub async fn invalidate_cache(&self) {
        self.snapshot.write().await.expires_at = None;
    }

    async fn lookup(&self, name: &str) -> Option<ToolBinding> {
        self.snapshot.read().await.bindings.get(name).cloned()
    }
}

fn status_for(service: &Service, probe: Option<McpResult<Vec<RemoteTool>>>) -> ServiceStatus {
    let mut status = ServiceStatus {
        service_id: service.id.clone(),
        service_name: service.name.clone(),
        transport: service.transport.clone(),
        enabled: service.enabled,
        connected: false,
        tool_count: 0,
        tools: Vec::new(),
        error: None,
    };

    match probe {
        None => status.error = Some("disabled".to_string()),
        Some(Err(e)) => status.error = Some(e.to_string()),
        Some(Ok(remote)) => {
            let mut tools: Vec<ServiceToolStatus> = remote
                .into_iter()
                .map(|tool| ServiceToolStatus {
                    enabled: service.is_tool_enabled(&tool.name),
                    description: tool.description.trim().to_string(),
                    name: tool.name,
                })
                .collect();
            tools.sort_by(|a, b| a.name.cmp(&b.name));
            status.connected = true;
            status.tool_count = tools.iter().filter(|t| t.enabled).count();
            status.tools = tools;
        }
    }
    status
}

/// Builds the exposed definitions and routing table from discovery
/// results, in service order. Collisions get `_2`, `_3`, ... in first-seen
/// order; the returned list is sorted by name.
pub fn assemble(
    discovered: &[(Service, Vec<RemoteTool>)],
) -> (Vec<ToolDefinition>, HashMap<String, ToolBinding>) {
    let mut definitions = Vec::new();
    let mut bindings = HashMap::new();

    for (service, tools) in discovered {
        for tool in tools {
            if !service.is_tool_enabled(&tool.name) {
                continue;
            }
            let base = exposed_name(&service.id, &tool.name);
            let mut name = base.clone();
            let mut suffix = 2;
            while bindings.contains_key(&name) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }

            bindings.insert(
                name.clone(),
                ToolBinding {
                    service_id: service.id.clone(),
                    tool_name: tool.name.clone(),
                },
            );
            definitions.push(ToolDefinition {
                name,
                description: describe(service, tool),
                parameters: tool.input_schema.clone().unwrap_or_else(empty_schema),
            });
        }
    }

    definitions.sort_by(|a, b| a.name.cmp(&b.name));
    (definitions, bindings)
}

fn exposed_name(service_id: &str, tool_name: &str) -> String {
    let prefix = sanitize_name(service_id);
    let tool = sanitize_name(tool_name);
    if prefix.is_empty() {
        tool
    } else {
        format!("{prefix}__{tool}")
    }
}

fn describe(service: &Service, tool: &RemoteTool) -> String {
    let description = match tool.description.trim() {
        "" => "MCP tool",
        text => text,
    };
    format!("[MCP {}] {description}", service.name)
}

fn empty_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {}
    })
}

/// Restricts a name to `[A-Za-z0-9_-]`, mapping everything else to `_`
/// and trimming surrounding underscores. Blank input becomes `tool`.
pub fn sanitize_name(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return "tool".to_string();
    }
    let mapped: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    mapped.trim_matches('_').to_string()
}

/// Accepts a JSON object, the JSON text of one, or nothing at all.
pub fn parse_arguments(
    tool: &str,
    raw: &serde_json::Value,
) -> McpResult<serde_json::Map<String, serde_json::Value>> {
    let invalid = |reason: String| McpError::InvalidArguments {
        tool: tool.to_string(),
        reason,
    };

    match raw {
        serde_json::Value::Null => Ok(serde_json::Map::new()),
        serde_json::Value::Object(map) => Ok(map.clone()),
        serde_json::Value::String(text) => {
            let text = text.trim();
            if text.is_empty() {
                return Ok(serde_json::Map::new());
            }
            match serde_json::from_str::<serde_json::Value>(text) {
                Ok(serde_json::Value::Object(map)) => Ok(map),
                Ok(serde_json::Value::Null) => Ok(serde_json::Map::new()),
                Ok(other) => Err(invalid(format!("expected a JSON object, got {}", kind(&other)))),
                Err(e) => Err(invalid(e.to_string())),
            }
        }
        other => Err(invalid(format!("expected a JSON object, got {}", kind(other)))),
    }
}

fn kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[async_trait]
impl ToolProvider for ToolRegistry {
    async fn list_tools(&self) -> ToolbridgeResult<Vec<ToolDefinition>> {
        Ok(ToolRegistry::list_tools(self).await)
    }

    async fn call_tool(&self, call: ToolCall) -> ToolbridgeResult<ToolResult> {
        match ToolRegistry::call_tool(self, &call).await {
            Ok(output) => Ok(ToolResult::success(call.id, output)),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "MCP tool call failed");
                Ok(ToolResult::error(call.id, e.to_string()))
            }
        }
    }
}
