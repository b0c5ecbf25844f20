#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Integration tests for the tool registry: naming, caching, routing and
//! status reporting against a counting in-memory tool source.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use toolbridge_core::{ToolCall, ToolProvider};
use toolbridge_mcp::protocol::McpContent;
use toolbridge_mcp::{
    McpError, McpResult, MemoryDirectory, RemoteTool, Service, ToolCallResult, ToolRegistry,
    ToolSource,
};

const TTL: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

#[derive(Default)]
struct FakeSource {
    catalog: Mutex<HashMap<String, Result<Vec<RemoteTool>, String>>>,
    list_calls: Mutex<HashMap<String, usize>>,
    calls: Mutex<Vec<(String, String, Map<String, Value>)>>,
    total_calls: AtomicUsize,
    flag_errors: bool,
}

impl FakeSource {
    fn with(entries: &[(&str, &[&str])]) -> Self {
        let source = Self::default();
        for (service, tools) in entries {
            source.set_tools(service, tools);
        }
        source
    }

    fn set_tools(&self, service: &str, tools: &[&str]) {
        let tools = tools
            .iter()
            .map(|name| RemoteTool {
                name: name.to_string(),
                description: format!("{name} tool"),
                input_schema: None,
            })
            .collect();
        self.catalog
            .lock()
            .unwrap()
            .insert(service.to_string(), Ok(tools));
    }

    fn fail(&self, service: &str, message: &str) {
        self.catalog
            .lock()
            .unwrap()
            .insert(service.to_string(), Err(message.to_string()));
    }

    fn lists_of(&self, service: &str) -> usize {
        self.list_calls
            .lock()
            .unwrap()
            .get(service)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl ToolSource for FakeSource {
    async fn list_tools(&self, service: &Service) -> McpResult<Vec<RemoteTool>> {
        *self
            .list_calls
            .lock()
            .unwrap()
            .entry(service.id.clone())
            .or_default() += 1;
        match self.catalog.lock().unwrap().get(&service.id) {
            Some(Ok(tools)) => Ok(tools.clone()),
            Some(Err(message)) => Err(McpError::Transport(message.clone())),
            None => Ok(Vec::new()),
        }
    }

    async fn call_tool(
        &self,
        service: &Service,
        tool_name: &str,
        arguments: Map<String, Value>,
    ) -> McpResult<ToolCallResult> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push((
            service.id.clone(),
            tool_name.to_string(),
            arguments,
        ));
        Ok(ToolCallResult {
            content: vec![McpContent {
                content_type: "text".into(),
                text: Some(format!("{} ran {tool_name}", service.id)),
                extra: Map::new(),
            }],
            structured_content: None,
            is_error: self.flag_errors,
        })
    }
}

fn directory(ids: &[&str]) -> Arc<MemoryDirectory> {
    let services = ids
        .iter()
        .map(|id| Service::http(*id, format!("http://{id}.invalid/mcp")));
    Arc::new(MemoryDirectory::from_services(services).unwrap())
}

fn registry(dir: &Arc<MemoryDirectory>, source: &Arc<FakeSource>) -> ToolRegistry {
    ToolRegistry::new(dir.clone(), source.clone(), TTL)
}

fn names(defs: &[toolbridge_core::ToolDefinition]) -> Vec<&str> {
    defs.iter().map(|d| d.name.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Naming and routing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_same_tool_on_two_services() {
    let dir = directory(&["a", "b"]);
    let source = Arc::new(FakeSource::with(&[("a", &["query"]), ("b", &["query"])]));
    let registry = registry(&dir, &source);

    let tools = registry.list_tools().await;
    assert_eq!(names(&tools), vec!["a__query", "b__query"]);
    assert_eq!(tools[0].description, "[MCP a] query tool");

    let out = registry
        .call_tool(&ToolCall::new("c1", "b__query", json!({"q": "x"})))
        .await
        .unwrap();
    assert_eq!(out, "b ran query");

    let calls = source.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "b");
    assert_eq!(calls[0].1, "query");
    assert_eq!(calls[0].2["q"], json!("x"));
}

#[tokio::test]
async fn test_sanitized_collisions_get_suffixes() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["get.data", "get data"])]));
    let registry = registry(&dir, &source);

    let tools = registry.list_tools().await;
    assert_eq!(names(&tools), vec!["svc__get_data", "svc__get_data_2"]);

    registry
        .call_tool(&ToolCall::new("c1", "svc__get_data_2", Value::Null))
        .await
        .unwrap();
    assert_eq!(source.calls.lock().unwrap()[0].1, "get data");
}

// ---------------------------------------------------------------------------
// Caching
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_cache_served_until_ttl_elapses() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["one"])]));
    let registry = registry(&dir, &source);

    registry.list_tools().await;
    registry.list_tools().await;
    assert_eq!(source.lists_of("svc"), 1);

    tokio::time::advance(TTL - Duration::from_secs(1)).await;
    registry.list_tools().await;
    assert_eq!(source.lists_of("svc"), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    registry.list_tools().await;
    assert_eq!(source.lists_of("svc"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_invalidate_forces_refresh() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["one"])]));
    let registry = registry(&dir, &source);

    registry.list_tools().await;
    source.set_tools("svc", &["one", "two"]);
    assert_eq!(registry.list_tools().await.len(), 1);

    registry.invalidate_cache().await;
    let tools = registry.list_tools().await;
    assert_eq!(names(&tools), vec!["svc__one", "svc__two"]);
    assert_eq!(source.lists_of("svc"), 2);
}

#[tokio::test]
async fn test_empty_snapshot_is_not_cached() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::default());
    let registry = registry(&dir, &source);

    assert!(registry.list_tools().await.is_empty());
    assert!(registry.list_tools().await.is_empty());
    assert_eq!(source.lists_of("svc"), 2);
}

#[tokio::test]
async fn test_unknown_tool_refreshes_exactly_once() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["one"])]));
    let registry = registry(&dir, &source);

    registry.list_tools().await;
    let err = registry
        .call_tool(&ToolCall::new("c1", "svc__missing", Value::Null))
        .await
        .unwrap_err();

    assert!(matches!(err, McpError::UnknownTool(ref name) if name == "svc__missing"));
    assert_eq!(source.lists_of("svc"), 2);
    assert_eq!(source.total_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_newly_added_tool_found_after_refresh() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["one"])]));
    let registry = registry(&dir, &source);

    registry.list_tools().await;
    source.set_tools("svc", &["one", "fresh"]);

    let out = registry
        .call_tool(&ToolCall::new("c1", "svc__fresh", Value::Null))
        .await
        .unwrap();
    assert_eq!(out, "svc ran fresh");
    assert_eq!(source.lists_of("svc"), 2);
}

// ---------------------------------------------------------------------------
// Enable flags and re-validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_disabled_tool_hidden_but_reported() {
    let dir = directory(&["svc"]);
    dir.set_tool_enabled("svc", "secret", false).unwrap();
    let source = Arc::new(FakeSource::with(&[("svc", &["open", "secret"])]));
    let registry = registry(&dir, &source);

    assert_eq!(names(&registry.list_tools().await), vec!["svc__open"]);

    let statuses = registry.list_service_statuses().await;
    assert_eq!(statuses.len(), 1);
    let status = &statuses[0];
    assert!(status.connected);
    assert_eq!(status.tool_count, 1);
    assert_eq!(status.tools.len(), 2);
    assert_eq!(status.tools[0].name, "open");
    assert!(status.tools[0].enabled);
    assert_eq!(status.tools[1].name, "secret");
    assert!(!status.tools[1].enabled);
}

#[tokio::test]
async fn test_stale_binding_revalidated_before_dispatch() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["one"])]));
    let registry = registry(&dir, &source);
    registry.list_tools().await;

    dir.set_tool_enabled("svc", "one", false).unwrap();
    let err = registry
        .call_tool(&ToolCall::new("c1", "svc__one", Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::ToolDisabled { ref tool, .. } if tool == "one"));

    dir.set_enabled("svc", false).unwrap();
    let err = registry
        .call_tool(&ToolCall::new("c2", "svc__one", Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::ServiceDisabled(ref id) if id == "svc"));

    assert!(dir.remove_service("svc"));
    let err = registry
        .call_tool(&ToolCall::new("c3", "svc__one", Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::ServiceNotFound(ref id) if id == "svc"));

    assert_eq!(source.total_calls.load(Ordering::SeqCst), 0);
    assert_eq!(source.lists_of("svc"), 1);
}

#[tokio::test]
async fn test_disabled_service_never_probed() {
    let dir = directory(&["off", "on"]);
    dir.set_enabled("off", false).unwrap();
    let source = Arc::new(FakeSource::with(&[("off", &["x"]), ("on", &["y"])]));
    let registry = registry(&dir, &source);

    assert_eq!(names(&registry.list_tools().await), vec!["on__y"]);

    let statuses = registry.list_service_statuses().await;
    assert_eq!(statuses[0].service_id, "off");
    assert!(!statuses[0].enabled);
    assert!(!statuses[0].connected);
    assert_eq!(statuses[0].error.as_deref(), Some("disabled"));
    assert_eq!(source.lists_of("off"), 0);
}

// ---------------------------------------------------------------------------
// Failure handling
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_failing_service_isolated() {
    let dir = directory(&["zeta", "down", "alpha"]);
    let source = Arc::new(FakeSource::with(&[("zeta", &["z"]), ("alpha", &["a"])]));
    source.fail("down", "connection refused");
    let registry = registry(&dir, &source);

    assert_eq!(names(&registry.list_tools().await), vec!["alpha__a", "zeta__z"]);

    let statuses = registry.list_service_statuses().await;
    let ids: Vec<&str> = statuses.iter().map(|s| s.service_id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "down", "zeta"]);
    assert!(!statuses[1].connected);
    assert!(statuses[1]
        .error
        .as_deref()
        .unwrap()
        .contains("connection refused"));
    assert!(statuses[0].connected && statuses[2].connected);
}

#[tokio::test]
async fn test_invalid_arguments_rejected_before_dispatch() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["one"])]));
    let registry = registry(&dir, &source);

    let err = registry
        .call_tool(&ToolCall::new("c1", "svc__one", json!("[1, 2]")))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::InvalidArguments { .. }));
    assert_eq!(source.total_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_flagged_result_becomes_error() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource {
        flag_errors: true,
        ..FakeSource::with(&[("svc", &["one"])])
    });
    let registry = registry(&dir, &source);

    let err = registry
        .call_tool(&ToolCall::new("c1", "svc__one", Value::Null))
        .await
        .unwrap_err();
    assert!(matches!(err, McpError::ToolFailed(ref msg) if msg == "svc ran one"));
}

#[tokio::test]
async fn test_tool_provider_reports_failures_as_results() {
    let dir = directory(&["svc"]);
    let source = Arc::new(FakeSource::with(&[("svc", &["one"])]));
    let provider: Arc<dyn ToolProvider> = Arc::new(registry(&dir, &source));

    let defs = provider.list_tools().await.unwrap();
    assert_eq!(defs.len(), 1);

    let ok = provider
        .call_tool(ToolCall::new("c1", "svc__one", json!("{}")))
        .await
        .unwrap();
    assert!(!ok.is_error);
    assert_eq!(ok.call_id, "c1");
    assert_eq!(ok.content, "svc ran one");

    let failed = provider
        .call_tool(ToolCall::new("c2", "nope", Value::Null))
        .await
        .unwrap();
    assert!(failed.is_error);
    assert_eq!(failed.call_id, "c2");
    assert!(failed.content.contains("unknown tool"));
}

#[tokio::test]
async fn test_concurrent_readers_during_refresh() {
    let dir = directory(&["a", "b"]);
    let source = Arc::new(FakeSource::with(&[("a", &["x"]), ("b", &["y"])]));
    let registry = Arc::new(registry(&dir, &source));

    let mut handles = Vec::new();
    for i in 0..16 {
        let registry = registry.clone();
        handles.push(tokio::spawn(async move {
            if i % 4 == 0 {
                registry.refresh_tools().await
            } else {
                registry.list_tools().await
            }
        }));
    }
    for handle in handles {
        let tools = handle.await.unwrap();
        assert_eq!(names(&tools), vec!["a__x", "b__y"]);
    }
}
