//! MCP service definitions and the directory the registry reads them from.

use crate::error::{McpError, McpResult};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::LazyLock;

#[allow(clippy::expect_used)]
static SERVICE_ID_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("valid service id pattern"));

/// Wire mechanism a service is reached through.
///
/// Unrecognized values survive deserialization verbatim as
/// [`Transport::Unknown`] and are rejected by [`Service::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Transport {
    /// Direct request/response: one POST per RPC.
    #[default]
    StreamableHttp,
    /// Long-lived GET event stream plus POSTs to a server-announced endpoint.
    Sse,
    /// Subprocess speaking newline-delimited JSON over stdin/stdout.
    Stdio,
    Unknown(String),
}

impl Transport {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "http" | "streamablehttp" | "streamable_http" | "streamable-http" => {
                Transport::StreamableHttp
            }
            "sse" => Transport::Sse,
            "stdio" => Transport::Stdio,
            _ => Transport::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Transport::StreamableHttp => "streamable_http",
            Transport::Sse => "sse",
            Transport::Stdio => "stdio",
            Transport::Unknown(raw) => raw,
        }
    }
}

impl From<String> for Transport {
    fn from(raw: String) -> Self {
        Transport::parse(&raw)
    }
}

impl From<Transport> for String {
    fn from(t: Transport) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit per-tool override. Tools are enabled unless a record says
/// otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolState {
    pub name: String,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

/// A configured MCP service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// HTTP endpoint for the HTTP-family transports.
    #[serde(default)]
    pub endpoint: String,
    /// Executable for the stdio transport.
    #[serde(default)]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    /// Extra environment for the stdio subprocess.
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_states: Vec<ToolState>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_true() -> bool {
    true
}

impl Service {
    /// An enabled direct-request service.
    pub fn http(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            endpoint: endpoint.into(),
            command: String::new(),
            args: Vec::new(),
            env: HashMap::new(),
            transport: Transport::StreamableHttp,
            auth_token: None,
            enabled: true,
            tool_states: Vec::new(),
            updated_at: Utc::now(),
        }
    }

    /// An enabled event-stream service.
    pub fn sse(id: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            transport: Transport::Sse,
            ..Self::http(id, endpoint)
        }
    }

    /// An enabled subprocess service.
    pub fn stdio(id: impl Into<String>, command: impl Into<String>, args: &[&str]) -> Self {
        Self {
            command: command.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            transport: Transport::Stdio,
            ..Self::http(id, "")
        }
    }

    /// Bearer credential, if one is configured and non-blank.
    pub fn bearer_token(&self) -> Option<&str> {
        self.auth_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }

    /// Tools are enabled unless an override disables them.
    pub fn is_tool_enabled(&self, tool_name: &str) -> bool {
        let tool_name = tool_name.trim();
        if tool_name.is_empty() {
            return false;
        }
        self.tool_states
            .iter()
            .find(|s| s.name.trim() == tool_name)
            .map_or(true, |s| s.enabled)
    }

    /// Trims fields, defaults the display name to the id and collapses tool
    /// overrides to the sorted set of disabled tools.
    pub fn normalize(&mut self) {
        self.id = self.id.trim().to_string();
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        self.endpoint = self.endpoint.trim().to_string();
        self.command = self.command.trim().to_string();
        self.auth_token = self.bearer_token().map(str::to_string);
        self.tool_states = normalize_tool_states(std::mem::take(&mut self.tool_states));
    }

    pub fn validate(&self) -> McpResult<()> {
        if self.id.is_empty() {
            return Err(McpError::InvalidService("service id is required".into()));
        }
        if !SERVICE_ID_PATTERN.is_match(&self.id) {
            return Err(McpError::InvalidService(format!(
                "service id {:?} must match [a-zA-Z0-9_-]+",
                self.id
            )));
        }
        match &self.transport {
            Transport::StreamableHttp | Transport::Sse => {
                if self.endpoint.is_empty() {
                    return Err(McpError::InvalidService(format!(
                        "service {:?}: endpoint is required",
                        self.id
                    )));
                }
                if !self.endpoint.starts_with("http://") && !self.endpoint.starts_with("https://") {
                    return Err(McpError::InvalidService(format!(
                        "service {:?}: endpoint must start with http:// or https://",
                        self.id
                    )));
                }
            }
            Transport::Stdio => {
                if self.command.trim().is_empty() {
                    return Err(McpError::InvalidService(format!(
                        "service {:?}: stdio command is required",
                        self.id
                    )));
                }
            }
            Transport::Unknown(raw) => {
                return Err(McpError::InvalidService(format!(
                    "service {:?}: transport {raw:?} must be streamable_http, sse or stdio",
                    self.id
                )));
            }
        }
        if self.tool_states.iter().any(|s| s.name.trim().is_empty()) {
            return Err(McpError::InvalidService(format!(
                "service {:?}: tool state name is required",
                self.id
            )));
        }
        Ok(())
    }
}

fn normalize_tool_states(states: Vec<ToolState>) -> Vec<ToolState> {
    let mut by_name: BTreeMap<String, ToolState> = BTreeMap::new();
    for mut state in states {
        let name = state.name.trim().to_string();
        if name.is_empty() {
            continue;
        }
        if state.enabled {
            by_name.remove(&name);
            continue;
        }
        state.name = name.clone();
        by_name.insert(name, state);
    }
    by_name.into_values().collect()
}

/// Lowercase slug of `input`: runs of anything but ASCII letters and digits
/// become a single `-`, with none at either end.
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_dash = false;
    for c in input.trim().chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn unique_service_id(existing: &[Service], service: &Service) -> String {
    let base = [service.name.as_str(), service.endpoint.as_str()]
        .into_iter()
        .map(slugify)
        .find(|slug| !slug.is_empty())
        .unwrap_or_else(|| "service".to_string());

    let taken = |id: &str| existing.iter().any(|s| s.id == id);
    if !taken(&base) {
        return base;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{base}-{n}");
        if !taken(&candidate) {
            return candidate;
        }
        n += 1;
    }
}

/// Read access to the configured services, supplied by whoever owns the
/// configuration. The registry never writes through this trait.
pub trait ServiceDirectory: Send + Sync {
    /// All services, in configuration order.
    fn list_services(&self) -> Vec<Service>;

    fn get_service(&self, id: &str) -> Option<Service>;

    fn is_tool_enabled(&self, service_id: &str, tool_name: &str) -> bool {
        self.get_service(service_id)
            .is_some_and(|s| s.is_tool_enabled(tool_name))
    }

    fn list_enabled_services(&self) -> Vec<Service> {
        self.list_services().into_iter().filter(|s| s.enabled).collect()
    }
}

/// In-memory [`ServiceDirectory`] with mutation hooks for an admin surface.
/// Changes live only as long as the process.
#[derive(Default)]
pub struct MemoryDirectory {
    services: RwLock<Vec<Service>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a directory from configured services, rejecting invalid or
    /// duplicate entries.
    pub fn from_services(services: impl IntoIterator<Item = Service>) -> McpResult<Self> {
        let dir = Self::new();
        for mut service in services {
            service.normalize();
            service.validate()?;
            let mut guard = dir.services.write();
            if guard.iter().any(|s| s.id == service.id) {
                return Err(McpError::InvalidService(format!(
                    "duplicate service id {:?}",
                    service.id
                )));
            }
            guard.push(service);
        }
        Ok(dir)
    }

    /// Inserts or replaces a service. A blank credential or empty override
    /// list on update keeps the stored one.
    ///
    /// A blank id updates the service already registered at the same
    /// endpoint, or else gets a fresh id derived from the name or endpoint.
    /// Returns the id the service was stored under.
    pub fn upsert_service(&self, mut service: Service) -> McpResult<String> {
        service.normalize();

        let mut services = self.services.write();
        if service.id.is_empty() {
            service.id = services
                .iter()
                .find(|s| !service.endpoint.is_empty() && s.endpoint.trim() == service.endpoint)
                .map(|s| s.id.clone())
                .unwrap_or_else(|| unique_service_id(&services, &service));
        }
        if service.name.is_empty() {
            service.name = service.id.clone();
        }
        service.validate()?;
        service.updated_at = Utc::now();

        let id = service.id.clone();
        match services.iter_mut().find(|s| s.id == service.id) {
            Some(existing) => {
                if service.auth_token.is_none() {
                    service.auth_token = existing.auth_token.take();
                }
                if service.tool_states.is_empty() {
                    service.tool_states = std::mem::take(&mut existing.tool_states);
                }
                *existing = service;
            }
            None => services.push(service),
        }
        Ok(id)
    }

    pub fn remove_service(&self, id: &str) -> bool {
        let id = id.trim();
        let mut services = self.services.write();
        let before = services.len();
        services.retain(|s| s.id != id);
        services.len() != before
    }

    pub fn set_enabled(&self, id: &str, enabled: bool) -> McpResult<()> {
        let id = id.trim();
        let mut services = self.services.write();
        let service = services
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| McpError::ServiceNotFound(id.to_string()))?;
        service.enabled = enabled;
        service.updated_at = Utc::now();
        Ok(())
    }

    pub fn set_tool_enabled(&self, service_id: &str, tool_name: &str, enabled: bool) -> McpResult<()> {
        let service_id = service_id.trim();
        let tool_name = tool_name.trim();
        if tool_name.is_empty() {
            return Err(McpError::InvalidService("tool name is required".into()));
        }

        let mut services = self.services.write();
        let service = services
            .iter_mut()
            .find(|s| s.id == service_id)
            .ok_or_else(|| McpError::ServiceNotFound(service_id.to_string()))?;

        let now = Utc::now();
        let mut states = std::mem::take(&mut service.tool_states);
        states.retain(|s| s.name != tool_name);
        states.push(ToolState {
            name: tool_name.to_string(),
            enabled,
            updated_at: now,
        });
        service.tool_states = normalize_tool_states(states);
        service.updated_at = now;
        Ok(())
    }
}

impl ServiceDirectory for MemoryDirectory {
    fn list_services(&self) -> Vec<Service> {
        self.services.read().clone()
    }

    fn get_service(&self, id: &str) -> Option<Service> {
        let id = id.trim();
        self.services.read().iter().find(|s| s.id == id).cloned()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_normalization() {
        assert_eq!(Transport::parse(""), Transport::StreamableHttp);
        assert_eq!(Transport::parse("streamableHttp"), Transport::StreamableHttp);
        assert_eq!(Transport::parse("Streamable-HTTP"), Transport::StreamableHttp);
        assert_eq!(Transport::parse(" SSE "), Transport::Sse);
        assert_eq!(Transport::parse("stdio"), Transport::Stdio);
        assert_eq!(
            Transport::parse("WebSocket"),
            Transport::Unknown("WebSocket".into())
        );
    }

    #[test]
    fn test_unknown_transport_preserved_but_invalid() {
        let service: Service = serde_json::from_str(
            r#"{"id":"ws","endpoint":"http://localhost:1","transport":"websocket"}"#,
        )
        .unwrap();
        assert_eq!(service.transport, Transport::Unknown("websocket".into()));
        assert_eq!(
            serde_json::to_value(&service).unwrap()["transport"],
            "websocket"
        );
        assert!(matches!(service.validate(), Err(McpError::InvalidService(_))));
    }

    #[test]
    fn test_config_defaults() {
        let service: Service =
            serde_json::from_str(r#"{"id":"docs","endpoint":"https://example.com/mcp"}"#).unwrap();
        assert!(service.enabled);
        assert_eq!(service.transport, Transport::StreamableHttp);
        assert!(service.args.is_empty());
        assert!(service.tool_states.is_empty());
        assert!(service.bearer_token().is_none());
    }

    #[test]
    fn test_validation_rules() {
        assert!(Service::http("ok_id-1", "https://x").validate().is_ok());
        assert!(Service::http("bad id", "https://x").validate().is_err());
        assert!(Service::http("", "https://x").validate().is_err());
        assert!(Service::http("a", "ftp://x").validate().is_err());
        assert!(Service::sse("a", "").validate().is_err());
        assert!(Service::stdio("a", "mcp-server", &[]).validate().is_ok());
        assert!(Service::stdio("a", "  ", &[]).validate().is_err());
    }

    #[test]
    fn test_normalize_keeps_only_disabled_overrides() {
        let mut service = Service::http("svc", "http://localhost");
        service.name = "  ".into();
        service.auth_token = Some("   ".into());
        service.tool_states = vec![
            ToolState { name: " zeta ".into(), enabled: false, updated_at: Utc::now() },
            ToolState { name: "alpha".into(), enabled: false, updated_at: Utc::now() },
            ToolState { name: "alpha".into(), enabled: true, updated_at: Utc::now() },
            ToolState { name: "beta".into(), enabled: false, updated_at: Utc::now() },
            ToolState { name: "".into(), enabled: false, updated_at: Utc::now() },
        ];
        service.normalize();

        assert_eq!(service.name, "svc");
        assert!(service.auth_token.is_none());
        let names: Vec<&str> = service.tool_states.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["beta", "zeta"]);
        assert!(service.is_tool_enabled("alpha"));
        assert!(!service.is_tool_enabled("zeta"));
        assert!(!service.is_tool_enabled("  "));
    }

    #[test]
    fn test_directory_rejects_duplicates() {
        let result = MemoryDirectory::from_services(vec![
            Service::http("a", "http://one"),
            Service::http("a", "http://two"),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_directory_tool_toggle() {
        let dir = MemoryDirectory::from_services(vec![Service::http("a", "http://one")]).unwrap();
        assert!(dir.is_tool_enabled("a", "query"));

        dir.set_tool_enabled("a", "query", false).unwrap();
        assert!(!dir.is_tool_enabled("a", "query"));
        assert!(dir.is_tool_enabled("a", "lookup"));

        dir.set_tool_enabled("a", "query", true).unwrap();
        assert!(dir.is_tool_enabled("a", "query"));
        assert!(dir.get_service("a").unwrap().tool_states.is_empty());

        assert!(!dir.is_tool_enabled("missing", "query"));
        assert!(matches!(
            dir.set_tool_enabled("missing", "query", false),
            Err(McpError::ServiceNotFound(_))
        ));
    }

    #[test]
    fn test_directory_upsert_keeps_credential() {
        let mut original = Service::http("a", "http://one");
        original.auth_token = Some("secret".into());
        let dir = MemoryDirectory::from_services(vec![original]).unwrap();

        let mut update = Service::http("a", "http://two");
        update.name = "Renamed".into();
        dir.upsert_service(update).unwrap();

        let stored = dir.get_service("a").unwrap();
        assert_eq!(stored.endpoint, "http://two");
        assert_eq!(stored.name, "Renamed");
        assert_eq!(stored.bearer_token(), Some("secret"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Weather API  "), "weather-api");
        assert_eq!(slugify("__a--b__c__"), "a-b-c");
        assert_eq!(slugify("https://docs.example/mcp"), "https-docs-example-mcp");
        assert_eq!(slugify(" -- "), "");
    }

    #[test]
    fn test_upsert_blank_id_matches_endpoint() {
        let mut original = Service::http("docs", "https://docs.example/mcp");
        original.auth_token = Some("secret".into());
        let dir = MemoryDirectory::from_services(vec![original]).unwrap();

        let mut update = Service::http("", " https://docs.example/mcp ");
        update.name = "Docs".into();
        let id = dir.upsert_service(update).unwrap();

        assert_eq!(id, "docs");
        assert_eq!(dir.list_services().len(), 1);
        let stored = dir.get_service("docs").unwrap();
        assert_eq!(stored.name, "Docs");
        assert_eq!(stored.bearer_token(), Some("secret"));
    }

    #[test]
    fn test_upsert_blank_id_generates_unique_id() {
        let dir = MemoryDirectory::from_services(vec![Service::http(
            "weather-api",
            "https://one.example/mcp",
        )])
        .unwrap();

        let mut named = Service::http("", "https://two.example/mcp");
        named.name = "Weather API".into();
        assert_eq!(dir.upsert_service(named).unwrap(), "weather-api-2");

        let mut named_again = Service::http("", "https://three.example/mcp");
        named_again.name = "Weather  API!".into();
        assert_eq!(dir.upsert_service(named_again).unwrap(), "weather-api-3");

        let unnamed = Service::http("", "https://four.example/mcp");
        let id = dir.upsert_service(unnamed).unwrap();
        assert_eq!(id, "https-four-example-mcp");
        assert_eq!(dir.get_service(&id).unwrap().name, id);

        let anonymous = Service::stdio("", "mcp-server", &[]);
        assert_eq!(dir.upsert_service(anonymous).unwrap(), "service");
        assert_eq!(dir.list_services().len(), 5);
    }

    #[test]
    fn test_directory_enable_and_remove() {
        let dir = MemoryDirectory::from_services(vec![
            Service::http("a", "http://one"),
            Service::http("b", "http://two"),
        ])
        .unwrap();

        dir.set_enabled("a", false).unwrap();
        let enabled: Vec<String> = dir.list_enabled_services().into_iter().map(|s| s.id).collect();
        assert_eq!(enabled, vec!["b"]);

        assert!(dir.remove_service("b"));
        assert!(!dir.remove_service("b"));
        assert_eq!(dir.list_services().len(), 1);
    }
}
