//! MCP client configuration, loaded from TOML with environment overrides.

use crate::error::{McpError, McpResult};
use crate::protocol::{Handshake, DEFAULT_PROTOCOL_VERSION};
use crate::service::{MemoryDirectory, Service};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const ENV_HTTP_TIMEOUT: &str = "TOOLBRIDGE_MCP_HTTP_TIMEOUT";
pub const ENV_PROTOCOL_VERSION: &str = "TOOLBRIDGE_MCP_PROTOCOL_VERSION";
pub const ENV_TOOL_CACHE_TTL: &str = "TOOLBRIDGE_MCP_TOOL_CACHE_TTL";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 20;
const DEFAULT_TOOL_CACHE_TTL_SECS: u64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpConfig {
    /// Upper bound for any single protocol operation.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,
    /// How long a discovered tool list is served from cache.
    #[serde(default = "default_tool_cache_ttl_secs")]
    pub tool_cache_ttl_secs: u64,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
    #[serde(default)]
    pub services: Vec<Service>,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_protocol_version() -> String {
    DEFAULT_PROTOCOL_VERSION.to_string()
}

fn default_tool_cache_ttl_secs() -> u64 {
    DEFAULT_TOOL_CACHE_TTL_SECS
}

fn default_client_name() -> String {
    "toolbridge".to_string()
}

fn default_client_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

impl Default for McpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: default_request_timeout_secs(),
            protocol_version: default_protocol_version(),
            tool_cache_ttl_secs: default_tool_cache_ttl_secs(),
            client_name: default_client_name(),
            client_version: default_client_version(),
            services: Vec::new(),
        }
    }
}

impl McpConfig {
    pub fn from_toml_str(raw: &str) -> McpResult<Self> {
        toml::from_str(raw).map_err(|e| McpError::Config(format!("parse mcp config: {e}")))
    }

    /// Reads a TOML file and applies environment overrides.
    pub async fn load(path: impl AsRef<Path>) -> McpResult<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| McpError::Config(format!("read {}: {e}", path.display())))?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies `TOOLBRIDGE_MCP_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(secs) = lookup(ENV_HTTP_TIMEOUT).and_then(|v| parse_secs(ENV_HTTP_TIMEOUT, &v)) {
            self.request_timeout_secs = secs;
        }
        if let Some(version) = lookup(ENV_PROTOCOL_VERSION) {
            let version = version.trim();
            if !version.is_empty() {
                self.protocol_version = version.to_string();
            }
        }
        if let Some(secs) = lookup(ENV_TOOL_CACHE_TTL).and_then(|v| parse_secs(ENV_TOOL_CACHE_TTL, &v)) {
            self.tool_cache_ttl_secs = secs;
        }
    }

    pub fn request_timeout(&self) -> Duration {
        match self.request_timeout_secs {
            0 => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn tool_cache_ttl(&self) -> Duration {
        match self.tool_cache_ttl_secs {
            0 => Duration::from_secs(DEFAULT_TOOL_CACHE_TTL_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn handshake(&self) -> Handshake {
        let pick = |value: &str, fallback: String| {
            let value = value.trim();
            if value.is_empty() {
                fallback
            } else {
                value.to_string()
            }
        };
        Handshake {
            protocol_version: pick(&self.protocol_version, default_protocol_version()),
            client_name: pick(&self.client_name, default_client_name()),
            client_version: pick(&self.client_version, default_client_version()),
        }
    }

    /// Builds the in-memory service directory from the configured services.
    pub fn directory(&self) -> McpResult<MemoryDirectory> {
        MemoryDirectory::from_services(self.services.iter().cloned())
    }
}

fn parse_secs(key: &str, raw: &str) -> Option<u64> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Some(secs),
        _ => {
            warn!(key, value = %raw, "Ignoring invalid duration override");
            None
        }
    }
}
