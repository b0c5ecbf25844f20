//! Model Context Protocol client for toolbridge.
//!
//! [`McpClient`] speaks JSON-RPC 2.0 to remote tool services over a direct
//! HTTP request, an SSE event stream, or a stdio subprocess, establishing
//! sessions lazily and retrying once when a session has gone stale.
//! [`ToolRegistry`] merges every enabled service's tools into one cached
//! namespace and implements [`toolbridge_core::ToolProvider`].

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod service;
pub mod session;
pub mod sse;
pub mod transport;

pub use client::{McpClient, ToolSource};
pub use config::McpConfig;
pub use error::{McpError, McpResult};
pub use protocol::{RemoteTool, ToolCallResult};
pub use registry::{ServiceStatus, ServiceToolStatus, ToolRegistry};
pub use service::{MemoryDirectory, Service, ServiceDirectory, ToolState, Transport};
pub use session::SessionStore;
