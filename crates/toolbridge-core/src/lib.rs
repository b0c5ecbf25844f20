//! Core types and error definitions shared across toolbridge crates.
//!
//! Collaborators (an LLM orchestration loop, an admin UI) depend on this
//! crate only; the MCP machinery lives in `toolbridge-mcp` and is reached
//! through [`ToolProvider`].
//!
//! # Main types
//!
//! - [`ToolbridgeError`] — Unified error enum.
//! - [`ToolbridgeResult`] — Convenience alias for `Result<T, ToolbridgeError>`.
//! - [`ToolCall`] — A planner-initiated tool invocation request.
//! - [`ToolResult`] — The result returned after executing a tool call.
//! - [`ToolDefinition`] — An invocable tool as advertised to the planner.
//! - [`ToolProvider`] — The list/call capability exposed to collaborators.

mod error;
mod tool;

pub use error::{ToolbridgeError, ToolbridgeResult};
pub use tool::{ToolCall, ToolDefinition, ToolProvider, ToolResult};
