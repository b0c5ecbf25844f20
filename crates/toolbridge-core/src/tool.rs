use crate::ToolbridgeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A request from the planner to invoke a specific tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Identifier assigned by the planner for this tool call.
    pub id: String,
    /// Exposed name of the tool to invoke.
    pub name: String,
    /// Argument payload. Either a JSON object, or the raw JSON text the model
    /// produced (a string), or null when the model sent nothing.
    #[serde(default)]
    pub arguments: serde_json::Value,
}

impl ToolCall {
    /// Creates a tool call.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The result returned after executing a [`ToolCall`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The ID of the [`ToolCall`] this result corresponds to.
    pub call_id: String,
    /// The textual output produced by the tool.
    pub content: String,
    /// Whether the tool execution ended in an error.
    pub is_error: bool,
}

impl ToolResult {
    /// Creates a successful tool result.
    pub fn success(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: false,
        }
    }

    /// Creates an error tool result.
    pub fn error(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            content: content.into(),
            is_error: true,
        }
    }
}

/// An invocable tool as advertised to the planner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Exposed name, unique within one provider snapshot.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema of the accepted arguments.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Renders the definition in the OpenAI-style `function` tool shape most
    /// chat APIs accept.
    pub fn to_function_json(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}

/// Something that can advertise tools and execute calls against them.
///
/// The orchestration loop only sees this trait: it lists tools once per turn
/// and hands every model-issued call back through [`ToolProvider::call_tool`].
#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Returns the currently invocable tools.
    async fn list_tools(&self) -> ToolbridgeResult<Vec<ToolDefinition>>;

    /// Executes a call. Tool-level failures are reported through
    /// [`ToolResult::is_error`]; `Err` is reserved for provider breakage.
    async fn call_tool(&self, call: ToolCall) -> ToolbridgeResult<ToolResult>;
}
