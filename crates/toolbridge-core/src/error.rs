use thiserror::Error;

/// A convenience `Result` alias using [`ToolbridgeError`].
pub type ToolbridgeResult<T> = Result<T, ToolbridgeError>;

/// Top-level error type shared by every toolbridge crate.
///
/// Subsystems with a richer taxonomy (the MCP client, for one) keep their own
/// enum and convert into this one at the crate boundary.
#[derive(Error, Debug)]
pub enum ToolbridgeError {
    /// A tool could not be listed, resolved, or executed.
    #[error("Tool error: {0}")]
    Tool(String),

    /// Configuration could not be read or failed validation.
    #[error("Config error: {0}")]
    Config(String),

    /// An outbound HTTP exchange failed.
    #[error("HTTP error: {0}")]
    Http(String),

    /// A JSON serialization or deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A standard I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
