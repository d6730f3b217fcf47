//! Error types for collaborator calls

use thiserror::Error;

/// Errors raised by completion services and tools
#[derive(Error, Debug)]
pub enum LlmError {
    /// The completion service returned an error
    #[error("Completion failed: {0}")]
    Completion(String),

    /// A tool call failed
    #[error("Tool '{tool}' failed: {message}")]
    Tool {
        /// Name of the tool
        tool: String,
        /// Failure description
        message: String,
    },

    /// A tool was not found in the registry
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool arguments could not be encoded or decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Any other collaborator failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl LlmError {
    /// Create a completion error
    pub fn completion(message: impl Into<String>) -> Self {
        LlmError::Completion(message.into())
    }

    /// Create a tool error
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        LlmError::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }
}

/// Result type alias for collaborator calls
pub type LlmResult<T> = std::result::Result<T, LlmError>;
