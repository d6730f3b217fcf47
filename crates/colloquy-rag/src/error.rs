//! Error types for the Colloquy core

use colloquy_llm::LlmError;
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors raised by the memory, citation and intent layers
#[derive(Error, Debug)]
pub enum ColloquyError {
    /// Missing or invalid request field (user-correctable)
    #[error("{field} {constraint}, got {value}")]
    Validation {
        /// Offending field
        field: String,
        /// Rule that was violated
        constraint: String,
        /// Value that was supplied
        value: String,
    },

    /// The session store failed or is unreachable
    #[error("Storage operation '{operation}' failed: {source}")]
    Storage {
        /// Store operation that failed
        operation: String,
        /// Underlying cause
        #[source]
        source: BoxError,
    },

    /// The completion service could not produce a summary
    #[error("Summarization failed: {message}")]
    Summarization {
        /// Failure description
        message: String,
        /// Underlying collaborator error
        #[source]
        source: Option<LlmError>,
    },

    /// A named tool is missing or failed
    #[error("Tool invocation failed for intent '{intent}' on service '{service}': {message}")]
    ToolInvocation {
        /// Intent being dispatched
        intent: String,
        /// Owning service
        service: String,
        /// Failure description
        message: String,
        /// Underlying collaborator error
        #[source]
        source: Option<LlmError>,
    },

    /// Intent value not recognised
    #[error("Unknown intent '{intent}', expected one of: summarise, translate, search")]
    UnknownIntent {
        /// The value received
        intent: String,
    },

    /// A collaborator call exceeded its deadline
    #[error("Operation '{operation}' timed out after {seconds}s")]
    Timeout {
        /// Operation that timed out
        operation: String,
        /// Deadline in seconds
        seconds: u64,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ColloquyError {
    /// Create a validation error
    pub fn validation(
        field: impl Into<String>,
        constraint: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        ColloquyError::Validation {
            field: field.into(),
            constraint: constraint.into(),
            value: value.into(),
        }
    }

    /// Create a storage error
    pub fn storage(operation: impl Into<String>, source: impl Into<BoxError>) -> Self {
        ColloquyError::Storage {
            operation: operation.into(),
            source: source.into(),
        }
    }

    /// Create a summarization error from a collaborator failure
    pub fn summarization(message: impl Into<String>, source: Option<LlmError>) -> Self {
        ColloquyError::Summarization {
            message: message.into(),
            source,
        }
    }

    /// Create a tool invocation error
    pub fn tool_invocation(
        intent: impl Into<String>,
        service: impl Into<String>,
        message: impl Into<String>,
        source: Option<LlmError>,
    ) -> Self {
        ColloquyError::ToolInvocation {
            intent: intent.into(),
            service: service.into(),
            message: message.into(),
            source,
        }
    }

    /// Create an unknown intent error
    pub fn unknown_intent(intent: impl Into<String>) -> Self {
        ColloquyError::UnknownIntent {
            intent: intent.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, seconds: u64) -> Self {
        ColloquyError::Timeout {
            operation: operation.into(),
            seconds,
        }
    }

    /// Short category name for logs and metrics labels
    pub fn category(&self) -> &'static str {
        match self {
            ColloquyError::Validation { .. } => "validation",
            ColloquyError::Storage { .. } => "storage",
            ColloquyError::Summarization { .. } => "summarization",
            ColloquyError::ToolInvocation { .. } => "tool_invocation",
            ColloquyError::UnknownIntent { .. } => "unknown_intent",
            ColloquyError::Timeout { .. } => "timeout",
            ColloquyError::Config(_) => "config",
        }
    }

    /// Whether the message can be shown to the end user verbatim
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            ColloquyError::Validation { .. } | ColloquyError::UnknownIntent { .. }
        )
    }

    /// Whether the caller may continue the conversation after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ColloquyError::Summarization { .. } | ColloquyError::Timeout { .. }
        )
    }
}

impl From<serde_json::Error> for ColloquyError {
    fn from(err: serde_json::Error) -> Self {
        ColloquyError::storage("serde_json", err)
    }
}

impl From<config::ConfigError> for ColloquyError {
    fn from(err: config::ConfigError) -> Self {
        ColloquyError::Config(err.to_string())
    }
}

/// Result type alias for Colloquy operations
pub type ColloquyResult<T> = std::result::Result<T, ColloquyError>;
