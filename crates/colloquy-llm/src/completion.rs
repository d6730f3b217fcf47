//! Text completion contract

use crate::error::LlmResult;
use async_trait::async_trait;

/// A service that turns a prompt into generated text.
///
/// Only the summary generator talks to this; the agent's own model client lives
/// outside this workspace.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Complete the prompt and return the generated text
    async fn complete(&self, prompt: &str) -> LlmResult<String>;

    /// Model identifier, for logging
    fn model_name(&self) -> &str {
        "unknown"
    }
}
