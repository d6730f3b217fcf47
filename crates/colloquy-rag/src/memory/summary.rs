//! Chunk summaries through a completion service

use crate::error::{ColloquyError, ColloquyResult};
use colloquy_llm::{ChatMessage, CompletionClient};
use std::sync::Arc;
use std::time::Duration;

/// Characters allowed per requested word before the summary is cut
pub const CHARS_PER_WORD: usize = 6;

/// Produces short natural-language compressions of message blocks
#[derive(Clone)]
pub struct SummaryGenerator {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
}

impl SummaryGenerator {
    /// Create a generator with a completion deadline
    pub fn new(client: Arc<dyn CompletionClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Render messages as `Role: text` lines
    pub fn transcript(messages: &[ChatMessage]) -> String {
        let mut conversation = String::new();
        for msg in messages {
            conversation.push_str(&format!("{}: {}\n", msg.role.label(), msg.text()));
        }
        conversation
    }

    /// Build the summarization prompt
    pub fn build_prompt(messages: &[ChatMessage], word_limit: usize) -> String {
        format!(
            "Summarize this exchange in exactly {} words or fewer. Preserve the topics discussed, \
             any decisions made, and the context needed to continue the conversation.\n\n{}",
            word_limit,
            Self::transcript(messages)
        )
    }

    /// Cut a completion to the character bound for `word_limit`
    pub fn truncate(text: &str, word_limit: usize) -> String {
        let max_chars = word_limit.saturating_mul(CHARS_PER_WORD);
        let trimmed = text.trim();
        match trimmed.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => trimmed[..byte_idx].trim_end().to_string(),
            None => trimmed.to_string(),
        }
    }

    /// Summarize a block of messages in at most `word_limit` words.
    ///
    /// Calls the completion service exactly once. Collaborator errors, timeouts
    /// and empty completions all surface as [`ColloquyError::Summarization`].
    pub async fn summarize(
        &self,
        messages: &[ChatMessage],
        word_limit: usize,
    ) -> ColloquyResult<String> {
        if messages.is_empty() {
            return Err(ColloquyError::validation(
                "messages",
                "must not be empty",
                "0 messages provided",
            ));
        }

        let prompt = Self::build_prompt(messages, word_limit);

        tracing::debug!(
            model = self.client.model_name(),
            message_count = messages.len(),
            word_limit,
            "Requesting chunk summary"
        );

        let completion = tokio::time::timeout(self.timeout, self.client.complete(&prompt))
            .await
            .map_err(|_| {
                ColloquyError::summarization(
                    format!("completion timed out after {}s", self.timeout.as_secs()),
                    None,
                )
            })?
            .map_err(|e| ColloquyError::summarization(e.to_string(), Some(e)))?;

        let summary = Self::truncate(&completion, word_limit);
        if summary.is_empty() {
            return Err(ColloquyError::summarization(
                "completion returned an empty summary",
                None,
            ));
        }

        Ok(summary)
    }
}
