//! Configuration for the conversation core

use crate::error::{ColloquyError, ColloquyResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix (`COLLOQUY_SHORT_TERM_LIMIT`, ...)
pub const ENV_PREFIX: &str = "COLLOQUY";

/// Configuration for memory compaction, summaries and intent dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColloquyConfig {
    /// Size of the verbatim hot window, and of each summarized chunk
    pub short_term_limit: usize,

    /// Word budget for each chunk summary
    pub summary_word_limit: usize,

    /// Deadline for completion calls, in seconds
    pub completion_timeout_secs: u64,

    /// Deadline for tool invocations, in seconds
    pub tool_timeout_secs: u64,

    /// Service owning the summarization tools
    pub summarization_service: String,

    /// Service owning the translation tools
    pub translation_service: String,

    /// Service owning the retrieval tools
    pub search_service: String,
}

impl Default for ColloquyConfig {
    fn default() -> Self {
        Self {
            short_term_limit: 10,
            summary_word_limit: 100,
            completion_timeout_secs: 30,
            tool_timeout_secs: 60,
            summarization_service: "summarization".to_string(),
            translation_service: "translation".to_string(),
            search_service: "rag".to_string(),
        }
    }
}

impl ColloquyConfig {
    /// Create the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from an optional config file, overridden by `COLLOQUY_*` variables
    pub fn load(path: impl AsRef<Path>) -> ColloquyResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `COLLOQUY_*` environment variables only
    pub fn from_env() -> ColloquyResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check invariants the compactor relies on
    pub fn validate(&self) -> ColloquyResult<()> {
        if self.short_term_limit == 0 {
            return Err(ColloquyError::Config(
                "short_term_limit must be greater than 0".to_string(),
            ));
        }
        if self.summary_word_limit == 0 {
            return Err(ColloquyError::Config(
                "summary_word_limit must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Set the hot window / chunk size
    pub fn with_short_term_limit(mut self, limit: usize) -> Self {
        self.short_term_limit = limit;
        self
    }

    /// Set the summary word budget
    pub fn with_summary_word_limit(mut self, words: usize) -> Self {
        self.summary_word_limit = words;
        self
    }

    /// Set the completion deadline
    pub fn with_completion_timeout(mut self, timeout: Duration) -> Self {
        self.completion_timeout_secs = timeout.as_secs();
        self
    }

    /// Set the tool deadline
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout_secs = timeout.as_secs();
        self
    }

    /// Completion deadline
    pub fn completion_timeout(&self) -> Duration {
        Duration::from_secs(self.completion_timeout_secs)
    }

    /// Tool deadline
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = ColloquyConfig::default();
        assert_eq!(config.short_term_limit, 10);
        assert_eq!(config.completion_timeout(), Duration::from_secs(30));
        assert_eq!(config.search_service, "rag");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_limit_rejected() {
        let config = ColloquyConfig::new().with_short_term_limit(0);
        assert!(matches!(config.validate(), Err(ColloquyError::Config(_))));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "short_term_limit = 4").unwrap();
        writeln!(file, "search_service = \"retrieval\"").unwrap();

        let config = ColloquyConfig::load(file.path()).unwrap();
        assert_eq!(config.short_term_limit, 4);
        assert_eq!(config.search_service, "retrieval");
        assert_eq!(config.summary_word_limit, 100);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let config = ColloquyConfig::load("/nonexistent/colloquy.toml").unwrap();
        assert_eq!(config.tool_timeout_secs, 60);
    }
}
