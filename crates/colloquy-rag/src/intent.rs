//! # Structured intent routing
//!
//! Explicit actions (summarise a document, translate it, search a collection)
//! bypass the agent and go straight to the tool of the service that owns them.
//!
//! ```text
//! IntentRequest --validate--> ValidatedIntent --find_tool/invoke--> IntentResponse
//! ```
//!
//! | Intent      | Service          | Tool                                                   |
//! |-------------|------------------|--------------------------------------------------------|
//! | `summarise` | summarization    | `summarize_by_word_count` / `summarize_by_detail_level` |
//! | `translate` | translation      | `translate_document`                                   |
//! | `search`    | rag              | `retrieve`                                             |

use crate::config::ColloquyConfig;
use crate::error::{ColloquyError, ColloquyResult};
use colloquy_llm::ToolRegistry;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

/// Accepted summary word counts
pub const WORD_COUNT_RANGE: RangeInclusive<i64> = 10..=2000;

/// Accepted search result limits
pub const LIMIT_RANGE: RangeInclusive<i64> = 1..=20;

/// Search limit when none is given
pub const DEFAULT_SEARCH_LIMIT: u32 = 5;

/// Supported intents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentKind {
    /// Summarise a document
    Summarise,
    /// Translate a document
    Translate,
    /// Search document collections
    Search,
}

impl IntentKind {
    /// Parse an intent value, case-insensitively
    pub fn parse(value: &str) -> ColloquyResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "summarise" | "summarize" => Ok(IntentKind::Summarise),
            "translate" => Ok(IntentKind::Translate),
            "search" => Ok(IntentKind::Search),
            _ => Err(ColloquyError::unknown_intent(value)),
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentKind::Summarise => "summarise",
            IntentKind::Translate => "translate",
            IntentKind::Search => "search",
        }
    }
}

impl fmt::Display for IntentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary detail level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLevel {
    /// Short overview
    Concise,
    /// Balanced summary
    #[default]
    Medium,
    /// Thorough summary
    Detailed,
}

impl SummaryLevel {
    fn parse(value: &str) -> ColloquyResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "concise" => Ok(SummaryLevel::Concise),
            "medium" => Ok(SummaryLevel::Medium),
            "detailed" => Ok(SummaryLevel::Detailed),
            _ => Err(ColloquyError::validation(
                "level",
                "must be one of concise, medium, detailed",
                value,
            )),
        }
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryLevel::Concise => "concise",
            SummaryLevel::Medium => "medium",
            SummaryLevel::Detailed => "detailed",
        }
    }
}

/// An intent as received from a client, before validation.
///
/// Only the fields relevant to `intent` are read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentRequest {
    /// `summarise`, `translate` or `search`
    pub intent: String,

    /// Summary detail level
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,

    /// Target summary length in words; wins over `level`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_count: Option<i64>,

    /// Translation target language
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,

    /// Maximum search results
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<i64>,

    /// Search text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Free-form instructions forwarded to summarise and translate tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_instructions: Option<String>,
}

impl IntentRequest {
    /// Create a request for an intent value
    pub fn new(intent: impl Into<String>) -> Self {
        Self {
            intent: intent.into(),
            ..Default::default()
        }
    }

    /// A `summarise` request
    pub fn summarise() -> Self {
        Self::new(IntentKind::Summarise.as_str())
    }

    /// A `translate` request
    pub fn translate(target_language: impl Into<String>) -> Self {
        Self::new(IntentKind::Translate.as_str()).with_target_language(target_language)
    }

    /// A `search` request
    pub fn search() -> Self {
        Self::new(IntentKind::Search.as_str())
    }

    /// Set the summary level
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = Some(level.into());
        self
    }

    /// Set the summary word count
    pub fn with_word_count(mut self, word_count: i64) -> Self {
        self.word_count = Some(word_count);
        self
    }

    /// Set the target language
    pub fn with_target_language(mut self, target_language: impl Into<String>) -> Self {
        self.target_language = Some(target_language.into());
        self
    }

    /// Set the search limit
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the search query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    /// Set additional instructions
    pub fn with_additional_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.additional_instructions = Some(instructions.into());
        self
    }
}

/// Where an intent applies: the caller and the session's documents
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntentScope {
    /// Requesting user
    pub user_id: String,

    /// Collections a search runs over
    pub collection_ids: Vec<String>,

    /// Document to summarise or translate
    pub doc_id: Option<String>,

    /// Search text used when the request carries no query
    pub fallback_query: Option<String>,
}

impl IntentScope {
    /// Scope for a user
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Default::default()
        }
    }

    /// Set the collections
    pub fn with_collections(mut self, collection_ids: Vec<String>) -> Self {
        self.collection_ids = collection_ids;
        self
    }

    /// Set the document
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Set the fallback search text
    pub fn with_fallback_query(mut self, query: impl Into<String>) -> Self {
        self.fallback_query = Some(query.into());
        self
    }
}

/// A request that passed validation, with exactly the arguments its tool needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidatedIntent {
    /// Summarise at a detail level
    SummariseByLevel {
        /// Document to summarise
        document_id: String,
        /// Detail level
        level: SummaryLevel,
        /// Forwarded instructions
        additional_instructions: Option<String>,
    },
    /// Summarise to a word count
    SummariseByWordCount {
        /// Document to summarise
        document_id: String,
        /// Target length
        num_words: u32,
        /// Forwarded instructions
        additional_instructions: Option<String>,
    },
    /// Translate a document
    Translate {
        /// Document to translate
        document_id: String,
        /// Target language
        target_lang: String,
        /// Forwarded instructions
        additional_instructions: Option<String>,
    },
    /// Search collections
    Search {
        /// Search text, possibly empty
        query: String,
        /// Collections to search
        collection_ids: Vec<String>,
        /// Maximum results
        limit: u32,
    },
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn require_doc_id(scope: &IntentScope, intent: IntentKind) -> ColloquyResult<String> {
    non_empty(scope.doc_id.as_deref()).ok_or_else(|| {
        ColloquyError::validation(
            "doc_id",
            format!("is required for intent '{}'", intent),
            "none",
        )
    })
}

impl ValidatedIntent {
    /// Validate a raw request against its scope
    pub fn validate(request: &IntentRequest, scope: &IntentScope) -> ColloquyResult<Self> {
        let kind = IntentKind::parse(&request.intent)?;
        let additional_instructions = non_empty(request.additional_instructions.as_deref());

        match kind {
            IntentKind::Summarise => {
                let document_id = require_doc_id(scope, kind)?;

                if let Some(word_count) = request.word_count {
                    if !WORD_COUNT_RANGE.contains(&word_count) {
                        return Err(ColloquyError::validation(
                            "word_count",
                            format!(
                                "must be between {} and {}",
                                WORD_COUNT_RANGE.start(),
                                WORD_COUNT_RANGE.end()
                            ),
                            word_count.to_string(),
                        ));
                    }
                    return Ok(ValidatedIntent::SummariseByWordCount {
                        document_id,
                        num_words: word_count as u32,
                        additional_instructions,
                    });
                }

                let level = match request.level.as_deref() {
                    Some(level) => SummaryLevel::parse(level)?,
                    None => SummaryLevel::default(),
                };
                Ok(ValidatedIntent::SummariseByLevel {
                    document_id,
                    level,
                    additional_instructions,
                })
            }
            IntentKind::Translate => {
                let document_id = require_doc_id(scope, kind)?;
                let target_lang = non_empty(request.target_language.as_deref()).ok_or_else(|| {
                    ColloquyError::validation(
                        "target_language",
                        "is required for intent 'translate'",
                        "none",
                    )
                })?;
                Ok(ValidatedIntent::Translate {
                    document_id,
                    target_lang,
                    additional_instructions,
                })
            }
            IntentKind::Search => {
                let collection_ids: Vec<String> = scope
                    .collection_ids
                    .iter()
                    .filter_map(|id| non_empty(Some(id.as_str())))
                    .collect();
                if collection_ids.is_empty() {
                    return Err(ColloquyError::validation(
                        "collection_id",
                        "must name at least one collection for intent 'search'",
                        "[]",
                    ));
                }

                let limit = match request.limit {
                    Some(limit) if LIMIT_RANGE.contains(&limit) => limit as u32,
                    Some(limit) => {
                        return Err(ColloquyError::validation(
                            "limit",
                            format!(
                                "must be between {} and {}",
                                LIMIT_RANGE.start(),
                                LIMIT_RANGE.end()
                            ),
                            limit.to_string(),
                        ))
                    }
                    None => DEFAULT_SEARCH_LIMIT,
                };

                let query = non_empty(request.query.as_deref())
                    .or_else(|| non_empty(scope.fallback_query.as_deref()))
                    .unwrap_or_default();

                Ok(ValidatedIntent::Search {
                    query,
                    collection_ids,
                    limit,
                })
            }
        }
    }

    /// Intent this request came from
    pub fn kind(&self) -> IntentKind {
        match self {
            ValidatedIntent::SummariseByLevel { .. }
            | ValidatedIntent::SummariseByWordCount { .. } => IntentKind::Summarise,
            ValidatedIntent::Translate { .. } => IntentKind::Translate,
            ValidatedIntent::Search { .. } => IntentKind::Search,
        }
    }

    /// Name of the tool to invoke
    pub fn tool_name(&self) -> &'static str {
        match self {
            ValidatedIntent::SummariseByLevel { .. } => "summarize_by_detail_level",
            ValidatedIntent::SummariseByWordCount { .. } => "summarize_by_word_count",
            ValidatedIntent::Translate { .. } => "translate_document",
            ValidatedIntent::Search { .. } => "retrieve",
        }
    }

    /// Service owning the tool
    pub fn service<'a>(&self, config: &'a ColloquyConfig) -> &'a str {
        match self.kind() {
            IntentKind::Summarise => &config.summarization_service,
            IntentKind::Translate => &config.translation_service,
            IntentKind::Search => &config.search_service,
        }
    }

    /// JSON arguments for the tool
    pub fn arguments(&self, user_id: &str) -> Value {
        let mut args = match self {
            ValidatedIntent::SummariseByLevel {
                document_id, level, ..
            } => json!({
                "user_id": user_id,
                "document_id": document_id,
                "summarization_level": level.as_str(),
            }),
            ValidatedIntent::SummariseByWordCount {
                document_id,
                num_words,
                ..
            } => json!({
                "user_id": user_id,
                "document_id": document_id,
                "num_words": num_words,
            }),
            ValidatedIntent::Translate {
                document_id,
                target_lang,
                ..
            } => json!({
                "user_id": user_id,
                "document_id": document_id,
                "target_lang": target_lang,
            }),
            ValidatedIntent::Search {
                query,
                collection_ids,
                limit,
            } => json!({
                "query": query,
                "user_id": user_id,
                "collection_id": collection_ids,
                "limit": limit,
            }),
        };

        if let (Some(instructions), Some(map)) = (self.additional_instructions(), args.as_object_mut()) {
            map.insert(
                "additional_instructions".to_string(),
                Value::String(instructions.to_string()),
            );
        }

        args
    }

    fn additional_instructions(&self) -> Option<&str> {
        match self {
            ValidatedIntent::SummariseByLevel {
                additional_instructions,
                ..
            }
            | ValidatedIntent::SummariseByWordCount {
                additional_instructions,
                ..
            }
            | ValidatedIntent::Translate {
                additional_instructions,
                ..
            } => additional_instructions.as_deref(),
            ValidatedIntent::Search { .. } => None,
        }
    }
}

/// Raw tool output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentResponse {
    /// Tool output, unmodified
    pub response: String,

    /// For searches, the same output kept as citation source text
    pub rag_response: Option<String>,
}

/// Result of an intent as shown to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentReply {
    /// Whether the tool ran
    pub success: bool,

    /// Tool output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,

    /// Citation source text for searches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rag_response: Option<String>,

    /// Failure message
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IntentReply {
    /// Message shown for failures that are not the user's to fix
    pub const GENERIC_FAILURE: &'static str =
        "Failed to process the request. Please try again later.";

    /// Successful reply
    pub fn success(response: IntentResponse) -> Self {
        Self {
            success: true,
            response: Some(response.response),
            rag_response: response.rag_response,
            error: None,
        }
    }

    /// Failed reply; only user-facing errors keep their message
    pub fn failure(error: &ColloquyError) -> Self {
        let message = if error.is_user_facing() {
            error.to_string()
        } else {
            Self::GENERIC_FAILURE.to_string()
        };
        Self {
            success: false,
            response: None,
            rag_response: None,
            error: Some(message),
        }
    }
}

/// Dispatches validated intents to service tools
pub struct IntentRouter {
    registry: Arc<dyn ToolRegistry>,
    config: ColloquyConfig,
}

impl IntentRouter {
    /// Create a router
    pub fn new(registry: Arc<dyn ToolRegistry>, config: ColloquyConfig) -> Self {
        Self { registry, config }
    }

    /// Validate and dispatch an intent, returning the tool's raw output
    pub async fn route_intent(
        &self,
        request: &IntentRequest,
        scope: &IntentScope,
    ) -> ColloquyResult<IntentResponse> {
        let intent = ValidatedIntent::validate(request, scope)?;
        let output = self.dispatch(&intent, &scope.user_id).await?;

        let rag_response = match intent.kind() {
            IntentKind::Search => Some(output.clone()),
            _ => None,
        };

        Ok(IntentResponse {
            response: output,
            rag_response,
        })
    }

    /// Invoke the tool for an already validated intent
    pub async fn dispatch(&self, intent: &ValidatedIntent, user_id: &str) -> ColloquyResult<String> {
        let kind = intent.kind();
        let service = intent.service(&self.config);
        let tool_name = intent.tool_name();
        let deadline = self.config.tool_timeout();

        tracing::info!(
            intent = %kind,
            service,
            tool = tool_name,
            user_id,
            "Dispatching intent"
        );

        let tool = tokio::time::timeout(deadline, self.registry.find_tool(service, tool_name))
            .await
            .map_err(|_| {
                ColloquyError::timeout(format!("list_tools {}", service), deadline.as_secs())
            })?
            .map_err(|e| {
                ColloquyError::tool_invocation(
                    kind.as_str(),
                    service,
                    format!("tool '{}' unavailable", tool_name),
                    Some(e),
                )
            })?;

        let output = tokio::time::timeout(deadline, tool.invoke(intent.arguments(user_id)))
            .await
            .map_err(|_| {
                ColloquyError::timeout(format!("{}/{}", service, tool_name), deadline.as_secs())
            })?
            .map_err(|e| {
                ColloquyError::tool_invocation(
                    kind.as_str(),
                    service,
                    format!("tool '{}' failed", tool_name),
                    Some(e),
                )
            })?;

        tracing::debug!(
            intent = %kind,
            service,
            tool = tool_name,
            output_chars = output.len(),
            "Intent completed"
        );

        Ok(output)
    }
}
