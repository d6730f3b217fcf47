//! Conversation engine
//!
//! The entry point a chat host calls once per turn: build the bounded context
//! before asking the agent, record the exchange afterwards, extract citations
//! from the answer, and route explicit intents to service tools.

use crate::citation::{self, SourceReference};
use crate::config::ColloquyConfig;
use crate::error::ColloquyResult;
use crate::intent::{IntentReply, IntentRequest, IntentResponse, IntentRouter, IntentScope};
use crate::memory::{BoundedContext, MemoryCompactor, SummaryGenerator};
use crate::session::{derive_title, Session, SessionInfo, SessionMetadata, SessionStore};
use colloquy_llm::{ChatMessage, CompletionClient, ToolRegistry};
use std::sync::Arc;

/// Facade over session storage, memory compaction, citations and intents
pub struct ConversationEngine {
    store: Arc<dyn SessionStore>,
    compactor: MemoryCompactor,
    router: IntentRouter,
    config: ColloquyConfig,
}

impl ConversationEngine {
    /// Create an engine; fails if `config` is invalid
    pub fn new(
        store: Arc<dyn SessionStore>,
        completion: Arc<dyn CompletionClient>,
        tools: Arc<dyn ToolRegistry>,
        config: ColloquyConfig,
    ) -> ColloquyResult<Self> {
        config.validate()?;

        let generator = SummaryGenerator::new(completion, config.completion_timeout());
        let compactor = MemoryCompactor::new(store.clone(), generator, &config);
        let router = IntentRouter::new(tools, config.clone());

        tracing::info!(
            short_term_limit = config.short_term_limit,
            summary_word_limit = config.summary_word_limit,
            "Conversation engine initialized"
        );

        Ok(Self {
            store,
            compactor,
            router,
            config,
        })
    }

    /// Active configuration
    pub fn config(&self) -> &ColloquyConfig {
        &self.config
    }

    /// Underlying session store
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Create the session if needed
    pub async fn ensure_session(
        &self,
        session_id: &str,
        user_id: &str,
        metadata: SessionMetadata,
    ) -> ColloquyResult<Session> {
        self.store.ensure_session(session_id, user_id, metadata).await
    }

    /// Load a session with its full history
    pub async fn get_session(&self, session_id: &str, user_id: &str) -> ColloquyResult<Option<Session>> {
        self.store.get_session(session_id, user_id).await
    }

    /// A user's sessions, most recently updated first
    pub async fn list_sessions(&self, user_id: &str) -> ColloquyResult<Vec<SessionInfo>> {
        self.store.list_sessions(user_id).await
    }

    /// Context to send to the agent for the next turn
    pub async fn build_context(&self, session_id: &str, user_id: &str) -> ColloquyResult<BoundedContext> {
        self.compactor.build_context(session_id, user_id).await
    }

    /// Record a text exchange.
    ///
    /// Creates the session on first use, titled after the user's message.
    pub async fn record_turn(
        &self,
        session_id: &str,
        user_id: &str,
        user_text: &str,
        agent_text: &str,
        doc_id: Option<&str>,
    ) -> ColloquyResult<usize> {
        let mut metadata = SessionMetadata::new();
        if let Some(title) = derive_title(user_text) {
            metadata = metadata.with_title(title);
        }
        if let Some(doc_id) = doc_id {
            metadata = metadata.with_doc_id(doc_id);
        }

        self.record_exchange(
            session_id,
            user_id,
            ChatMessage::user(user_text),
            ChatMessage::assistant(agent_text),
            metadata,
        )
        .await
    }

    /// Record a user message and the agent's reply, compacting after each.
    ///
    /// `metadata` only applies when the session is created. Returns the new
    /// message count.
    pub async fn record_exchange(
        &self,
        session_id: &str,
        user_id: &str,
        user_message: ChatMessage,
        agent_message: ChatMessage,
        metadata: SessionMetadata,
    ) -> ColloquyResult<usize> {
        let result = self
            .append_exchange(session_id, user_id, user_message, agent_message, metadata)
            .await;

        if let Err(e) = &result {
            tracing::error!(
                session_id,
                user_id,
                category = e.category(),
                error = %e,
                "Failed to record conversation turn"
            );
        }

        result
    }

    async fn append_exchange(
        &self,
        session_id: &str,
        user_id: &str,
        user_message: ChatMessage,
        agent_message: ChatMessage,
        metadata: SessionMetadata,
    ) -> ColloquyResult<usize> {
        self.store.ensure_session(session_id, user_id, metadata).await?;
        self.compactor.append(session_id, user_id, user_message).await?;
        self.compactor.append(session_id, user_id, agent_message).await
    }

    /// Sources cited by an agent answer
    pub fn extract_references(&self, response: &str, retrieval: Option<&str>) -> Vec<SourceReference> {
        citation::extract_references(response, retrieval)
    }

    /// Validate and dispatch an intent, surfacing errors to the caller
    pub async fn route_intent(
        &self,
        request: &IntentRequest,
        scope: &IntentScope,
    ) -> ColloquyResult<IntentResponse> {
        self.router.route_intent(request, scope).await
    }

    /// Dispatch an intent and convert the outcome into a client reply.
    ///
    /// Validation messages are passed through; anything else is logged with
    /// its context and replaced by a generic failure message.
    pub async fn handle_intent(
        &self,
        session_id: &str,
        request: &IntentRequest,
        scope: &IntentScope,
    ) -> IntentReply {
        match self.router.route_intent(request, scope).await {
            Ok(response) => IntentReply::success(response),
            Err(e) if e.is_user_facing() => {
                tracing::warn!(
                    session_id,
                    user_id = %scope.user_id,
                    intent = %request.intent,
                    error = %e,
                    "Rejected intent request"
                );
                IntentReply::failure(&e)
            }
            Err(e) => {
                tracing::error!(
                    session_id,
                    user_id = %scope.user_id,
                    intent = %request.intent,
                    category = e.category(),
                    error = %e,
                    "Intent processing failed"
                );
                IntentReply::failure(&e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryState;
    use crate::session::MemorySessionStore;
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use colloquy_llm::{FnTool, LlmResult, StaticToolRegistry};

    struct EchoCompletion;

    #[async_trait]
    impl CompletionClient for EchoCompletion {
        async fn complete(&self, _prompt: &str) -> LlmResult<String> {
            Ok("they talked".to_string())
        }
    }

    fn engine() -> ConversationEngine {
        let store = Arc::new(MemorySessionStore::new(Arc::new(InMemoryStorage::new())));
        let tools = StaticToolRegistry::new().with_tool(
            "rag",
            FnTool::new("retrieve", |_| {
                Ok("Rust is fast. SOURCE_CITATION: \\cite{rust.pdf, page 2}".to_string())
            }),
        );
        ConversationEngine::new(
            store,
            Arc::new(EchoCompletion),
            Arc::new(tools),
            ColloquyConfig::default().with_short_term_limit(4),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let store = Arc::new(MemorySessionStore::new(Arc::new(InMemoryStorage::new())));
        let result = ConversationEngine::new(
            store,
            Arc::new(EchoCompletion),
            Arc::new(StaticToolRegistry::new()),
            ColloquyConfig::default().with_short_term_limit(0),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_record_turn_creates_titled_session() {
        let engine = engine();
        let count = engine
            .record_turn("s1", "u1", "  What is   ownership? ", "A set of rules.", Some("doc-1"))
            .await
            .unwrap();
        assert_eq!(count, 2);

        let session = engine.get_session("s1", "u1").await.unwrap().unwrap();
        assert_eq!(session.info.title.as_deref(), Some("What is ownership?"));
        assert_eq!(session.info.doc_id.as_deref(), Some("doc-1"));
        assert_eq!(session.messages[1].text(), "A set of rules.");

        engine
            .record_turn("s1", "u1", "Another question", "Another answer", None)
            .await
            .unwrap();
        let session = engine.get_session("s1", "u1").await.unwrap().unwrap();
        assert_eq!(session.info.title.as_deref(), Some("What is ownership?"));
        assert_eq!(session.message_count(), 4);
    }

    #[tokio::test]
    async fn test_context_is_bounded_after_many_turns() {
        let engine = engine();
        for i in 0..6 {
            engine
                .record_turn("s1", "u1", &format!("q{}", i), &format!("a{}", i), None)
                .await
                .unwrap();
        }

        // 12 messages, hot window 4: two completed chunks.
        let context = engine.build_context("s1", "u1").await.unwrap();
        assert_eq!(context.state, MemoryState::Summarized);
        assert_eq!(context.summaries_used, 2);
        assert_eq!(context.messages.len(), 5);
        assert_eq!(context.messages[4].text(), "a5");
    }

    #[tokio::test]
    async fn test_handle_intent_success_and_failure() {
        let engine = engine();
        let scope = IntentScope::new("u1").with_collections(vec!["c1".to_string()]);

        let reply = engine
            .handle_intent("s1", &IntentRequest::search().with_query("rust"), &scope)
            .await;
        assert!(reply.success);
        let rag = reply.rag_response.unwrap_or_default();
        let refs = engine.extract_references(
            "Fast. SOURCE_CITATION: \\cite{rust.pdf, page 2}",
            Some(&rag),
        );
        assert_eq!(refs[0].text_content.as_deref(), Some("Rust is fast."));

        let reply = engine
            .handle_intent("s1", &IntentRequest::summarise(), &IntentScope::new("u1"))
            .await;
        assert!(!reply.success);
        assert!(reply.error.unwrap_or_default().contains("doc_id"));

        let reply = engine
            .handle_intent("s1", &IntentRequest::translate("German"), &IntentScope::new("u1").with_doc_id("d"))
            .await;
        assert!(!reply.success);
        assert_eq!(reply.error.as_deref(), Some(IntentReply::GENERIC_FAILURE));
    }
}
