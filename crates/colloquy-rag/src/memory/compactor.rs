//! Bounded conversation context with persisted chunk summaries
//!
//! With `hot = short_term_limit`, `total` messages and `cold = total - hot`:
//!
//! - `total <= hot`: every message is sent verbatim ([`MemoryState::Unbounded`])
//! - `cold / hot == 0`: cold messages are not yet summarizable, so everything is
//!   sent verbatim ([`MemoryState::PartialCold`])
//! - otherwise one synthetic system message carries the summaries of the first
//!   `cold / hot` chunks, followed by the hot window ([`MemoryState::Summarized`])
//!
//! Summaries are created right after an append lands on a chunk boundary
//! (`cold > 0 && cold % hot == 0`). Creation is serialized per session, and the
//! store's conditional insert turns any remaining duplicate into a no-op.

use super::summary::SummaryGenerator;
use crate::config::ColloquyConfig;
use crate::error::ColloquyResult;
use crate::session::{SessionStore, SummaryRecord};
use colloquy_llm::ChatMessage;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Header of the synthetic summary message
pub const SUMMARY_PREFIX: &str = "Summary of the earlier conversation:";

/// Compaction state for a given message count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryState {
    /// Everything fits in the hot window
    Unbounded,
    /// Cold messages exist but no chunk is complete
    PartialCold,
    /// At least one completed chunk is represented by its summary
    Summarized,
}

/// The context to send to the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundedContext {
    /// Messages in the order they should be sent
    pub messages: Vec<ChatMessage>,

    /// Compaction state the context was built in
    pub state: MemoryState,

    /// Number of persisted summaries folded into the synthetic message
    pub summaries_used: usize,

    /// Completed chunks sent verbatim because their summary is missing
    pub missing_summaries: usize,

    /// Total messages stored for the session
    pub total_messages: usize,
}

/// Keeps agent context bounded by compacting cold messages into summaries
pub struct MemoryCompactor {
    store: Arc<dyn SessionStore>,
    generator: SummaryGenerator,
    short_term_limit: usize,
    summary_word_limit: usize,
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl MemoryCompactor {
    /// Create a compactor. `config` must have passed [`ColloquyConfig::validate`].
    pub fn new(
        store: Arc<dyn SessionStore>,
        generator: SummaryGenerator,
        config: &ColloquyConfig,
    ) -> Self {
        Self {
            store,
            generator,
            short_term_limit: config.short_term_limit.max(1),
            summary_word_limit: config.summary_word_limit.max(1),
            locks: DashMap::new(),
        }
    }

    /// Hot window size
    pub fn short_term_limit(&self) -> usize {
        self.short_term_limit
    }

    /// The session store
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Classify a message count
    pub fn state(&self, total: usize) -> MemoryState {
        let hot = self.short_term_limit;
        if total <= hot {
            MemoryState::Unbounded
        } else if (total - hot) / hot == 0 {
            MemoryState::PartialCold
        } else {
            MemoryState::Summarized
        }
    }

    /// Chunk index whose summary becomes due once the log holds `total` messages
    pub fn due_chunk(&self, total: usize) -> Option<usize> {
        let hot = self.short_term_limit;
        let cold = total.checked_sub(hot)?;
        if cold > 0 && cold % hot == 0 {
            Some(cold / hot - 1)
        } else {
            None
        }
    }

    /// Assemble the bounded context for a session
    pub async fn build_context(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> ColloquyResult<BoundedContext> {
        let hot = self.short_term_limit;
        // The log is append-only, so positions below `total` are stable.
        let total = self.store.message_count(session_id, user_id).await?;
        let state = self.state(total);

        let context = match state {
            MemoryState::Unbounded | MemoryState::PartialCold => BoundedContext {
                messages: self
                    .store
                    .read_message_range(session_id, user_id, 0, total)
                    .await?,
                state,
                summaries_used: 0,
                missing_summaries: 0,
                total_messages: total,
            },
            MemoryState::Summarized => {
                let chunk_count = (total - hot) / hot;
                let summaries = self
                    .store
                    .find_summaries(session_id, user_id, chunk_count)
                    .await?;

                let mut messages = Vec::with_capacity(hot + 1);
                if !summaries.is_empty() {
                    messages.push(Self::summary_message(&summaries));
                }

                let mut missing = 0;
                for index in 0..chunk_count {
                    if summaries.iter().any(|s| s.summary_index == index) {
                        continue;
                    }
                    missing += 1;
                    let chunk = self
                        .store
                        .read_message_range(session_id, user_id, index * hot, (index + 1) * hot)
                        .await?;
                    messages.extend(chunk);
                }

                messages.extend(
                    self.store
                        .read_message_range(session_id, user_id, total - hot, total)
                        .await?,
                );

                if missing > 0 {
                    tracing::warn!(
                        session_id,
                        user_id,
                        missing,
                        "Summaries missing for completed chunks, sending them verbatim"
                    );
                }

                BoundedContext {
                    messages,
                    state,
                    summaries_used: summaries.len(),
                    missing_summaries: missing,
                    total_messages: total,
                }
            }
        };

        tracing::debug!(
            session_id,
            user_id,
            total_messages = total,
            context_messages = context.messages.len(),
            state = ?context.state,
            "Built bounded context"
        );

        Ok(context)
    }

    /// Append a message, then create any summary the append made due.
    ///
    /// Returns the new message count. Only a failed append is an error: once
    /// the message is stored, compaction failures are logged and left for the
    /// next boundary to backfill.
    pub async fn append(
        &self,
        session_id: &str,
        user_id: &str,
        message: ChatMessage,
    ) -> ColloquyResult<usize> {
        let total = self
            .store
            .append_message(session_id, user_id, message)
            .await?;

        if let Some(index) = self.due_chunk(total) {
            if let Err(e) = self.compact_through(session_id, user_id, index).await {
                tracing::error!(
                    session_id,
                    user_id,
                    summary_index = index,
                    category = e.category(),
                    error = %e,
                    "Compaction failed after append, deferring to the next boundary"
                );
            }
        }

        Ok(total)
    }

    /// Ensure summaries exist for chunks `0..=last_index`, lowest first.
    ///
    /// Stops at the first chunk whose summary cannot be produced so indices stay
    /// contiguous. Returns the number of summaries this call created.
    pub async fn compact_through(
        &self,
        session_id: &str,
        user_id: &str,
        last_index: usize,
    ) -> ColloquyResult<usize> {
        let key = (session_id.to_string(), user_id.to_string());
        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let result = {
            let _guard = lock.lock().await;
            self.summarize_pending(session_id, user_id, last_index).await
        };

        drop(lock);
        self.locks.remove_if(&key, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    async fn summarize_pending(
        &self,
        session_id: &str,
        user_id: &str,
        last_index: usize,
    ) -> ColloquyResult<usize> {
        let hot = self.short_term_limit;
        let mut created = 0;

        let existing = self
            .store
            .find_summaries(session_id, user_id, last_index + 1)
            .await?;
        let pending = (0..=last_index)
            .filter(|index| !existing.iter().any(|s| s.summary_index == *index));

        for index in pending {
            let chunk = self
                .store
                .read_message_range(session_id, user_id, index * hot, (index + 1) * hot)
                .await?;
            if chunk.len() < hot {
                break;
            }

            let text = match self.generator.summarize(&chunk, self.summary_word_limit).await {
                Ok(text) => text,
                Err(e) if e.is_recoverable() => {
                    tracing::warn!(
                        session_id,
                        user_id,
                        summary_index = index,
                        error = %e,
                        "Summary generation failed, continuing without it"
                    );
                    break;
                }
                Err(e) => return Err(e),
            };

            let record = SummaryRecord::new(session_id, index, text, hot);
            if self.store.insert_summary_if_absent(user_id, record).await? {
                created += 1;
                tracing::info!(
                    session_id,
                    user_id,
                    summary_index = index,
                    covered_messages = hot,
                    "Created conversation summary"
                );
            } else {
                tracing::warn!(
                    session_id,
                    user_id,
                    summary_index = index,
                    "Summary already created by a concurrent writer"
                );
            }
        }

        Ok(created)
    }

    fn summary_message(summaries: &[SummaryRecord]) -> ChatMessage {
        let body = summaries
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        ChatMessage::system(format!("{}\n\n{}", SUMMARY_PREFIX, body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ColloquyError;
    use crate::session::{MemorySessionStore, Session, SessionInfo, SessionMetadata};
    use crate::storage::InMemoryStorage;
    use async_trait::async_trait;
    use colloquy_llm::{CompletionClient, LlmError, LlmResult};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Numbers each summary; fails the calls listed in `fail_on` (1-based)
    struct CountingClient {
        calls: AtomicUsize,
        fail_on: Vec<usize>,
    }

    impl CountingClient {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: Vec::new(),
            }
        }

        fn failing_on(calls: Vec<usize>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_on: calls,
            }
        }
    }

    #[async_trait]
    impl CompletionClient for CountingClient {
        async fn complete(&self, _prompt: &str) -> LlmResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on.contains(&call) {
                return Err(LlmError::completion("overloaded"));
            }
            Ok(format!("summary #{}", call))
        }
    }

    /// Passes through to a real store; summary lookups can be made to fail
    struct FlakyStore {
        inner: MemorySessionStore,
        fail_lookups: AtomicBool,
        lookups: AtomicUsize,
    }

    impl FlakyStore {
        fn new() -> Self {
            Self {
                inner: MemorySessionStore::new(Arc::new(InMemoryStorage::new())),
                fail_lookups: AtomicBool::new(false),
                lookups: AtomicUsize::new(0),
            }
        }

        fn lookup(&self) -> ColloquyResult<()> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            if self.fail_lookups.load(Ordering::SeqCst) {
                return Err(ColloquyError::storage("find_summaries", "connection reset"));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SessionStore for FlakyStore {
        async fn ensure_session(
            &self,
            session_id: &str,
            user_id: &str,
            metadata: SessionMetadata,
        ) -> ColloquyResult<Session> {
            self.inner.ensure_session(session_id, user_id, metadata).await
        }

        async fn get_session(&self, session_id: &str, user_id: &str) -> ColloquyResult<Option<Session>> {
            self.inner.get_session(session_id, user_id).await
        }

        async fn list_sessions(&self, user_id: &str) -> ColloquyResult<Vec<SessionInfo>> {
            self.inner.list_sessions(user_id).await
        }

        async fn append_message(
            &self,
            session_id: &str,
            user_id: &str,
            message: ChatMessage,
        ) -> ColloquyResult<usize> {
            self.inner.append_message(session_id, user_id, message).await
        }

        async fn read_messages(&self, session_id: &str, user_id: &str) -> ColloquyResult<Vec<ChatMessage>> {
            self.inner.read_messages(session_id, user_id).await
        }

        async fn read_message_range(
            &self,
            session_id: &str,
            user_id: &str,
            start: usize,
            end: usize,
        ) -> ColloquyResult<Vec<ChatMessage>> {
            self.inner.read_message_range(session_id, user_id, start, end).await
        }

        async fn message_count(&self, session_id: &str, user_id: &str) -> ColloquyResult<usize> {
            self.inner.message_count(session_id, user_id).await
        }

        async fn find_summaries(
            &self,
            session_id: &str,
            user_id: &str,
            index_less_than: usize,
        ) -> ColloquyResult<Vec<SummaryRecord>> {
            self.lookup()?;
            self.inner.find_summaries(session_id, user_id, index_less_than).await
        }

        async fn summary_exists(&self, session_id: &str, user_id: &str, index: usize) -> ColloquyResult<bool> {
            self.lookup()?;
            self.inner.summary_exists(session_id, user_id, index).await
        }

        async fn insert_summary_if_absent(&self, user_id: &str, record: SummaryRecord) -> ColloquyResult<bool> {
            self.inner.insert_summary_if_absent(user_id, record).await
        }
    }

    async fn setup_flaky() -> (Arc<FlakyStore>, MemoryCompactor) {
        let store = Arc::new(FlakyStore::new());
        store
            .ensure_session("s1", "u1", SessionMetadata::new())
            .await
            .unwrap();
        let generator = SummaryGenerator::new(Arc::new(CountingClient::new()), Duration::from_secs(5));
        let compactor = MemoryCompactor::new(store.clone(), generator, &ColloquyConfig::default());
        (store, compactor)
    }

    async fn setup(client: Arc<CountingClient>) -> MemoryCompactor {
        let store: Arc<dyn SessionStore> =
            Arc::new(MemorySessionStore::new(Arc::new(InMemoryStorage::new())));
        store
            .ensure_session("s1", "u1", SessionMetadata::new())
            .await
            .unwrap();
        let generator = SummaryGenerator::new(client, Duration::from_secs(5));
        MemoryCompactor::new(store, generator, &ColloquyConfig::default())
    }

    async fn push(compactor: &MemoryCompactor, count: usize) {
        for _ in 0..count {
            let next = compactor.store().message_count("s1", "u1").await.unwrap();
            compactor
                .append("s1", "u1", ChatMessage::user(format!("m{}", next)))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_state_classification() {
        let compactor = setup(Arc::new(CountingClient::new())).await;

        assert_eq!(compactor.state(0), MemoryState::Unbounded);
        assert_eq!(compactor.state(10), MemoryState::Unbounded);
        assert_eq!(compactor.state(11), MemoryState::PartialCold);
        assert_eq!(compactor.state(19), MemoryState::PartialCold);
        assert_eq!(compactor.state(20), MemoryState::Summarized);

        assert_eq!(compactor.due_chunk(10), None);
        assert_eq!(compactor.due_chunk(20), Some(0));
        assert_eq!(compactor.due_chunk(25), None);
        assert_eq!(compactor.due_chunk(30), Some(1));
    }

    #[tokio::test]
    async fn test_unbounded_and_partial_cold_send_everything() {
        let compactor = setup(Arc::new(CountingClient::new())).await;

        push(&compactor, 7).await;
        let context = compactor.build_context("s1", "u1").await.unwrap();
        assert_eq!(context.state, MemoryState::Unbounded);
        assert_eq!(context.messages.len(), 7);

        push(&compactor, 8).await;
        let context = compactor.build_context("s1", "u1").await.unwrap();
        assert_eq!(context.state, MemoryState::PartialCold);
        assert_eq!(context.messages.len(), 15);
        assert_eq!(context.messages[0].text(), "m0");
    }

    #[tokio::test]
    async fn test_summary_cadence() {
        let client = Arc::new(CountingClient::new());
        let compactor = setup(client.clone()).await;

        push(&compactor, 19).await;
        assert!(compactor.store().find_summaries("s1", "u1", 10).await.unwrap().is_empty());

        push(&compactor, 2).await;
        let summaries = compactor.store().find_summaries("s1", "u1", 10).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].summary_index, 0);
        assert_eq!(summaries[0].covered_range(), 0..10);

        push(&compactor, 10).await;
        let summaries = compactor.store().find_summaries("s1", "u1", 10).await.unwrap();
        assert_eq!(summaries.len(), 2);
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_summarized_context_shape() {
        let compactor = setup(Arc::new(CountingClient::new())).await;
        push(&compactor, 25).await;

        let context = compactor.build_context("s1", "u1").await.unwrap();
        assert_eq!(context.state, MemoryState::Summarized);
        assert_eq!(context.summaries_used, 1);
        assert_eq!(context.messages.len(), 11);

        let synthetic = &context.messages[0];
        assert_eq!(synthetic.role, colloquy_llm::MessageRole::System);
        assert!(synthetic.text().starts_with(SUMMARY_PREFIX));
        assert!(synthetic.text().contains("summary #1"));
        assert_eq!(context.messages[1].text(), "m15");
        assert_eq!(context.messages[10].text(), "m24");
    }

    #[tokio::test]
    async fn test_failed_summary_degrades_then_backfills() {
        let client = Arc::new(CountingClient::failing_on(vec![1]));
        let compactor = setup(client.clone()).await;

        push(&compactor, 20).await;
        assert!(compactor.store().find_summaries("s1", "u1", 5).await.unwrap().is_empty());

        let context = compactor.build_context("s1", "u1").await.unwrap();
        assert_eq!(context.missing_summaries, 1);
        assert_eq!(context.summaries_used, 0);
        assert_eq!(context.messages.len(), 20);
        assert_eq!(context.messages[0].text(), "m0");

        push(&compactor, 10).await;
        let summaries = compactor.store().find_summaries("s1", "u1", 5).await.unwrap();
        let indices: Vec<usize> = summaries.iter().map(|s| s.summary_index).collect();
        assert_eq!(indices, vec![0, 1]);

        let context = compactor.build_context("s1", "u1").await.unwrap();
        assert_eq!(context.missing_summaries, 0);
        assert_eq!(context.messages.len(), 11);
    }

    #[tokio::test]
    async fn test_concurrent_compaction_creates_one_summary() {
        let client = Arc::new(CountingClient::new());
        let compactor = Arc::new(setup(client.clone()).await);
        push(&compactor, 20).await;
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let compactor = compactor.clone();
            handles.push(tokio::spawn(async move {
                compactor.compact_through("s1", "u1", 0).await.unwrap()
            }));
        }
        let mut created = 0;
        for handle in handles {
            created += handle.await.unwrap();
        }

        assert_eq!(created, 0);
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(compactor.locks.is_empty());
    }

    #[tokio::test]
    async fn test_compaction_failure_does_not_fail_stored_append() {
        let (store, compactor) = setup_flaky().await;
        push(&compactor, 19).await;

        store.fail_lookups.store(true, Ordering::SeqCst);
        let total = compactor
            .append("s1", "u1", ChatMessage::user("m19"))
            .await
            .unwrap();
        assert_eq!(total, 20);
        assert_eq!(store.message_count("s1", "u1").await.unwrap(), 20);

        store.fail_lookups.store(false, Ordering::SeqCst);
        assert!(store.find_summaries("s1", "u1", 5).await.unwrap().is_empty());

        push(&compactor, 10).await;
        let messages = store.read_messages("s1", "u1").await.unwrap();
        assert_eq!(messages.len(), 30);
        assert_eq!(messages[19].text(), "m19");
        assert_eq!(messages[20].text(), "m20");

        let indices: Vec<usize> = store
            .find_summaries("s1", "u1", 5)
            .await
            .unwrap()
            .iter()
            .map(|s| s.summary_index)
            .collect();
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn test_boundary_looks_up_existing_summaries_once() {
        let (store, compactor) = setup_flaky().await;
        push(&compactor, 49).await;
        assert_eq!(store.inner.find_summaries("s1", "u1", 10).await.unwrap().len(), 3);

        store.lookups.store(0, Ordering::SeqCst);
        push(&compactor, 1).await;

        assert_eq!(store.lookups.load(Ordering::SeqCst), 1);
        assert_eq!(store.inner.find_summaries("s1", "u1", 10).await.unwrap().len(), 4);
    }
}
