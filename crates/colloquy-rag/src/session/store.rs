//! Session persistence contract and the key/value-backed implementation

use super::model::{Session, SessionInfo, SessionMetadata, SummaryRecord};
use crate::error::{ColloquyError, ColloquyResult};
use crate::storage::{ListAppend, Memory, MemoryQuery, MemoryValue};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colloquy_llm::ChatMessage;
use std::sync::Arc;
use uuid::Uuid;

/// Persistence for conversations and their summaries.
///
/// Sessions are keyed by `(session_id, user_id)`. Implementations must make
/// [`SessionStore::ensure_session`], [`SessionStore::append_message`] and
/// [`SessionStore::insert_summary_if_absent`] atomic at the storage layer.
/// Failures surface as [`ColloquyError::Storage`] and are not retried here.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Create the session if absent, otherwise return the existing one unchanged
    async fn ensure_session(
        &self,
        session_id: &str,
        user_id: &str,
        metadata: SessionMetadata,
    ) -> ColloquyResult<Session>;

    /// Load a session with its messages
    async fn get_session(&self, session_id: &str, user_id: &str)
        -> ColloquyResult<Option<Session>>;

    /// Headers of all sessions owned by a user, most recently updated first
    async fn list_sessions(&self, user_id: &str) -> ColloquyResult<Vec<SessionInfo>>;

    /// Append one message and bump `updated_at`. Returns the new message count.
    async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: ChatMessage,
    ) -> ColloquyResult<usize>;

    /// All messages in submission order
    async fn read_messages(&self, session_id: &str, user_id: &str)
        -> ColloquyResult<Vec<ChatMessage>>;

    /// Messages at positions `start..end`, clamped to what exists
    async fn read_message_range(
        &self,
        session_id: &str,
        user_id: &str,
        start: usize,
        end: usize,
    ) -> ColloquyResult<Vec<ChatMessage>>;

    /// Number of stored messages
    async fn message_count(&self, session_id: &str, user_id: &str) -> ColloquyResult<usize>;

    /// Summaries with `summary_index < index_less_than`, ordered by index
    async fn find_summaries(
        &self,
        session_id: &str,
        user_id: &str,
        index_less_than: usize,
    ) -> ColloquyResult<Vec<SummaryRecord>>;

    /// Whether a summary exists at `index`
    async fn summary_exists(
        &self,
        session_id: &str,
        user_id: &str,
        index: usize,
    ) -> ColloquyResult<bool>;

    /// Insert unless a summary already exists at the same index.
    ///
    /// Returns `false` when another writer got there first.
    async fn insert_summary_if_absent(
        &self,
        user_id: &str,
        record: SummaryRecord,
    ) -> ColloquyResult<bool>;
}

/// Generate a unique session ID
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// [`SessionStore`] layered over any [`Memory`] backend.
///
/// Layout under `session::<user_id>::<session_id>`:
/// - `::meta` – JSON [`SessionInfo`], written once with `set_if_absent`
/// - `::messages` – list of JSON messages, grown with a guarded `list_append`
/// - `::updated_at` – RFC 3339 stamp written by the same `list_append`
/// - `::summary::<index>` – JSON [`SummaryRecord`], written with `set_if_absent`
pub struct MemorySessionStore {
    storage: Arc<dyn Memory>,
}

impl MemorySessionStore {
    /// Wrap a storage backend
    pub fn new(storage: Arc<dyn Memory>) -> Self {
        Self { storage }
    }

    /// The underlying storage backend
    pub fn storage(&self) -> Arc<dyn Memory> {
        self.storage.clone()
    }

    fn user_namespace(user_id: &str) -> String {
        format!("session::{}", user_id)
    }

    fn namespace(session_id: &str, user_id: &str) -> String {
        format!("session::{}::{}", user_id, session_id)
    }

    fn meta_key(session_id: &str, user_id: &str) -> String {
        format!("{}::meta", Self::namespace(session_id, user_id))
    }

    fn messages_key(session_id: &str, user_id: &str) -> String {
        format!("{}::messages", Self::namespace(session_id, user_id))
    }

    fn updated_key(session_id: &str, user_id: &str) -> String {
        format!("{}::updated_at", Self::namespace(session_id, user_id))
    }

    fn summary_namespace(session_id: &str, user_id: &str) -> String {
        format!("{}::summary", Self::namespace(session_id, user_id))
    }

    fn summary_key(session_id: &str, user_id: &str, index: usize) -> String {
        format!("{}::{:08}", Self::summary_namespace(session_id, user_id), index)
    }

    fn check_ids(session_id: &str, user_id: &str) -> ColloquyResult<()> {
        for (field, value) in [("session_id", session_id), ("user_id", user_id)] {
            if value.trim().is_empty() {
                return Err(ColloquyError::validation(field, "must not be empty", "''"));
            }
            if value.contains("::") {
                return Err(ColloquyError::validation(
                    field,
                    "must not contain '::'",
                    value.to_string(),
                ));
            }
        }
        Ok(())
    }

    fn message_to_value(message: &ChatMessage) -> ColloquyResult<MemoryValue> {
        let json = serde_json::to_value(message)
            .map_err(|e| ColloquyError::storage("serialize_message", e))?;
        Ok(MemoryValue::Json(json))
    }

    fn value_to_message(value: &MemoryValue) -> ColloquyResult<ChatMessage> {
        let json = value.as_json().ok_or_else(|| {
            ColloquyError::storage("invalid_message_type", "expected JSON message value")
        })?;
        serde_json::from_value(json.clone())
            .map_err(|e| ColloquyError::storage("deserialize_message", e))
    }

    fn value_to_info(value: &MemoryValue) -> ColloquyResult<SessionInfo> {
        let json = value.as_json().ok_or_else(|| {
            ColloquyError::storage("invalid_session_type", "expected JSON session value")
        })?;
        serde_json::from_value(json.clone())
            .map_err(|e| ColloquyError::storage("deserialize_session", e))
    }

    fn value_to_summary(value: &MemoryValue) -> ColloquyResult<SummaryRecord> {
        let json = value.as_json().ok_or_else(|| {
            ColloquyError::storage("invalid_summary_type", "expected JSON summary value")
        })?;
        serde_json::from_value(json.clone())
            .map_err(|e| ColloquyError::storage("deserialize_summary", e))
    }

    async fn load_info(&self, session_id: &str, user_id: &str) -> ColloquyResult<Option<SessionInfo>> {
        let Some(value) = self.storage.get(&Self::meta_key(session_id, user_id)).await? else {
            return Ok(None);
        };
        let mut info = Self::value_to_info(&value)?;

        if let Some(value) = self.storage.get(&Self::updated_key(session_id, user_id)).await? {
            if let Some(updated) = value
                .as_string()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            {
                info.updated_at = updated.with_timezone(&Utc);
            }
        }

        Ok(Some(info))
    }
}

fn now_stamp() -> MemoryValue {
    MemoryValue::String(Utc::now().to_rfc3339())
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn ensure_session(
        &self,
        session_id: &str,
        user_id: &str,
        metadata: SessionMetadata,
    ) -> ColloquyResult<Session> {
        Self::check_ids(session_id, user_id)?;

        let info = SessionInfo::new(session_id, user_id, metadata);
        let value = serde_json::to_value(&info)
            .map_err(|e| ColloquyError::storage("serialize_session", e))?;

        let created = self
            .storage
            .set_if_absent(&Self::meta_key(session_id, user_id), MemoryValue::Json(value))
            .await?;

        if created {
            tracing::debug!(session_id, user_id, backend = self.storage.backend_name(), "Created session");
            return Ok(Session {
                info,
                messages: Vec::new(),
            });
        }

        self.get_session(session_id, user_id).await?.ok_or_else(|| {
            ColloquyError::storage("ensure_session", "session vanished after creation")
        })
    }

    async fn get_session(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> ColloquyResult<Option<Session>> {
        let Some(info) = self.load_info(session_id, user_id).await? else {
            return Ok(None);
        };
        let messages = self.read_messages(session_id, user_id).await?;
        Ok(Some(Session { info, messages }))
    }

    async fn list_sessions(&self, user_id: &str) -> ColloquyResult<Vec<SessionInfo>> {
        let query = MemoryQuery::new().with_namespace(Self::user_namespace(user_id));
        let keys = self.storage.keys(&query).await?;

        let prefix = format!("{}::", Self::user_namespace(user_id));
        let mut sessions = Vec::new();
        for key in keys {
            let Some(session_id) = key
                .strip_prefix(&prefix)
                .and_then(|rest| rest.strip_suffix("::meta"))
            else {
                continue;
            };
            if let Some(info) = self.load_info(session_id, user_id).await? {
                sessions.push(info);
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(sessions)
    }

    async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: ChatMessage,
    ) -> ColloquyResult<usize> {
        let meta_key = Self::meta_key(session_id, user_id);
        let messages_key = Self::messages_key(session_id, user_id);
        let updated_key = Self::updated_key(session_id, user_id);

        let op = ListAppend::new(&messages_key, Self::message_to_value(&message)?)
            .requiring(&meta_key)
            .touching(&updated_key, now_stamp());

        self.storage.list_append(op).await?.ok_or_else(|| {
            ColloquyError::storage(
                "append_message",
                format!("session '{}' for user '{}' does not exist", session_id, user_id),
            )
        })
    }

    async fn read_messages(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> ColloquyResult<Vec<ChatMessage>> {
        self.read_message_range(session_id, user_id, 0, usize::MAX).await
    }

    async fn read_message_range(
        &self,
        session_id: &str,
        user_id: &str,
        start: usize,
        end: usize,
    ) -> ColloquyResult<Vec<ChatMessage>> {
        self.storage
            .list_range(&Self::messages_key(session_id, user_id), start, end)
            .await?
            .iter()
            .map(Self::value_to_message)
            .collect()
    }

    async fn message_count(&self, session_id: &str, user_id: &str) -> ColloquyResult<usize> {
        self.storage
            .list_len(&Self::messages_key(session_id, user_id))
            .await
    }

    async fn find_summaries(
        &self,
        session_id: &str,
        user_id: &str,
        index_less_than: usize,
    ) -> ColloquyResult<Vec<SummaryRecord>> {
        let namespace = Self::summary_namespace(session_id, user_id);
        let keys = self
            .storage
            .keys(&MemoryQuery::new().with_namespace(namespace))
            .await?;

        let mut summaries = Vec::new();
        for key in keys {
            let Some(value) = self.storage.get(&key).await? else {
                continue;
            };
            let record = Self::value_to_summary(&value)?;
            if record.summary_index < index_less_than {
                summaries.push(record);
            }
        }

        summaries.sort_by_key(|s| s.summary_index);
        Ok(summaries)
    }

    async fn summary_exists(
        &self,
        session_id: &str,
        user_id: &str,
        index: usize,
    ) -> ColloquyResult<bool> {
        self.storage
            .exists(&Self::summary_key(session_id, user_id, index))
            .await
    }

    async fn insert_summary_if_absent(
        &self,
        user_id: &str,
        record: SummaryRecord,
    ) -> ColloquyResult<bool> {
        let key = Self::summary_key(&record.session_id, user_id, record.summary_index);
        let value = serde_json::to_value(&record)
            .map_err(|e| ColloquyError::storage("serialize_summary", e))?;

        self.storage.set_if_absent(&key, MemoryValue::Json(value)).await
    }
}
