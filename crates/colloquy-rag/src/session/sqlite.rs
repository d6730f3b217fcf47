//! SQLite-backed session store
//!
//! Uniqueness lives in the schema: sessions are keyed by `(session_id, user_id)`,
//! messages by `(session_id, user_id, position)` and summaries by
//! `(session_id, user_id, summary_index)`. Conflicting inserts are no-ops.

use super::model::{Session, SessionInfo, SessionMetadata, SummaryRecord};
use super::store::SessionStore;
use crate::error::{ColloquyError, ColloquyResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use colloquy_llm::ChatMessage;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::str::FromStr;

const SCHEMA: &[&str] = &[
    "\
CREATE TABLE IF NOT EXISTS sessions (
	session_id TEXT NOT NULL,
	user_id TEXT NOT NULL,
	collection_ids TEXT NOT NULL,
	doc_id TEXT,
	title TEXT,
	created_at TEXT NOT NULL,
	updated_at TEXT NOT NULL,
	PRIMARY KEY (session_id, user_id)
)",
    "\
CREATE TABLE IF NOT EXISTS messages (
	session_id TEXT NOT NULL,
	user_id TEXT NOT NULL,
	position INTEGER NOT NULL,
	body TEXT NOT NULL,
	PRIMARY KEY (session_id, user_id, position)
)",
    "\
CREATE TABLE IF NOT EXISTS summaries (
	session_id TEXT NOT NULL,
	user_id TEXT NOT NULL,
	summary_index INTEGER NOT NULL,
	text TEXT NOT NULL,
	covered_message_count INTEGER NOT NULL,
	created_at TEXT NOT NULL,
	PRIMARY KEY (session_id, user_id, summary_index)
)",
];

#[derive(FromRow)]
struct SessionRow {
    session_id: String,
    user_id: String,
    collection_ids: String,
    doc_id: Option<String>,
    title: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SessionRow {
    fn into_info(self) -> ColloquyResult<SessionInfo> {
        let collection_ids = serde_json::from_str(&self.collection_ids)
            .map_err(|e| ColloquyError::storage("decode_collection_ids", e))?;
        Ok(SessionInfo {
            session_id: self.session_id,
            user_id: self.user_id,
            collection_ids,
            doc_id: self.doc_id,
            title: self.title,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    session_id: String,
    summary_index: i64,
    text: String,
    covered_message_count: i64,
    created_at: DateTime<Utc>,
}

impl From<SummaryRow> for SummaryRecord {
    fn from(row: SummaryRow) -> Self {
        SummaryRecord {
            session_id: row.session_id,
            summary_index: row.summary_index.max(0) as usize,
            text: row.text,
            covered_message_count: row.covered_message_count.max(0) as usize,
            created_at: row.created_at,
        }
    }
}

fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> ColloquyError {
    move |e| ColloquyError::storage(operation, e)
}

fn to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// [`SessionStore`] persisted in SQLite
#[derive(Clone)]
pub struct SqliteSessionStore {
    pool: SqlitePool,
}

impl SqliteSessionStore {
    /// Connect to `url` (e.g. `sqlite://colloquy.db`), creating the file and schema if needed
    pub async fn connect(url: &str) -> ColloquyResult<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(db_error("parse_url"))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(db_error("connect"))?;

        Self::from_pool(pool).await
    }

    /// Private in-memory database on a single connection
    pub async fn in_memory() -> ColloquyResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(db_error("connect"))?;

        Self::from_pool(pool).await
    }

    /// Use an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool) -> ColloquyResult<Self> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&pool)
                .await
                .map_err(db_error("create_schema"))?;
        }
        Ok(Self { pool })
    }

    async fn load_info(&self, session_id: &str, user_id: &str) -> ColloquyResult<Option<SessionInfo>> {
        sqlx::query_as::<_, SessionRow>(
            "SELECT session_id, user_id, collection_ids, doc_id, title, created_at, updated_at \
             FROM sessions WHERE session_id = ?1 AND user_id = ?2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error("get_session"))?
        .map(SessionRow::into_info)
        .transpose()
    }
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn ensure_session(
        &self,
        session_id: &str,
        user_id: &str,
        metadata: SessionMetadata,
    ) -> ColloquyResult<Session> {
        let info = SessionInfo::new(session_id, user_id, metadata);
        let collection_ids = serde_json::to_string(&info.collection_ids)
            .map_err(|e| ColloquyError::storage("encode_collection_ids", e))?;

        sqlx::query(
            "\
INSERT INTO sessions (session_id, user_id, collection_ids, doc_id, title, created_at, updated_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
ON CONFLICT DO NOTHING",
        )
        .bind(&info.session_id)
        .bind(&info.user_id)
        .bind(collection_ids)
        .bind(&info.doc_id)
        .bind(&info.title)
        .bind(info.created_at)
        .bind(info.updated_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("ensure_session"))?;

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
        sqlx::query_as::<_, SessionRow>(
            "SELECT session_id, user_id, collection_ids, doc_id, title, created_at, updated_at \
             FROM sessions WHERE user_id = ?1 ORDER BY updated_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("list_sessions"))?
        .into_iter()
        .map(SessionRow::into_info)
        .collect()
    }

    async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        message: ChatMessage,
    ) -> ColloquyResult<usize> {
        let body = serde_json::to_string(&message)
            .map_err(|e| ColloquyError::storage("serialize_message", e))?;

        let mut tx = self.pool.begin().await.map_err(db_error("append_message"))?;

        let position = sqlx::query_scalar::<_, i64>(
            "\
INSERT INTO messages (session_id, user_id, position, body)
SELECT s.session_id, s.user_id,
	(SELECT COALESCE(MAX(m.position) + 1, 0) FROM messages m
	 WHERE m.session_id = s.session_id AND m.user_id = s.user_id),
	?3
FROM sessions s WHERE s.session_id = ?1 AND s.user_id = ?2
RETURNING position",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(body)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_error("append_message"))?
        .ok_or_else(|| {
            ColloquyError::storage(
                "append_message",
                format!("session '{}' for user '{}' does not exist", session_id, user_id),
            )
        })?;

        sqlx::query("UPDATE sessions SET updated_at = ?3 WHERE session_id = ?1 AND user_id = ?2")
            .bind(session_id)
            .bind(user_id)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(db_error("append_message"))?;

        tx.commit().await.map_err(db_error("append_message"))?;

        Ok(position.max(0) as usize + 1)
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
        let bodies = sqlx::query_scalar::<_, String>(
            "SELECT body FROM messages \
             WHERE session_id = ?1 AND user_id = ?2 AND position >= ?3 AND position < ?4 \
             ORDER BY position",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(to_i64(start))
        .bind(to_i64(end))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("read_messages"))?;

        bodies
            .iter()
            .map(|body| {
                serde_json::from_str(body)
                    .map_err(|e| ColloquyError::storage("deserialize_message", e))
            })
            .collect()
    }

    async fn message_count(&self, session_id: &str, user_id: &str) -> ColloquyResult<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM messages WHERE session_id = ?1 AND user_id = ?2",
        )
        .bind(session_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("message_count"))?;

        Ok(count.max(0) as usize)
    }

    async fn find_summaries(
        &self,
        session_id: &str,
        user_id: &str,
        index_less_than: usize,
    ) -> ColloquyResult<Vec<SummaryRecord>> {
        let rows = sqlx::query_as::<_, SummaryRow>(
            "SELECT session_id, summary_index, text, covered_message_count, created_at \
             FROM summaries WHERE session_id = ?1 AND user_id = ?2 AND summary_index < ?3 \
             ORDER BY summary_index",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(to_i64(index_less_than))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error("find_summaries"))?;

        Ok(rows.into_iter().map(SummaryRecord::from).collect())
    }

    async fn summary_exists(
        &self,
        session_id: &str,
        user_id: &str,
        index: usize,
    ) -> ColloquyResult<bool> {
        let found = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM summaries \
             WHERE session_id = ?1 AND user_id = ?2 AND summary_index = ?3",
        )
        .bind(session_id)
        .bind(user_id)
        .bind(to_i64(index))
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("summary_exists"))?;

        Ok(found > 0)
    }

    async fn insert_summary_if_absent(
        &self,
        user_id: &str,
        record: SummaryRecord,
    ) -> ColloquyResult<bool> {
        let result = sqlx::query(
            "\
INSERT INTO summaries (session_id, user_id, summary_index, text, covered_message_count, created_at)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT DO NOTHING",
        )
        .bind(&record.session_id)
        .bind(user_id)
        .bind(to_i64(record.summary_index))
        .bind(&record.text)
        .bind(to_i64(record.covered_message_count))
        .bind(record.created_at)
        .execute(&self.pool)
        .await
        .map_err(db_error("insert_summary"))?;

        Ok(result.rows_affected() == 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_sqlite_session_lifecycle() {
        let store = SqliteSessionStore::in_memory().await.unwrap();

        store
            .ensure_session("s1", "u1", SessionMetadata::new().with_doc_id("d1"))
            .await
            .unwrap();
        let again = store
            .ensure_session("s1", "u1", SessionMetadata::new())
            .await
            .unwrap();
        assert_eq!(again.info.doc_id.as_deref(), Some("d1"));
        assert_eq!(store.list_sessions("u1").await.unwrap().len(), 1);

        for i in 0..3 {
            let count = store
                .append_message("s1", "u1", ChatMessage::user(format!("m{}", i)))
                .await
                .unwrap();
            assert_eq!(count, i + 1);
        }

        let tail = store.read_message_range("s1", "u1", 1, 10).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].text(), "m1");
        assert_eq!(store.message_count("s1", "u1").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_sqlite_append_without_session_fails() {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        let result = store
            .append_message("nope", "u1", ChatMessage::user("hi"))
            .await;
        assert!(matches!(result, Err(ColloquyError::Storage { .. })));
    }

    #[tokio::test]
    async fn test_sqlite_summary_uniqueness() {
        let store = SqliteSessionStore::in_memory().await.unwrap();
        store.ensure_session("s1", "u1", SessionMetadata::new()).await.unwrap();

        assert!(store
            .insert_summary_if_absent("u1", SummaryRecord::new("s1", 0, "a", 10))
            .await
            .unwrap());
        assert!(!store
            .insert_summary_if_absent("u1", SummaryRecord::new("s1", 0, "b", 10))
            .await
            .unwrap());
        assert!(store.summary_exists("s1", "u1", 0).await.unwrap());

        let summaries = store.find_summaries("s1", "u1", 1).await.unwrap();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].text, "a");
    }

    async fn file_store(dir: &tempfile::TempDir) -> SqliteSessionStore {
        let url = format!("sqlite://{}", dir.path().join("colloquy.db").display());
        SqliteSessionStore::connect(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_sqlite_concurrent_appends_keep_every_message() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(file_store(&dir).await);
        store.ensure_session("s1", "u1", SessionMetadata::new()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..100 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .append_message("s1", "u1", ChatMessage::user(format!("m{}", i)))
                    .await
            }));
        }

        let mut counts = Vec::new();
        for handle in handles {
            counts.push(handle.await.unwrap().unwrap());
        }
        counts.sort_unstable();
        assert_eq!(counts, (1..=100).collect::<Vec<_>>());

        let messages = store.read_messages("s1", "u1").await.unwrap();
        assert_eq!(messages.len(), 100);
        let mut texts: Vec<String> = messages.iter().map(|m| m.text()).collect();
        texts.sort();
        texts.dedup();
        assert_eq!(texts.len(), 100);
    }

    #[tokio::test]
    async fn test_sqlite_backs_compaction() {
        use crate::config::ColloquyConfig;
        use crate::memory::{MemoryCompactor, MemoryState, SummaryGenerator};
        use async_trait::async_trait;
        use colloquy_llm::{CompletionClient, LlmResult};
        use std::time::Duration;

        struct FixedCompletion;

        #[async_trait]
        impl CompletionClient for FixedCompletion {
            async fn complete(&self, _prompt: &str) -> LlmResult<String> {
                Ok("earlier turns".to_string())
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let store: Arc<dyn SessionStore> = Arc::new(file_store(&dir).await);
        store.ensure_session("s1", "u1", SessionMetadata::new()).await.unwrap();

        let generator = SummaryGenerator::new(Arc::new(FixedCompletion), Duration::from_secs(5));
        let compactor = MemoryCompactor::new(store.clone(), generator, &ColloquyConfig::default());
        for i in 0..50 {
            compactor
                .append("s1", "u1", ChatMessage::user(format!("m{}", i)))
                .await
                .unwrap();
        }

        let indices: Vec<usize> = store
            .find_summaries("s1", "u1", usize::MAX)
            .await
            .unwrap()
            .iter()
            .map(|s| s.summary_index)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3]);

        let context = compactor.build_context("s1", "u1").await.unwrap();
        assert_eq!(context.state, MemoryState::Summarized);
        assert_eq!(context.messages.len(), 11);
        assert_eq!(context.messages[10].text(), "m49");
    }
}
