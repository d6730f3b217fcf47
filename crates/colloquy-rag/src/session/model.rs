//! Session and summary records

use chrono::{DateTime, Utc};
use colloquy_llm::ChatMessage;
use serde::{Deserialize, Serialize};

/// Longest title derived from a first user message, in characters
pub const MAX_DERIVED_TITLE_CHARS: usize = 60;

/// Metadata supplied when a session is first created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionMetadata {
    /// Collections the conversation searches
    #[serde(default)]
    pub collection_ids: Vec<String>,

    /// Document the conversation is about, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,

    /// Display title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl SessionMetadata {
    /// Empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the searched collections
    pub fn with_collections(mut self, collection_ids: Vec<String>) -> Self {
        self.collection_ids = collection_ids;
        self
    }

    /// Set the associated document
    pub fn with_doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Set the title
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Persisted session header (everything except the message log)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session identifier
    pub session_id: String,

    /// Owning user
    pub user_id: String,

    /// Collections the conversation searches
    pub collection_ids: Vec<String>,

    /// Associated document
    pub doc_id: Option<String>,

    /// Display title
    pub title: Option<String>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Time of the last append
    pub updated_at: DateTime<Utc>,
}

impl SessionInfo {
    /// Build a fresh header stamped with the current time
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        metadata: SessionMetadata,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            collection_ids: metadata.collection_ids,
            doc_id: metadata.doc_id,
            title: metadata.title,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A conversation with its ordered message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Header fields
    #[serde(flatten)]
    pub info: SessionInfo,

    /// Messages in submission order
    pub messages: Vec<ChatMessage>,
}

impl Session {
    /// Session identifier
    pub fn session_id(&self) -> &str {
        &self.info.session_id
    }

    /// Owning user
    pub fn user_id(&self) -> &str {
        &self.info.user_id
    }

    /// Number of stored messages
    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

/// Compressed form of one chunk of cold messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    /// Session the summary belongs to
    pub session_id: String,

    /// Chunk index, contiguous from 0
    pub summary_index: usize,

    /// Summary text
    pub text: String,

    /// Number of messages the chunk covered
    pub covered_message_count: usize,

    /// Creation time
    pub created_at: DateTime<Utc>,
}

impl SummaryRecord {
    /// Create a record stamped with the current time
    pub fn new(
        session_id: impl Into<String>,
        summary_index: usize,
        text: impl Into<String>,
        covered_message_count: usize,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            summary_index,
            text: text.into(),
            covered_message_count,
            created_at: Utc::now(),
        }
    }

    /// Range of message positions this summary covers
    pub fn covered_range(&self) -> std::ops::Range<usize> {
        let start = self.summary_index * self.covered_message_count;
        start..start + self.covered_message_count
    }
}

/// Derive a session title from the first user message
pub fn derive_title(text: &str) -> Option<String> {
    let trimmed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if trimmed.is_empty() {
        return None;
    }

    if trimmed.chars().count() <= MAX_DERIVED_TITLE_CHARS {
        return Some(trimmed);
    }

    let mut title: String = trimmed.chars().take(MAX_DERIVED_TITLE_CHARS).collect();
    title.push('…');
    Some(title)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covered_range() {
        let record = SummaryRecord::new("s1", 2, "text", 10);
        assert_eq!(record.covered_range(), 20..30);
    }

    #[test]
    fn test_derive_title() {
        assert_eq!(derive_title("  What is   Rust? "), Some("What is Rust?".to_string()));
        assert_eq!(derive_title("   "), None);

        let long = "word ".repeat(40);
        let title = derive_title(&long).unwrap();
        assert_eq!(title.chars().count(), MAX_DERIVED_TITLE_CHARS + 1);
        assert!(title.ends_with('…'));
    }

    #[test]
    fn test_session_serializes_flat() {
        let info = SessionInfo::new("s1", "u1", SessionMetadata::new().with_doc_id("d1"));
        let session = Session {
            info,
            messages: vec![ChatMessage::user("hi")],
        };

        let json = serde_json::to_value(&session).unwrap();
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["doc_id"], "d1");
        assert_eq!(json["messages"].as_array().unwrap().len(), 1);
        assert_eq!(session.message_count(), 1);
    }
}
