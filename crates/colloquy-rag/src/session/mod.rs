//! # Session persistence
//!
//! A session is one conversation's ordered message log plus its metadata and
//! the summaries compacted out of it.
//!
//! - [`SessionStore`]: the persistence contract the memory layer compiles against
//! - [`MemorySessionStore`]: adapter over any [`crate::storage::Memory`] backend
//! - `SqliteSessionStore`: SQLite backend (feature `sqlite`)

mod model;
mod store;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use model::{
    derive_title, Session, SessionInfo, SessionMetadata, SummaryRecord, MAX_DERIVED_TITLE_CHARS,
};
pub use store::{generate_session_id, MemorySessionStore, SessionStore};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteSessionStore;
