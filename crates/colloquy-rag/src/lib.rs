//! # Colloquy RAG
//!
//! Conversation core for a document-grounded chat agent:
//!
//! - **Bounded memory**: the last `short_term_limit` messages are sent verbatim;
//!   older messages are compacted, one fixed-size chunk at a time, into
//!   persisted summaries ([`memory`])
//! - **Citations**: `SOURCE_CITATION: \cite{doc, page N}` tokens in agent
//!   answers become deduplicated [`SourceReference`]s ([`citation`])
//! - **Intents**: explicit summarise / translate / search requests are
//!   validated and dispatched straight to service tools ([`intent`])
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colloquy_rag::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(completion: Arc<dyn CompletionClient>, tools: Arc<dyn ToolRegistry>) -> ColloquyResult<()> {
//! let store = Arc::new(MemorySessionStore::new(Arc::new(InMemoryStorage::new())));
//! let engine = ConversationEngine::new(store, completion, tools, ColloquyConfig::default())?;
//!
//! let context = engine.build_context("session-1", "user-1").await?;
//! // ... send context.messages to the agent ...
//! engine
//!     .record_turn("session-1", "user-1", "What changed?", "Revenue grew.", None)
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

pub mod citation;
pub mod config;
pub mod engine;
pub mod error;
pub mod intent;
pub mod memory;
pub mod session;
pub mod storage;

pub use citation::{extract_references, format_citation, ReferenceType, SourceReference};
pub use config::ColloquyConfig;
pub use engine::ConversationEngine;
pub use error::{ColloquyError, ColloquyResult};
pub use intent::{
    IntentKind, IntentReply, IntentRequest, IntentResponse, IntentRouter, IntentScope,
    SummaryLevel, ValidatedIntent,
};
pub use memory::{BoundedContext, MemoryCompactor, MemoryState, SummaryGenerator};
pub use session::{
    generate_session_id, MemorySessionStore, Session, SessionInfo, SessionMetadata, SessionStore,
    SummaryRecord,
};
#[cfg(feature = "sqlite")]
pub use session::SqliteSessionStore;
pub use storage::{InMemoryStorage, Memory, MemoryValue};

/// Commonly used types and traits
pub mod prelude {
    pub use crate::{
        extract_references, BoundedContext, ColloquyConfig, ColloquyError, ColloquyResult,
        ConversationEngine, InMemoryStorage, IntentReply, IntentRequest, IntentScope, Memory,
        MemorySessionStore, MemoryState, SessionMetadata, SessionStore, SourceReference,
    };
    pub use colloquy_llm::{ChatMessage, CompletionClient, MessageRole, NamedTool, ToolRegistry};
}
