//! # Colloquy
//!
//! Conversation core for document-grounded chat agents:
//!
//! - **Colloquy LLM**: message model plus the completion and tool contracts
//! - **Colloquy RAG**: bounded memory with persisted summaries, citation
//!   extraction and structured intent routing
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use colloquy::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn run(completion: Arc<dyn CompletionClient>, tools: Arc<dyn ToolRegistry>) -> ColloquyResult<()> {
//! let store = Arc::new(MemorySessionStore::new(Arc::new(InMemoryStorage::new())));
//! let engine = ConversationEngine::new(store, completion, tools, ColloquyConfig::from_env()?)?;
//!
//! let reply = engine
//!     .handle_intent(
//!         "session-1",
//!         &IntentRequest::search().with_query("quarterly revenue"),
//!         &IntentScope::new("user-1").with_collections(vec!["reports".into()]),
//!     )
//!     .await;
//!
//! if let Some(rag) = reply.rag_response.as_deref() {
//!     let sources = engine.extract_references("... agent answer ...", Some(rag));
//!     println!("{} sources", sources.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │                Colloquy                  │
//! │            (Umbrella Crate)              │
//! └───────────────────┬──────────────────────┘
//!                     │
//!          ┌──────────┴──────────┐
//!          │                     │
//!      ┌───▼───┐            ┌────▼────┐
//!      │  LLM  │◄───────────┤   RAG   │
//!      └───────┘            └─────────┘
//! ```

#![doc(html_root_url = "https://docs.rs/colloquy/0.1.0")]
#![warn(missing_docs)]

// Re-export sub-crates
#[cfg(feature = "llm")]
pub use colloquy_llm as llm;

#[cfg(feature = "rag")]
pub use colloquy_rag as rag;

/// Commonly used types and traits
pub mod prelude {
    #[cfg(feature = "llm")]
    pub use crate::llm::{
        ChatMessage, CompletionClient, ContentSegment, MessageRole, NamedTool, StaticToolRegistry,
        ToolRegistry,
    };

    #[cfg(feature = "rag")]
    pub use crate::rag::{
        citation::{extract_references, ReferenceType, SourceReference},
        config::ColloquyConfig,
        engine::ConversationEngine,
        error::{ColloquyError, ColloquyResult},
        intent::{IntentReply, IntentRequest, IntentScope},
        memory::{BoundedContext, MemoryState},
        session::{MemorySessionStore, SessionMetadata, SessionStore},
        storage::{InMemoryStorage, Memory},
    };

    #[cfg(feature = "sqlite")]
    pub use crate::rag::session::SqliteSessionStore;
}
