//! # Bounded Memory Demo
//!
//! Walks one conversation through every memory state, then runs a search
//! intent and extracts the citations from an answer grounded on it.
//!
//! ## Features Demonstrated
//!
//! ### 1. Memory Compaction
//! - Verbatim hot window while the conversation is short
//! - Chunk summaries persisted at every chunk boundary
//! - One synthetic summary message plus the hot window afterwards
//!
//! ### 2. Intents and Citations
//! - `search` dispatched to the `rag` service's `retrieve` tool
//! - `SOURCE_CITATION` tokens resolved against the retrieval output
//!
//! ## Run This Example
//!
//! ```bash
//! # Optional overrides: colloquy.toml or COLLOQUY_SHORT_TERM_LIMIT=4
//! RUST_LOG=colloquy_rag=debug cargo run --example bounded_memory
//! ```

use async_trait::async_trait;
use colloquy_llm::{FnTool, LlmResult, StaticToolRegistry};
use colloquy_rag::prelude::*;
use colloquy_rag::{format_citation, ReferenceType};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Stand-in completion service: reports which turns a chunk covered
struct TranscriptDigest;

#[async_trait]
impl CompletionClient for TranscriptDigest {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let turns: Vec<&str> = prompt
            .lines()
            .filter_map(|line| line.strip_prefix("User: "))
            .collect();
        Ok(format!("The user asked about {}.", turns.join(", ")))
    }

    fn model_name(&self) -> &str {
        "transcript-digest"
    }
}

fn retrieval_service() -> StaticToolRegistry {
    StaticToolRegistry::new().with_tool(
        "rag",
        FnTool::new("retrieve", |_| {
            Ok([
                format!(
                    "Borrowing lets code use a value without taking ownership. {}",
                    format_citation("rust-book.pdf", ReferenceType::from_file_type("pdf"), 74)
                ),
                format!(
                    "Lifetimes name the scope a reference is valid for. {}",
                    format_citation("lifetimes.md", ReferenceType::from_file_type("md"), 3)
                ),
            ]
            .join("\n\n"))
        }),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Bounded Memory Demo ===\n");

    let config = ColloquyConfig::load("colloquy.toml")?;
    let store: Arc<dyn SessionStore> =
        Arc::new(MemorySessionStore::new(Arc::new(InMemoryStorage::new())));
    let engine = ConversationEngine::new(
        store,
        Arc::new(TranscriptDigest),
        Arc::new(retrieval_service()),
        config.clone(),
    )?;

    // ========================================
    // 1. MEMORY COMPACTION
    // ========================================
    info!("=== 1. Memory Compaction ===");
    let topics = [
        "ownership", "borrowing", "lifetimes", "traits", "generics", "closures",
        "iterators", "smart pointers", "threads", "async", "macros", "unsafe",
        "modules", "testing", "error handling",
    ];

    for (turn, topic) in topics.iter().enumerate() {
        engine
            .record_turn(
                "demo",
                "alice",
                &format!("Explain {}", topic),
                &format!("Here is how {} works in Rust.", topic),
                None,
            )
            .await?;

        let context = engine.build_context("demo", "alice").await?;
        info!(
            turn = turn + 1,
            stored = context.total_messages,
            sent = context.messages.len(),
            summaries = context.summaries_used,
            state = ?context.state,
            "Context after turn"
        );
    }

    let context = engine.build_context("demo", "alice").await?;
    if let Some(first) = context.messages.first() {
        info!("Synthetic message:\n{}\n", first.text());
    }

    // ========================================
    // 2. INTENTS AND CITATIONS
    // ========================================
    info!("=== 2. Intents and Citations ===");
    let scope = IntentScope::new("alice")
        .with_collections(vec!["rust-docs".to_string()])
        .with_fallback_query("How do references work?");
    let reply = engine
        .handle_intent("demo", &IntentRequest::search().with_limit(2), &scope)
        .await;
    info!("{}", serde_json::to_string_pretty(&reply)?);

    let answer = "References borrow values SOURCE_CITATION: \\cite{rust-book.pdf, page 74} \
                  and are bounded by lifetimes SOURCE_CITATION: \\cite{lifetimes.md, chunk 3}.";
    for reference in engine.extract_references(answer, reply.rag_response.as_deref()) {
        info!(
            "{} -> {}",
            reference.source_reference,
            reference.text_content.unwrap_or_default()
        );
    }

    let sessions = engine.list_sessions("alice").await?;
    info!(
        sessions = sessions.len(),
        title = sessions.first().and_then(|s| s.title.as_deref()).unwrap_or("-"),
        "Done"
    );

    Ok(())
}
