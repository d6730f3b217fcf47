//! Scripted collaborators shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use colloquy_llm::{CompletionClient, LlmError, LlmResult};
use colloquy_rag::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Completion client that numbers its summaries, or always fails
pub struct ScriptedCompletion {
    calls: AtomicUsize,
    failing: bool,
}

impl ScriptedCompletion {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failing: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> LlmResult<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.failing {
            return Err(LlmError::completion("service unavailable"));
        }
        let lines = prompt.lines().filter(|l| l.contains(": ")).count();
        Ok(format!("summary {} of {} lines", call, lines))
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}

pub fn memory_store() -> Arc<dyn SessionStore> {
    Arc::new(MemorySessionStore::new(Arc::new(InMemoryStorage::new())))
}

pub fn engine_with(
    store: Arc<dyn SessionStore>,
    completion: Arc<ScriptedCompletion>,
    tools: Arc<dyn ToolRegistry>,
) -> ConversationEngine {
    ConversationEngine::new(store, completion, tools, ColloquyConfig::default())
        .expect("default config is valid")
}

/// Install a test subscriber once; ignores repeated calls
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("colloquy_rag=debug")
        .with_test_writer()
        .try_init();
}
