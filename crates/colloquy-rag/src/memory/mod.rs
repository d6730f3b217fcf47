//! # Bounded conversation memory
//!
//! Keeps a verbatim hot window of recent messages and compacts older chunks
//! into persisted summaries.
//!
//! - [`SummaryGenerator`]: one completion call per chunk, hard-bounded output
//! - [`MemoryCompactor`]: builds the bounded context and creates summaries
//!   when an append lands on a chunk boundary

mod compactor;
mod summary;

pub use compactor::{BoundedContext, MemoryCompactor, MemoryState, SUMMARY_PREFIX};
pub use summary::{SummaryGenerator, CHARS_PER_WORD};
