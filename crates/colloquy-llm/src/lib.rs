//! # Colloquy LLM
//!
//! Message model and the narrow collaborator contracts the Colloquy core
//! compiles against:
//!
//! - [`ChatMessage`]: role plus ordered text / file segments
//! - [`CompletionClient`]: `complete(prompt) -> text`
//! - [`ToolRegistry`] / [`NamedTool`]: tools listed per owning service,
//!   invoked with JSON arguments, returning raw text
//!
//! Concrete model SDKs and tool transports implement these traits outside
//! this workspace. [`StaticToolRegistry`] and [`FnTool`] cover in-process
//! tools and tests.

#![warn(missing_docs)]

pub mod completion;
pub mod error;
pub mod message;
pub mod tools;

pub use completion::CompletionClient;
pub use error::{LlmError, LlmResult};
pub use message::{ChatMessage, ContentSegment, MessageRole};
pub use tools::{FnTool, NamedTool, StaticToolRegistry, ToolRegistry};

/// Re-exported so implementors of the collaborator traits need no extra dependency
pub use async_trait::async_trait;
