//! Tool registry contract
//!
//! Tools are grouped by the service that owns them (e.g. `summarization`,
//! `translation`, `rag`). A registry lists the tools of one service; each tool
//! takes JSON arguments and returns raw text.

use crate::error::{LlmError, LlmResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// A callable tool exposed by an external service
#[async_trait]
pub trait NamedTool: Send + Sync {
    /// Tool name, unique within its service
    fn name(&self) -> &str;

    /// Invoke the tool with JSON arguments and return its raw text output
    async fn invoke(&self, args: Value) -> LlmResult<String>;
}

/// Lists the tools offered by a service
#[async_trait]
pub trait ToolRegistry: Send + Sync {
    /// List every tool owned by `service`
    async fn list_tools(&self, service: &str) -> LlmResult<Vec<Arc<dyn NamedTool>>>;

    /// Find one tool by name within a service
    async fn find_tool(&self, service: &str, name: &str) -> LlmResult<Arc<dyn NamedTool>> {
        self.list_tools(service)
            .await?
            .into_iter()
            .find(|tool| tool.name() == name)
            .ok_or_else(|| LlmError::ToolNotFound(format!("{}/{}", service, name)))
    }
}

type ToolFn = dyn Fn(Value) -> LlmResult<String> + Send + Sync;

/// Tool backed by a synchronous closure
pub struct FnTool {
    name: String,
    func: Box<ToolFn>,
}

impl FnTool {
    /// Create a tool from a closure
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(Value) -> LlmResult<String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl NamedTool for FnTool {
    fn name(&self) -> &str {
        &self.name
    }

    async fn invoke(&self, args: Value) -> LlmResult<String> {
        tracing::debug!(tool = %self.name, "Invoking function tool");
        (self.func)(args)
    }
}

/// Registry with a fixed set of tools per service
#[derive(Default, Clone)]
pub struct StaticToolRegistry {
    services: HashMap<String, Vec<Arc<dyn NamedTool>>>,
}

impl StaticToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool under a service
    pub fn register(&mut self, service: impl Into<String>, tool: Arc<dyn NamedTool>) {
        self.services.entry(service.into()).or_default().push(tool);
    }

    /// Builder-style registration
    pub fn with_tool(mut self, service: impl Into<String>, tool: impl NamedTool + 'static) -> Self {
        self.register(service, Arc::new(tool));
        self
    }

    /// Number of services with at least one tool
    pub fn service_count(&self) -> usize {
        self.services.len()
    }
}

#[async_trait]
impl ToolRegistry for StaticToolRegistry {
    async fn list_tools(&self, service: &str) -> LlmResult<Vec<Arc<dyn NamedTool>>> {
        Ok(self.services.get(service).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_registry() -> StaticToolRegistry {
        StaticToolRegistry::new()
            .with_tool(
                "rag",
                FnTool::new("retrieve", |args| {
                    Ok(format!("query={}", args["query"].as_str().unwrap_or_default()))
                }),
            )
            .with_tool(
                "translation",
                FnTool::new("translate_document", |_| {
                    Err(LlmError::tool("translate_document", "backend down"))
                }),
            )
    }

    #[tokio::test]
    async fn test_find_and_invoke_tool() {
        let registry = echo_registry();
        let tool = registry.find_tool("rag", "retrieve").await.unwrap();

        let output = tool.invoke(json!({"query": "rust"})).await.unwrap();
        assert_eq!(output, "query=rust");
        assert_eq!(registry.service_count(), 2);
    }

    #[tokio::test]
    async fn test_missing_tool_and_service() {
        let registry = echo_registry();

        let missing = registry.find_tool("rag", "retrieve_dense").await;
        assert!(matches!(missing, Err(LlmError::ToolNotFound(_))));

        let tools = registry.list_tools("summarization").await.unwrap();
        assert!(tools.is_empty());
    }

    #[tokio::test]
    async fn test_tool_error_propagates() {
        let registry = echo_registry();
        let tool = registry
            .find_tool("translation", "translate_document")
            .await
            .unwrap();

        let err = tool.invoke(json!({})).await.unwrap_err();
        assert!(err.to_string().contains("backend down"));
    }
}
