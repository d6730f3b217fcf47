//! Key/value storage capability used by the session layer
//!
//! Keys are namespaced with `::` separators (`session::<user>::<session>::messages`).
//! Besides plain get/set, the trait exposes the two atomic primitives the memory
//! layer depends on: [`Memory::set_if_absent`] and [`Memory::list_append`]. Each
//! must execute as a single operation at the storage layer.

use crate::error::{ColloquyError, ColloquyResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MemoryValue {
    /// UTF-8 string
    String(String),
    /// Signed integer
    Integer(i64),
    /// Boolean flag
    Boolean(bool),
    /// Arbitrary JSON document
    Json(serde_json::Value),
    /// Ordered list of values
    List(Vec<MemoryValue>),
}

impl MemoryValue {
    /// Borrow as string
    pub fn as_string(&self) -> Option<&str> {
        match self {
            MemoryValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Read as integer
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            MemoryValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Read as boolean
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            MemoryValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as JSON
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            MemoryValue::Json(j) => Some(j),
            _ => None,
        }
    }

    /// Borrow as list
    pub fn as_list(&self) -> Option<&[MemoryValue]> {
        match self {
            MemoryValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<String> for MemoryValue {
    fn from(value: String) -> Self {
        MemoryValue::String(value)
    }
}

impl From<&str> for MemoryValue {
    fn from(value: &str) -> Self {
        MemoryValue::String(value.to_string())
    }
}

impl From<i64> for MemoryValue {
    fn from(value: i64) -> Self {
        MemoryValue::Integer(value)
    }
}

impl From<bool> for MemoryValue {
    fn from(value: bool) -> Self {
        MemoryValue::Boolean(value)
    }
}

impl From<serde_json::Value> for MemoryValue {
    fn from(value: serde_json::Value) -> Self {
        MemoryValue::Json(value)
    }
}

/// Key listing query
#[derive(Debug, Clone, Default)]
pub struct MemoryQuery {
    /// Restrict to keys under this namespace
    pub namespace: Option<String>,

    /// Maximum number of keys to return
    pub limit: Option<usize>,
}

impl MemoryQuery {
    /// Create an unrestricted query
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Cap the number of returned keys
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Conditional list append executed as one storage operation
#[derive(Debug, Clone)]
pub struct ListAppend<'a> {
    /// List key
    pub key: &'a str,

    /// Value to push at the end of the list
    pub value: MemoryValue,

    /// Append only if this key exists
    pub require: Option<&'a str>,

    /// Key/value written in the same operation (e.g. an `updated_at` stamp)
    pub touch: Option<(&'a str, MemoryValue)>,
}

impl<'a> ListAppend<'a> {
    /// Unconditional append
    pub fn new(key: &'a str, value: MemoryValue) -> Self {
        Self {
            key,
            value,
            require: None,
            touch: None,
        }
    }

    /// Require `key` to exist
    pub fn requiring(mut self, key: &'a str) -> Self {
        self.require = Some(key);
        self
    }

    /// Write `key = value` alongside the append
    pub fn touching(mut self, key: &'a str, value: MemoryValue) -> Self {
        self.touch = Some((key, value));
        self
    }
}

/// Storage backend capability
#[async_trait]
pub trait Memory: Send + Sync {
    /// Backend name, for logging
    fn backend_name(&self) -> &str;

    /// Read a value
    async fn get(&self, key: &str) -> ColloquyResult<Option<MemoryValue>>;

    /// Write a value, replacing any existing one
    async fn set(&self, key: &str, value: MemoryValue) -> ColloquyResult<()>;

    /// Delete a key, returning whether it existed
    async fn delete(&self, key: &str) -> ColloquyResult<bool>;

    /// Whether a key exists
    async fn exists(&self, key: &str) -> ColloquyResult<bool>;

    /// List keys matching a query
    async fn keys(&self, query: &MemoryQuery) -> ColloquyResult<Vec<String>>;

    /// Count keys, optionally within a namespace
    async fn count(&self, namespace: Option<&str>) -> ColloquyResult<usize>;

    /// Remove all keys, optionally within a namespace
    async fn clear(&self, namespace: Option<&str>) -> ColloquyResult<()>;

    /// Write `value` only if `key` is absent. Returns `true` if written.
    async fn set_if_absent(&self, key: &str, value: MemoryValue) -> ColloquyResult<bool>;

    /// Atomically append to a list.
    ///
    /// Returns the new list length, or `None` when the required key is missing
    /// (nothing is written in that case).
    async fn list_append(&self, op: ListAppend<'_>) -> ColloquyResult<Option<usize>>;

    /// Read `list[start..end]`, clamped to the list bounds
    async fn list_range(&self, key: &str, start: usize, end: usize)
        -> ColloquyResult<Vec<MemoryValue>>;

    /// Length of a list (0 if absent)
    async fn list_len(&self, key: &str) -> ColloquyResult<usize>;
}

fn in_namespace(key: &str, namespace: &str) -> bool {
    key.strip_prefix(namespace)
        .map(|rest| rest.is_empty() || rest.starts_with("::"))
        .unwrap_or(false)
}

/// Process-local storage backed by a locked hash map
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    data: RwLock<HashMap<String, MemoryValue>>,
}

impl InMemoryStorage {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Memory for InMemoryStorage {
    fn backend_name(&self) -> &str {
        "in_memory"
    }

    async fn get(&self, key: &str) -> ColloquyResult<Option<MemoryValue>> {
        Ok(self.data.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: MemoryValue) -> ColloquyResult<()> {
        self.data.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> ColloquyResult<bool> {
        Ok(self.data.write().remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> ColloquyResult<bool> {
        Ok(self.data.read().contains_key(key))
    }

    async fn keys(&self, query: &MemoryQuery) -> ColloquyResult<Vec<String>> {
        let data = self.data.read();
        let mut keys: Vec<String> = data
            .keys()
            .filter(|k| match &query.namespace {
                Some(ns) => in_namespace(k, ns),
                None => true,
            })
            .cloned()
            .collect();
        keys.sort();

        if let Some(limit) = query.limit {
            keys.truncate(limit);
        }

        Ok(keys)
    }

    async fn count(&self, namespace: Option<&str>) -> ColloquyResult<usize> {
        let data = self.data.read();
        Ok(match namespace {
            Some(ns) => data.keys().filter(|k| in_namespace(k, ns)).count(),
            None => data.len(),
        })
    }

    async fn clear(&self, namespace: Option<&str>) -> ColloquyResult<()> {
        let mut data = self.data.write();
        match namespace {
            Some(ns) => data.retain(|k, _| !in_namespace(k, ns)),
            None => data.clear(),
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: MemoryValue) -> ColloquyResult<bool> {
        let mut data = self.data.write();
        if data.contains_key(key) {
            return Ok(false);
        }
        data.insert(key.to_string(), value);
        Ok(true)
    }

    async fn list_append(&self, op: ListAppend<'_>) -> ColloquyResult<Option<usize>> {
        let mut data = self.data.write();

        if let Some(required) = op.require {
            if !data.contains_key(required) {
                return Ok(None);
            }
        }

        let entry = data
            .entry(op.key.to_string())
            .or_insert_with(|| MemoryValue::List(Vec::new()));

        let len = match entry {
            MemoryValue::List(items) => {
                items.push(op.value);
                items.len()
            }
            _ => {
                return Err(ColloquyError::storage(
                    "list_append",
                    format!("key '{}' does not hold a list", op.key),
                ))
            }
        };

        if let Some((touch_key, touch_value)) = op.touch {
            data.insert(touch_key.to_string(), touch_value);
        }

        Ok(Some(len))
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> ColloquyResult<Vec<MemoryValue>> {
        let data = self.data.read();
        match data.get(key) {
            None => Ok(Vec::new()),
            Some(MemoryValue::List(items)) => {
                let end = end.min(items.len());
                let start = start.min(end);
                Ok(items[start..end].to_vec())
            }
            Some(_) => Err(ColloquyError::storage(
                "list_range",
                format!("key '{}' does not hold a list", key),
            )),
        }
    }

    async fn list_len(&self, key: &str) -> ColloquyResult<usize> {
        let data = self.data.read();
        match data.get(key) {
            None => Ok(0),
            Some(MemoryValue::List(items)) => Ok(items.len()),
            Some(_) => Err(ColloquyError::storage(
                "list_len",
                format!("key '{}' does not hold a list", key),
            )),
        }
    }
}
