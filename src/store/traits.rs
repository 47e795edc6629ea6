//! Storage traits: the local key/value cache and the remote record store.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{CacheError, RemoteError};

/// A flat set of named fields, as stored in the cache or a remote row.
pub type Record = serde_json::Map<String, Value>;

/// Fast, offline-capable key/value store. Values are primitives
/// (string, bool, number, RFC 3339 date string) or null.
#[async_trait]
pub trait LocalCache: Send + Sync {
    /// Read one key.
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    /// Write one key, replacing any previous value.
    async fn set(&self, key: &str, value: &Value) -> Result<(), CacheError>;

    /// Remove one key. Returns whether it existed.
    async fn remove(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key. Returns the number removed.
    async fn clear(&self) -> Result<usize, CacheError>;

    /// Write several keys at once.
    async fn set_many(&self, entries: &Record) -> Result<(), CacheError> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }
}

/// Equality filter selecting remote rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: String,
    pub value: String,
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            value: value.into(),
        }
    }

    /// Whether `record` satisfies this filter.
    pub fn matches(&self, record: &Record) -> bool {
        record
            .get(&self.column)
            .and_then(Value::as_str)
            .is_some_and(|v| v == self.value)
    }
}

impl std::fmt::Display for Filter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}={}", self.column, self.value)
    }
}

/// Networked, authoritative record store addressed by table name and filter.
#[async_trait]
pub trait RemoteDataStore: Send + Sync {
    /// Read the first row matching `filter`.
    async fn fetch(&self, table: &str, filter: &Filter) -> Result<Option<Record>, RemoteError>;

    /// Insert a row and return it as stored.
    async fn create(&self, table: &str, record: &Record) -> Result<Record, RemoteError>;

    /// Overwrite `fields` on every row matching `filter`.
    async fn update(&self, table: &str, filter: &Filter, fields: &Record)
    -> Result<(), RemoteError>;

    /// Delete every row matching `filter`.
    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), RemoteError>;
}
