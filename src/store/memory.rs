//! In-memory implementations of the storage traits.
//!
//! Used by tests and by hosts that run without persistence. The remote store
//! records every call and can be told to fail, which lets tests assert on
//! debounce collapsing and failure handling.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::{CacheError, RemoteError};
use crate::store::traits::{Filter, LocalCache, Record, RemoteDataStore};

/// Map-backed [`LocalCache`].
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Value>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl LocalCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.lock().await.remove(key).is_some())
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        Ok(count)
    }
}

/// One call made against [`InMemoryRemoteStore`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteCall {
    Fetch { table: String, filter: Filter },
    Create { table: String, record: Record },
    Update {
        table: String,
        filter: Filter,
        fields: Record,
    },
    Delete { table: String, filter: Filter },
}

impl RemoteCall {
    pub fn table(&self) -> &str {
        match self {
            Self::Fetch { table, .. }
            | Self::Create { table, .. }
            | Self::Update { table, .. }
            | Self::Delete { table, .. } => table,
        }
    }

    pub fn is_write(&self) -> bool {
        !matches!(self, Self::Fetch { .. })
    }
}

/// Table-of-rows [`RemoteDataStore`] with a call log and failure injection.
#[derive(Default)]
pub struct InMemoryRemoteStore {
    tables: Mutex<HashMap<String, Vec<Record>>>,
    calls: Mutex<Vec<RemoteCall>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    latency: Option<Duration>,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps for `latency` before completing.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            latency: Some(latency),
            ..Self::default()
        }
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make create, update and delete fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Seed a row directly, bypassing the call log.
    pub async fn insert_row(&self, table: &str, record: Record) {
        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .push(record);
    }

    pub async fn rows(&self, table: &str) -> Vec<Record> {
        self.tables
            .lock()
            .await
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().await.clone()
    }

    /// Update calls made against `table`.
    pub async fn updates_to(&self, table: &str) -> Vec<Record> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|call| match call {
                RemoteCall::Update { table: t, fields, .. } if t == table => Some(fields.clone()),
                _ => None,
            })
            .collect()
    }

    pub async fn write_count(&self) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|c| c.is_write())
            .count()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    async fn record_call(&self, call: RemoteCall) {
        self.calls.lock().await.push(call);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check(&self, flag: &AtomicBool, table: &str) -> Result<(), RemoteError> {
        if flag.load(Ordering::SeqCst) {
            return Err(RemoteError::Request {
                table: table.to_string(),
                reason: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteDataStore for InMemoryRemoteStore {
    async fn fetch(&self, table: &str, filter: &Filter) -> Result<Option<Record>, RemoteError> {
        self.record_call(RemoteCall::Fetch {
            table: table.to_string(),
            filter: filter.clone(),
        })
        .await;
        self.check(&self.fail_reads, table)?;

        let tables = self.tables.lock().await;
        Ok(tables
            .get(table)
            .and_then(|rows| rows.iter().find(|r| filter.matches(r)).cloned()))
    }

    async fn create(&self, table: &str, record: &Record) -> Result<Record, RemoteError> {
        self.record_call(RemoteCall::Create {
            table: table.to_string(),
            record: record.clone(),
        })
        .await;
        self.check(&self.fail_writes, table)?;

        self.tables
            .lock()
            .await
            .entry(table.to_string())
            .or_default()
            .push(record.clone());
        Ok(record.clone())
    }

    async fn update(
        &self,
        table: &str,
        filter: &Filter,
        fields: &Record,
    ) -> Result<(), RemoteError> {
        self.record_call(RemoteCall::Update {
            table: table.to_string(),
            filter: filter.clone(),
            fields: fields.clone(),
        })
        .await;
        self.check(&self.fail_writes, table)?;

        let mut tables = self.tables.lock().await;
        let rows = tables.entry(table.to_string()).or_default();
        let mut matched = false;
        for row in rows.iter_mut().filter(|r| filter.matches(r)) {
            matched = true;
            for (k, v) in fields {
                row.insert(k.clone(), v.clone());
            }
        }
        if !matched {
            return Err(RemoteError::NotFound {
                table: table.to_string(),
                filter: filter.to_string(),
            });
        }
        Ok(())
    }

    async fn delete(&self, table: &str, filter: &Filter) -> Result<(), RemoteError> {
        self.record_call(RemoteCall::Delete {
            table: table.to_string(),
            filter: filter.clone(),
        })
        .await;
        self.check(&self.fail_writes, table)?;

        if let Some(rows) = self.tables.lock().await.get_mut(table) {
            rows.retain(|r| !filter.matches(r));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(device: &str) -> Record {
        let mut r = Record::new();
        r.insert("device_id".into(), json!(device));
        r.insert("bio".into(), Value::Null);
        r
    }

    #[tokio::test]
    async fn cache_roundtrip_and_clear() {
        let cache = InMemoryCache::new();
        cache.set("a", &json!(1)).await.unwrap();
        cache.set("b", &json!("x")).await.unwrap();
        assert_eq!(cache.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.clear().await.unwrap(), 2);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn remote_create_fetch_update_delete() {
        let store = InMemoryRemoteStore::new();
        let filter = Filter::eq("device_id", "d1");

        assert!(store.fetch("profiles", &filter).await.unwrap().is_none());
        store.create("profiles", &row("d1")).await.unwrap();

        let mut fields = Record::new();
        fields.insert("bio".into(), json!("hello"));
        store.update("profiles", &filter, &fields).await.unwrap();

        let fetched = store.fetch("profiles", &filter).await.unwrap().unwrap();
        assert_eq!(fetched["bio"], "hello");

        store.delete("profiles", &filter).await.unwrap();
        assert!(store.rows("profiles").await.is_empty());
        assert_eq!(store.write_count().await, 3);
        assert_eq!(store.updates_to("profiles").await.len(), 1);
    }

    #[tokio::test]
    async fn update_of_missing_row_is_not_found() {
        let store = InMemoryRemoteStore::new();
        let err = store
            .update("progress", &Filter::eq("device_id", "nope"), &Record::new())
            .await
            .unwrap_err();
        assert!(matches!(err, RemoteError::NotFound { .. }));
    }

    #[tokio::test]
    async fn injected_failures_are_logged_calls() {
        let store = InMemoryRemoteStore::new();
        store.set_fail_reads(true);
        store.set_fail_writes(true);
        let filter = Filter::eq("device_id", "d1");

        assert!(store.fetch("profiles", &filter).await.is_err());
        assert!(store.create("profiles", &row("d1")).await.is_err());
        assert!(store.rows("profiles").await.is_empty());
        assert_eq!(store.calls().await.len(), 2);
        assert_eq!(store.calls().await[1].table(), "profiles");
    }
}
