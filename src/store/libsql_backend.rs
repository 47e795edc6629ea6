//! libSQL backend for the local cache.
//!
//! Values are stored as JSON text in the `cache_entries` table, keyed by a
//! namespace so several logical caches can share one database file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use libsql::{Connection, Database as LibSqlDatabase, params};
use serde_json::Value;
use tracing::info;

use crate::error::CacheError;
use crate::store::migrations;
use crate::store::traits::LocalCache;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "onboarding";

/// libSQL-backed [`LocalCache`].
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
#[derive(Clone)]
pub struct LibSqlCache {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
    namespace: String,
}

impl LibSqlCache {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::Open(format!("Failed to create cache directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| CacheError::Open(format!("Failed to open libSQL database: {e}")))?;

        let cache = Self::from_database(db).await?;
        info!(path = %path.display(), "Cache opened");
        Ok(cache)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, CacheError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| CacheError::Open(format!("Failed to create in-memory database: {e}")))?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self, CacheError> {
        let conn = db
            .connect()
            .map_err(|e| CacheError::Open(format!("Failed to create connection: {e}")))?;
        migrations::run_migrations(&conn).await?;
        Ok(Self {
            db: Arc::new(db),
            conn,
            namespace: DEFAULT_NAMESPACE.to_string(),
        })
    }

    /// A view of the same database scoped to another namespace.
    pub fn with_namespace(&self, namespace: impl Into<String>) -> Self {
        Self {
            db: Arc::clone(&self.db),
            conn: self.conn.clone(),
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

#[async_trait]
impl LocalCache for LibSqlCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![self.namespace.as_str(), key],
            )
            .await
            .map_err(|e| CacheError::Query(format!("get: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let raw: String = row
                    .get(0)
                    .map_err(|e| CacheError::Query(format!("get: {e}")))?;
                // Corrupt JSON reads as absent rather than failing the whole load.
                Ok(serde_json::from_str(&raw).ok())
            }
            Ok(None) => Ok(None),
            Err(e) => Err(CacheError::Query(format!("get: {e}"))),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), CacheError> {
        let now = Utc::now().to_rfc3339();
        let raw =
            serde_json::to_string(value).map_err(|e| CacheError::Serialization(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO cache_entries (namespace, key, value, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (namespace, key) DO UPDATE SET value = ?3, updated_at = ?4",
                params![self.namespace.as_str(), key, raw, now],
            )
            .await
            .map_err(|e| CacheError::Query(format!("set: {e}")))?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, CacheError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![self.namespace.as_str(), key],
            )
            .await
            .map_err(|e| CacheError::Query(format!("remove: {e}")))?;
        Ok(count > 0)
    }

    async fn clear(&self) -> Result<usize, CacheError> {
        let count = self
            .conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![self.namespace.as_str()],
            )
            .await
            .map_err(|e| CacheError::Query(format!("clear: {e}")))?;
        Ok(count as usize)
    }
}
