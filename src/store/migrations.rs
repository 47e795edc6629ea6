//! Schema history for the on-device cache database.
//!
//! The cache holds one key/value table, `cache_entries`, keyed by namespace
//! so several logical caches can share the file. The versions
//! already applied live in `cache_schema`, so opening an existing cache only
//! runs the steps it has not seen yet.

use libsql::Connection;

use crate::error::CacheError;

struct SchemaStep {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Append only. Shipped versions are never edited.
static SCHEMA_STEPS: &[SchemaStep] = &[SchemaStep {
    version: 1,
    name: "cache_entries",
    sql: r#"
        CREATE TABLE IF NOT EXISTS cache_entries (
            namespace TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (namespace, key)
        );
    "#,
}];

/// Bring the cache schema up to the latest version.
pub async fn run_migrations(conn: &Connection) -> Result<(), CacheError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS cache_schema (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| CacheError::Migration(format!("Failed to create cache_schema: {e}")))?;

    let applied = schema_version(conn).await?;
    for step in SCHEMA_STEPS.iter().filter(|s| s.version > applied) {
        tracing::info!(version = step.version, name = step.name, "Upgrading cache schema");
        conn.execute_batch(step.sql).await.map_err(|e| {
            CacheError::Migration(format!("Cache schema v{} ({}) failed: {e}", step.version, step.name))
        })?;
        mark_applied(conn, step).await?;
    }

    Ok(())
}

/// Highest applied version; 0 for a fresh cache.
async fn schema_version(conn: &Connection) -> Result<i64, CacheError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM cache_schema", ())
        .await
        .map_err(|e| CacheError::Migration(format!("Failed to read cache schema version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| CacheError::Migration(format!("Failed to read cache schema version: {e}")))?;

    match row {
        Some(row) => row
            .get::<i64>(0)
            .map_err(|e| CacheError::Migration(format!("Bad cache schema version: {e}"))),
        None => Ok(0),
    }
}

async fn mark_applied(conn: &Connection, step: &SchemaStep) -> Result<(), CacheError> {
    conn.execute(
        "INSERT OR IGNORE INTO cache_schema (version, name) VALUES (?1, ?2)",
        libsql::params![step.version, step.name],
    )
    .await
    .map_err(|e| CacheError::Migration(format!("Failed to record cache schema v{}: {e}", step.version)))?;
    Ok(())
}
