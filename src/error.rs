//! Error types for the onboarding engine.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Remote store error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Local cache errors.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Failed to open cache: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Remote data store errors.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("Request to {table} failed: {reason}")]
    Request { table: String, reason: String },

    #[error("Remote returned {status} for {table}: {body}")]
    Status {
        table: String,
        status: u16,
        body: String,
    },

    #[error("Invalid response from {table}: {reason}")]
    Decode { table: String, reason: String },

    #[error("No record in {table} matching {filter}")]
    NotFound { table: String, filter: String },
}

/// Errors raised while synchronizing the profile across tiers.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Device identity unavailable: {0}")]
    Identity(String),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
