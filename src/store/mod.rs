//! Persistence layer: local cache and remote record store.

pub mod libsql_backend;
pub mod memory;
pub mod migrations;
pub mod rest;
pub mod traits;

pub use libsql_backend::LibSqlCache;
pub use memory::{InMemoryCache, InMemoryRemoteStore, RemoteCall};
pub use rest::RestRemoteStore;
pub use traits::{Filter, LocalCache, Record, RemoteDataStore};
