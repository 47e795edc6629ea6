//! Profile synchronization across memory, the local cache and the remote store.

pub mod debounce;
pub mod engine;
pub mod keys;
pub mod snapshot;

pub use debounce::Debouncer;
pub use engine::{LinkOutcome, ProfileSyncEngine, SyncEvent};
pub use keys::FieldGroup;
pub use snapshot::{ProfileIdentity, ProfileState};
