//! Three-tier profile persistence.
//!
//! Memory is the source of truth for the session. Every mutation is written
//! to the local cache before the call returns and schedules a debounced
//! remote write for each touched field group. At startup the cache is loaded
//! first, then the remote record set is fetched (or created) and hydrated
//! into memory under the `initializing` guard so the downloaded values are
//! not uploaded again.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::debounce::Debouncer;
use super::keys::{DEVICE_ID_COLUMN, FieldGroup, USER_ID_COLUMN, local};
use super::snapshot::{ProfileIdentity, ProfileState};
use crate::error::{RemoteError, SyncError};
use crate::identity::DeviceIdentityProvider;
use crate::store::{Filter, LocalCache, Record, RemoteDataStore};

const SYNC_EVENT_CAPACITY: usize = 128;

/// Notifications about persistence activity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// A group's in-memory fields changed and were written to the cache.
    GroupChanged(FieldGroup),
    RemoteWriteCompleted(FieldGroup),
    RemoteWriteFailed { group: FieldGroup, error: String },
    Hydrated,
    HydrationFailed(String),
    IdentityLinked(String),
    IdentityLinkFailed { user_id: String, error: String },
    AccountDeleted,
}

/// Result of an identity link attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked,
    AlreadyLinked,
    Failed,
}

/// Keeps memory, the local cache and the remote store consistent.
pub struct ProfileSyncEngine {
    state: RwLock<ProfileState>,
    cache: Arc<dyn LocalCache>,
    remote: Arc<dyn RemoteDataStore>,
    identity: Arc<dyn DeviceIdentityProvider>,
    debouncer: Debouncer,
    /// Held for the duration of one remote write per group.
    write_gates: HashMap<FieldGroup, Mutex<()>>,
    /// Bumped by every local mutation of the group outside hydration.
    revisions: HashMap<FieldGroup, AtomicU64>,
    /// Serializes mutations so cache writes land in mutation order.
    mutation: Mutex<()>,
    initializing: AtomicBool,
    /// Bumped on account deletion; writes scheduled before it are dropped.
    epoch: AtomicU64,
    last_error: StdMutex<Option<String>>,
    tx: broadcast::Sender<SyncEvent>,
}

impl ProfileSyncEngine {
    pub fn new(
        cache: Arc<dyn LocalCache>,
        remote: Arc<dyn RemoteDataStore>,
        identity: Arc<dyn DeviceIdentityProvider>,
        debounce: Duration,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(SYNC_EVENT_CAPACITY);
        let write_gates = FieldGroup::ALL
            .iter()
            .map(|g| (*g, Mutex::new(())))
            .collect();
        let revisions = FieldGroup::ALL
            .iter()
            .map(|g| (*g, AtomicU64::new(0)))
            .collect();
        Arc::new(Self {
            state: RwLock::new(ProfileState::default()),
            cache,
            remote,
            identity,
            debouncer: Debouncer::new(debounce),
            write_gates,
            revisions,
            mutation: Mutex::new(()),
            initializing: AtomicBool::new(false),
            epoch: AtomicU64::new(0),
            last_error: StdMutex::new(None),
            tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: SyncEvent) {
        // ok if nobody is listening
        let _ = self.tx.send(event);
    }

    /// A copy of the current in-memory state.
    pub async fn snapshot(&self) -> ProfileState {
        self.state.read().await.clone()
    }

    pub async fn device_id(&self) -> String {
        self.state.read().await.identity.device_id.clone()
    }

    pub fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    /// Message from the last failed hydration, cleared by a successful one.
    pub fn last_error(&self) -> Option<String> {
        self.last_error
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn set_last_error(&self, error: Option<String>) {
        *self.last_error.lock().unwrap_or_else(|e| e.into_inner()) = error;
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.debouncer.pending().is_empty()
    }

    // ── Mutation path ───────────────────────────────────────────────

    /// Apply `f` to the in-memory state, then persist `groups`.
    ///
    /// The cache write completes before this returns. Remote writes are
    /// debounced per group and suppressed while hydrating.
    pub async fn mutate<R, F>(self: &Arc<Self>, groups: &[FieldGroup], f: F) -> R
    where
        F: FnOnce(&mut ProfileState) -> R + Send,
        R: Send,
    {
        let _guard = self.mutation.lock().await;
        self.apply_locked(groups, f).await
    }

    async fn apply_locked<R, F>(self: &Arc<Self>, groups: &[FieldGroup], f: F) -> R
    where
        F: FnOnce(&mut ProfileState) -> R + Send,
        R: Send,
    {
        let (result, entries) = {
            let mut state = self.state.write().await;
            let result = f(&mut state);
            let mut entries = Record::new();
            for group in groups {
                entries.extend(state.group_record(*group));
            }
            (result, entries)
        };

        match self.cache.set_many(&entries).await {
            Ok(()) => debug!(keys = entries.len(), "Cache updated"),
            Err(e) => warn!(error = %e, "Cache write failed; keeping in-memory change"),
        }

        let initializing = self.is_initializing();
        for group in groups {
            if initializing {
                debug!(group = %group, "Remote write suppressed during hydration");
            } else {
                self.bump_revision(*group);
                self.schedule_remote(*group);
            }
            self.emit(SyncEvent::GroupChanged(*group));
        }
        result
    }

    fn revision(&self, group: FieldGroup) -> u64 {
        self.revisions
            .get(&group)
            .map_or(0, |r| r.load(Ordering::SeqCst))
    }

    fn bump_revision(&self, group: FieldGroup) {
        if let Some(r) = self.revisions.get(&group) {
            r.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn schedule_remote(self: &Arc<Self>, group: FieldGroup) {
        let engine = Arc::clone(self);
        let epoch = self.epoch.load(Ordering::SeqCst);
        self.debouncer.schedule(group, async move {
            engine.write_group(group, epoch).await;
        });
    }

    /// Write the group's current fields to the remote store.
    async fn write_group(self: Arc<Self>, group: FieldGroup, epoch: u64) {
        let Some(gate) = self.write_gates.get(&group) else {
            return;
        };
        let _gate = gate.lock().await;
        if self.epoch.load(Ordering::SeqCst) != epoch {
            debug!(group = %group, "Dropping remote write scheduled before account deletion");
            return;
        }

        let (identity, mut record) = {
            let state = self.state.read().await;
            (state.identity.clone(), state.group_record(group))
        };
        if identity.device_id.is_empty() {
            warn!(group = %group, "No device id yet; skipping remote write");
            return;
        }

        let table = group.table();
        let filter = Filter::eq(DEVICE_ID_COLUMN, identity.device_id.as_str());
        let result = match self.remote.update(table, &filter, &record).await {
            Err(RemoteError::NotFound { .. }) => {
                add_id_columns(&mut record, &identity);
                self.remote.create(table, &record).await.map(|_| ())
            }
            other => other,
        };

        match result {
            Ok(()) => {
                debug!(group = %group, "Remote write completed");
                self.emit(SyncEvent::RemoteWriteCompleted(group));
            }
            Err(e) => {
                warn!(group = %group, error = %e, "Remote write failed; not retrying");
                self.emit(SyncEvent::RemoteWriteFailed {
                    group,
                    error: e.to_string(),
                });
            }
        }
    }

    /// Run pending debounced writes now. Returns how many groups were written.
    pub async fn flush(self: &Arc<Self>) -> usize {
        let groups = self.debouncer.cancel_all();
        let epoch = self.epoch.load(Ordering::SeqCst);
        futures::future::join_all(
            groups
                .iter()
                .map(|g| Arc::clone(self).write_group(*g, epoch)),
        )
        .await;
        if !groups.is_empty() {
            info!(groups = groups.len(), "Flushed pending remote writes");
        }
        groups.len()
    }

    // ── Local-only keys ─────────────────────────────────────────────

    pub async fn get_local(&self, key: &str) -> Option<Value> {
        match self.cache.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Cache read failed");
                None
            }
        }
    }

    pub async fn set_local(&self, key: &str, value: Value) {
        if let Err(e) = self.cache.set(key, &value).await {
            warn!(key, error = %e, "Cache write failed");
        }
    }

    pub async fn remove_local(&self, key: &str) {
        if let Err(e) = self.cache.remove(key).await {
            warn!(key, error = %e, "Cache remove failed");
        }
    }

    // ── Startup ─────────────────────────────────────────────────────

    /// Resolve the device id and fill memory from the cache.
    ///
    /// Unreadable keys are treated as absent; only a missing device id fails.
    pub async fn load_cache(&self) -> Result<(), SyncError> {
        let device_id = self.identity.device_id().await?;

        let mut records = Vec::with_capacity(FieldGroup::ALL.len());
        for group in FieldGroup::ALL {
            let mut record = Record::new();
            for key in group.fields() {
                if let Some(value) = self.get_local(key).await {
                    record.insert((*key).to_string(), value);
                }
            }
            records.push((*group, record));
        }
        let linked_user_id = self
            .get_local(local::LINKED_USER_ID)
            .await
            .and_then(|v| v.as_str().map(str::to_string));

        let mut state = self.state.write().await;
        state.identity = ProfileIdentity {
            device_id: device_id.clone(),
            linked_user_id,
        };
        for (group, record) in &records {
            let fallbacks = state.apply_record(*group, record);
            if !fallbacks.is_empty() {
                warn!(group = %group, keys = ?fallbacks, "Malformed cached values replaced with defaults");
            }
        }
        info!(device_id = %device_id, "Profile loaded from cache");
        Ok(())
    }

    async fn fetch_or_create(
        &self,
        group: FieldGroup,
        filter: &Filter,
        identity: &ProfileIdentity,
    ) -> Result<Record, RemoteError> {
        // A debounced write for the group may fall back to a create too; the
        // gate keeps the two from both inserting a row.
        let _gate = match self.write_gates.get(&group) {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };
        let table = group.table();
        if let Some(record) = self.remote.fetch(table, filter).await? {
            return Ok(record);
        }
        let mut record = self.state.read().await.group_record(group);
        add_id_columns(&mut record, identity);
        info!(table, "No remote record for device; creating one");
        self.remote.create(table, &record).await
    }

    /// Fetch (or create) every group's remote record and assign it to memory.
    ///
    /// Returns whether every group was fetched. Groups edited locally while
    /// the fetch was in flight, or with a write still pending, keep their
    /// local values.
    pub async fn hydrate(self: &Arc<Self>) -> bool {
        let identity = self.state.read().await.identity.clone();
        if identity.device_id.is_empty() {
            let msg = "device id not loaded".to_string();
            warn!("Hydration skipped: {msg}");
            self.set_last_error(Some(msg.clone()));
            self.emit(SyncEvent::HydrationFailed(msg));
            return false;
        }

        let revisions: HashMap<FieldGroup, u64> = FieldGroup::ALL
            .iter()
            .map(|g| (*g, self.revision(*g)))
            .collect();
        let filter = Filter::eq(DEVICE_ID_COLUMN, identity.device_id.as_str());
        let (profile, quiz, progress) = futures::join!(
            self.fetch_or_create(FieldGroup::Profile, &filter, &identity),
            self.fetch_or_create(FieldGroup::Quiz, &filter, &identity),
            self.fetch_or_create(FieldGroup::Progress, &filter, &identity),
        );

        let mut failure: Option<String> = None;
        {
            let _guard = self.mutation.lock().await;
            self.initializing.store(true, Ordering::SeqCst);
            for (group, fetched) in [
                (FieldGroup::Profile, profile),
                (FieldGroup::Quiz, quiz),
                (FieldGroup::Progress, progress),
            ] {
                match fetched {
                    Ok(record) => {
                        let edited = revisions.get(&group) != Some(&self.revision(group));
                        if edited || self.debouncer.is_pending(group) {
                            debug!(group = %group, "Local edits newer than fetch; keeping local values");
                            continue;
                        }
                        let fallbacks = self
                            .apply_locked(&[group], |s| s.apply_record(group, &record))
                            .await;
                        if !fallbacks.is_empty() {
                            warn!(group = %group, keys = ?fallbacks, "Malformed remote values replaced with defaults");
                        }
                    }
                    Err(e) => {
                        warn!(group = %group, error = %e, "Remote read failed; using cached values");
                        failure.get_or_insert_with(|| e.to_string());
                    }
                }
            }
            self.initializing.store(false, Ordering::SeqCst);
        }

        match failure {
            Some(msg) => {
                self.set_last_error(Some(msg.clone()));
                self.emit(SyncEvent::HydrationFailed(msg));
                false
            }
            None => {
                self.set_last_error(None);
                info!(device_id = %identity.device_id, "Profile hydrated from remote");
                self.emit(SyncEvent::Hydrated);
                true
            }
        }
    }

    /// Load the cache, then hydrate from the remote store in the background.
    pub async fn bootstrap(self: &Arc<Self>) -> Result<JoinHandle<bool>, SyncError> {
        self.load_cache().await?;
        let engine = Arc::clone(self);
        Ok(tokio::spawn(async move { engine.hydrate().await }))
    }

    // ── Identity ────────────────────────────────────────────────────

    /// Associate the device-scoped remote profile with `user_id`.
    ///
    /// Failures are logged and leave the profile usable unlinked.
    pub async fn link_identity(&self, user_id: &str) -> LinkOutcome {
        let device_id = {
            let state = self.state.read().await;
            if state.identity.linked_user_id.as_deref() == Some(user_id) {
                return LinkOutcome::AlreadyLinked;
            }
            state.identity.device_id.clone()
        };

        let mut fields = Record::new();
        fields.insert(USER_ID_COLUMN.to_string(), Value::from(user_id));
        let result = self
            .remote
            .update(
                FieldGroup::Profile.table(),
                &Filter::eq(DEVICE_ID_COLUMN, device_id.as_str()),
                &fields,
            )
            .await;

        match result {
            Ok(()) => {
                self.state.write().await.identity.linked_user_id = Some(user_id.to_string());
                self.set_local(local::LINKED_USER_ID, Value::from(user_id))
                    .await;
                info!(user_id, device_id = %device_id, "Identity linked");
                self.emit(SyncEvent::IdentityLinked(user_id.to_string()));
                LinkOutcome::Linked
            }
            Err(e) => {
                warn!(user_id, error = %e, "Identity link failed; profile stays unlinked");
                self.emit(SyncEvent::IdentityLinkFailed {
                    user_id: user_id.to_string(),
                    error: e.to_string(),
                });
                LinkOutcome::Failed
            }
        }
    }

    // ── Teardown ────────────────────────────────────────────────────

    /// Delete the remote records and every cached key, and reset memory.
    ///
    /// Local teardown happens even if remote deletion fails; the first remote
    /// error is returned. The device id is kept.
    pub async fn delete_account(&self) -> Result<(), SyncError> {
        let cancelled = self.debouncer.cancel_all();
        self.epoch.fetch_add(1, Ordering::SeqCst);

        let _guard = self.mutation.lock().await;
        let mut gates = Vec::with_capacity(self.write_gates.len());
        for group in FieldGroup::ALL {
            if let Some(gate) = self.write_gates.get(group) {
                gates.push(gate.lock().await);
            }
        }

        let device_id = self.device_id().await;
        let filter = Filter::eq(DEVICE_ID_COLUMN, device_id.as_str());
        let mut remote_error: Option<RemoteError> = None;
        for group in FieldGroup::ALL {
            if let Err(e) = self.remote.delete(group.table(), &filter).await {
                warn!(group = %group, error = %e, "Remote delete failed");
                remote_error.get_or_insert(e);
            }
        }
        drop(gates);

        let cache_result = self.cache.clear().await;
        if let Err(e) = &cache_result {
            warn!(error = %e, "Cache clear failed");
        }

        *self.state.write().await = ProfileState {
            identity: ProfileIdentity {
                device_id,
                linked_user_id: None,
            },
            ..ProfileState::default()
        };
        self.set_last_error(None);
        info!(cancelled_writes = cancelled.len(), "Account deleted");
        self.emit(SyncEvent::AccountDeleted);

        if let Some(e) = remote_error {
            return Err(e.into());
        }
        cache_result?;
        Ok(())
    }
}

fn add_id_columns(record: &mut Record, identity: &ProfileIdentity) {
    record.insert(
        DEVICE_ID_COLUMN.to_string(),
        Value::from(identity.device_id.as_str()),
    );
    if let Some(user_id) = &identity.linked_user_id {
        record.insert(USER_ID_COLUMN.to_string(), Value::from(user_id.as_str()));
    }
}
