//! Identity collaborators: device id, authentication, subscription purchase.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::SyncError;
use crate::store::LocalCache;

/// Key under which the device identifier is stored in both tiers.
pub const DEVICE_ID_KEY: &str = "device_id";

const AUTH_EVENT_CAPACITY: usize = 16;

/// Supplies the stable per-install identifier.
#[async_trait]
pub trait DeviceIdentityProvider: Send + Sync {
    async fn device_id(&self) -> Result<String, SyncError>;
}

/// Device id kept in a fast cache with a durable fallback (e.g. a keychain).
///
/// A fast-tier miss that hits the durable tier repairs the fast tier. A miss
/// in both generates a fresh v4 UUID and writes it to both.
pub struct TieredDeviceIdentity {
    fast: Arc<dyn LocalCache>,
    durable: Arc<dyn LocalCache>,
}

impl TieredDeviceIdentity {
    pub fn new(fast: Arc<dyn LocalCache>, durable: Arc<dyn LocalCache>) -> Self {
        Self { fast, durable }
    }
}

fn as_id(value: Option<Value>) -> Option<String> {
    value
        .as_ref()
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl DeviceIdentityProvider for TieredDeviceIdentity {
    async fn device_id(&self) -> Result<String, SyncError> {
        match self.fast.get(DEVICE_ID_KEY).await {
            Ok(value) => {
                if let Some(id) = as_id(value) {
                    return Ok(id);
                }
            }
            Err(e) => warn!(error = %e, "Fast identity tier unreadable, trying durable tier"),
        }

        if let Some(id) = as_id(self.durable.get(DEVICE_ID_KEY).await?) {
            debug!("Device id recovered from durable tier");
            if let Err(e) = self.fast.set(DEVICE_ID_KEY, &Value::from(id.as_str())).await {
                warn!(error = %e, "Failed to repair fast identity tier");
            }
            return Ok(id);
        }

        let id = Uuid::new_v4().to_string();
        self.durable
            .set(DEVICE_ID_KEY, &Value::from(id.as_str()))
            .await
            .map_err(|e| SyncError::Identity(format!("Failed to store device id: {e}")))?;
        if let Err(e) = self.fast.set(DEVICE_ID_KEY, &Value::from(id.as_str())).await {
            warn!(error = %e, "Failed to write device id to fast tier");
        }
        info!(device_id = %id, "Generated new device id");
        Ok(id)
    }
}

/// Sign-in state change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(String),
    SignedOut,
}

/// Authentication state and notifications.
pub trait AuthProvider: Send + Sync {
    fn is_authenticated(&self) -> bool;
    fn current_user_id(&self) -> Option<String>;
    fn subscribe(&self) -> broadcast::Receiver<AuthEvent>;
}

/// Starts a purchase and resolves to whether it went through.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    async fn purchase(&self) -> bool;
}

/// [`AuthProvider`] driven by the host: it reports sign-in and sign-out as
/// they happen in whatever SDK actually performs authentication.
pub struct SessionAuth {
    user_id: std::sync::RwLock<Option<String>>,
    tx: broadcast::Sender<AuthEvent>,
}

impl SessionAuth {
    pub fn new() -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Arc::new(Self {
            user_id: std::sync::RwLock::new(None),
            tx,
        })
    }

    pub fn signed_in(user_id: impl Into<String>) -> Arc<Self> {
        let auth = Self::new();
        *auth.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id.into());
        auth
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        let user_id = user_id.into();
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = Some(user_id.clone());
        // ok if nobody is listening
        let _ = self.tx.send(AuthEvent::SignedIn(user_id));
    }

    pub fn sign_out(&self) {
        *self.user_id.write().unwrap_or_else(|e| e.into_inner()) = None;
        let _ = self.tx.send(AuthEvent::SignedOut);
    }
}

impl AuthProvider for SessionAuth {
    fn is_authenticated(&self) -> bool {
        self.current_user_id().is_some()
    }

    fn current_user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.tx.subscribe()
    }
}

/// Host-supplied purchase result that can be changed between calls.
pub struct FixedPurchase {
    result: RwLock<bool>,
}

impl FixedPurchase {
    pub fn new(result: bool) -> Arc<Self> {
        Arc::new(Self {
            result: RwLock::new(result),
        })
    }

    pub async fn set(&self, result: bool) {
        *self.result.write().await = result;
    }
}

#[async_trait]
impl SubscriptionProvider for FixedPurchase {
    async fn purchase(&self) -> bool {
        *self.result.read().await
    }
}
