//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Timing and behaviour knobs for the onboarding engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Delay between selecting an answer on an auto-advance step and moving on.
    pub auto_advance_delay: Duration,
    /// How long navigation is locked after each phase transition.
    pub phase_lock: Duration,
    /// Quiet period before a field group is written to the remote store.
    pub remote_debounce: Duration,
    /// Whether a declined purchase may proceed past the paywall.
    pub allow_paywall_bypass: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            auto_advance_delay: Duration::from_millis(200),
            phase_lock: Duration::from_millis(350),
            remote_debounce: Duration::from_millis(500),
            allow_paywall_bypass: cfg!(debug_assertions),
        }
    }
}

impl EngineConfig {
    /// Build from `ONBOARDING_*` environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            auto_advance_delay: env_millis("ONBOARDING_AUTO_ADVANCE_MS")?
                .unwrap_or(defaults.auto_advance_delay),
            phase_lock: env_millis("ONBOARDING_PHASE_LOCK_MS")?.unwrap_or(defaults.phase_lock),
            remote_debounce: env_millis("ONBOARDING_DEBOUNCE_MS")?
                .unwrap_or(defaults.remote_debounce),
            allow_paywall_bypass: env_bool("ONBOARDING_PAYWALL_BYPASS")?
                .unwrap_or(defaults.allow_paywall_bypass),
        })
    }
}

/// Connection settings for the remote record store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Base URL of the REST endpoint, without a trailing slash.
    pub base_url: String,
    pub api_key: SecretString,
}

impl RemoteConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let base_url = std::env::var("ONBOARDING_REMOTE_URL")
            .map_err(|_| ConfigError::MissingEnvVar("ONBOARDING_REMOTE_URL".to_string()))?;
        let api_key = std::env::var("ONBOARDING_REMOTE_KEY")
            .map_err(|_| ConfigError::MissingEnvVar("ONBOARDING_REMOTE_KEY".to_string()))?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue {
                key: "ONBOARDING_REMOTE_URL".to_string(),
                message: format!("expected an http(s) URL, got {base_url}"),
            });
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: SecretString::from(api_key),
        })
    }
}

fn env_millis(key: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_millis(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn env_bool(key: &str) -> Result<Option<bool>, ConfigError> {
    match std::env::var(key) {
        Ok(raw) => parse_bool(key, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_millis(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })
}

fn parse_bool(key: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
