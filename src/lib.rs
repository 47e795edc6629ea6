//! Recovery onboarding: assessment, streak tracking and profile sync.
//!
//! The crate drives a new user through onboarding: a scored assessment quiz,
//! a fixed sequence of onboarding phases ending in a paywall, and a streak
//! tracker with milestone tiers. All of it is persisted in three tiers
//! (memory, local cache, remote store) by [`sync::ProfileSyncEngine`], and
//! [`engine::OnboardingEngine`] ties the pieces together.

pub mod assessment;
pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod logging;
pub mod onboarding;
pub mod persisted;
pub mod store;
pub mod streak;
pub mod sync;
pub mod timer;

pub use engine::{EngineEvent, EngineView, OnboardingEngine};
pub use error::{Error, Result};
