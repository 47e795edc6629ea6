//! Onboarding flow: top-level phase sequencing and the paywall sub-flow.
//!
//! A new user moves through a fixed sequence of phases. The quiz phase hands
//! off to the calculating phase once the assessment is scored, and the
//! paywall phase runs its own purchase/forced-sign-in sub-machine before the
//! flow completes.

pub mod controller;
pub mod model;
pub mod paywall;
pub mod state;

pub use controller::{PhaseController, PhasePersistence, PhaseTransition};
pub use model::{ProgressRecord, UserProfile};
pub use paywall::{PaywallFlow, PaywallStage};
pub use state::OnboardingPhase;
