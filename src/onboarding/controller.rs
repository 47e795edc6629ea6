//! Phase navigation with a transition lock.
//!
//! Every transition locks navigation until the caller releases the lock with
//! the generation it was handed (after the animation window). Navigation
//! requested while locked is ignored.

use super::state::OnboardingPhase;

/// A transition that happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTransition {
    pub from: OnboardingPhase,
    pub to: OnboardingPhase,
    /// Pass to [`PhaseController::release_lock`] when the lock window ends.
    pub lock_generation: u64,
}

/// What to do with the persisted phase after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhasePersistence {
    Store(OnboardingPhase),
    /// Onboarding finished: forget the phase so a relaunch never resumes mid-flow.
    Clear,
}

impl PhaseTransition {
    pub fn persistence(&self) -> PhasePersistence {
        if self.to.is_terminal() {
            PhasePersistence::Clear
        } else {
            PhasePersistence::Store(self.to)
        }
    }
}

#[derive(Debug, Clone)]
pub struct PhaseController {
    current: OnboardingPhase,
    is_transitioning: bool,
    lock_generation: u64,
}

impl PhaseController {
    pub fn new(start: OnboardingPhase) -> Self {
        Self {
            current: start,
            is_transitioning: false,
            lock_generation: 0,
        }
    }

    /// Startup rule: completed profiles go straight to `Complete`, otherwise
    /// resume the persisted phase, else start at `Welcome`.
    pub fn resume(has_completed_onboarding: bool, persisted: Option<OnboardingPhase>) -> Self {
        let start = if has_completed_onboarding {
            OnboardingPhase::Complete
        } else {
            persisted.unwrap_or_default()
        };
        Self::new(start)
    }

    pub fn current(&self) -> OnboardingPhase {
        self.current
    }

    pub fn is_transitioning(&self) -> bool {
        self.is_transitioning
    }

    pub fn can_go_back(&self) -> bool {
        !self.is_transitioning && self.current.can_go_back() && self.current.previous().is_some()
    }

    pub fn progress(&self) -> Option<f64> {
        self.current.progress()
    }

    /// Move to the next phase. No-op when locked or terminal.
    pub fn advance(&mut self) -> Option<PhaseTransition> {
        if self.is_transitioning {
            return None;
        }
        let next = self.current.next()?;
        Some(self.transition(next))
    }

    /// Move to the previous phase when the current one allows it.
    pub fn go_back(&mut self) -> Option<PhaseTransition> {
        if !self.can_go_back() {
            return None;
        }
        let previous = self.current.previous()?;
        Some(self.transition(previous))
    }

    /// Jump directly to `target`. No-op when locked or already there.
    pub fn jump_to(&mut self, target: OnboardingPhase) -> Option<PhaseTransition> {
        if self.is_transitioning {
            return None;
        }
        self.force_jump(target)
    }

    /// Jump regardless of the lock. For transitions the engine initiates
    /// itself rather than ones driven by user input.
    pub(crate) fn force_jump(&mut self, target: OnboardingPhase) -> Option<PhaseTransition> {
        if target == self.current {
            return None;
        }
        Some(self.transition(target))
    }

    /// Release the lock taken by the transition with `generation`.
    ///
    /// Returns `false` if a newer transition has since taken the lock.
    pub fn release_lock(&mut self, generation: u64) -> bool {
        if !self.is_transitioning || generation != self.lock_generation {
            return false;
        }
        self.is_transitioning = false;
        true
    }

    fn transition(&mut self, to: OnboardingPhase) -> PhaseTransition {
        let from = self.current;
        self.current = to;
        self.is_transitioning = true;
        self.lock_generation += 1;
        PhaseTransition {
            from,
            to,
            lock_generation: self.lock_generation,
        }
    }
}
