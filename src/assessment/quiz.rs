//! Quiz step sequencing.
//!
//! `QuizFlowController` owns the step ordinal and the auto-advance
//! bookkeeping. It never sleeps itself: a selection on an auto-advance step
//! hands back a generation number, the caller waits the configured delay,
//! and only the newest generation is honoured when it fires.

use crate::persisted::string_enum;

use super::answers::QuizAnswerSet;

string_enum! {
    /// The eleven quiz steps, in order.
    pub enum QuizStep {
        Intro => "intro",
        Gender => "gender",
        ViewingFrequency => "viewing_frequency",
        FirstExposureAge => "first_exposure_age",
        Escalation => "escalation",
        ArousalDifficulty => "arousal_difficulty",
        EmotionalCoping => "emotional_coping",
        StressResponse => "stress_response",
        BoredomResponse => "boredom_response",
        MoneySpent => "money_spent",
        AboutYou => "about_you",
    }
}

/// How a step moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceMode {
    /// Selecting a value moves on by itself after a short delay.
    Auto,
    /// The user must press continue; gated by [`QuizStep::is_satisfied_by`].
    Manual,
}

impl QuizStep {
    pub const COUNT: usize = 11;

    pub fn ordinal(&self) -> usize {
        Self::ALL.iter().position(|s| s == self).unwrap_or(0)
    }

    pub fn from_ordinal(ordinal: usize) -> Option<Self> {
        Self::ALL.get(ordinal).copied()
    }

    pub fn first() -> Self {
        Self::Intro
    }

    pub fn is_last(&self) -> bool {
        self.ordinal() == Self::COUNT - 1
    }

    pub fn next(&self) -> Option<Self> {
        Self::from_ordinal(self.ordinal() + 1)
    }

    pub fn previous(&self) -> Option<Self> {
        self.ordinal().checked_sub(1).and_then(Self::from_ordinal)
    }

    pub fn advance_mode(&self) -> AdvanceMode {
        match self {
            Self::Intro | Self::AboutYou => AdvanceMode::Manual,
            _ => AdvanceMode::Auto,
        }
    }

    /// Whether the answers required by this step are present.
    ///
    /// `AboutYou` needs only the age; the display name is optional.
    pub fn is_satisfied_by(&self, answers: &QuizAnswerSet) -> bool {
        match self {
            Self::Intro => true,
            Self::Gender => answers.gender.is_some(),
            Self::ViewingFrequency => answers.viewing_frequency.is_some(),
            Self::FirstExposureAge => answers.first_exposure_age.is_some(),
            Self::Escalation => answers.escalation.is_some(),
            Self::ArousalDifficulty => answers.arousal_difficulty.is_some(),
            Self::EmotionalCoping => answers.emotional_coping.is_some(),
            Self::StressResponse => answers.stress_response.is_some(),
            Self::BoredomResponse => answers.boredom_response.is_some(),
            Self::MoneySpent => answers.money_spent.is_some(),
            Self::AboutYou => answers.age.is_some(),
        }
    }
}

/// Result of asking the controller to move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizAdvance {
    /// Moved to the given step.
    Moved(QuizStep),
    /// The last step was left: score and hand off to the calculating phase.
    Finalize,
    /// Nothing happened (already finalized).
    Ignored,
}

/// Step sequencer for the assessment.
#[derive(Debug, Clone)]
pub struct QuizFlowController {
    step: QuizStep,
    finalized: bool,
    auto_generation: u64,
    pending_auto_advance: Option<u64>,
}

impl Default for QuizFlowController {
    fn default() -> Self {
        Self::new()
    }
}

impl QuizFlowController {
    pub fn new() -> Self {
        Self::resume(QuizStep::first(), false)
    }

    /// Rebuild from persisted state.
    pub fn resume(step: QuizStep, finalized: bool) -> Self {
        Self {
            step,
            finalized,
            auto_generation: 0,
            pending_auto_advance: None,
        }
    }

    pub fn current(&self) -> QuizStep {
        self.step
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn has_pending_auto_advance(&self) -> bool {
        self.pending_auto_advance.is_some()
    }

    /// Whether the current step may be continued manually.
    pub fn can_continue(&self, answers: &QuizAnswerSet) -> bool {
        !self.finalized && self.step.is_satisfied_by(answers)
    }

    /// Register a selection for `step`.
    ///
    /// On an auto-advance step this bumps the generation, superseding any
    /// pending auto-advance.
    pub fn select(&mut self, step: QuizStep) -> Selection {
        if self.finalized || step != self.step {
            return Selection::Rejected;
        }
        match step.advance_mode() {
            AdvanceMode::Auto => {
                self.auto_generation += 1;
                self.pending_auto_advance = Some(self.auto_generation);
                Selection::AutoAdvance(self.auto_generation)
            }
            AdvanceMode::Manual => Selection::Recorded,
        }
    }

    /// Called when an auto-advance delay elapses. Only the newest pending
    /// generation advances; stale ones are dropped.
    pub fn auto_advance_due(&mut self, generation: u64) -> QuizAdvance {
        if self.pending_auto_advance != Some(generation) {
            return QuizAdvance::Ignored;
        }
        self.advance()
    }

    /// Manual continue, gated by the step's requirements.
    pub fn continue_manual(&mut self, answers: &QuizAnswerSet) -> QuizAdvance {
        if !self.can_continue(answers) {
            return QuizAdvance::Ignored;
        }
        self.advance()
    }

    /// Move forward one step, or finalize on the last step.
    pub fn advance(&mut self) -> QuizAdvance {
        if self.finalized {
            return QuizAdvance::Ignored;
        }
        self.pending_auto_advance = None;
        match self.step.next() {
            Some(next) => {
                self.step = next;
                QuizAdvance::Moved(next)
            }
            None => {
                self.finalized = true;
                QuizAdvance::Finalize
            }
        }
    }

    /// Step back, allowed while not on the first step. Cancels any pending auto-advance.
    pub fn go_back(&mut self) -> Option<QuizStep> {
        if self.finalized {
            return None;
        }
        let previous = self.step.previous()?;
        self.pending_auto_advance = None;
        self.step = previous;
        Some(previous)
    }

    /// Start over for a retake.
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

/// Outcome of [`QuizFlowController::select`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// Not the current step, or the quiz is finalized.
    Rejected,
    /// Stored; the step waits for a manual continue.
    Recorded,
    /// Stored; schedule an auto-advance tagged with this generation.
    AutoAdvance(u64),
}
