//! Onboarding phase sequence: the sixteen top-level screens, in order.

use crate::persisted::string_enum;

string_enum! {
    /// The phases of onboarding.
    ///
    /// Progresses linearly from `Welcome` to `Complete`; the quiz hands off to
    /// `QuizCalculating` by a direct jump.
    pub enum OnboardingPhase {
        Welcome => "welcome",
        OptionalAuth => "optional_auth",
        Quiz => "quiz",
        QuizCalculating => "quiz_calculating",
        QuizResults => "quiz_results",
        Symptoms => "symptoms",
        BrainEducation => "brain_education",
        Benefits => "benefits",
        Goals => "goals",
        StreakStart => "streak_start",
        Commitment => "commitment",
        Notifications => "notifications",
        BlockerSetup => "blocker_setup",
        Testimonials => "testimonials",
        Paywall => "paywall",
        Complete => "complete",
    }
}

impl OnboardingPhase {
    pub fn ordinal(&self) -> usize {
        Self::ALL.iter().position(|p| p == self).unwrap_or(0)
    }

    /// Whether this phase is terminal (onboarding is done).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Get the next phase in the linear progression, if any.
    pub fn next(&self) -> Option<OnboardingPhase> {
        Self::ALL.get(self.ordinal() + 1).copied()
    }

    /// Get the preceding phase, if any.
    pub fn previous(&self) -> Option<OnboardingPhase> {
        self.ordinal()
            .checked_sub(1)
            .and_then(|i| Self::ALL.get(i).copied())
    }

    /// Whether the user may navigate back out of this phase.
    pub fn can_go_back(&self) -> bool {
        !matches!(
            self,
            Self::Welcome
                | Self::OptionalAuth
                | Self::QuizCalculating
                | Self::QuizResults
                | Self::Paywall
                | Self::Complete
        )
    }

    /// Whether this phase counts toward the progress indicator.
    pub fn is_visible_step(&self) -> bool {
        !matches!(
            self,
            Self::OptionalAuth | Self::QuizCalculating | Self::Paywall | Self::Complete
        )
    }

    /// Number of phases shown in the progress indicator.
    pub fn visible_step_count() -> usize {
        Self::ALL.iter().filter(|p| p.is_visible_step()).count()
    }

    /// Position among the visible phases, `None` for hidden ones.
    pub fn visible_index(&self) -> Option<usize> {
        Self::ALL
            .iter()
            .filter(|p| p.is_visible_step())
            .position(|p| p == self)
    }

    /// Progress fraction `visible_index / visible_step_count`.
    pub fn progress(&self) -> Option<f64> {
        self.visible_index()
            .map(|i| i as f64 / Self::visible_step_count() as f64)
    }
}

impl Default for OnboardingPhase {
    fn default() -> Self {
        Self::Welcome
    }
}
