//! Onboarding engine: the single owner of flow state.
//!
//! Wires the quiz, phase and paywall state machines to the sync engine, the
//! timers and the identity collaborators. Every command takes the flow lock,
//! so no two mutations interleave; timer callbacks and auth events go
//! through the same lock.

use std::sync::{Arc, Mutex as StdMutex, Weak};

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::assessment::{
    DependencyScore, QuizAdvance, QuizAnswer, QuizAnswerSet, QuizFlowController, QuizStep,
    ScoringEngine, Selection,
};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::identity::{AuthEvent, AuthProvider, SubscriptionProvider};
use crate::onboarding::{
    OnboardingPhase, PaywallFlow, PaywallStage, PhaseController, PhasePersistence,
    PhaseTransition, UserProfile,
};
use crate::persisted::{parse_optional, parse_or};
use crate::streak::{MilestoneTier, ResetOutcome, StreakTracker};
use crate::sync::keys::local;
use crate::sync::{FieldGroup, ProfileState, ProfileSyncEngine};
use crate::timer::TimerSlot;

const ENGINE_EVENT_CAPACITY: usize = 128;

/// Flow notifications for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    PhaseChanged {
        from: OnboardingPhase,
        to: OnboardingPhase,
    },
    PhaseLockReleased(OnboardingPhase),
    QuizStepChanged(QuizStep),
    AnswerRecorded(QuizStep),
    QuizFinalized {
        score: DependencyScore,
        total_recovery_days: u32,
    },
    StreakReset(ResetOutcome),
    PaywallStageChanged(PaywallStage),
}

/// Read-only snapshot of everything the presentation layer renders.
#[derive(Debug, Clone)]
pub struct EngineView {
    pub phase: OnboardingPhase,
    pub is_transitioning: bool,
    pub can_go_back: bool,
    pub progress: Option<f64>,
    pub quiz_step: QuizStep,
    pub quiz_finalized: bool,
    pub can_continue_quiz: bool,
    pub auto_advance_pending: bool,
    pub paywall_stage: Option<PaywallStage>,
    pub skipped_early_auth: bool,
    pub is_authenticated: bool,
    pub profile: ProfileState,
    pub days_since_relapse: u32,
    pub days_until_next_milestone: Option<u32>,
    pub last_sync_error: Option<String>,
}

struct FlowState {
    phase: PhaseController,
    quiz: QuizFlowController,
    paywall: Option<PaywallFlow>,
    skipped_early_auth: bool,
}

impl Default for FlowState {
    fn default() -> Self {
        Self {
            phase: PhaseController::new(OnboardingPhase::Welcome),
            quiz: QuizFlowController::new(),
            paywall: None,
            skipped_early_auth: false,
        }
    }
}

/// Composition root for the onboarding flow.
pub struct OnboardingEngine {
    config: EngineConfig,
    flow: Mutex<FlowState>,
    sync: Arc<ProfileSyncEngine>,
    auth: Arc<dyn AuthProvider>,
    subscription: Arc<dyn SubscriptionProvider>,
    auto_advance: TimerSlot,
    phase_lock: TimerSlot,
    auth_listener: StdMutex<Option<JoinHandle<()>>>,
    tx: broadcast::Sender<EngineEvent>,
}

impl OnboardingEngine {
    pub fn new(
        config: EngineConfig,
        sync: Arc<ProfileSyncEngine>,
        auth: Arc<dyn AuthProvider>,
        subscription: Arc<dyn SubscriptionProvider>,
    ) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(ENGINE_EVENT_CAPACITY);
        Arc::new(Self {
            config,
            flow: Mutex::new(FlowState::default()),
            sync,
            auth,
            subscription,
            auto_advance: TimerSlot::new("quiz_auto_advance"),
            phase_lock: TimerSlot::new("phase_lock"),
            auth_listener: StdMutex::new(None),
            tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn sync(&self) -> &Arc<ProfileSyncEngine> {
        &self.sync
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    // ── Startup ─────────────────────────────────────────────────────

    /// Restore from the cache, start listening for auth events and hydrate
    /// from the remote store in the background.
    ///
    /// The returned handle resolves once hydration and its follow-ups
    /// (completion check, identity link, streak refresh) are done.
    pub async fn start(self: &Arc<Self>) -> Result<JoinHandle<bool>> {
        self.sync.load_cache().await?;
        let has_completed = self
            .sync
            .snapshot()
            .await
            .progress
            .has_completed_onboarding;

        let raw_phase = self.local_string(local::ONBOARDING_PHASE).await;
        let phase = parse_optional::<OnboardingPhase>(raw_phase.as_deref());
        if phase.is_fallback() {
            warn!(value = ?raw_phase, "Unknown persisted phase; starting over");
        }
        let raw_step = self.local_string(local::QUIZ_STEP).await;
        let step = parse_or(raw_step.as_deref(), QuizStep::first());
        if step.is_fallback() && raw_step.is_some() {
            warn!(value = ?raw_step, "Unknown persisted quiz step; restarting quiz");
        }
        let quiz_finalized = self.local_flag(local::QUIZ_FINALIZED).await;
        let skipped_early_auth = self.local_flag(local::SKIPPED_EARLY_AUTH).await;

        let controller = PhaseController::resume(has_completed, phase.into_inner());
        let current = controller.current();
        {
            let mut flow = self.flow.lock().await;
            *flow = FlowState {
                phase: controller,
                quiz: QuizFlowController::resume(step.into_inner(), quiz_finalized),
                paywall: (current == OnboardingPhase::Paywall)
                    .then(|| PaywallFlow::new(skipped_early_auth)),
                skipped_early_auth,
            };
        }
        if has_completed && raw_phase.is_some() {
            self.sync.remove_local(local::ONBOARDING_PHASE).await;
        }
        info!(phase = %current, has_completed, "Onboarding resumed");

        self.spawn_auth_listener();

        let engine = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let hydrated = engine.sync.hydrate().await;
            engine.after_hydration().await;
            hydrated
        }))
    }

    async fn local_string(&self, key: &str) -> Option<String> {
        self.sync
            .get_local(key)
            .await
            .and_then(|v| v.as_str().map(str::to_string))
    }

    async fn local_flag(&self, key: &str) -> bool {
        self.sync
            .get_local(key)
            .await
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    async fn after_hydration(self: &Arc<Self>) {
        let completed = self
            .sync
            .snapshot()
            .await
            .progress
            .has_completed_onboarding;
        if completed {
            let mut flow = self.flow.lock().await;
            if let Some(t) = flow.phase.force_jump(OnboardingPhase::Complete) {
                info!(from = %t.from, "Remote profile already completed onboarding");
                self.apply_transition(&mut flow, t).await;
            }
        }

        if let Some(user_id) = self.auth.current_user_id() {
            self.sync.link_identity(&user_id).await;
        }
        self.refresh_streak(Utc::now()).await;
    }

    fn spawn_auth_listener(self: &Arc<Self>) {
        let mut rx = self.auth.subscribe();
        let engine: Weak<Self> = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(engine) = engine.upgrade() else {
                            break;
                        };
                        engine.on_auth_event(event).await;
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(missed = n, "Auth listener lagged behind events");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Auth event channel closed");
                        break;
                    }
                }
            }
        });
        let previous = self
            .auth_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    async fn on_auth_event(self: &Arc<Self>, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(user_id) => {
                info!(user_id = %user_id, "Signed in");
                self.sync.link_identity(&user_id).await;

                let mut flow = self.flow.lock().await;
                if flow.phase.current() == OnboardingPhase::OptionalAuth {
                    if let Some(t) = flow.phase.force_jump(OnboardingPhase::Quiz) {
                        self.apply_transition(&mut flow, t).await;
                    }
                }
                self.complete_forced_auth_locked(&mut flow).await;
            }
            AuthEvent::SignedOut => {
                info!("Signed out; anonymous profile kept");
            }
        }
    }

    // ── Phase navigation ────────────────────────────────────────────

    /// Move to the next phase.
    ///
    /// Ignored while locked, on the quiz (which finishes by finalizing) and
    /// on the paywall (which finishes through the purchase flow).
    pub async fn advance(self: &Arc<Self>) -> Option<OnboardingPhase> {
        let mut flow = self.flow.lock().await;
        if matches!(
            flow.phase.current(),
            OnboardingPhase::Quiz | OnboardingPhase::Paywall
        ) {
            debug!(phase = %flow.phase.current(), "Advance ignored; phase finishes on its own");
            return None;
        }
        let t = flow.phase.advance()?;
        self.apply_transition(&mut flow, t).await;
        Some(t.to)
    }

    pub async fn go_back(self: &Arc<Self>) -> Option<OnboardingPhase> {
        let mut flow = self.flow.lock().await;
        let t = flow.phase.go_back()?;
        self.apply_transition(&mut flow, t).await;
        Some(t.to)
    }

    pub async fn jump_to(self: &Arc<Self>, target: OnboardingPhase) -> Option<OnboardingPhase> {
        let mut flow = self.flow.lock().await;
        let t = flow.phase.jump_to(target)?;
        self.apply_transition(&mut flow, t).await;
        Some(t.to)
    }

    /// Continue past the optional sign-in without signing in.
    pub async fn skip_optional_auth(self: &Arc<Self>) -> Option<OnboardingPhase> {
        let mut flow = self.flow.lock().await;
        if flow.phase.current() != OnboardingPhase::OptionalAuth {
            return None;
        }
        let t = flow.phase.advance()?;
        flow.skipped_early_auth = true;
        self.sync
            .set_local(local::SKIPPED_EARLY_AUTH, Value::Bool(true))
            .await;
        self.apply_transition(&mut flow, t).await;
        Some(t.to)
    }

    async fn apply_transition(self: &Arc<Self>, flow: &mut FlowState, t: PhaseTransition) {
        flow.paywall = (t.to == OnboardingPhase::Paywall)
            .then(|| PaywallFlow::new(flow.skipped_early_auth));
        if t.from == OnboardingPhase::Quiz {
            self.auto_advance.cancel();
        }

        match t.persistence() {
            PhasePersistence::Store(phase) => {
                self.sync
                    .set_local(local::ONBOARDING_PHASE, Value::from(phase.as_str()))
                    .await;
            }
            PhasePersistence::Clear => {
                self.sync.remove_local(local::ONBOARDING_PHASE).await;
            }
        }

        if t.to.is_terminal() {
            self.sync
                .mutate(&[FieldGroup::Progress], |s| {
                    s.progress.has_completed_onboarding = true
                })
                .await;
        }

        let engine = Arc::clone(self);
        let generation = t.lock_generation;
        self.phase_lock.restart(self.config.phase_lock, async move {
            engine.release_phase_lock(generation).await;
        });

        info!(from = %t.from, to = %t.to, "Phase changed");
        self.emit(EngineEvent::PhaseChanged {
            from: t.from,
            to: t.to,
        });
        if let Some(paywall) = &flow.paywall {
            self.emit(EngineEvent::PaywallStageChanged(paywall.stage()));
        }
    }

    async fn release_phase_lock(&self, generation: u64) {
        let mut flow = self.flow.lock().await;
        if flow.phase.release_lock(generation) {
            debug!(phase = %flow.phase.current(), "Phase lock released");
            self.emit(EngineEvent::PhaseLockReleased(flow.phase.current()));
        }
    }

    // ── Quiz ────────────────────────────────────────────────────────

    /// Record an answer for the current step.
    ///
    /// On auto-advance steps the quiz moves on after a short delay; a new
    /// selection before then restarts the delay with the new value.
    pub async fn select_answer(self: &Arc<Self>, answer: QuizAnswer) -> bool {
        let mut flow = self.flow.lock().await;
        if flow.phase.current() != OnboardingPhase::Quiz {
            return false;
        }
        let step = answer.step();
        let selection = flow.quiz.select(step);
        if selection == Selection::Rejected {
            debug!(step = %step, current = %flow.quiz.current(), "Selection rejected");
            return false;
        }

        let groups: &[FieldGroup] = if step == QuizStep::Gender {
            &[FieldGroup::Quiz, FieldGroup::Profile]
        } else {
            &[FieldGroup::Quiz]
        };
        self.sync.mutate(groups, |s| s.answers.record(answer)).await;
        self.emit(EngineEvent::AnswerRecorded(step));

        if let Selection::AutoAdvance(generation) = selection {
            let engine = Arc::clone(self);
            self.auto_advance
                .restart(self.config.auto_advance_delay, async move {
                    engine.on_auto_advance(generation).await;
                });
        }
        true
    }

    async fn on_auto_advance(self: &Arc<Self>, generation: u64) {
        let mut flow = self.flow.lock().await;
        if flow.phase.current() != OnboardingPhase::Quiz {
            return;
        }
        let advance = flow.quiz.auto_advance_due(generation);
        self.handle_quiz_advance(&mut flow, advance).await;
    }

    /// Set the age and optional display name asked on the last step.
    pub async fn set_about_you(&self, age: Option<u32>, display_name: Option<String>) -> bool {
        let flow = self.flow.lock().await;
        if flow.phase.current() != OnboardingPhase::Quiz || flow.quiz.is_finalized() {
            return false;
        }
        self.sync
            .mutate(&[FieldGroup::Profile], |s| {
                s.answers.set_about_you(age, display_name)
            })
            .await;
        self.emit(EngineEvent::AnswerRecorded(QuizStep::AboutYou));
        true
    }

    /// Explicit continue on a manual step. Ignored until the step's
    /// requirements are met.
    pub async fn continue_quiz(self: &Arc<Self>) -> bool {
        let mut flow = self.flow.lock().await;
        if flow.phase.current() != OnboardingPhase::Quiz {
            return false;
        }
        let answers = self.sync.snapshot().await.answers;
        let advance = flow.quiz.continue_manual(&answers);
        self.handle_quiz_advance(&mut flow, advance).await
    }

    pub async fn quiz_back(&self) -> Option<QuizStep> {
        let mut flow = self.flow.lock().await;
        if flow.phase.current() != OnboardingPhase::Quiz {
            return None;
        }
        let step = flow.quiz.go_back()?;
        self.auto_advance.cancel();
        self.persist_quiz_step(step).await;
        self.emit(EngineEvent::QuizStepChanged(step));
        Some(step)
    }

    async fn handle_quiz_advance(
        self: &Arc<Self>,
        flow: &mut FlowState,
        advance: QuizAdvance,
    ) -> bool {
        match advance {
            QuizAdvance::Moved(step) => {
                self.persist_quiz_step(step).await;
                debug!(step = %step, "Quiz step changed");
                self.emit(EngineEvent::QuizStepChanged(step));
                true
            }
            QuizAdvance::Finalize => {
                self.finalize_quiz(flow).await;
                true
            }
            QuizAdvance::Ignored => false,
        }
    }

    async fn persist_quiz_step(&self, step: QuizStep) {
        self.sync
            .set_local(local::QUIZ_STEP, Value::from(step.as_str()))
            .await;
    }

    /// Score the answers, fix the recovery horizon and hand off to the
    /// calculating phase.
    async fn finalize_quiz(self: &Arc<Self>, flow: &mut FlowState) {
        let now = Utc::now();
        let (score, total) = self
            .sync
            .mutate(&[FieldGroup::Quiz, FieldGroup::Progress], |s| {
                let score = ScoringEngine::score(&s.answers);
                s.score = Some(score);
                let progress = &mut s.progress;
                StreakTracker::finalize(&mut progress.streak, &mut progress.projection, score, now);
                (score, progress.projection.total_recovery_days.unwrap_or(0))
            })
            .await;
        self.sync
            .set_local(local::QUIZ_FINALIZED, Value::Bool(true))
            .await;

        info!(score = %score, total_recovery_days = total, "Quiz finalized");
        self.emit(EngineEvent::QuizFinalized {
            score,
            total_recovery_days: total,
        });

        if let Some(t) = flow.phase.force_jump(OnboardingPhase::QuizCalculating) {
            self.apply_transition(flow, t).await;
        }
    }

    /// Clear the answers and score and take the quiz again.
    ///
    /// The recovery horizon is replaced when the retake is finalized.
    pub async fn retake_quiz(self: &Arc<Self>) {
        let mut flow = self.flow.lock().await;
        self.auto_advance.cancel();
        flow.quiz.reset();
        self.sync
            .mutate(&[FieldGroup::Quiz, FieldGroup::Profile], |s| {
                s.answers = QuizAnswerSet::default();
                s.score = None;
            })
            .await;
        self.sync
            .set_local(local::QUIZ_FINALIZED, Value::Bool(false))
            .await;
        self.persist_quiz_step(QuizStep::first()).await;
        info!("Quiz retake started");
        self.emit(EngineEvent::QuizStepChanged(QuizStep::first()));

        if let Some(t) = flow.phase.force_jump(OnboardingPhase::Quiz) {
            self.apply_transition(&mut flow, t).await;
        }
    }

    // ── Streak ──────────────────────────────────────────────────────

    /// Record a relapse on `relapse_date`.
    pub async fn reset_timer(&self, relapse_date: DateTime<Utc>) -> ResetOutcome {
        let _flow = self.flow.lock().await;
        let now = Utc::now();
        let outcome = self
            .sync
            .mutate(&[FieldGroup::Progress], |s| {
                let p = &mut s.progress;
                StreakTracker::reset_timer(&mut p.streak, &mut p.projection, relapse_date, now)
            })
            .await;
        info!(
            previous_streak_days = outcome.previous_streak_days,
            best_streak = outcome.best_streak,
            times_relapsed = outcome.times_relapsed,
            "Streak reset"
        );
        self.emit(EngineEvent::StreakReset(outcome));
        outcome
    }

    /// Set when the current streak began, without counting a relapse.
    pub async fn set_streak_start(&self, start: DateTime<Utc>) {
        let _flow = self.flow.lock().await;
        let now = Utc::now();
        self.sync
            .mutate(&[FieldGroup::Progress], |s| {
                let p = &mut s.progress;
                StreakTracker::set_streak_start(&mut p.streak, &mut p.projection, start, now)
            })
            .await;
    }

    /// Recompute the milestone tier and projected date for `now`.
    ///
    /// Persists only if something changed.
    pub async fn refresh_streak(&self, now: DateTime<Utc>) -> bool {
        let _flow = self.flow.lock().await;
        let mut progress = self.sync.snapshot().await.progress;
        if !StreakTracker::refresh(&mut progress.streak, &mut progress.projection, now) {
            return false;
        }
        self.sync
            .mutate(&[FieldGroup::Progress], |s| {
                let p = &mut s.progress;
                StreakTracker::refresh(&mut p.streak, &mut p.projection, now)
            })
            .await;
        debug!(milestone = %progress.streak.current_milestone, "Streak refreshed");
        true
    }

    // ── Paywall ─────────────────────────────────────────────────────

    /// Run the purchase flow from the paywall.
    ///
    /// The flow lock is released while the purchase is in progress.
    pub async fn purchase(self: &Arc<Self>) -> Option<PaywallStage> {
        {
            let flow = self.flow.lock().await;
            let stage = flow.paywall.as_ref()?.stage();
            if stage != PaywallStage::ShowingPaywall {
                return Some(stage);
            }
        }

        let purchased = self.subscription.purchase().await;

        let mut flow = self.flow.lock().await;
        let is_authenticated = self.auth.is_authenticated();
        let allow_bypass = self.config.allow_paywall_bypass;
        let paywall = flow.paywall.as_mut()?;
        if paywall.stage() != PaywallStage::ShowingPaywall {
            return Some(paywall.stage());
        }
        let stage = paywall.on_purchase_result(purchased, is_authenticated, allow_bypass);

        if purchased {
            self.sync
                .mutate(&[FieldGroup::Progress], |s| s.progress.is_subscribed = true)
                .await;
        } else {
            info!(bypass = allow_bypass, "Purchase declined");
        }
        self.emit(EngineEvent::PaywallStageChanged(stage));

        if stage == PaywallStage::Completing {
            self.finish_paywall(&mut flow).await;
        }
        Some(stage)
    }

    /// Finish the forced sign-in step. Requires an authenticated user.
    pub async fn complete_forced_auth(self: &Arc<Self>) -> Option<PaywallStage> {
        let mut flow = self.flow.lock().await;
        self.complete_forced_auth_locked(&mut flow).await
    }

    async fn complete_forced_auth_locked(
        self: &Arc<Self>,
        flow: &mut FlowState,
    ) -> Option<PaywallStage> {
        let paywall = flow.paywall.as_mut()?;
        if paywall.stage() != PaywallStage::ShowingForcedAuth {
            return Some(paywall.stage());
        }
        if !self.auth.is_authenticated() {
            debug!("Forced sign-in not complete yet");
            return Some(paywall.stage());
        }
        let stage = paywall.on_auth_complete();
        self.emit(EngineEvent::PaywallStageChanged(stage));
        if stage == PaywallStage::Completing {
            self.finish_paywall(flow).await;
        }
        Some(stage)
    }

    async fn finish_paywall(self: &Arc<Self>, flow: &mut FlowState) {
        let Some(next) = flow.phase.current().next() else {
            return;
        };
        if let Some(t) = flow.phase.force_jump(next) {
            self.apply_transition(flow, t).await;
        }
    }

    // ── Profile ─────────────────────────────────────────────────────

    pub async fn update_profile<F>(&self, f: F)
    where
        F: FnOnce(&mut UserProfile) + Send,
    {
        let _flow = self.flow.lock().await;
        self.sync
            .mutate(&[FieldGroup::Profile], |s| f(&mut s.profile))
            .await;
    }

    /// Write pending debounced changes now (e.g. before the app is suspended).
    pub async fn flush(&self) -> usize {
        self.sync.flush().await
    }

    /// Tear down the account locally and remotely and restart onboarding.
    pub async fn delete_account(&self) -> Result<()> {
        let mut flow = self.flow.lock().await;
        self.auto_advance.cancel();
        self.phase_lock.cancel();
        let from = flow.phase.current();
        let result = self.sync.delete_account().await;
        *flow = FlowState::default();
        if from != OnboardingPhase::Welcome {
            self.emit(EngineEvent::PhaseChanged {
                from,
                to: OnboardingPhase::Welcome,
            });
        }
        result.map_err(Into::into)
    }

    // ── Observation ─────────────────────────────────────────────────

    pub async fn view(&self) -> EngineView {
        let flow = self.flow.lock().await;
        let profile = self.sync.snapshot().await;
        let now = Utc::now();
        let days = StreakTracker::days_since_relapse(&profile.progress.streak, now);
        EngineView {
            phase: flow.phase.current(),
            is_transitioning: flow.phase.is_transitioning(),
            can_go_back: flow.phase.can_go_back(),
            progress: flow.phase.progress(),
            quiz_step: flow.quiz.current(),
            quiz_finalized: flow.quiz.is_finalized(),
            can_continue_quiz: flow.quiz.can_continue(&profile.answers),
            auto_advance_pending: flow.quiz.has_pending_auto_advance(),
            paywall_stage: flow.paywall.as_ref().map(PaywallFlow::stage),
            skipped_early_auth: flow.skipped_early_auth,
            is_authenticated: self.auth.is_authenticated(),
            days_since_relapse: days,
            days_until_next_milestone: MilestoneTier::days_until_next(days),
            last_sync_error: self.sync.last_error(),
            profile,
        }
    }
}

impl Drop for OnboardingEngine {
    fn drop(&mut self) {
        if let Some(handle) = self
            .auth_listener
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            handle.abort();
        }
    }
}
