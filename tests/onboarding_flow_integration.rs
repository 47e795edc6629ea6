//! Integration tests for the onboarding engine.
//!
//! Each test builds an engine over in-memory stores with millisecond-scale
//! timers and drives it through the public API, the way a presentation
//! layer would.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::{Value, json};
use tokio::time::{sleep, timeout};

use recovery_onboarding::assessment::{
    FirstExposureAge, Frequency, Gender, QuizAnswer, QuizStep, ViewingFrequency, YesNo,
};
use recovery_onboarding::config::EngineConfig;
use recovery_onboarding::identity::{
    DEVICE_ID_KEY, FixedPurchase, SessionAuth, TieredDeviceIdentity,
};
use recovery_onboarding::onboarding::{OnboardingPhase, PaywallStage};
use recovery_onboarding::store::{InMemoryCache, InMemoryRemoteStore, LocalCache, Record};
use recovery_onboarding::streak::MilestoneTier;
use recovery_onboarding::sync::keys::{self, local};
use recovery_onboarding::sync::{ProfileSyncEngine, SyncEvent};
use recovery_onboarding::{EngineEvent, EngineView, OnboardingEngine};

/// Maximum time any wait is allowed to take before we consider the test hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Longer than any timer in `test_config`.
const SETTLE: Duration = Duration::from_millis(250);

fn test_config() -> EngineConfig {
    EngineConfig {
        auto_advance_delay: Duration::from_millis(30),
        phase_lock: Duration::from_millis(25),
        remote_debounce: Duration::from_millis(60),
        allow_paywall_bypass: false,
    }
}

/// Stores that survive an engine being dropped and rebuilt ("relaunch").
#[derive(Clone)]
struct Device {
    cache: Arc<InMemoryCache>,
    keychain: Arc<InMemoryCache>,
    remote: Arc<InMemoryRemoteStore>,
    auth: Arc<SessionAuth>,
    purchase: Arc<FixedPurchase>,
}

impl Device {
    fn new() -> Self {
        Self::with_remote(InMemoryRemoteStore::new())
    }

    fn with_remote(remote: InMemoryRemoteStore) -> Self {
        Self {
            cache: Arc::new(InMemoryCache::new()),
            keychain: Arc::new(InMemoryCache::new()),
            remote: Arc::new(remote),
            auth: SessionAuth::new(),
            purchase: FixedPurchase::new(true),
        }
    }

    /// A device whose id is already known, so remote rows can be seeded.
    async fn with_id(device_id: &str) -> Self {
        let device = Self::new();
        device
            .keychain
            .set(DEVICE_ID_KEY, &json!(device_id))
            .await
            .unwrap();
        device
    }

    fn engine(&self) -> Arc<OnboardingEngine> {
        let identity = Arc::new(TieredDeviceIdentity::new(
            self.cache.clone(),
            self.keychain.clone(),
        ));
        let config = test_config();
        let sync = ProfileSyncEngine::new(
            self.cache.clone(),
            self.remote.clone(),
            identity,
            config.remote_debounce,
        );
        OnboardingEngine::new(config, sync, self.auth.clone(), self.purchase.clone())
    }

    /// Build an engine and wait for startup hydration to finish.
    async fn launch(&self) -> Arc<OnboardingEngine> {
        let engine = self.engine();
        let hydration = engine.start().await.unwrap();
        timeout(TEST_TIMEOUT, hydration)
            .await
            .expect("hydration timed out")
            .unwrap();
        engine
    }
}

fn seeded_row(device_id: &str, fields: &[(&str, Value)]) -> Record {
    let mut record = Record::new();
    record.insert("device_id".into(), json!(device_id));
    for (key, value) in fields {
        record.insert((*key).to_string(), value.clone());
    }
    record
}

async fn wait_for(
    engine: &OnboardingEngine,
    what: &str,
    pred: impl Fn(&EngineView) -> bool,
) -> EngineView {
    timeout(TEST_TIMEOUT, async {
        loop {
            let view = engine.view().await;
            if pred(&view) {
                return view;
            }
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"))
}

async fn wait_unlocked(engine: &OnboardingEngine) -> EngineView {
    wait_for(engine, "phase lock release", |v| !v.is_transitioning).await
}

fn worst_case_answers() -> Vec<QuizAnswer> {
    vec![
        QuizAnswer::Gender(Gender::Male),
        QuizAnswer::ViewingFrequency(ViewingFrequency::MoreThanDaily),
        QuizAnswer::FirstExposureAge(FirstExposureAge::TwelveOrUnder),
        QuizAnswer::Escalation(YesNo::Yes),
        QuizAnswer::ArousalDifficulty(Frequency::Frequently),
        QuizAnswer::EmotionalCoping(Frequency::Frequently),
        QuizAnswer::StressResponse(Frequency::Frequently),
        QuizAnswer::BoredomResponse(Frequency::Frequently),
        QuizAnswer::MoneySpent(YesNo::Yes),
    ]
}

/// Jump into the quiz and answer each categorical step in turn.
async fn answer_steps(engine: &Arc<OnboardingEngine>, answers: &[QuizAnswer]) {
    assert_eq!(
        engine.jump_to(OnboardingPhase::Quiz).await,
        Some(OnboardingPhase::Quiz)
    );
    wait_unlocked(engine).await;
    assert!(engine.continue_quiz().await, "intro continue");

    for answer in answers {
        assert!(engine.select_answer(*answer).await, "{answer:?}");
        let next = answer.step().next().unwrap();
        wait_for(engine, "auto-advance", |v| v.quiz_step == next).await;
    }
}

/// Answer every step and finalize the quiz.
async fn complete_quiz(engine: &Arc<OnboardingEngine>, answers: &[QuizAnswer]) {
    answer_steps(engine, answers).await;
    assert!(engine.set_about_you(Some(30), Some("Alex".into())).await);
    assert!(engine.continue_quiz().await, "final continue");
}

fn drain<T: Clone>(rx: &mut tokio::sync::broadcast::Receiver<T>) -> Vec<T> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

// ── Startup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn fresh_install_starts_at_welcome_and_creates_remote_records() {
    let device = Device::new();
    let engine = device.launch().await;

    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::Welcome);
    assert_eq!(view.progress, Some(0.0));
    assert!(!view.can_go_back);
    assert!(view.last_sync_error.is_none());

    let device_id = engine.sync().device_id().await;
    assert!(!device_id.is_empty());
    for table in ["profiles", "quiz_answers", "progress"] {
        let rows = device.remote.rows(table).await;
        assert_eq!(rows.len(), 1, "{table}");
        assert_eq!(rows[0]["device_id"], json!(device_id));
    }
}

#[tokio::test]
async fn hydration_does_not_upload_downloaded_values() {
    let device = Device::with_id("device-a").await;
    device
        .remote
        .insert_row(
            "profiles",
            seeded_row("device-a", &[(keys::BIO, json!("from the server"))]),
        )
        .await;
    device
        .remote
        .insert_row(
            "quiz_answers",
            seeded_row("device-a", &[(keys::GENDER, json!("female"))]),
        )
        .await;
    device
        .remote
        .insert_row(
            "progress",
            seeded_row("device-a", &[(keys::TIMES_RELAPSED, json!(3))]),
        )
        .await;

    let engine = device.launch().await;
    sleep(SETTLE).await;

    assert_eq!(device.remote.write_count().await, 0);
    let view = engine.view().await;
    assert_eq!(view.profile.profile.bio.as_deref(), Some("from the server"));
    assert_eq!(view.profile.answers.gender, Some(Gender::Female));
    assert_eq!(view.profile.progress.streak.times_relapsed, 3);
    assert_eq!(
        device.cache.get(keys::BIO).await.unwrap(),
        Some(json!("from the server"))
    );
}

#[tokio::test]
async fn remote_read_failure_falls_back_and_exposes_error() {
    let device = Device::new();
    device.remote.set_fail_reads(true);

    let engine = device.engine();
    let hydrated = engine.start().await.unwrap().await.unwrap();
    assert!(!hydrated);

    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::Welcome);
    assert!(view.last_sync_error.is_some());
    assert_eq!(
        engine.advance().await,
        Some(OnboardingPhase::OptionalAuth)
    );
}

#[tokio::test]
async fn edits_after_failed_startup_fetch_still_reach_the_remote() {
    let device = Device::new();
    device.remote.set_fail_reads(true);
    let engine = device.engine();
    assert!(!engine.start().await.unwrap().await.unwrap());
    assert!(device.remote.rows("profiles").await.is_empty());
    device.remote.set_fail_reads(false);

    let mut sync_events = engine.sync().subscribe();
    engine
        .update_profile(|p| p.bio = Some("offline edit".into()))
        .await;
    // No row exists yet, so the link cannot attach to anything.
    device.auth.sign_in("user-1");
    let outcome = timeout(TEST_TIMEOUT, async {
        loop {
            match sync_events.recv().await {
                Ok(SyncEvent::IdentityLinked(_)) => return true,
                Ok(SyncEvent::IdentityLinkFailed { .. }) => return false,
                _ => {}
            }
        }
    })
    .await
    .expect("link outcome");
    assert!(!outcome);
    assert!(engine.sync().snapshot().await.identity.linked_user_id.is_none());

    sleep(SETTLE).await;
    let device_id = engine.sync().device_id().await;
    let profiles = device.remote.rows("profiles").await;
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0]["device_id"], json!(device_id));
    assert_eq!(profiles[0][keys::BIO], json!("offline edit"));

    device.auth.sign_in("user-1");
    wait_for(&engine, "identity link", |v| {
        v.profile.identity.linked_user_id.as_deref() == Some("user-1")
    })
    .await;
    assert_eq!(device.remote.rows("profiles").await[0]["user_id"], json!("user-1"));
}

#[tokio::test]
async fn edit_during_slow_startup_fetch_is_stored_once() {
    let device = Device::with_remote(InMemoryRemoteStore::with_latency(
        Duration::from_millis(100),
    ));
    let engine = device.engine();
    let hydration = engine.start().await.unwrap();
    engine
        .update_profile(|p| p.bio = Some("typed early".into()))
        .await;
    assert!(timeout(TEST_TIMEOUT, hydration).await.unwrap().unwrap());
    sleep(Duration::from_millis(500)).await;

    let profiles = device.remote.rows("profiles").await;
    assert_eq!(profiles.len(), 1);
    assert_eq!(profiles[0][keys::BIO], json!("typed early"));
    assert_eq!(
        engine.view().await.profile.profile.bio.as_deref(),
        Some("typed early")
    );
}

#[tokio::test]
async fn completed_remote_profile_jumps_to_complete() {
    let device = Device::with_id("device-b").await;
    device
        .cache
        .set(local::ONBOARDING_PHASE, &json!("goals"))
        .await
        .unwrap();
    device
        .remote
        .insert_row(
            "progress",
            seeded_row("device-b", &[(keys::HAS_COMPLETED_ONBOARDING, json!(true))]),
        )
        .await;

    let engine = device.launch().await;

    assert_eq!(engine.view().await.phase, OnboardingPhase::Complete);
    assert_eq!(device.cache.get(local::ONBOARDING_PHASE).await.unwrap(), None);
}

#[tokio::test]
async fn unknown_persisted_phase_starts_over() {
    let device = Device::new();
    device
        .cache
        .set(local::ONBOARDING_PHASE, &json!("retired_screen"))
        .await
        .unwrap();
    device
        .cache
        .set(keys::CURRENT_MILESTONE, &json!("decade"))
        .await
        .unwrap();

    let engine = device.launch().await;
    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::Welcome);
    assert_eq!(
        view.profile.progress.streak.current_milestone,
        MilestoneTier::Beginning
    );
}

// ── Phase navigation ────────────────────────────────────────────────

#[tokio::test]
async fn navigation_is_ignored_while_locked() {
    let device = Device::new();
    let engine = device.launch().await;

    assert_eq!(engine.advance().await, Some(OnboardingPhase::OptionalAuth));
    assert_eq!(engine.advance().await, None);
    assert!(engine.view().await.is_transitioning);

    wait_unlocked(&engine).await;
    assert_eq!(engine.skip_optional_auth().await, Some(OnboardingPhase::Quiz));
    assert!(engine.view().await.skipped_early_auth);
}

#[tokio::test]
async fn go_back_follows_phase_rules() {
    let device = Device::new();
    let engine = device.launch().await;

    assert_eq!(engine.go_back().await, None);

    engine.jump_to(OnboardingPhase::Symptoms).await;
    let view = wait_unlocked(&engine).await;
    assert!(view.can_go_back);

    assert_eq!(engine.go_back().await, Some(OnboardingPhase::QuizResults));
    let view = wait_unlocked(&engine).await;
    assert!(!view.can_go_back);
    assert_eq!(engine.go_back().await, None);

    engine.jump_to(OnboardingPhase::Goals).await;
    wait_unlocked(&engine).await;
    assert_eq!(engine.advance().await, Some(OnboardingPhase::StreakStart));
    wait_unlocked(&engine).await;
    assert_eq!(engine.go_back().await, Some(OnboardingPhase::Goals));
}

#[tokio::test]
async fn relaunch_resumes_persisted_phase_and_quiz_step() {
    let device = Device::new();
    {
        let engine = device.launch().await;
        engine.jump_to(OnboardingPhase::Quiz).await;
        wait_unlocked(&engine).await;
        assert!(engine.continue_quiz().await);
        assert!(
            engine
                .select_answer(QuizAnswer::Gender(Gender::PreferNotToSay))
                .await
        );
        wait_for(&engine, "auto-advance", |v| {
            v.quiz_step == QuizStep::ViewingFrequency
        })
        .await;
        engine.flush().await;
    }

    let engine = device.launch().await;
    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::Quiz);
    assert_eq!(view.quiz_step, QuizStep::ViewingFrequency);
    assert_eq!(view.profile.answers.gender, Some(Gender::PreferNotToSay));
}

// ── Quiz ────────────────────────────────────────────────────────────

#[tokio::test]
async fn last_quiz_step_finalizes_once_and_jumps_once() {
    let device = Device::new();
    let engine = device.launch().await;
    let mut events = engine.subscribe();

    complete_quiz(&engine, &worst_case_answers()).await;
    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::QuizCalculating);
    assert!(view.quiz_finalized);
    assert_eq!(view.profile.score.map(|s| s.value()), Some(94.0));
    assert_eq!(
        view.profile.progress.projection.total_recovery_days,
        Some(121)
    );
    assert!(view.profile.progress.streak.streak_start_date.is_some());

    // A second continue must not finalize again.
    assert!(!engine.continue_quiz().await);

    let events = drain(&mut events);
    let finalized = events
        .iter()
        .filter(|e| matches!(e, EngineEvent::QuizFinalized { .. }))
        .count();
    let jumps = events
        .iter()
        .filter(|e| {
            matches!(
                e,
                EngineEvent::PhaseChanged {
                    to: OnboardingPhase::QuizCalculating,
                    ..
                }
            )
        })
        .count();
    assert_eq!(finalized, 1);
    assert_eq!(jumps, 1);

    engine.flush().await;
    let quiz_rows = device.remote.rows("quiz_answers").await;
    assert_eq!(quiz_rows[0][keys::DEPENDENCY_SCORE], json!(94.0));
    assert_eq!(quiz_rows[0][keys::MONEY_SPENT], json!("yes"));
}

#[tokio::test]
async fn changed_selection_supersedes_pending_auto_advance() {
    let device = Device::new();
    let engine = device.launch().await;
    engine.jump_to(OnboardingPhase::Quiz).await;
    wait_unlocked(&engine).await;
    assert!(engine.continue_quiz().await);
    device.remote.clear_calls().await;

    assert!(engine.select_answer(QuizAnswer::Gender(Gender::Male)).await);
    assert!(engine.select_answer(QuizAnswer::Gender(Gender::Female)).await);
    sleep(SETTLE).await;

    let view = engine.view().await;
    assert_eq!(view.quiz_step, QuizStep::ViewingFrequency);
    assert_eq!(view.profile.answers.gender, Some(Gender::Female));

    // Both selections collapse into one write per touched group.
    let quiz_writes = device.remote.updates_to("quiz_answers").await;
    assert_eq!(quiz_writes.len(), 1);
    assert_eq!(quiz_writes[0][keys::GENDER], json!("female"));
    assert_eq!(device.remote.updates_to("profiles").await.len(), 1);
}

#[tokio::test]
async fn quiz_back_cancels_pending_auto_advance() {
    let device = Device::new();
    let engine = device.launch().await;
    engine.jump_to(OnboardingPhase::Quiz).await;
    wait_unlocked(&engine).await;
    assert!(engine.continue_quiz().await);
    assert!(engine.select_answer(QuizAnswer::Gender(Gender::Male)).await);
    wait_for(&engine, "auto-advance", |v| {
        v.quiz_step == QuizStep::ViewingFrequency
    })
    .await;

    assert!(
        engine
            .select_answer(QuizAnswer::ViewingFrequency(ViewingFrequency::Daily))
            .await
    );
    assert_eq!(engine.quiz_back().await, Some(QuizStep::Gender));
    sleep(SETTLE).await;

    let view = engine.view().await;
    assert_eq!(view.quiz_step, QuizStep::Gender);
    assert!(!view.auto_advance_pending);
}

#[tokio::test]
async fn about_you_requires_age_before_continuing() {
    let device = Device::new();
    let engine = device.launch().await;
    answer_steps(&engine, &worst_case_answers()).await;

    let view = engine.view().await;
    assert_eq!(view.quiz_step, QuizStep::AboutYou);
    assert!(!view.can_continue_quiz);
    assert!(!engine.continue_quiz().await);

    assert!(engine.set_about_you(None, Some("Sam".into())).await);
    assert!(!engine.continue_quiz().await);
    assert_eq!(engine.view().await.phase, OnboardingPhase::Quiz);

    assert!(engine.set_about_you(Some(19), Some("Sam".into())).await);
    assert!(engine.continue_quiz().await);
    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::QuizCalculating);
    assert_eq!(view.profile.answers.age, Some(19));
    assert_eq!(view.profile.answers.display_name.as_deref(), Some("Sam"));
}

#[tokio::test]
async fn retake_replaces_score_on_refinalize() {
    let device = Device::new();
    let engine = device.launch().await;
    complete_quiz(&engine, &worst_case_answers()).await;
    wait_unlocked(&engine).await;

    engine.retake_quiz().await;
    let view = wait_unlocked(&engine).await;
    assert_eq!(view.phase, OnboardingPhase::Quiz);
    assert_eq!(view.quiz_step, QuizStep::Intro);
    assert!(view.profile.score.is_none());
    assert_eq!(
        view.profile.progress.projection.total_recovery_days,
        Some(121)
    );

    let best_case = vec![
        QuizAnswer::Gender(Gender::Female),
        QuizAnswer::ViewingFrequency(ViewingFrequency::LessThanWeekly),
        QuizAnswer::FirstExposureAge(FirstExposureAge::TwentyFiveOrOver),
        QuizAnswer::Escalation(YesNo::No),
        QuizAnswer::ArousalDifficulty(Frequency::RarelyOrNever),
        QuizAnswer::EmotionalCoping(Frequency::RarelyOrNever),
        QuizAnswer::StressResponse(Frequency::RarelyOrNever),
        QuizAnswer::BoredomResponse(Frequency::RarelyOrNever),
        QuizAnswer::MoneySpent(YesNo::No),
    ];
    engine.continue_quiz().await;
    for answer in &best_case {
        assert!(engine.select_answer(*answer).await);
        let next = answer.step().next().unwrap();
        wait_for(&engine, "auto-advance", |v| v.quiz_step == next).await;
    }
    engine.set_about_you(Some(30), None).await;
    assert!(engine.continue_quiz().await);

    let view = engine.view().await;
    assert_eq!(view.profile.score.map(|s| s.value()), Some(57.0));
    // ceil(90 * 57 / 70) = 74
    assert_eq!(
        view.profile.progress.projection.total_recovery_days,
        Some(74)
    );
}

// ── Streak ──────────────────────────────────────────────────────────

#[tokio::test]
async fn relapse_reset_keeps_recovery_horizon() {
    let device = Device::new();
    let engine = device.launch().await;
    complete_quiz(&engine, &worst_case_answers()).await;

    let now = Utc::now();
    engine.set_streak_start(now - ChronoDuration::days(10)).await;
    let view = engine.view().await;
    assert_eq!(view.days_since_relapse, 10);
    assert_eq!(
        view.profile.progress.streak.current_milestone,
        MilestoneTier::OneWeek
    );

    let outcome = engine.reset_timer(now).await;
    assert_eq!(outcome.previous_streak_days, 10);
    assert_eq!(outcome.best_streak, 10);
    assert_eq!(outcome.times_relapsed, 1);

    let view = engine.view().await;
    assert_eq!(view.days_since_relapse, 0);
    assert_eq!(
        view.profile.progress.streak.current_milestone,
        MilestoneTier::Beginning
    );
    assert_eq!(
        view.profile.progress.projection.total_recovery_days,
        Some(121)
    );
    let projected = view.profile.progress.projection.projected_recovery_date.unwrap();
    assert_eq!((projected.date_naive() - Utc::now().date_naive()).num_days(), 121);
}

#[tokio::test]
async fn refresh_streak_persists_only_on_change() {
    let device = Device::new();
    let engine = device.launch().await;
    let now = Utc::now();
    engine.set_streak_start(now).await;
    engine.flush().await;
    device.remote.clear_calls().await;

    assert!(!engine.refresh_streak(now).await);
    assert!(engine.refresh_streak(now + ChronoDuration::days(7)).await);
    engine.flush().await;

    let writes = device.remote.updates_to("progress").await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0][keys::CURRENT_MILESTONE], json!("one_week"));
}

// ── Paywall ─────────────────────────────────────────────────────────

#[tokio::test]
async fn declined_purchase_re_presents_paywall() {
    let device = Device::new();
    device.purchase.set(false).await;
    let engine = device.launch().await;

    engine.jump_to(OnboardingPhase::Paywall).await;
    let view = wait_unlocked(&engine).await;
    assert_eq!(view.paywall_stage, Some(PaywallStage::ShowingPaywall));
    assert!(!view.can_go_back);
    assert_eq!(engine.advance().await, None);

    assert_eq!(engine.purchase().await, Some(PaywallStage::ShowingPaywall));
    assert_eq!(engine.view().await.phase, OnboardingPhase::Paywall);

    device.purchase.set(true).await;
    assert_eq!(engine.purchase().await, Some(PaywallStage::Completing));

    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::Complete);
    assert!(view.profile.progress.is_subscribed);
    assert!(view.profile.progress.has_completed_onboarding);
    assert_eq!(device.cache.get(local::ONBOARDING_PHASE).await.unwrap(), None);

    engine.flush().await;
    drop(engine);
    let relaunched = device.launch().await;
    assert_eq!(relaunched.view().await.phase, OnboardingPhase::Complete);
}

#[tokio::test]
async fn skipped_sign_in_is_forced_after_purchase() {
    let device = Device::new();
    let engine = device.launch().await;

    engine.advance().await;
    wait_unlocked(&engine).await;
    assert_eq!(engine.skip_optional_auth().await, Some(OnboardingPhase::Quiz));
    wait_unlocked(&engine).await;
    engine.jump_to(OnboardingPhase::Paywall).await;
    wait_unlocked(&engine).await;

    assert_eq!(engine.purchase().await, Some(PaywallStage::ShowingForcedAuth));
    // No skipping the forced sign-in.
    assert_eq!(
        engine.complete_forced_auth().await,
        Some(PaywallStage::ShowingForcedAuth)
    );
    assert_eq!(engine.view().await.phase, OnboardingPhase::Paywall);

    device.auth.sign_in("user-1");
    wait_for(&engine, "completion after sign-in", |v| {
        v.phase == OnboardingPhase::Complete
    })
    .await;

    let profiles = device.remote.rows("profiles").await;
    assert_eq!(profiles[0]["user_id"], json!("user-1"));
    let state = engine.sync().snapshot().await;
    assert_eq!(state.identity.linked_user_id.as_deref(), Some("user-1"));
}

#[tokio::test]
async fn signing_in_later_satisfies_skipped_auth() {
    let device = Device::new();
    let engine = device.launch().await;

    engine.advance().await;
    wait_unlocked(&engine).await;
    engine.skip_optional_auth().await;
    wait_unlocked(&engine).await;

    device.auth.sign_in("user-2");
    wait_for(&engine, "authenticated", |v| v.is_authenticated).await;

    engine.jump_to(OnboardingPhase::Paywall).await;
    wait_unlocked(&engine).await;
    assert_eq!(engine.purchase().await, Some(PaywallStage::Completing));
    assert_eq!(engine.view().await.phase, OnboardingPhase::Complete);
}

// ── Identity and account ────────────────────────────────────────────

#[tokio::test]
async fn identity_link_failure_is_non_fatal() {
    let device = Device::new();
    let engine = device.launch().await;
    let mut sync_events = engine.sync().subscribe();
    device.remote.set_fail_writes(true);

    device.auth.sign_in("user-3");
    let failed = timeout(TEST_TIMEOUT, async {
        loop {
            if let Ok(SyncEvent::IdentityLinkFailed { user_id, .. }) = sync_events.recv().await {
                return user_id;
            }
        }
    })
    .await
    .expect("link failure event");
    assert_eq!(failed, "user-3");

    let state = engine.sync().snapshot().await;
    assert!(state.identity.linked_user_id.is_none());
    assert_eq!(engine.advance().await, Some(OnboardingPhase::OptionalAuth));
}

#[tokio::test]
async fn delete_account_restarts_onboarding_with_same_device() {
    let device = Device::new();
    let engine = device.launch().await;
    let device_id = engine.sync().device_id().await;
    complete_quiz(&engine, &worst_case_answers()).await;
    engine
        .update_profile(|p| p.bio = Some("about me".into()))
        .await;

    engine.delete_account().await.unwrap();
    sleep(SETTLE).await;

    let view = engine.view().await;
    assert_eq!(view.phase, OnboardingPhase::Welcome);
    assert_eq!(view.quiz_step, QuizStep::Intro);
    assert!(view.profile.score.is_none());
    assert!(view.profile.profile.bio.is_none());
    for table in ["profiles", "quiz_answers", "progress"] {
        assert!(device.remote.rows(table).await.is_empty(), "{table}");
    }
    assert_eq!(device.cache.get(local::QUIZ_STEP).await.unwrap(), None);

    drop(engine);
    let relaunched = device.launch().await;
    assert_eq!(relaunched.sync().device_id().await, device_id);
    assert_eq!(relaunched.view().await.phase, OnboardingPhase::Welcome);
}
