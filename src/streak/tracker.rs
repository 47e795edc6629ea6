//! Streak bookkeeping and recovery projection.
//!
//! Everything here is pure: callers pass `now` explicitly.

use chrono::{DateTime, Duration, Utc};

use crate::assessment::DependencyScore;

use super::milestone::MilestoneTier;

/// Days of recovery assigned to a score of 70.
const RECOVERY_DAYS_PER_70_POINTS: f64 = 90.0;

/// The current streak and its history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreakRecord {
    pub streak_start_date: Option<DateTime<Utc>>,
    /// Longest streak in days. Never decreases.
    pub best_streak: u32,
    /// Number of recorded relapses. Never decreases.
    pub times_relapsed: u32,
    pub current_milestone: MilestoneTier,
}

/// Recovery horizon derived from the dependency score.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryProjection {
    /// Fixed when the quiz is finalized; not recomputed afterwards.
    pub total_recovery_days: Option<u32>,
    pub projected_recovery_date: Option<DateTime<Utc>>,
}

/// What a relapse reset changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResetOutcome {
    pub previous_streak_days: u32,
    pub best_streak: u32,
    pub times_relapsed: u32,
}

/// Whole calendar days from `start` to `now` (UTC dates), zero if `start` is later.
pub fn whole_calendar_days(start: DateTime<Utc>, now: DateTime<Utc>) -> u32 {
    let days = (now.date_naive() - start.date_naive()).num_days();
    u32::try_from(days.max(0)).unwrap_or(u32::MAX)
}

/// `ceil(90 × score / 70)`.
pub fn total_recovery_days(score: DependencyScore) -> u32 {
    (RECOVERY_DAYS_PER_70_POINTS * score.value() / 70.0).ceil() as u32
}

pub struct StreakTracker;

impl StreakTracker {
    pub fn days_since_relapse(record: &StreakRecord, now: DateTime<Utc>) -> u32 {
        record
            .streak_start_date
            .map(|start| whole_calendar_days(start, now))
            .unwrap_or(0)
    }

    /// `now + max(total − days_since_relapse, 0)` days.
    pub fn projected_recovery_date(
        total_recovery_days: u32,
        days_since_relapse: u32,
        now: DateTime<Utc>,
    ) -> DateTime<Utc> {
        let remaining = total_recovery_days.saturating_sub(days_since_relapse);
        now + Duration::days(i64::from(remaining))
    }

    /// Fix the recovery horizon at quiz completion.
    ///
    /// Starts the streak at `now` if none was set yet.
    pub fn finalize(
        record: &mut StreakRecord,
        projection: &mut RecoveryProjection,
        score: DependencyScore,
        now: DateTime<Utc>,
    ) {
        if record.streak_start_date.is_none() {
            record.streak_start_date = Some(now);
        }
        projection.total_recovery_days = Some(total_recovery_days(score));
        Self::refresh(record, projection, now);
    }

    /// Move the streak start without counting a relapse (e.g. the user
    /// reports when their current streak began).
    pub fn set_streak_start(
        record: &mut StreakRecord,
        projection: &mut RecoveryProjection,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) {
        record.streak_start_date = Some(start);
        Self::refresh(record, projection, now);
    }

    /// Record a relapse on `relapse_date`.
    ///
    /// The existing `total_recovery_days` is kept; only the projected date moves.
    pub fn reset_timer(
        record: &mut StreakRecord,
        projection: &mut RecoveryProjection,
        relapse_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> ResetOutcome {
        let previous_streak_days = Self::days_since_relapse(record, now);
        record.best_streak = record.best_streak.max(previous_streak_days);
        record.streak_start_date = Some(relapse_date);
        record.times_relapsed = record.times_relapsed.saturating_add(1);
        Self::refresh(record, projection, now);

        ResetOutcome {
            previous_streak_days,
            best_streak: record.best_streak,
            times_relapsed: record.times_relapsed,
        }
    }

    /// Recompute the milestone tier and projected date for `now`.
    ///
    /// Returns whether anything changed.
    pub fn refresh(
        record: &mut StreakRecord,
        projection: &mut RecoveryProjection,
        now: DateTime<Utc>,
    ) -> bool {
        let days = Self::days_since_relapse(record, now);
        let tier = MilestoneTier::for_days(days);
        let projected = projection
            .total_recovery_days
            .map(|total| Self::projected_recovery_date(total, days, now));

        let changed = tier != record.current_milestone
            || projected.map(|d| d.date_naive())
                != projection.projected_recovery_date.map(|d| d.date_naive());
        record.current_milestone = tier;
        projection.projected_recovery_date = projected;
        changed
    }
}
