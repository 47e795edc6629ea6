//! Streak tracking: milestone tiers, relapse resets, and recovery projection.

pub mod milestone;
pub mod tracker;

pub use milestone::{MILESTONES, MilestoneTier};
pub use tracker::{
    RecoveryProjection, ResetOutcome, StreakRecord, StreakTracker, total_recovery_days,
    whole_calendar_days,
};
