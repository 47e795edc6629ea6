//! Field names shared by the cache and the remote tables.

use crate::persisted::string_enum;

string_enum! {
    /// Unit of remote persistence. Each group maps to one table and has its
    /// own debounce timer.
    pub enum FieldGroup {
        Profile => "profile",
        Quiz => "quiz",
        Progress => "progress",
    }
}

impl FieldGroup {
    pub fn table(&self) -> &'static str {
        match self {
            Self::Profile => "profiles",
            Self::Quiz => "quiz_answers",
            Self::Progress => "progress",
        }
    }

    /// Field keys carried by this group, in cache and remote rows alike.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            Self::Profile => PROFILE_FIELDS,
            Self::Quiz => QUIZ_FIELDS,
            Self::Progress => PROGRESS_FIELDS,
        }
    }
}

/// Row column holding the anonymous device id.
pub const DEVICE_ID_COLUMN: &str = "device_id";
/// Row column holding the linked account id.
pub const USER_ID_COLUMN: &str = "user_id";

pub const DISPLAY_NAME: &str = "display_name";
pub const AGE: &str = "age";
pub const GENDER: &str = "gender";
pub const BIO: &str = "bio";
pub const SOCIAL_HANDLE: &str = "social_handle";
pub const PICTURE_URL: &str = "picture_url";
pub const IS_PUBLIC: &str = "is_public";

pub const VIEWING_FREQUENCY: &str = "viewing_frequency";
pub const FIRST_EXPOSURE_AGE: &str = "first_exposure_age";
pub const ESCALATION: &str = "escalation";
pub const AROUSAL_DIFFICULTY: &str = "arousal_difficulty";
pub const EMOTIONAL_COPING: &str = "emotional_coping";
pub const STRESS_RESPONSE: &str = "stress_response";
pub const BOREDOM_RESPONSE: &str = "boredom_response";
pub const MONEY_SPENT: &str = "money_spent";
pub const DEPENDENCY_SCORE: &str = "dependency_score";

pub const HAS_COMPLETED_ONBOARDING: &str = "has_completed_onboarding";
pub const STREAK_START_DATE: &str = "streak_start_date";
pub const BEST_STREAK: &str = "best_streak";
pub const TIMES_RELAPSED: &str = "times_relapsed";
pub const CURRENT_MILESTONE: &str = "current_milestone";
pub const TOTAL_RECOVERY_DAYS: &str = "total_recovery_days";
pub const PROJECTED_RECOVERY_DATE: &str = "projected_recovery_date";
pub const IS_SUBSCRIBED: &str = "is_subscribed";

const PROFILE_FIELDS: &[&str] = &[
    DISPLAY_NAME,
    AGE,
    GENDER,
    BIO,
    SOCIAL_HANDLE,
    PICTURE_URL,
    IS_PUBLIC,
];

const QUIZ_FIELDS: &[&str] = &[
    GENDER,
    VIEWING_FREQUENCY,
    FIRST_EXPOSURE_AGE,
    ESCALATION,
    AROUSAL_DIFFICULTY,
    EMOTIONAL_COPING,
    STRESS_RESPONSE,
    BOREDOM_RESPONSE,
    MONEY_SPENT,
    DEPENDENCY_SCORE,
];

const PROGRESS_FIELDS: &[&str] = &[
    HAS_COMPLETED_ONBOARDING,
    STREAK_START_DATE,
    BEST_STREAK,
    TIMES_RELAPSED,
    CURRENT_MILESTONE,
    TOTAL_RECOVERY_DAYS,
    PROJECTED_RECOVERY_DATE,
    IS_SUBSCRIBED,
];

/// Keys that live only in the local cache.
pub mod local {
    pub const ONBOARDING_PHASE: &str = "onboarding_phase";
    pub const QUIZ_STEP: &str = "quiz_step";
    pub const QUIZ_FINALIZED: &str = "quiz_finalized";
    pub const SKIPPED_EARLY_AUTH: &str = "skipped_early_auth";
    pub const LINKED_USER_ID: &str = "linked_user_id";
}
