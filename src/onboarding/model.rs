//! Profile and progress records kept for the user.

use serde::{Deserialize, Serialize};

use crate::streak::{RecoveryProjection, StreakRecord};

/// Public-facing profile fields beyond what the quiz collects.
///
/// Display name, age and gender come from the quiz answers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub social_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    /// Whether the profile is visible to other users.
    #[serde(default)]
    pub is_public: bool,
}

/// Onboarding completion, streak and subscription state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressRecord {
    pub has_completed_onboarding: bool,
    pub streak: StreakRecord,
    pub projection: RecoveryProjection,
    pub is_subscribed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_profile_is_private_and_empty() {
        let p = UserProfile::default();
        assert!(p.bio.is_none());
        assert!(p.social_handle.is_none());
        assert!(p.picture_url.is_none());
        assert!(!p.is_public);
    }

    #[test]
    fn profile_serde_skips_missing_fields() {
        let profile = UserProfile {
            bio: Some("Day by day".to_string()),
            is_public: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["bio"], "Day by day");
        assert!(json.get("social_handle").is_none());

        let parsed: UserProfile = serde_json::from_str(r#"{"is_public": true}"#).unwrap();
        assert!(parsed.is_public);
        assert!(parsed.bio.is_none());
    }

    #[test]
    fn default_progress_is_fresh() {
        let progress = ProgressRecord::default();
        assert!(!progress.has_completed_onboarding);
        assert_eq!(progress.streak.times_relapsed, 0);
        assert!(progress.projection.total_recovery_days.is_none());
    }
}
