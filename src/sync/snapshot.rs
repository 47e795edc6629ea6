//! In-memory profile state and its flat record form.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::assessment::{DependencyScore, QuizAnswerSet};
use crate::onboarding::{ProgressRecord, UserProfile};
use crate::persisted::{Parsed, parse_optional, parse_or};
use crate::store::Record;
use crate::streak::MilestoneTier;

use super::keys::{self, FieldGroup};

/// Anonymous device identity plus the account it was linked to, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileIdentity {
    pub device_id: String,
    pub linked_user_id: Option<String>,
}

/// Everything the sync engine mirrors to the cache and the remote store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileState {
    pub profile: UserProfile,
    pub answers: QuizAnswerSet,
    pub score: Option<DependencyScore>,
    pub progress: ProgressRecord,
    pub identity: ProfileIdentity,
}

fn opt<T: Into<Value>>(v: Option<T>) -> Value {
    v.map(Into::into).unwrap_or(Value::Null)
}

fn opt_str<T: ToString>(v: Option<T>) -> Value {
    opt(v.map(|v| v.to_string()))
}

fn date(v: Option<DateTime<Utc>>) -> Value {
    opt(v.map(|d| d.to_rfc3339()))
}

impl ProfileState {
    /// The group's fields as a flat record (no id columns).
    pub fn group_record(&self, group: FieldGroup) -> Record {
        let mut r = Record::new();
        match group {
            FieldGroup::Profile => {
                let p = &self.profile;
                r.insert(keys::DISPLAY_NAME.into(), opt(self.answers.display_name.clone()));
                r.insert(keys::AGE.into(), opt(self.answers.age));
                r.insert(keys::GENDER.into(), opt_str(self.answers.gender));
                r.insert(keys::BIO.into(), opt(p.bio.clone()));
                r.insert(keys::SOCIAL_HANDLE.into(), opt(p.social_handle.clone()));
                r.insert(keys::PICTURE_URL.into(), opt(p.picture_url.clone()));
                r.insert(keys::IS_PUBLIC.into(), Value::Bool(p.is_public));
            }
            FieldGroup::Quiz => {
                let a = &self.answers;
                r.insert(keys::GENDER.into(), opt_str(a.gender));
                r.insert(keys::VIEWING_FREQUENCY.into(), opt_str(a.viewing_frequency));
                r.insert(keys::FIRST_EXPOSURE_AGE.into(), opt_str(a.first_exposure_age));
                r.insert(keys::ESCALATION.into(), opt_str(a.escalation));
                r.insert(keys::AROUSAL_DIFFICULTY.into(), opt_str(a.arousal_difficulty));
                r.insert(keys::EMOTIONAL_COPING.into(), opt_str(a.emotional_coping));
                r.insert(keys::STRESS_RESPONSE.into(), opt_str(a.stress_response));
                r.insert(keys::BOREDOM_RESPONSE.into(), opt_str(a.boredom_response));
                r.insert(keys::MONEY_SPENT.into(), opt_str(a.money_spent));
                r.insert(keys::DEPENDENCY_SCORE.into(), opt(self.score.map(|s| s.value())));
            }
            FieldGroup::Progress => {
                let p = &self.progress;
                r.insert(
                    keys::HAS_COMPLETED_ONBOARDING.into(),
                    Value::Bool(p.has_completed_onboarding),
                );
                r.insert(keys::STREAK_START_DATE.into(), date(p.streak.streak_start_date));
                r.insert(keys::BEST_STREAK.into(), Value::from(p.streak.best_streak));
                r.insert(keys::TIMES_RELAPSED.into(), Value::from(p.streak.times_relapsed));
                r.insert(
                    keys::CURRENT_MILESTONE.into(),
                    Value::from(p.streak.current_milestone.as_str()),
                );
                r.insert(
                    keys::TOTAL_RECOVERY_DAYS.into(),
                    opt(p.projection.total_recovery_days),
                );
                r.insert(
                    keys::PROJECTED_RECOVERY_DATE.into(),
                    date(p.projection.projected_recovery_date),
                );
                r.insert(keys::IS_SUBSCRIBED.into(), Value::Bool(p.is_subscribed));
            }
        }
        r
    }

    /// All three groups merged into one flat record, as the cache stores it.
    pub fn cache_record(&self) -> Record {
        let mut r = Record::new();
        for group in FieldGroup::ALL {
            r.extend(self.group_record(*group));
        }
        r
    }

    /// Assign the group's fields present in `record`.
    ///
    /// Absent keys leave the field untouched. Malformed values fall back to
    /// the field's default; their keys are returned.
    pub fn apply_record(&mut self, group: FieldGroup, record: &Record) -> Vec<&'static str> {
        let mut r = Reader::new(record);
        match group {
            FieldGroup::Profile => {
                let a = &mut self.answers;
                let p = &mut self.profile;
                if let Some(v) = r.string(keys::DISPLAY_NAME) {
                    a.display_name = v;
                }
                if let Some(v) = r.uint(keys::AGE) {
                    a.age = v;
                }
                if let Some(v) = r.choice(keys::GENDER) {
                    a.gender = v;
                }
                if let Some(v) = r.string(keys::BIO) {
                    p.bio = v;
                }
                if let Some(v) = r.string(keys::SOCIAL_HANDLE) {
                    p.social_handle = v;
                }
                if let Some(v) = r.string(keys::PICTURE_URL) {
                    p.picture_url = v;
                }
                if let Some(v) = r.flag(keys::IS_PUBLIC) {
                    p.is_public = v;
                }
            }
            FieldGroup::Quiz => {
                let a = &mut self.answers;
                if let Some(v) = r.choice(keys::GENDER) {
                    a.gender = v;
                }
                if let Some(v) = r.choice(keys::VIEWING_FREQUENCY) {
                    a.viewing_frequency = v;
                }
                if let Some(v) = r.choice(keys::FIRST_EXPOSURE_AGE) {
                    a.first_exposure_age = v;
                }
                if let Some(v) = r.choice(keys::ESCALATION) {
                    a.escalation = v;
                }
                if let Some(v) = r.choice(keys::AROUSAL_DIFFICULTY) {
                    a.arousal_difficulty = v;
                }
                if let Some(v) = r.choice(keys::EMOTIONAL_COPING) {
                    a.emotional_coping = v;
                }
                if let Some(v) = r.choice(keys::STRESS_RESPONSE) {
                    a.stress_response = v;
                }
                if let Some(v) = r.choice(keys::BOREDOM_RESPONSE) {
                    a.boredom_response = v;
                }
                if let Some(v) = r.choice(keys::MONEY_SPENT) {
                    a.money_spent = v;
                }
                if let Some(v) = r.number(keys::DEPENDENCY_SCORE) {
                    self.score = v.map(DependencyScore::new);
                }
            }
            FieldGroup::Progress => {
                let p = &mut self.progress;
                if let Some(v) = r.flag(keys::HAS_COMPLETED_ONBOARDING) {
                    p.has_completed_onboarding = v;
                }
                if let Some(v) = r.date(keys::STREAK_START_DATE) {
                    p.streak.streak_start_date = v;
                }
                if let Some(v) = r.uint(keys::BEST_STREAK) {
                    p.streak.best_streak = v.unwrap_or(0);
                }
                if let Some(v) = r.uint(keys::TIMES_RELAPSED) {
                    p.streak.times_relapsed = v.unwrap_or(0);
                }
                if let Some(v) = r.choice::<MilestoneTier>(keys::CURRENT_MILESTONE) {
                    p.streak.current_milestone = v.unwrap_or_default();
                }
                if let Some(v) = r.uint(keys::TOTAL_RECOVERY_DAYS) {
                    p.projection.total_recovery_days = v;
                }
                if let Some(v) = r.date(keys::PROJECTED_RECOVERY_DATE) {
                    p.projection.projected_recovery_date = v;
                }
                if let Some(v) = r.flag(keys::IS_SUBSCRIBED) {
                    p.is_subscribed = v;
                }
            }
        }
        r.fallbacks
    }
}

/// Typed access to a record. Every accessor returns `None` when the key is
/// absent, and `Some(None)` (or `Some(false)`) for null or malformed values.
struct Reader<'a> {
    record: &'a Record,
    fallbacks: Vec<&'static str>,
}

impl<'a> Reader<'a> {
    fn new(record: &'a Record) -> Self {
        Self {
            record,
            fallbacks: Vec::new(),
        }
    }

    fn raw(&self, key: &'static str) -> Option<&'a Value> {
        self.record.get(key)
    }

    fn settle<T>(&mut self, key: &'static str, parsed: Parsed<T>) -> T {
        if parsed.is_fallback() {
            self.fallbacks.push(key);
        }
        parsed.into_inner()
    }

    fn typed<T>(
        &mut self,
        key: &'static str,
        f: impl FnOnce(&Value) -> Option<T>,
    ) -> Option<Option<T>> {
        let value = self.raw(key)?;
        if value.is_null() {
            return Some(None);
        }
        let parsed = match f(value) {
            Some(v) => Parsed::Exact(Some(v)),
            None => Parsed::Fallback(None),
        };
        Some(self.settle(key, parsed))
    }

    fn choice<T: FromStr>(&mut self, key: &'static str) -> Option<Option<T>> {
        let value = self.raw(key)?;
        let parsed = match value {
            Value::Null => Parsed::Exact(None),
            Value::String(s) => parse_optional(Some(s.as_str())),
            _ => Parsed::Fallback(None),
        };
        Some(self.settle(key, parsed))
    }

    fn string(&mut self, key: &'static str) -> Option<Option<String>> {
        self.typed(key, |v| v.as_str().map(str::to_string))
    }

    fn uint(&mut self, key: &'static str) -> Option<Option<u32>> {
        self.typed(key, |v| v.as_u64().and_then(|n| u32::try_from(n).ok()))
    }

    fn number(&mut self, key: &'static str) -> Option<Option<f64>> {
        self.typed(key, Value::as_f64)
    }

    fn date(&mut self, key: &'static str) -> Option<Option<DateTime<Utc>>> {
        self.typed(key, |v| {
            v.as_str()
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|d| d.with_timezone(&Utc))
        })
    }

    fn flag(&mut self, key: &'static str) -> Option<bool> {
        let value = self.raw(key)?;
        let parsed = match value {
            Value::Bool(b) => Parsed::Exact(*b),
            Value::Null => Parsed::Exact(false),
            other => parse_or(other.as_str(), false),
        };
        Some(self.settle(key, parsed))
    }
}
