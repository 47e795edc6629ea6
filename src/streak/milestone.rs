//! Milestone tiers keyed by days since the last relapse.

use crate::persisted::string_enum;

string_enum! {
    pub enum MilestoneTier {
        Beginning => "beginning",
        OneWeek => "one_week",
        TwoWeeks => "two_weeks",
        OneMonth => "one_month",
        TwoMonths => "two_months",
        ThreeMonths => "three_months",
        SixMonths => "six_months",
        OneYear => "one_year",
    }
}

/// Threshold table in ascending days-required order.
pub const MILESTONES: [(u32, MilestoneTier); 8] = [
    (0, MilestoneTier::Beginning),
    (7, MilestoneTier::OneWeek),
    (14, MilestoneTier::TwoWeeks),
    (30, MilestoneTier::OneMonth),
    (60, MilestoneTier::TwoMonths),
    (90, MilestoneTier::ThreeMonths),
    (180, MilestoneTier::SixMonths),
    (365, MilestoneTier::OneYear),
];

impl Default for MilestoneTier {
    fn default() -> Self {
        Self::Beginning
    }
}

impl MilestoneTier {
    /// The tier with the greatest threshold not exceeding `days`.
    pub fn for_days(days: u32) -> Self {
        MILESTONES
            .iter()
            .rev()
            .find(|(required, _)| *required <= days)
            .map(|(_, tier)| *tier)
            .unwrap_or_default()
    }

    pub fn days_required(&self) -> u32 {
        MILESTONES
            .iter()
            .find(|(_, tier)| tier == self)
            .map(|(days, _)| *days)
            .unwrap_or(0)
    }

    pub fn next(&self) -> Option<Self> {
        let idx = MILESTONES.iter().position(|(_, tier)| tier == self)?;
        MILESTONES.get(idx + 1).map(|(_, tier)| *tier)
    }

    /// Days remaining until the next tier, or `None` at the top tier.
    pub fn days_until_next(days: u32) -> Option<u32> {
        let next = Self::for_days(days).next()?;
        Some(next.days_required() - days)
    }

    /// Human-readable title.
    pub fn title(&self) -> &'static str {
        match self {
            Self::Beginning => "New Beginning",
            Self::OneWeek => "One Week Strong",
            Self::TwoWeeks => "Two Weeks",
            Self::OneMonth => "One Month",
            Self::TwoMonths => "Two Months",
            Self::ThreeMonths => "Rewired",
            Self::SixMonths => "Half a Year",
            Self::OneYear => "One Year Free",
        }
    }
}
