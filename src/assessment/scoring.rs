//! Dependency score: a capped weighted sum over the quiz answers.

use super::answers::{FirstExposureAge, Frequency, QuizAnswerSet, ViewingFrequency, YesNo};

/// Score assigned before any answer weight is added.
pub const BASE_SCORE: f64 = 55.0;
/// Upper bound of the score.
pub const MAX_SCORE: f64 = 94.0;

/// Assessed severity, always within `BASE_SCORE..=MAX_SCORE`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct DependencyScore(f64);

impl DependencyScore {
    /// Clamp `raw` into the valid range. Non-finite input maps to the base score.
    pub fn new(raw: f64) -> Self {
        if !raw.is_finite() {
            return Self(BASE_SCORE);
        }
        Self(raw.clamp(BASE_SCORE, MAX_SCORE))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl std::fmt::Display for DependencyScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.0}", self.0)
    }
}

impl ViewingFrequency {
    pub fn weight(&self) -> u32 {
        match self {
            Self::MoreThanDaily => 8,
            Self::Daily => 6,
            Self::FewTimesWeekly => 4,
            Self::LessThanWeekly => 2,
        }
    }
}

impl FirstExposureAge {
    pub fn weight(&self) -> u32 {
        match self {
            Self::TwelveOrUnder => 6,
            Self::ThirteenToSixteen => 4,
            Self::SeventeenToTwentyFour => 2,
            Self::TwentyFiveOrOver => 0,
        }
    }
}

/// Per-question weights for the frequency-style answers.
#[derive(Debug, Clone, Copy)]
struct FrequencyWeights {
    frequently: u32,
    occasionally: u32,
}

impl FrequencyWeights {
    fn of(&self, answer: Frequency) -> u32 {
        match answer {
            Frequency::Frequently => self.frequently,
            Frequency::Occasionally => self.occasionally,
            Frequency::RarelyOrNever => 0,
        }
    }
}

const AROUSAL: FrequencyWeights = FrequencyWeights { frequently: 5, occasionally: 3 };
const EMOTIONAL_COPING: FrequencyWeights = FrequencyWeights { frequently: 4, occasionally: 2 };
const STRESS: FrequencyWeights = FrequencyWeights { frequently: 4, occasionally: 2 };
const BOREDOM: FrequencyWeights = FrequencyWeights { frequently: 3, occasionally: 2 };

const ESCALATION_WEIGHT: u32 = 5;
const MONEY_SPENT_WEIGHT: u32 = 4;

fn yes_weight(answer: YesNo, weight: u32) -> u32 {
    match answer {
        YesNo::Yes => weight,
        YesNo::No => 0,
    }
}

/// Pure scoring over a [`QuizAnswerSet`]. Missing answers contribute nothing.
pub struct ScoringEngine;

impl ScoringEngine {
    /// Sum of all answer weights, before the base score and cap.
    pub fn weight_sum(answers: &QuizAnswerSet) -> u32 {
        let weights = [
            answers.viewing_frequency.map(|a| a.weight()),
            answers.escalation.map(|a| yes_weight(a, ESCALATION_WEIGHT)),
            answers.first_exposure_age.map(|a| a.weight()),
            answers.arousal_difficulty.map(|a| AROUSAL.of(a)),
            answers.emotional_coping.map(|a| EMOTIONAL_COPING.of(a)),
            answers.stress_response.map(|a| STRESS.of(a)),
            answers.boredom_response.map(|a| BOREDOM.of(a)),
            answers.money_spent.map(|a| yes_weight(a, MONEY_SPENT_WEIGHT)),
        ];
        weights.iter().flatten().sum()
    }

    pub fn score(answers: &QuizAnswerSet) -> DependencyScore {
        DependencyScore::new(BASE_SCORE + f64::from(Self::weight_sum(answers)))
    }
}
