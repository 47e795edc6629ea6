//! Quiz answer domains and the answer set collected during the assessment.

use crate::persisted::string_enum;

use super::quiz::QuizStep;

string_enum! {
    /// Self-reported gender. Shown on the profile; carries no score weight.
    pub enum Gender {
        Male => "male",
        Female => "female",
        NonBinary => "non_binary",
        PreferNotToSay => "prefer_not_to_say",
    }
}

string_enum! {
    /// How often the user views content.
    pub enum ViewingFrequency {
        MoreThanDaily => "more_than_daily",
        Daily => "daily",
        FewTimesWeekly => "few_times_weekly",
        LessThanWeekly => "less_than_weekly",
    }
}

string_enum! {
    /// Age bracket at first exposure.
    pub enum FirstExposureAge {
        TwelveOrUnder => "12_or_under",
        ThirteenToSixteen => "13_to_16",
        SeventeenToTwentyFour => "17_to_24",
        TwentyFiveOrOver => "25_or_over",
    }
}

string_enum! {
    pub enum YesNo {
        Yes => "yes",
        No => "no",
    }
}

string_enum! {
    /// Frequency response used by the arousal, coping, stress and boredom questions.
    pub enum Frequency {
        Frequently => "frequently",
        Occasionally => "occasionally",
        RarelyOrNever => "rarely_or_never",
    }
}

/// A single categorical selection made on one quiz step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizAnswer {
    Gender(Gender),
    ViewingFrequency(ViewingFrequency),
    FirstExposureAge(FirstExposureAge),
    Escalation(YesNo),
    ArousalDifficulty(Frequency),
    EmotionalCoping(Frequency),
    StressResponse(Frequency),
    BoredomResponse(Frequency),
    MoneySpent(YesNo),
}

impl QuizAnswer {
    /// The step that asks for this answer.
    pub fn step(&self) -> QuizStep {
        match self {
            Self::Gender(_) => QuizStep::Gender,
            Self::ViewingFrequency(_) => QuizStep::ViewingFrequency,
            Self::FirstExposureAge(_) => QuizStep::FirstExposureAge,
            Self::Escalation(_) => QuizStep::Escalation,
            Self::ArousalDifficulty(_) => QuizStep::ArousalDifficulty,
            Self::EmotionalCoping(_) => QuizStep::EmotionalCoping,
            Self::StressResponse(_) => QuizStep::StressResponse,
            Self::BoredomResponse(_) => QuizStep::BoredomResponse,
            Self::MoneySpent(_) => QuizStep::MoneySpent,
        }
    }
}

/// Everything the assessment collects.
///
/// Built up one step at a time; frozen once the quiz is finalized until an
/// explicit retake clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuizAnswerSet {
    pub gender: Option<Gender>,
    pub viewing_frequency: Option<ViewingFrequency>,
    pub first_exposure_age: Option<FirstExposureAge>,
    pub escalation: Option<YesNo>,
    pub arousal_difficulty: Option<Frequency>,
    pub emotional_coping: Option<Frequency>,
    pub stress_response: Option<Frequency>,
    pub boredom_response: Option<Frequency>,
    pub money_spent: Option<YesNo>,
    pub age: Option<u32>,
    pub display_name: Option<String>,
}

impl QuizAnswerSet {
    /// Store a categorical answer, replacing any previous value for its step.
    pub fn record(&mut self, answer: QuizAnswer) {
        match answer {
            QuizAnswer::Gender(v) => self.gender = Some(v),
            QuizAnswer::ViewingFrequency(v) => self.viewing_frequency = Some(v),
            QuizAnswer::FirstExposureAge(v) => self.first_exposure_age = Some(v),
            QuizAnswer::Escalation(v) => self.escalation = Some(v),
            QuizAnswer::ArousalDifficulty(v) => self.arousal_difficulty = Some(v),
            QuizAnswer::EmotionalCoping(v) => self.emotional_coping = Some(v),
            QuizAnswer::StressResponse(v) => self.stress_response = Some(v),
            QuizAnswer::BoredomResponse(v) => self.boredom_response = Some(v),
            QuizAnswer::MoneySpent(v) => self.money_spent = Some(v),
        }
    }

    /// Set the free-form pair. Blank names are stored as `None`.
    pub fn set_about_you(&mut self, age: Option<u32>, display_name: Option<String>) {
        self.age = age;
        self.display_name = display_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
    }

    /// Number of categorical answers given so far.
    pub fn answered_count(&self) -> usize {
        [
            self.gender.is_some(),
            self.viewing_frequency.is_some(),
            self.first_exposure_age.is_some(),
            self.escalation.is_some(),
            self.arousal_difficulty.is_some(),
            self.emotional_coping.is_some(),
            self.stress_response.is_some(),
            self.boredom_response.is_some(),
            self.money_spent.is_some(),
        ]
        .iter()
        .filter(|answered| **answered)
        .count()
    }
}
