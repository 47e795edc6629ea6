//! Assessment quiz: answer domains, scoring, and step sequencing.

pub mod answers;
pub mod quiz;
pub mod scoring;

pub use answers::{
    FirstExposureAge, Frequency, Gender, QuizAnswer, QuizAnswerSet, ViewingFrequency, YesNo,
};
pub use quiz::{AdvanceMode, QuizAdvance, QuizFlowController, QuizStep, Selection};
pub use scoring::{DependencyScore, ScoringEngine};
