//! Outcome-based education attainment math.
//!
//! Everything here is a pure function over already-fetched numbers. A zero
//! denominator yields `0.0` rather than an error or `NaN`.

pub mod rollup;

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DomainError;

pub use rollup::{
    AttainmentReport, AttainmentTargets, CloPloLink, OutcomeAttainment, OutcomeScores,
    PloPeoLink, RollupInput,
};

/// How strongly a lower-level outcome contributes to a higher-level one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrength {
    Low,
    #[default]
    Medium,
    High,
}

impl MappingStrength {
    pub fn value(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }
}

impl FromStr for MappingStrength {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "1" | "low" => Ok(Self::Low),
            "2" | "medium" => Ok(Self::Medium),
            "3" | "high" => Ok(Self::High),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown mapping strength `{other}` (expected low|medium|high or 1..=3)"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedContribution {
    pub attainment_pct: f64,
    pub strength: MappingStrength,
    pub weight: f64,
}

/// `passing / total * 100`.
pub fn pass_rate(passing: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    passing as f64 / total as f64 * 100.0
}

/// Share of `scores_pct` at or above `threshold_pct`, as a percentage.
pub fn attainment_percentage(scores_pct: &[f64], threshold_pct: f64) -> f64 {
    let passing = scores_pct.iter().filter(|score| **score >= threshold_pct).count();
    pass_rate(passing, scores_pct.len())
}

/// Marks obtained as a percentage of the maximum.
pub fn score_percentage(obtained: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return 0.0;
    }
    obtained / max * 100.0
}

/// Question-level attainment: mean marks obtained over the question's marks.
pub fn question_attainment(marks_obtained: &[f64], question_marks: f64) -> f64 {
    if marks_obtained.is_empty() {
        return 0.0;
    }
    let average = marks_obtained.iter().sum::<f64>() / marks_obtained.len() as f64;
    score_percentage(average, question_marks)
}

/// `sum(attainment * strength * weight) / sum(strength * weight)`.
pub fn weighted_attainment(contributions: &[WeightedContribution]) -> f64 {
    let (numerator, denominator) =
        contributions.iter().fold((0.0_f64, 0.0_f64), |(numerator, denominator), item| {
            let factor = f64::from(item.strength.value()) * item.weight;
            (numerator + item.attainment_pct * factor, denominator + factor)
        });

    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

pub fn meets_target(attainment_pct: f64, target_pct: f64) -> bool {
    attainment_pct >= target_pct
}
