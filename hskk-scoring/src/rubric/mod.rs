//! Acoustic rubric scorer
//!
//! Deterministic threshold rubrics over a validated `AcousticFeatureSet`:
//! - **pronunciation:** per-metric tier tables (HNR, jitter, shimmer) combined by a
//!   configurable `PronunciationPolicy`
//! - **fluency:** ordered boolean issue detectors, scored by issue count
//!
//! Rules are plain data evaluated in a fixed order, so the set of triggered labels
//! and every tie-break is reproducible. The scorer holds no state beyond its policy:
//! identical inputs always give identical `CriterionScore`s.

pub mod fluency;
pub mod pronunciation;

use crate::criteria::{Criterion, CriterionKind};
use crate::types::{AcousticFeatureSet, CriterionScore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Rule types
// ============================================================================

/// Quality tier of one acoustic metric
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Excellent => "excellent",
            Tier::Good => "good",
            Tier::Acceptable => "acceptable",
            Tier::Poor => "poor",
        }
    }
}

/// Which way a metric improves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    HigherIsBetter,
    LowerIsBetter,
}

/// One row of a threshold table: reaching `limit` earns `tier`
#[derive(Debug, Clone, Copy)]
pub struct TierRow {
    pub tier: Tier,
    pub limit: f64,
    pub deduction: f64,
}

/// Ordered threshold table for one metric; the first matching row wins and
/// `floor` applies when no row matches
#[derive(Debug, Clone, Copy)]
pub struct ThresholdTable {
    pub metric: &'static str,
    pub direction: Direction,
    pub rows: &'static [TierRow],
    pub floor_deduction: f64,
    /// Issue label raised when the tier is Acceptable or worse
    pub issue_label: &'static str,
}

/// Tier assigned to a measured value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierOutcome {
    pub metric: &'static str,
    pub value: f64,
    pub tier: Tier,
    pub deduction: f64,
}

impl ThresholdTable {
    pub fn classify(&self, value: f64) -> TierOutcome {
        let reached = |row: &&TierRow| match self.direction {
            Direction::HigherIsBetter => value >= row.limit,
            Direction::LowerIsBetter => value <= row.limit,
        };
        let (tier, deduction) = self
            .rows
            .iter()
            .find(reached)
            .map(|row| (row.tier, row.deduction))
            .unwrap_or((Tier::Poor, self.floor_deduction));
        TierOutcome {
            metric: self.metric,
            value,
            tier,
            deduction,
        }
    }
}

/// Boolean issue detector; `transcript` is the canonical transcript if any
#[derive(Clone, Copy)]
pub struct IssueRule {
    pub label: &'static str,
    pub predicate: fn(&AcousticFeatureSet, Option<&str>) -> bool,
}

impl fmt::Debug for IssueRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueRule").field("label", &self.label).finish()
    }
}

/// Evaluate rules in order, returning the labels that fired
pub fn triggered_labels(
    rules: &[IssueRule],
    features: &AcousticFeatureSet,
    transcript: Option<&str>,
) -> Vec<&'static str> {
    rules
        .iter()
        .filter(|rule| (rule.predicate)(features, transcript))
        .map(|rule| rule.label)
        .collect()
}

// ============================================================================
// Policy
// ============================================================================

/// How simultaneous pronunciation breaches combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PronunciationPolicy {
    /// Largest single deduction applies (weakest link)
    #[default]
    WorstTier,
    /// Deductions add up, capped at the full score
    Cumulative,
}

impl PronunciationPolicy {
    /// Combined deduction fraction, always within `[0, 1]`
    pub fn combine(&self, outcomes: &[TierOutcome]) -> f64 {
        let deduction = match self {
            PronunciationPolicy::WorstTier => outcomes
                .iter()
                .map(|o| o.deduction)
                .fold(0.0, f64::max),
            PronunciationPolicy::Cumulative => outcomes.iter().map(|o| o.deduction).sum(),
        };
        deduction.clamp(0.0, 1.0)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PronunciationPolicy::WorstTier => "worst_tier",
            PronunciationPolicy::Cumulative => "cumulative",
        }
    }
}

impl FromStr for PronunciationPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "worst_tier" | "worst-tier" => Ok(PronunciationPolicy::WorstTier),
            "cumulative" => Ok(PronunciationPolicy::Cumulative),
            other => Err(format!("Unknown pronunciation policy: {}", other)),
        }
    }
}

// ============================================================================
// Scorer
// ============================================================================

/// Scores the acoustic criteria of a task
#[derive(Debug, Clone, Copy, Default)]
pub struct RubricScorer {
    policy: PronunciationPolicy,
}

impl RubricScorer {
    pub fn new(policy: PronunciationPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> PronunciationPolicy {
        self.policy
    }

    /// Score one acoustic criterion; `None` for criteria this scorer does not own
    pub fn score(
        &self,
        criterion: &Criterion,
        features: &AcousticFeatureSet,
        transcript: Option<&str>,
    ) -> Option<CriterionScore> {
        match criterion.id {
            CriterionKind::Pronunciation => {
                Some(pronunciation::score(criterion, features, self.policy))
            }
            CriterionKind::Fluency => Some(fluency::score(criterion, features, transcript)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TABLE: ThresholdTable = ThresholdTable {
        metric: "demo",
        direction: Direction::LowerIsBetter,
        rows: &[
            TierRow { tier: Tier::Excellent, limit: 1.0, deduction: 0.0 },
            TierRow { tier: Tier::Good, limit: 2.0, deduction: 0.1 },
        ],
        floor_deduction: 0.4,
        issue_label: "demo_issue",
    };

    #[test]
    fn test_first_matching_row_wins() {
        assert_eq!(TABLE.classify(0.5).tier, Tier::Excellent);
        assert_eq!(TABLE.classify(1.0).tier, Tier::Excellent);
        assert_eq!(TABLE.classify(1.5).tier, Tier::Good);
        let floor = TABLE.classify(9.0);
        assert_eq!(floor.tier, Tier::Poor);
        assert_eq!(floor.deduction, 0.4);
    }

    #[test]
    fn test_policies_stay_in_unit_interval() {
        let outcome = |deduction| TierOutcome {
            metric: "m",
            value: 0.0,
            tier: Tier::Poor,
            deduction,
        };
        let outcomes = [outcome(0.5), outcome(0.35), outcome(0.35)];
        assert_eq!(PronunciationPolicy::WorstTier.combine(&outcomes), 0.5);
        assert_eq!(PronunciationPolicy::Cumulative.combine(&outcomes), 1.0);
        assert_eq!(PronunciationPolicy::WorstTier.combine(&[]), 0.0);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!(
            "worst_tier".parse::<PronunciationPolicy>().unwrap(),
            PronunciationPolicy::WorstTier
        );
        assert_eq!(
            "Cumulative".parse::<PronunciationPolicy>().unwrap(),
            PronunciationPolicy::Cumulative
        );
        assert!("average".parse::<PronunciationPolicy>().is_err());
    }
}
