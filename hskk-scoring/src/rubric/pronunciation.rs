//! Pronunciation rubric
//!
//! Voice clarity (HNR), pitch stability (jitter) and amplitude stability
//! (shimmer) each map to a tier with a deduction fraction.
//! `pronunciation_raw = max_score * (1 - combined_deduction)`.

use super::{Direction, PronunciationPolicy, ThresholdTable, Tier, TierOutcome, TierRow};
use crate::criteria::Criterion;
use crate::types::{AcousticFeatureSet, CriterionScore};
use serde_json::json;

pub const HNR_TABLE: ThresholdTable = ThresholdTable {
    metric: "hnr_mean",
    direction: Direction::HigherIsBetter,
    rows: &[
        TierRow { tier: Tier::Excellent, limit: 20.0, deduction: 0.0 },
        TierRow { tier: Tier::Good, limit: 15.0, deduction: 0.15 },
        TierRow { tier: Tier::Acceptable, limit: 10.0, deduction: 0.30 },
    ],
    floor_deduction: 0.50,
    issue_label: "giong_khong_ro",
};

pub const JITTER_TABLE: ThresholdTable = ThresholdTable {
    metric: "jitter_local",
    direction: Direction::LowerIsBetter,
    rows: &[
        TierRow { tier: Tier::Excellent, limit: 0.010, deduction: 0.0 },
        TierRow { tier: Tier::Good, limit: 0.015, deduction: 0.15 },
        TierRow { tier: Tier::Acceptable, limit: 0.020, deduction: 0.25 },
    ],
    floor_deduction: 0.35,
    issue_label: "cao_do_khong_on_dinh",
};

pub const SHIMMER_TABLE: ThresholdTable = ThresholdTable {
    metric: "shimmer_local",
    direction: Direction::LowerIsBetter,
    rows: &[
        TierRow { tier: Tier::Excellent, limit: 0.05, deduction: 0.0 },
        TierRow { tier: Tier::Good, limit: 0.08, deduction: 0.15 },
        TierRow { tier: Tier::Acceptable, limit: 0.12, deduction: 0.25 },
    ],
    floor_deduction: 0.35,
    issue_label: "am_luong_khong_deu",
};

/// Tier of each metric in fixed order: HNR, jitter, shimmer
pub fn classify(features: &AcousticFeatureSet) -> [TierOutcome; 3] {
    [
        HNR_TABLE.classify(features.hnr_mean),
        JITTER_TABLE.classify(features.jitter_local),
        SHIMMER_TABLE.classify(features.shimmer_local),
    ]
}

pub fn score(
    criterion: &Criterion,
    features: &AcousticFeatureSet,
    policy: PronunciationPolicy,
) -> CriterionScore {
    let outcomes = classify(features);
    let deduction = policy.combine(&outcomes);
    let raw = criterion.max_score * (1.0 - deduction);

    let tables = [HNR_TABLE, JITTER_TABLE, SHIMMER_TABLE];
    let issues: Vec<&str> = tables
        .iter()
        .zip(outcomes.iter())
        .filter(|(_, outcome)| outcome.tier >= Tier::Acceptable)
        .map(|(table, _)| table.issue_label)
        .collect();

    let mut result = CriterionScore::scored(criterion, raw, feedback(&outcomes))
        .with_issues(issues)
        .with_detail("policy", policy.as_str())
        .with_detail("deduction", deduction);
    for outcome in &outcomes {
        result = result.with_detail(
            outcome.metric,
            json!({ "value": outcome.value, "tier": outcome.tier.as_str(), "deduction": outcome.deduction }),
        );
    }
    result
}

fn feedback(outcomes: &[TierOutcome; 3]) -> String {
    let [hnr, jitter, shimmer] = outcomes;
    let mut parts = Vec::new();

    parts.push(match hnr.tier {
        Tier::Excellent => format!("Voice is clear (HNR {:.1} dB).", hnr.value),
        Tier::Good => format!("Voice is fairly clear (HNR {:.1} dB).", hnr.value),
        Tier::Acceptable | Tier::Poor => format!(
            "Voice sounds breathy or noisy (HNR {:.1} dB); speak with a steadier, fuller tone.",
            hnr.value
        ),
    });

    match jitter.tier {
        Tier::Excellent => {}
        Tier::Good => parts.push(format!("Pitch is mostly steady (jitter {:.3}).", jitter.value)),
        Tier::Acceptable | Tier::Poor => parts.push(format!(
            "Pitch is unsteady (jitter {:.3}); hold tones more evenly.",
            jitter.value
        )),
    }
    match shimmer.tier {
        Tier::Excellent => {}
        Tier::Good => parts.push(format!("Loudness is mostly even (shimmer {:.3}).", shimmer.value)),
        Tier::Acceptable | Tier::Poor => parts.push(format!(
            "Loudness varies between cycles (shimmer {:.3}); keep volume consistent.",
            shimmer.value
        )),
    }
    if jitter.tier == Tier::Excellent && shimmer.tier == Tier::Excellent {
        parts.push("Pitch and volume are stable.".to_string());
    }

    parts.join(" ")
}
