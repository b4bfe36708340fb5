//! Score aggregation
//!
//! Folds per-criterion scores into the final report. Totals sum raw scores over
//! included criteria only; an unscored criterion is removed from both the numerator
//! and the denominator so it can never drag the percentage down as a silent zero.

use crate::criteria::{CriterionKind, TaskDefinition};
use crate::types::{
    round_to, AcousticFeatureSet, AcousticReport, ConsensusReport, CriterionScore, ScoreReport,
};
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Note for a declared criterion no scorer produced
pub const NOT_EVALUATED: &str = "not evaluated";

/// Build the report for one task from whatever scores are available
///
/// Scores are placed in the task's declared order regardless of the order they
/// arrive in. Declared criteria without a score become `unscored (not evaluated)`;
/// scores for criteria the task does not declare are dropped.
pub fn aggregate(scores: Vec<CriterionScore>, task: &TaskDefinition) -> ScoreReport {
    let mut by_kind: HashMap<CriterionKind, CriterionScore> =
        scores.into_iter().map(|s| (s.criterion_id, s)).collect();

    let criteria: Vec<CriterionScore> = task
        .criteria
        .iter()
        .map(|criterion| {
            by_kind
                .remove(&criterion.id)
                .unwrap_or_else(|| CriterionScore::unscored(criterion, NOT_EVALUATED))
        })
        .collect();

    for stray in by_kind.keys() {
        debug!(criterion = %stray, task_code = %task.task_code, "Dropping score for undeclared criterion");
    }

    let (overall, max_total) = criteria
        .iter()
        .filter(|c| c.is_included())
        .fold((0.0, 0.0), |(sum, max), c| {
            (sum + c.raw_score.unwrap_or(0.0), max + c.max_score)
        });

    let percentage = if max_total > 0.0 {
        round_to(overall / max_total * 100.0, 1)
    } else {
        0.0
    };

    let unscored_criteria: Vec<CriterionKind> = criteria
        .iter()
        .filter(|c| !c.is_included())
        .map(|c| c.criterion_id)
        .collect();

    let level_achieved = task.level_for(percentage).to_string();
    let overall_score = round_to(overall, 2);
    let max_total_score = round_to(max_total, 2);
    let overall_feedback =
        render_overall_feedback(&criteria, overall_score, max_total_score, percentage, &level_achieved);

    info!(
        task_code = %task.task_code,
        total = overall,
        max_total,
        percentage,
        level = %level_achieved,
        unscored = unscored_criteria.len(),
        "Scores aggregated"
    );

    ScoreReport {
        request_id: Uuid::nil(),
        exam_level: task.exam_level,
        task_code: task.task_code.clone(),
        task_name: task.name.clone(),
        criteria,
        overall_score,
        max_total_score,
        percentage,
        level_achieved,
        degraded: !unscored_criteria.is_empty(),
        unscored_criteria,
        consensus: None,
        features: None,
        overall_feedback,
        processing_time: 0.0,
    }
}

/// Totals line, then one line per counted criterion, then what was left out
fn render_overall_feedback(
    criteria: &[CriterionScore],
    overall: f64,
    max_total: f64,
    percentage: f64,
    level: &str,
) -> String {
    let mut lines = vec![format!(
        "Total {}/{} ({}%), level {}.",
        overall, max_total, percentage, level
    )];
    lines.extend(
        criteria
            .iter()
            .filter(|c| c.is_included() && !c.feedback.trim().is_empty())
            .map(|c| format!("{}: {}", c.display_name, c.feedback.trim())),
    );

    let skipped: Vec<&str> = criteria
        .iter()
        .filter(|c| !c.is_included())
        .map(|c| c.display_name.as_str())
        .collect();
    if !skipped.is_empty() {
        lines.push(format!("Not scored: {}.", skipped.join(", ")));
    }
    lines.join("\n")
}

/// Report over the acoustic criteria alone, in declared order
pub fn acoustic_report(
    scores: Vec<CriterionScore>,
    task: &TaskDefinition,
    features: AcousticFeatureSet,
) -> AcousticReport {
    let (total, max_total) = scores
        .iter()
        .filter(|c| c.is_included())
        .fold((0.0, 0.0), |(sum, max), c| {
            (sum + c.raw_score.unwrap_or(0.0), max + c.max_score)
        });
    let percentage = if max_total > 0.0 {
        round_to(total / max_total * 100.0, 1)
    } else {
        0.0
    };

    AcousticReport {
        success: true,
        request_id: Uuid::nil(),
        exam_level: task.exam_level,
        task_code: task.task_code.clone(),
        features,
        criteria: scores,
        acoustic_score: round_to(total, 2),
        acoustic_max_score: round_to(max_total, 2),
        acoustic_percentage: percentage,
        processing_time: 0.0,
    }
}

impl ScoreReport {
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    pub fn with_consensus(mut self, consensus: ConsensusReport) -> Self {
        self.consensus = Some(consensus);
        self
    }

    pub fn with_features(mut self, features: Option<AcousticFeatureSet>) -> Self {
        self.features = features;
        self
    }

    /// Seconds, rounded to milliseconds
    pub fn with_processing_time(mut self, seconds: f64) -> Self {
        self.processing_time = round_to(seconds, 3);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{CriteriaRegistry, ExamLevel};
    use crate::types::CriterionStatus;
    use std::sync::Arc;

    fn task() -> Arc<TaskDefinition> {
        CriteriaRegistry::builtin()
            .get(ExamLevel::Advanced, "HSKKCC3")
            .unwrap()
    }

    fn scored(task: &TaskDefinition, kind: CriterionKind, raw: f64) -> CriterionScore {
        CriterionScore::scored(task.criterion(kind).unwrap(), raw, "")
    }

    #[test]
    fn test_full_report_in_declared_order() {
        let task = task();
        // Arrival order differs from declared order
        let scores = vec![
            scored(&task, CriterionKind::Fluency, 3.0),
            scored(&task, CriterionKind::Coherence, 3.0),
            scored(&task, CriterionKind::TaskAchievement, 8.0),
            scored(&task, CriterionKind::Vocabulary, 2.0),
            scored(&task, CriterionKind::Grammar, 4.0),
            scored(&task, CriterionKind::Pronunciation, 5.0),
        ];
        let report = aggregate(scores, &task);
        let order: Vec<CriterionKind> = report.criteria.iter().map(|c| c.criterion_id).collect();
        let declared: Vec<CriterionKind> = task.criteria.iter().map(|c| c.id).collect();
        assert_eq!(order, declared);
        assert_eq!(report.overall_score, 25.0);
        assert_eq!(report.percentage, 100.0);
        assert_eq!(report.level_achieved, "advanced");
        assert!(!report.degraded);
    }

    #[test]
    fn test_unscored_excluded_from_denominator() {
        let task = task();
        let scores = vec![
            scored(&task, CriterionKind::TaskAchievement, 6.0),
            scored(&task, CriterionKind::Pronunciation, 4.0),
            CriterionScore::unscored(task.criterion(CriterionKind::Grammar).unwrap(), "unparsable"),
            scored(&task, CriterionKind::Vocabulary, 1.0),
            scored(&task, CriterionKind::Coherence, 2.0),
            scored(&task, CriterionKind::Fluency, 2.0),
        ];
        let report = aggregate(scores, &task);
        assert_eq!(report.overall_score, 15.0);
        assert_eq!(report.max_total_score, 21.0);
        assert_eq!(report.percentage, 71.4);
        assert_eq!(report.level_achieved, "intermediate");
        assert!(report.degraded);
        assert_eq!(report.unscored_criteria, vec![CriterionKind::Grammar]);
    }

    #[test]
    fn test_missing_criterion_marked_not_evaluated() {
        let task = task();
        let report = aggregate(vec![scored(&task, CriterionKind::Fluency, 1.5)], &task);
        assert_eq!(report.criteria.len(), 6);
        let grammar = report.criterion(CriterionKind::Grammar).unwrap();
        assert_eq!(grammar.status, CriterionStatus::Unscored);
        assert_eq!(grammar.note.as_deref(), Some(NOT_EVALUATED));
        assert_eq!(report.max_total_score, 3.0);
        assert_eq!(report.percentage, 50.0);
        assert_eq!(report.level_achieved, "elementary");
    }

    #[test]
    fn test_nothing_scored_is_zero_not_nan() {
        let report = aggregate(Vec::new(), &task());
        assert_eq!(report.max_total_score, 0.0);
        assert_eq!(report.percentage, 0.0);
        assert_eq!(report.unscored_criteria.len(), 6);
    }

    #[test]
    fn test_overall_feedback_summarizes_criteria() {
        let task = task();
        let scores = vec![
            CriterionScore::scored(task.criterion(CriterionKind::Pronunciation).unwrap(), 5.0, "Voice is clear."),
            CriterionScore::scored(task.criterion(CriterionKind::Fluency).unwrap(), 3.0, "  "),
            CriterionScore::unscored(task.criterion(CriterionKind::Grammar).unwrap(), "timeout"),
        ];
        let report = aggregate(scores, &task);
        let lines: Vec<&str> = report.overall_feedback.lines().collect();

        assert_eq!(lines[0], "Total 8/8 (100%), level advanced.");
        let pronunciation = task.criterion(CriterionKind::Pronunciation).unwrap();
        assert_eq!(lines[1], format!("{}: Voice is clear.", pronunciation.display_name));
        // Blank feedback adds no line
        assert_eq!(lines.len(), 3);
        let grammar = task.criterion(CriterionKind::Grammar).unwrap();
        assert!(lines[2].starts_with("Not scored: "));
        assert!(lines[2].contains(grammar.display_name.as_str()));
    }

    #[test]
    fn test_acoustic_report_totals() {
        let task = task();
        let features = crate::intake::validate(&crate::intake::fixtures::clean_features()).unwrap();
        let report = acoustic_report(
            vec![
                scored(&task, CriterionKind::Pronunciation, 4.0),
                scored(&task, CriterionKind::Fluency, 2.25),
            ],
            &task,
            features,
        );
        assert_eq!(report.acoustic_score, 6.25);
        assert_eq!(report.acoustic_max_score, 8.0);
        assert_eq!(report.acoustic_percentage, 78.1);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["scores"]["fluency"]["score"], 2.25);
        assert_eq!(json["task_code"], "HSKKCC3");
        assert!(json["features"]["hnr_mean"].is_number());
    }

    #[test]
    fn test_report_serializes_scores_by_id() {
        let task = task();
        let report = aggregate(vec![scored(&task, CriterionKind::Pronunciation, 4.0)], &task)
            .with_request_id(Uuid::new_v4())
            .with_processing_time(1.23456);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["task_info"]["criteria_count"], 6);
        assert_eq!(json["scores"]["pronunciation"]["score"], 4.0);
        assert_eq!(json["scores"]["grammar"]["status"], "unscored");
        assert_eq!(json["processing_time"], 1.235);
        assert_eq!(json["exam_level"], "103");
        assert!(json["features"].is_null());
        assert!(json["overall_feedback"].as_str().is_some_and(|f| f.starts_with("Total 4/5 (80%)")));
    }
}
