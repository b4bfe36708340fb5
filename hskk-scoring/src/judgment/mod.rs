//! Consensus-based judgment scorer
//!
//! Scores every judgment-backed criterion of a task from the canonical transcript
//! and its consensus classification. Criteria are judged concurrently; each has its
//! own timeout and retry budget, and a failure only ever affects its own criterion.
//!
//! # Retry policy
//! | Failure | Retried | Final status |
//! |---|---|---|
//! | Unparsable response | yes, with the strict-format instruction | `unscored` |
//! | Timeout, rate limited, network | yes | `unscored` (`timeout` for timeouts) |
//! | Content filter, authentication | no | `unscored` |

pub mod prompt;
pub mod response;

pub use response::{parse_response, ParsedJudgment, ResponseParsingError};

use crate::criteria::{Criterion, CriterionKind, DataSource, TaskDefinition};
use crate::events::EventSink;
use crate::types::{
    AgreementClass, ConsensusReport, CriterionScore, Judge, JudgeError, JudgmentRequest,
};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Note recorded on criteria that ran out of time
pub const TIMEOUT_NOTE: &str = "timeout";

/// Scores judgment-backed criteria through one judge
#[derive(Clone)]
pub struct JudgmentScorer {
    judge: Arc<dyn Judge>,
    /// Per call
    timeout: Duration,
    retries: u32,
}

impl JudgmentScorer {
    pub fn new(judge: Arc<dyn Judge>, timeout: Duration, retries: u32) -> Self {
        Self {
            judge,
            timeout,
            retries,
        }
    }

    pub fn judge_name(&self) -> &str {
        self.judge.name()
    }

    /// Score all judgment criteria of the task, in declared order
    ///
    /// Criteria still running at `deadline` end `unscored (timeout)`.
    pub async fn score_all(
        &self,
        task: &TaskDefinition,
        consensus: &ConsensusReport,
        reference_text: Option<&str>,
        deadline: Instant,
        events: &EventSink,
    ) -> Vec<CriterionScore> {
        let calls = task.criteria_from(DataSource::Judgment).map(move |criterion| {
            let request = build_request(task, criterion, consensus, reference_text);
            async move {
                let score = match tokio::time::timeout_at(deadline, self.score_one(criterion, request)).await {
                    Ok(score) => score,
                    Err(_) => {
                        warn!(criterion = %criterion.id, "Judgment cut off by request deadline");
                        CriterionScore::unscored(criterion, TIMEOUT_NOTE)
                    }
                };
                let score = apply_evidence_limits(score, criterion, consensus, reference_text);
                events.criterion_finished(criterion.id, score.status);
                score
            }
        });
        join_all(calls).await
    }

    /// Judge one criterion within its retry budget
    async fn score_one(&self, criterion: &Criterion, mut request: JudgmentRequest) -> CriterionScore {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let retries_left = attempt <= self.retries;

            let outcome = match tokio::time::timeout(self.timeout, self.judge.judge(&request)).await {
                Ok(result) => result,
                Err(_) => Err(JudgeError::Timeout),
            };

            let failure = match outcome {
                Ok(raw) => match parse_response(&raw, criterion.max_score) {
                    Ok(parsed) => {
                        debug!(criterion = %criterion.id, score = parsed.score, attempt, "Judgment parsed");
                        return CriterionScore::scored(criterion, parsed.score, parsed.feedback)
                            .with_issues(parsed.issues)
                            .with_detail("judge", self.judge.name())
                            .with_detail("attempts", attempt)
                            .with_detail("consensus", request.consensus.as_str())
                            .with_detail("clamped", parsed.clamped);
                    }
                    Err(e) => {
                        warn!(criterion = %criterion.id, attempt, error = %e, "Unparsable judge response");
                        request.strict_format = true;
                        format!("unparsable judge response: {}", e)
                    }
                },
                Err(JudgeError::Parsing(reason)) => {
                    warn!(criterion = %criterion.id, attempt, reason = %reason, "Judge reported a parsing failure");
                    request.strict_format = true;
                    format!("unparsable judge response: {}", reason)
                }
                Err(e) if e.is_retryable() => {
                    warn!(criterion = %criterion.id, attempt, error = %e, "Judgment call failed");
                    if !retries_left {
                        let note = match e {
                            JudgeError::Timeout => TIMEOUT_NOTE.to_string(),
                            other => other.to_string(),
                        };
                        return CriterionScore::unscored(criterion, note);
                    }
                    e.to_string()
                }
                Err(e) => {
                    warn!(criterion = %criterion.id, error = %e, "Judgment failed, not retrying");
                    return CriterionScore::unscored(criterion, e.to_string());
                }
            };

            if !retries_left {
                return CriterionScore::unscored(criterion, failure);
            }
            info!(criterion = %criterion.id, attempt, "Retrying judgment");
        }
    }
}

/// Build the judgment request for one criterion
pub fn build_request(
    task: &TaskDefinition,
    criterion: &Criterion,
    consensus: &ConsensusReport,
    reference_text: Option<&str>,
) -> JudgmentRequest {
    let reference = reference_text
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string);
    JudgmentRequest {
        criterion: criterion.id,
        criterion_name: criterion.display_name.clone(),
        max_score: criterion.max_score,
        rubric: prompt::rubric_for(criterion.id, reference.is_some()).to_string(),
        canonical_transcript: consensus.canonical_text().to_string(),
        consensus: consensus.classification,
        transcripts: consensus
            .available()
            .map(|t| (t.provider_id.clone(), t.text.clone().unwrap_or_default()))
            .collect(),
        reference_text: reference,
        exam_level: task.exam_level,
        task_code: task.task_code.clone(),
        task_name: task.name.clone(),
        strict_format: false,
    }
}

/// Mark scores that rest on reduced evidence as degraded
fn apply_evidence_limits(
    score: CriterionScore,
    criterion: &Criterion,
    consensus: &ConsensusReport,
    reference_text: Option<&str>,
) -> CriterionScore {
    let missing_reference = criterion.id == CriterionKind::TaskAchievement
        && criterion.requires_reference
        && reference_text.map(|r| r.trim().is_empty()).unwrap_or(true);

    let score = if missing_reference {
        score.degraded("judged without reference text")
    } else {
        score
    };
    if consensus.classification == AgreementClass::InsufficientData {
        score.degraded("single transcript available")
    } else {
        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{CriteriaRegistry, ExamLevel};
    use crate::mock::MockJudge;
    use crate::types::{CanonicalTranscript, CriterionStatus, Transcription, TranscriptResult};
    use std::sync::atomic::Ordering;

    fn consensus(class: AgreementClass) -> ConsensusReport {
        let arrived = |id: &str| {
            TranscriptResult::arrived(
                id,
                Transcription {
                    text: "我今天很高兴".to_string(),
                    confidence: None,
                },
                5,
            )
        };
        ConsensusReport {
            transcripts: vec![arrived("whisper"), arrived("gemini")],
            similarities: Vec::new(),
            classification: class,
            canonical: CanonicalTranscript {
                provider_id: "whisper".to_string(),
                text: "我今天很高兴".to_string(),
            },
        }
    }

    fn task(code: &str, level: ExamLevel) -> Arc<TaskDefinition> {
        CriteriaRegistry::builtin().get(level, code).unwrap()
    }

    fn far() -> Instant {
        Instant::now() + Duration::from_secs(5)
    }

    fn scorer(judge: MockJudge) -> JudgmentScorer {
        JudgmentScorer::new(Arc::new(judge), Duration::from_millis(200), 1)
    }

    #[tokio::test]
    async fn test_scores_every_judgment_criterion_in_order() {
        let task = task("HSKKCC3", ExamLevel::Advanced);
        let scores = scorer(MockJudge::scoring(2.0))
            .score_all(&task, &consensus(AgreementClass::Consistent), None, far(), &EventSink::disabled())
            .await;
        let ids: Vec<CriterionKind> = scores.iter().map(|s| s.criterion_id).collect();
        assert_eq!(
            ids,
            vec![
                CriterionKind::TaskAchievement,
                CriterionKind::Grammar,
                CriterionKind::Vocabulary,
                CriterionKind::Coherence
            ]
        );
        assert!(scores.iter().all(|s| s.status == CriterionStatus::Scored));
        assert_eq!(scores[0].raw_score, Some(2.0));
    }

    #[tokio::test]
    async fn test_unparsable_twice_is_unscored() {
        let judge = MockJudge::scripted(vec![Ok("not json".to_string())]);
        let calls = judge.calls.clone();
        let requests = judge.requests.clone();
        let task = task("HSKKSC2", ExamLevel::Beginner);
        let scores = scorer(judge)
            .score_all(&task, &consensus(AgreementClass::Consistent), None, far(), &EventSink::disabled())
            .await;

        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|s| s.status == CriterionStatus::Unscored));
        assert!(scores[0].note.as_deref().unwrap().starts_with("unparsable judge response"));
        assert_eq!(calls.load(Ordering::SeqCst), 4);

        let requests = requests.lock().unwrap();
        assert_eq!(requests.iter().filter(|r| r.strict_format).count(), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_recovers_on_strict_retry() {
        let judge = MockJudge::scripted(vec![
            Ok("Sure! The score is three.".to_string()),
            Ok(r#"{"score": 3, "feedback": "ok"}"#.to_string()),
        ]);
        let criterion_task = task("HSKKSC1", ExamLevel::Beginner);
        let scores = scorer(judge)
            .score_all(
                &criterion_task,
                &consensus(AgreementClass::Consistent),
                Some("你好"),
                far(),
                &EventSink::disabled(),
            )
            .await;
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].status, CriterionStatus::Scored);
        // Clamped to the 1.0 maximum
        assert_eq!(scores[0].raw_score, Some(1.0));
        assert_eq!(scores[0].details["attempts"], 2);
    }

    #[tokio::test]
    async fn test_content_filter_not_retried() {
        let judge = MockJudge::scripted(vec![Err(JudgeError::ContentFilter("blocked".into()))]);
        let calls = judge.calls.clone();
        let task = task("HSKKSC1", ExamLevel::Beginner);
        let scores = scorer(judge)
            .score_all(&task, &consensus(AgreementClass::Consistent), Some("你好"), far(), &EventSink::disabled())
            .await;
        assert_eq!(scores[0].status, CriterionStatus::Unscored);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_retried_once() {
        let judge = MockJudge::scripted(vec![
            Err(JudgeError::RateLimited("429".into())),
            Ok(r#"{"score": 0.5, "feedback": "ok"}"#.to_string()),
        ]);
        let calls = judge.calls.clone();
        let task = task("HSKKSC1", ExamLevel::Beginner);
        let scores = scorer(judge)
            .score_all(&task, &consensus(AgreementClass::Consistent), Some("你好"), far(), &EventSink::disabled())
            .await;
        assert_eq!(scores[0].raw_score, Some(0.5));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slow_judge_times_out() {
        let judge = MockJudge::scoring(1.0).with_delay(Duration::from_secs(2));
        let task = task("HSKKSC1", ExamLevel::Beginner);
        let scores = scorer(judge)
            .score_all(&task, &consensus(AgreementClass::Consistent), Some("你好"), far(), &EventSink::disabled())
            .await;
        assert_eq!(scores[0].status, CriterionStatus::Unscored);
        assert_eq!(scores[0].note.as_deref(), Some(TIMEOUT_NOTE));
    }

    #[tokio::test]
    async fn test_request_deadline_cuts_off_judgment() {
        let judge = MockJudge::scoring(1.0).with_delay(Duration::from_millis(150));
        let scorer = JudgmentScorer::new(Arc::new(judge), Duration::from_secs(5), 1);
        let task = task("HSKKSC1", ExamLevel::Beginner);
        let deadline = Instant::now() + Duration::from_millis(20);
        let scores = scorer
            .score_all(&task, &consensus(AgreementClass::Consistent), Some("你好"), deadline, &EventSink::disabled())
            .await;
        assert_eq!(scores[0].note.as_deref(), Some(TIMEOUT_NOTE));
    }

    #[tokio::test]
    async fn test_reduced_evidence_is_degraded() {
        let task = task("HSKKCC2", ExamLevel::Advanced);
        let scores = scorer(MockJudge::scoring(8.0))
            .score_all(&task, &consensus(AgreementClass::Consistent), None, far(), &EventSink::disabled())
            .await;
        assert_eq!(scores[0].status, CriterionStatus::Degraded);
        assert_eq!(scores[0].note.as_deref(), Some("judged without reference text"));

        let scores = scorer(MockJudge::scoring(8.0))
            .score_all(
                &task,
                &consensus(AgreementClass::InsufficientData),
                Some("参考"),
                far(),
                &EventSink::disabled(),
            )
            .await;
        assert_eq!(scores[0].status, CriterionStatus::Degraded);
        assert_eq!(scores[0].note.as_deref(), Some("single transcript available"));
    }

    #[test]
    fn test_build_request_carries_consensus() {
        let task = task("HSKKCC1", ExamLevel::Advanced);
        let criterion = task.criterion(CriterionKind::TaskAchievement).unwrap();
        let request = build_request(&task, criterion, &consensus(AgreementClass::PhoneticAmbiguous), Some("  "));
        assert_eq!(request.consensus, AgreementClass::PhoneticAmbiguous);
        assert_eq!(request.transcripts.len(), 2);
        assert_eq!(request.reference_text, None);
        assert_eq!(request.max_score, 4.0);
    }
}
