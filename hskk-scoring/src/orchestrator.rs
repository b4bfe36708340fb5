//! Assessment orchestrator
//!
//! Drives one assessment through the scoring pipeline and owns the only external
//! contract of the engine: `assess(request) -> ScoreReport | ScoringError`.
//!
//! # States
//! ```text
//! Init ─▶ FannedOut ─▶ Ready ─▶ Judged ─▶ Aggregated ─▶ Done
//!   └──────────┴─────────┴────────┴───────────┴─────▶ Failed
//! ```
//! - **FannedOut:** acoustic fetch and transcript collection run concurrently
//! - **Ready:** features validated (or timed out) and consensus resolved
//! - **Judged:** judgment criteria scored concurrently
//!
//! Validation happens in `Init`, before any collaborator is called. Acoustic
//! failure and zero transcripts are fatal; everything else degrades single
//! criteria. One deadline bounds the whole request; work still pending at the
//! deadline ends `unscored (timeout)` and the report is built from what completed.

use crate::aggregate::{acoustic_report, aggregate};
use crate::cache::CachedAnalyzer;
use crate::consensus::TranscriptAggregator;
use crate::criteria::{CriteriaRegistry, DataSource, ExamLevel, TaskDefinition};
use crate::error::ScoringError;
use crate::events::{AssessmentEvent, EventSink};
use crate::intake;
use crate::judgment::{JudgmentScorer, TIMEOUT_NOTE};
use crate::rubric::RubricScorer;
use crate::types::{
    round_to, AcousticAnalyzer, AcousticFeatureSet, AcousticReport, AnalysisError, AudioPayload,
    ConsensusReport, CriterionScore, CriterionStatus, RawFeatures, ScoreReport,
};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Default overall deadline of one assessment
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(90);
/// Default budget for the acoustic fetch
pub const DEFAULT_ACOUSTIC_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// State machine
// ============================================================================

/// Lifecycle state of one assessment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentState {
    Init,
    FannedOut,
    Ready,
    Judged,
    Aggregated,
    Done,
    Failed,
}

impl AssessmentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssessmentState::Init => "init",
            AssessmentState::FannedOut => "fanned_out",
            AssessmentState::Ready => "ready",
            AssessmentState::Judged => "judged",
            AssessmentState::Aggregated => "aggregated",
            AssessmentState::Done => "done",
            AssessmentState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AssessmentState::Done | AssessmentState::Failed)
    }

    /// Forward one step, or to `Failed` from any non-terminal state
    pub fn can_transition_to(&self, next: AssessmentState) -> bool {
        use AssessmentState::*;
        match (self, next) {
            (current, Failed) => !current.is_terminal(),
            (Init, FannedOut)
            | (FannedOut, Ready)
            | (Ready, Judged)
            | (Judged, Aggregated)
            | (Aggregated, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for AssessmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one running assessment
struct Run {
    state: AssessmentState,
    events: EventSink,
}

impl Run {
    fn new(events: EventSink) -> Self {
        Self {
            state: AssessmentState::Init,
            events,
        }
    }

    fn advance(&mut self, next: AssessmentState) {
        if !self.state.can_transition_to(next) {
            warn!(
                request_id = %self.events.request_id(),
                from = %self.state,
                to = %next,
                "Ignoring invalid assessment state transition"
            );
            return;
        }
        debug!(request_id = %self.events.request_id(), from = %self.state, to = %next, "Assessment state changed");
        self.events.state_changed(self.state, next);
        self.state = next;
    }

    fn fail(&mut self, err: ScoringError) -> ScoringError {
        error!(
            request_id = %self.events.request_id(),
            state = %self.state,
            kind = %err.kind(),
            retryable = err.is_retryable(),
            "Assessment failed: {}", err
        );
        self.advance(AssessmentState::Failed);
        err
    }
}

// ============================================================================
// Request
// ============================================================================

/// One assessment request
#[derive(Debug, Clone)]
pub struct AssessmentRequest {
    pub audio: AudioPayload,
    pub exam_level: ExamLevel,
    pub task_code: String,
    /// Overrides the task's default reference text
    pub reference_text: Option<String>,
    /// Restrict transcription to these provider ids
    pub stt_providers: Option<Vec<String>>,
    /// Judge id; the default judge when absent
    pub judge: Option<String>,
}

impl AssessmentRequest {
    pub fn new(audio: AudioPayload, exam_level: ExamLevel, task_code: impl Into<String>) -> Self {
        Self {
            audio,
            exam_level,
            task_code: task_code.into(),
            reference_text: None,
            stt_providers: None,
            judge: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference_text = Some(reference.into());
        self
    }
}

/// Everything resolved during validation
struct Plan<'a> {
    task: Arc<TaskDefinition>,
    transcripts: TranscriptAggregator,
    judge: &'a JudgmentScorer,
    reference: Option<String>,
}

/// Result of the acoustic fetch
enum FeatureOutcome {
    Ready(RawFeatures),
    TimedOut,
    Failed(AnalysisError),
    Cancelled,
}

// ============================================================================
// Orchestrator
// ============================================================================

/// Deadlines of one assessment
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorSettings {
    pub request_deadline: Duration,
    /// Capped by the request deadline
    pub acoustic_timeout: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            request_deadline: DEFAULT_REQUEST_DEADLINE,
            acoustic_timeout: DEFAULT_ACOUSTIC_TIMEOUT,
        }
    }
}

/// The scoring engine
///
/// Holds only read-only configuration and collaborator handles; every request's
/// state lives in its own call, so one instance serves concurrent requests.
pub struct Orchestrator {
    registry: Arc<CriteriaRegistry>,
    analyzer: Arc<dyn AcousticAnalyzer>,
    transcripts: TranscriptAggregator,
    judges: HashMap<String, JudgmentScorer>,
    default_judge: String,
    rubric: RubricScorer,
    settings: OrchestratorSettings,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<CriteriaRegistry>,
        analyzer: Arc<dyn AcousticAnalyzer>,
        transcripts: TranscriptAggregator,
        judge_id: impl Into<String>,
        judge: JudgmentScorer,
    ) -> Self {
        let default_judge = judge_id.into();
        let mut judges = HashMap::new();
        judges.insert(default_judge.clone(), judge);
        Self {
            registry,
            analyzer,
            transcripts,
            judges,
            default_judge,
            rubric: RubricScorer::default(),
            settings: OrchestratorSettings::default(),
        }
    }

    /// Register an additional judge selectable per request
    pub fn with_judge(mut self, id: impl Into<String>, judge: JudgmentScorer) -> Self {
        self.judges.insert(id.into(), judge);
        self
    }

    pub fn with_rubric(mut self, rubric: RubricScorer) -> Self {
        self.rubric = rubric;
        self
    }

    pub fn with_settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Memoize acoustic features by audio hash
    pub fn with_feature_cache(mut self, capacity: usize) -> Self {
        self.analyzer = Arc::new(CachedAnalyzer::new(self.analyzer, capacity));
        self
    }

    pub fn registry(&self) -> &Arc<CriteriaRegistry> {
        &self.registry
    }

    pub fn stt_provider_ids(&self) -> Vec<String> {
        self.transcripts.provider_ids()
    }

    pub fn default_judge(&self) -> &str {
        &self.default_judge
    }

    /// Judge ids, default first
    pub fn judge_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.judges.keys().cloned().collect();
        ids.sort_by_key(|id| (*id != self.default_judge, id.clone()));
        ids
    }

    pub async fn assess(&self, request: AssessmentRequest) -> Result<ScoreReport, ScoringError> {
        self.assess_with_events(request, None).await
    }

    /// Run one assessment, reporting progress on `events` when given
    pub async fn assess_with_events(
        &self,
        request: AssessmentRequest,
        events: Option<mpsc::Sender<AssessmentEvent>>,
    ) -> Result<ScoreReport, ScoringError> {
        let started = std::time::Instant::now();
        let request_id = Uuid::new_v4();
        let events = EventSink::new(request_id, events);
        let mut run = Run::new(events.clone());

        let plan = self.validate(&request).map_err(|e| run.fail(e))?;
        let task = plan.task.clone();
        info!(
            request_id = %request_id,
            exam_level = %task.exam_level,
            task_code = %task.task_code,
            audio_bytes = request.audio.len(),
            providers = plan.transcripts.provider_count(),
            judge = plan.judge.judge_name(),
            "Assessment started"
        );

        let deadline = Instant::now() + self.settings.request_deadline;
        let acoustic_deadline = deadline.min(Instant::now() + self.settings.acoustic_timeout);
        let cancel = CancellationToken::new();
        // Anything still in flight is cancelled when this call returns
        let _cancel_on_exit = cancel.clone().drop_guard();

        run.advance(AssessmentState::FannedOut);
        let reference = plan.reference.as_deref();
        let (features, consensus) = tokio::join!(
            self.fetch_features(&request.audio, acoustic_deadline, &cancel),
            async {
                let result = plan
                    .transcripts
                    .collect(&request.audio, reference, deadline, &cancel, &events)
                    .await;
                if result.is_err() {
                    cancel.cancel();
                }
                result
            }
        );

        let features = match features {
            FeatureOutcome::Failed(e) => return Err(run.fail(ScoringError::AcousticUnavailable(e))),
            FeatureOutcome::Ready(raw) => match intake::validate(&raw) {
                Ok(features) => Some(features),
                Err(e) => return Err(run.fail(ScoringError::FeatureValidation(e))),
            },
            FeatureOutcome::TimedOut | FeatureOutcome::Cancelled => None,
        };
        let consensus = consensus.map_err(|e| run.fail(ScoringError::TranscriptionUnavailable(e)))?;
        run.advance(AssessmentState::Ready);

        let mut scores = self.score_acoustic(&task, features.as_ref(), &consensus, &events);
        scores.extend(
            plan.judge
                .score_all(&task, &consensus, reference, deadline, &events)
                .await,
        );
        run.advance(AssessmentState::Judged);

        for score in scores.iter().filter(|s| s.status != CriterionStatus::Scored) {
            warn!(
                request_id = %request_id,
                criterion = %score.criterion_id,
                status = ?score.status,
                note = score.note.as_deref().unwrap_or(""),
                "Criterion not fully scored"
            );
        }

        let report = aggregate(scores, &task);
        if report.max_total_score <= 0.0 {
            return Err(run.fail(ScoringError::NoScorableCriteria {
                task_code: task.task_code.clone(),
            }));
        }
        run.advance(AssessmentState::Aggregated);

        let report = report
            .with_request_id(request_id)
            .with_consensus(consensus)
            .with_features(features)
            .with_processing_time(started.elapsed().as_secs_f64());
        run.advance(AssessmentState::Done);

        info!(
            request_id = %request_id,
            task_code = %report.task_code,
            total = report.overall_score,
            max_total = report.max_total_score,
            percentage = report.percentage,
            level = %report.level_achieved,
            degraded = report.degraded,
            processing_time = report.processing_time,
            "Assessment complete"
        );
        Ok(report)
    }

    /// Score only the acoustic criteria of the task
    ///
    /// No transcription or judgment runs, so the repetition detector sees no
    /// transcript. The acoustic budget is the only deadline; running out of it is
    /// an analysis timeout since nothing else could be scored.
    pub async fn assess_acoustic(&self, request: AssessmentRequest) -> Result<AcousticReport, ScoringError> {
        let started = std::time::Instant::now();
        let request_id = Uuid::new_v4();

        let task = self.resolve_task(&request)?;
        if task.criteria_from(DataSource::Acoustic).next().is_none() {
            return Err(ScoringError::NoScorableCriteria {
                task_code: task.task_code.clone(),
            });
        }
        info!(
            request_id = %request_id,
            exam_level = %task.exam_level,
            task_code = %task.task_code,
            audio_bytes = request.audio.len(),
            "Acoustic assessment started"
        );

        let budget = self.settings.acoustic_timeout.min(self.settings.request_deadline);
        let cancel = CancellationToken::new();
        let raw = match self.fetch_features(&request.audio, Instant::now() + budget, &cancel).await {
            FeatureOutcome::Ready(raw) => raw,
            FeatureOutcome::Failed(e) => return Err(ScoringError::AcousticUnavailable(e)),
            FeatureOutcome::TimedOut | FeatureOutcome::Cancelled => {
                return Err(ScoringError::AcousticUnavailable(AnalysisError::Timeout))
            }
        };
        let features = intake::validate(&raw)?;

        let scores: Vec<CriterionScore> = task
            .criteria_from(DataSource::Acoustic)
            .filter_map(|criterion| self.rubric.score(criterion, &features, None))
            .collect();
        let mut report = acoustic_report(scores, &task, features);
        report.request_id = request_id;
        report.processing_time = round_to(started.elapsed().as_secs_f64(), 3);

        info!(
            request_id = %request_id,
            task_code = %report.task_code,
            total = report.acoustic_score,
            max_total = report.acoustic_max_score,
            processing_time = report.processing_time,
            "Acoustic assessment complete"
        );
        Ok(report)
    }

    /// Non-empty audio and a task that belongs to the requested level
    fn resolve_task(&self, request: &AssessmentRequest) -> Result<Arc<TaskDefinition>, ScoringError> {
        if request.audio.is_empty() {
            return Err(ScoringError::Validation("audio is empty".to_string()));
        }

        let code = request.task_code.trim();
        if code.is_empty() {
            return Err(ScoringError::Validation("task_code is required".to_string()));
        }
        match self.registry.get(request.exam_level, code) {
            Some(task) => Ok(task),
            None if self.registry.knows_task_code(code) => Err(ScoringError::Validation(format!(
                "Task {} does not belong to exam level {}",
                code.to_ascii_uppercase(),
                request.exam_level
            ))),
            None => Err(ScoringError::Validation(format!("Unknown task code: {}", code))),
        }
    }

    /// Reject malformed requests before any collaborator is called
    fn validate(&self, request: &AssessmentRequest) -> Result<Plan<'_>, ScoringError> {
        let task = self.resolve_task(request)?;

        let transcripts = match &request.stt_providers {
            Some(ids) if ids.is_empty() => {
                return Err(ScoringError::Validation(
                    "stt_providers must name at least one provider".to_string(),
                ))
            }
            Some(ids) => self.transcripts.subset(ids)?,
            None => self.transcripts.clone(),
        };
        if transcripts.provider_count() == 0 {
            return Err(ScoringError::Internal("No STT providers configured".to_string()));
        }

        let judge_id = request.judge.as_deref().unwrap_or(&self.default_judge);
        let judge = self
            .judges
            .get(judge_id)
            .ok_or_else(|| ScoringError::Validation(format!("Unknown judge: {}", judge_id)))?;

        let reference = request
            .reference_text
            .clone()
            .or_else(|| task.reference_text.clone())
            .filter(|r| !r.trim().is_empty());

        Ok(Plan {
            task,
            transcripts,
            judge,
            reference,
        })
    }

    async fn fetch_features(
        &self,
        audio: &AudioPayload,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> FeatureOutcome {
        let started = std::time::Instant::now();
        let outcome = tokio::select! {
            _ = cancel.cancelled() => FeatureOutcome::Cancelled,
            result = tokio::time::timeout_at(deadline, self.analyzer.analyze(audio)) => match result {
                Ok(Ok(raw)) => FeatureOutcome::Ready(raw),
                Ok(Err(e)) => {
                    cancel.cancel();
                    FeatureOutcome::Failed(e)
                }
                Err(_) => FeatureOutcome::TimedOut,
            },
        };
        match &outcome {
            FeatureOutcome::Ready(raw) => debug!(
                analyzer = self.analyzer.name(),
                keys = raw.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Acoustic features received"
            ),
            FeatureOutcome::TimedOut => warn!(
                analyzer = self.analyzer.name(),
                "Acoustic features not ready before the deadline"
            ),
            FeatureOutcome::Failed(e) => warn!(analyzer = self.analyzer.name(), error = %e, "Acoustic analysis failed"),
            FeatureOutcome::Cancelled => debug!("Acoustic fetch cancelled"),
        }
        outcome
    }

    fn score_acoustic(
        &self,
        task: &TaskDefinition,
        features: Option<&AcousticFeatureSet>,
        consensus: &ConsensusReport,
        events: &EventSink,
    ) -> Vec<CriterionScore> {
        task.criteria_from(DataSource::Acoustic)
            .filter_map(|criterion| {
                let score = match features {
                    Some(features) => {
                        self.rubric
                            .score(criterion, features, Some(consensus.canonical_text()))?
                    }
                    None => CriterionScore::unscored(criterion, TIMEOUT_NOTE),
                };
                events.criterion_finished(criterion.id, score.status);
                Some(score)
            })
            .collect()
    }
}
