//! Core types and collaborator traits for the scoring engine
//!
//! Defines the value objects that flow through one assessment:
//! - **Inputs:** `AudioPayload`, raw feature mappings
//! - **Intermediate:** `AcousticFeatureSet`, `TranscriptResult`, `ConsensusReport`
//! - **Outputs:** `CriterionScore`, `ScoreReport`
//!
//! and the four collaborator seams the orchestrator is agnostic to:
//! `AcousticAnalyzer`, `SpeechToText`, `Judge`, `SemanticClassifier`.
//!
//! All request-scoped values are immutable once built; nothing here is shared
//! across requests.

use crate::criteria::{Criterion, CriterionKind, ExamLevel};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Feature mapping as returned by the acoustic collaborator
pub type RawFeatures = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Audio
// ============================================================================

/// Audio submitted for assessment
///
/// Bytes are reference-counted so every collaborator call shares one buffer.
#[derive(Debug, Clone)]
pub struct AudioPayload {
    pub bytes: Arc<[u8]>,
    pub filename: String,
}

impl AudioPayload {
    pub fn new(bytes: impl Into<Arc<[u8]>>, filename: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            filename: filename.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the audio bytes
    pub fn content_hash(&self) -> String {
        let digest = Sha256::digest(&self.bytes);
        digest.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// MIME type guessed from the file extension
    pub fn mime_type(&self) -> &'static str {
        let ext = self
            .filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "mp3" => "audio/mpeg",
            "ogg" | "oga" => "audio/ogg",
            "webm" => "audio/webm",
            "m4a" | "mp4" => "audio/mp4",
            "flac" => "audio/flac",
            _ => "audio/wav",
        }
    }
}

// ============================================================================
// Acoustic features
// ============================================================================

/// Validated acoustic measurements of one recording
///
/// Invariants (enforced by `intake::validate`): every field finite,
/// `duration > 0`, `pause_ratio ∈ [0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcousticFeatureSet {
    /// Seconds
    pub duration: f64,
    pub pitch_mean: f64,
    pub pitch_std: f64,
    pub pitch_range: f64,
    /// Harmonics-to-noise ratio, dB
    pub hnr_mean: f64,
    pub jitter_local: f64,
    pub shimmer_local: f64,
    pub f1_mean: f64,
    pub f2_mean: f64,
    pub speech_duration: f64,
    pub pause_duration: f64,
    pub pause_ratio: f64,
    pub num_pauses: u32,
    pub mean_pause_duration: f64,
    /// Syllables per minute over the whole recording
    pub speech_rate: f64,
    /// Syllables per minute over voiced segments only
    pub articulation_rate: f64,
    #[serde(flatten)]
    pub extended: ExtendedMeasurements,
}

/// Optional measurements carried through for feedback and auditing
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtendedMeasurements {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_median: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_quantile_25: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch_quantile_75: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f1_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f2_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f3_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f3_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f4_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub f4_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity_mean: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intensity_max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectral_centroid: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectral_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectral_skewness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spectral_kurtosis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hnr_std: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_rap: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jitter_ppq5: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shimmer_apq3: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shimmer_apq5: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shimmer_apq11: Option<f64>,
    /// Spectral centre of gravity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cog: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
}

// ============================================================================
// Transcripts and consensus
// ============================================================================

/// Text returned by one STT provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Outcome of one provider call; absent providers are kept, never dropped
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TranscriptResult {
    pub provider_id: String,
    /// `None` when the provider did not return a transcript
    pub text: Option<String>,
    pub arrived: bool,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Why the transcript is absent (error, timeout, cancelled)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscriptResult {
    pub fn arrived(provider_id: impl Into<String>, transcription: Transcription, latency_ms: u64) -> Self {
        Self {
            provider_id: provider_id.into(),
            text: Some(transcription.text),
            arrived: true,
            latency_ms,
            confidence: transcription.confidence,
            error: None,
        }
    }

    pub fn absent(provider_id: impl Into<String>, reason: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            provider_id: provider_id.into(),
            text: None,
            arrived: false,
            latency_ms,
            confidence: None,
            error: Some(reason.into()),
        }
    }
}

/// Agreement across independent transcripts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgreementClass {
    /// Every pair of transcripts is above the similarity threshold
    Consistent,
    /// Recognizers disagree with no majority: articulation was unclear
    PhoneticAmbiguous,
    /// A majority converges and the lone outlier is implausible: the wording itself is suspect
    GrammarSuspect,
    /// Fewer than two transcripts
    InsufficientData,
}

impl AgreementClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementClass::Consistent => "consistent",
            AgreementClass::PhoneticAmbiguous => "phonetic_ambiguous",
            AgreementClass::GrammarSuspect => "grammar_suspect",
            AgreementClass::InsufficientData => "insufficient_data",
        }
    }
}

impl fmt::Display for AgreementClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Similarity of one transcript pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairSimilarity {
    pub a: String,
    pub b: String,
    pub similarity: f64,
}

/// Transcript chosen to represent what was said
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalTranscript {
    pub provider_id: String,
    pub text: String,
}

/// Consensus over all provider results of one request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsensusReport {
    /// Every configured provider in priority order, present or absent
    pub transcripts: Vec<TranscriptResult>,
    pub similarities: Vec<PairSimilarity>,
    pub classification: AgreementClass,
    pub canonical: CanonicalTranscript,
}

impl ConsensusReport {
    pub fn available(&self) -> impl Iterator<Item = &TranscriptResult> {
        self.transcripts.iter().filter(|t| t.arrived)
    }

    pub fn available_count(&self) -> usize {
        self.available().count()
    }

    pub fn canonical_text(&self) -> &str {
        &self.canonical.text
    }
}

// ============================================================================
// Scores
// ============================================================================

/// Outcome status of one criterion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionStatus {
    Scored,
    /// Scored with reduced evidence
    Degraded,
    /// Excluded from totals
    Unscored,
}

/// Quality band by percentage of the criterion maximum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    Excellent,
    Good,
    Acceptable,
    Poor,
}

impl QualityBand {
    pub fn from_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            QualityBand::Excellent
        } else if percentage >= 70.0 {
            QualityBand::Good
        } else if percentage >= 50.0 {
            QualityBand::Acceptable
        } else {
            QualityBand::Poor
        }
    }
}

/// Result for one criterion
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionScore {
    pub criterion_id: CriterionKind,
    pub display_name: String,
    pub max_score: f64,
    /// `None` only when unscored; never a silent zero
    #[serde(rename = "score")]
    pub raw_score: Option<f64>,
    pub percentage: Option<f64>,
    pub quality_band: Option<QualityBand>,
    /// Triggered issue labels in rule order
    pub detected_issues: Vec<String>,
    pub feedback: String,
    pub status: CriterionStatus,
    /// Explanation for degraded or unscored status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub details: serde_json::Map<String, serde_json::Value>,
}

impl CriterionScore {
    /// Scored criterion; the raw score is clamped into `[0, max_score]` and rounded
    pub fn scored(criterion: &Criterion, raw_score: f64, feedback: impl Into<String>) -> Self {
        let raw = round_to(raw_score.clamp(0.0, criterion.max_score), 2);
        let percentage = round_to(raw / criterion.max_score * 100.0, 1);
        Self {
            criterion_id: criterion.id,
            display_name: criterion.display_name.clone(),
            max_score: criterion.max_score,
            raw_score: Some(raw),
            percentage: Some(percentage),
            quality_band: Some(QualityBand::from_percentage(percentage)),
            detected_issues: Vec::new(),
            feedback: feedback.into(),
            status: CriterionStatus::Scored,
            note: None,
            details: serde_json::Map::new(),
        }
    }

    pub fn unscored(criterion: &Criterion, note: impl Into<String>) -> Self {
        let note = note.into();
        Self {
            criterion_id: criterion.id,
            display_name: criterion.display_name.clone(),
            max_score: criterion.max_score,
            raw_score: None,
            percentage: None,
            quality_band: None,
            detected_issues: Vec::new(),
            feedback: format!("Not scored: {}", note),
            status: CriterionStatus::Unscored,
            note: Some(note),
            details: serde_json::Map::new(),
        }
    }

    /// Mark as scored with reduced evidence
    pub fn degraded(mut self, note: impl Into<String>) -> Self {
        if self.status == CriterionStatus::Scored {
            self.status = CriterionStatus::Degraded;
            self.note = Some(note.into());
        }
        self
    }

    pub fn with_issues<I, S>(mut self, issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for issue in issues {
            let issue = issue.into();
            if !self.detected_issues.contains(&issue) {
                self.detected_issues.push(issue);
            }
        }
        self
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }

    /// Counts toward totals
    pub fn is_included(&self) -> bool {
        self.status != CriterionStatus::Unscored && self.raw_score.is_some()
    }
}

/// Round half away from zero to `decimals` places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Final report of one assessment
///
/// Serializes to the external response shape: `task_info`, `stt`, `scores`
/// keyed by criterion id in declared order, totals and level.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreReport {
    pub request_id: Uuid,
    pub exam_level: ExamLevel,
    pub task_code: String,
    pub task_name: String,
    /// Declared task order
    pub criteria: Vec<CriterionScore>,
    pub overall_score: f64,
    pub max_total_score: f64,
    pub percentage: f64,
    pub level_achieved: String,
    pub degraded: bool,
    pub unscored_criteria: Vec<CriterionKind>,
    pub consensus: Option<ConsensusReport>,
    /// Validated measurements; `None` when analysis did not finish in time
    pub features: Option<AcousticFeatureSet>,
    /// Summary rendered from the per-criterion feedback
    pub overall_feedback: String,
    /// Seconds
    pub processing_time: f64,
}

impl ScoreReport {
    pub fn criterion(&self, kind: CriterionKind) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.criterion_id == kind)
    }
}

/// Acoustic-only report: pronunciation and fluency without transcription or judgment
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcousticReport {
    pub success: bool,
    pub request_id: Uuid,
    pub exam_level: ExamLevel,
    pub task_code: String,
    pub features: AcousticFeatureSet,
    #[serde(rename = "scores", serialize_with = "serialize_ordered_scores")]
    pub criteria: Vec<CriterionScore>,
    pub acoustic_score: f64,
    pub acoustic_max_score: f64,
    pub acoustic_percentage: f64,
    pub processing_time: f64,
}

impl AcousticReport {
    pub fn criterion(&self, kind: CriterionKind) -> Option<&CriterionScore> {
        self.criteria.iter().find(|c| c.criterion_id == kind)
    }
}

fn serialize_ordered_scores<S: Serializer>(scores: &[CriterionScore], serializer: S) -> Result<S::Ok, S::Error> {
    OrderedScores(scores).serialize(serializer)
}

struct OrderedScores<'a>(&'a [CriterionScore]);

impl Serialize for OrderedScores<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for score in self.0 {
            map.serialize_entry(score.criterion_id.id(), score)?;
        }
        map.end()
    }
}

struct TranscriptSnapshot<'a>(Option<&'a ConsensusReport>);

impl Serialize for TranscriptSnapshot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let available: Vec<&TranscriptResult> = self
            .0
            .map(|c| c.available().collect())
            .unwrap_or_default();
        let mut map = serializer.serialize_map(Some(available.len()))?;
        for transcript in available {
            map.serialize_entry(&transcript.provider_id, transcript.text.as_deref().unwrap_or(""))?;
        }
        map.end()
    }
}

#[derive(Serialize)]
struct TaskInfo<'a> {
    task_code: &'a str,
    name: &'a str,
    criteria_count: usize,
}

impl Serialize for ScoreReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ScoreReport", 16)?;
        state.serialize_field("success", &true)?;
        state.serialize_field("request_id", &self.request_id)?;
        state.serialize_field("exam_level", &self.exam_level)?;
        state.serialize_field(
            "task_info",
            &TaskInfo {
                task_code: &self.task_code,
                name: &self.task_name,
                criteria_count: self.criteria.len(),
            },
        )?;
        state.serialize_field("stt", &TranscriptSnapshot(self.consensus.as_ref()))?;
        state.serialize_field("scores", &OrderedScores(&self.criteria))?;
        state.serialize_field("total_score", &self.overall_score)?;
        state.serialize_field("max_total_score", &self.max_total_score)?;
        state.serialize_field("total_percentage", &self.percentage)?;
        state.serialize_field("level_achieved", &self.level_achieved)?;
        state.serialize_field("overall_feedback", &self.overall_feedback)?;
        state.serialize_field("degraded", &self.degraded)?;
        state.serialize_field("unscored_criteria", &self.unscored_criteria)?;
        state.serialize_field("consensus", &self.consensus)?;
        state.serialize_field("features", &self.features)?;
        state.serialize_field("processing_time", &self.processing_time)?;
        state.end()
    }
}

// ============================================================================
// Judgment request
// ============================================================================

/// Structured input for one judgment-backed criterion
#[derive(Debug, Clone, Serialize)]
pub struct JudgmentRequest {
    pub criterion: CriterionKind,
    pub criterion_name: String,
    pub max_score: f64,
    pub rubric: String,
    pub canonical_transcript: String,
    pub consensus: AgreementClass,
    /// (provider id, text) of every transcript that arrived
    pub transcripts: Vec<(String, String)>,
    pub reference_text: Option<String>,
    pub exam_level: ExamLevel,
    pub task_code: String,
    pub task_name: String,
    /// Set on the retry after an unparsable response
    pub strict_format: bool,
}

// ============================================================================
// Collaborator errors
// ============================================================================

/// Acoustic collaborator failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum AnalysisError {
    #[error("Audio unreadable: {0}")]
    Unreadable(String),

    #[error("Audio too short: {0}")]
    TooShort(String),

    #[error("Audio too long: {0}")]
    TooLong(String),

    #[error("Analysis timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Analysis service error: {0}")]
    Api(String),
}

impl AnalysisError {
    /// Problems with the audio itself are not worth retrying
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AnalysisError::Timeout | AnalysisError::Network(_) | AnalysisError::Api(_)
        )
    }

    pub fn is_client_audio_problem(&self) -> bool {
        matches!(
            self,
            AnalysisError::Unreadable(_) | AnalysisError::TooShort(_) | AnalysisError::TooLong(_)
        )
    }
}

/// STT provider failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SttError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Transcription timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Provider error: {0}")]
    Api(String),
}

impl SttError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SttError::RateLimited(_) | SttError::Timeout | SttError::Network(_)
        )
    }
}

/// Judge failure
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JudgeError {
    #[error("Response blocked by content filter: {0}")]
    ContentFilter(String),

    /// The judge itself reported malformed output
    #[error("Judge could not produce a parsable response: {0}")]
    Parsing(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Judgment timed out")]
    Timeout,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Judge error: {0}")]
    Api(String),
}

impl JudgeError {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            JudgeError::RateLimited(_) | JudgeError::Timeout | JudgeError::Network(_)
        )
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Acoustic analysis engine (computes measurements from audio)
///
/// # Example
/// ```rust,ignore
/// pub struct FixedAnalyzer(RawFeatures);
///
/// #[async_trait::async_trait]
/// impl AcousticAnalyzer for FixedAnalyzer {
///     fn name(&self) -> &str { "fixed" }
///
///     async fn analyze(&self, _audio: &AudioPayload) -> Result<RawFeatures, AnalysisError> {
///         Ok(self.0.clone())
///     }
/// }
/// ```
#[async_trait::async_trait]
pub trait AcousticAnalyzer: Send + Sync {
    fn name(&self) -> &str;

    /// Raw feature mapping; validated by the engine, not the analyzer
    async fn analyze(&self, audio: &AudioPayload) -> Result<RawFeatures, AnalysisError>;
}

/// Speech-to-text provider
#[async_trait::async_trait]
pub trait SpeechToText: Send + Sync {
    /// Identifier used in reports and request selectors
    fn provider_id(&self) -> &str;

    async fn transcribe(&self, audio: &AudioPayload) -> Result<Transcription, SttError>;
}

/// Language-model judge for semantic criteria
#[async_trait::async_trait]
pub trait Judge: Send + Sync {
    fn name(&self) -> &str;

    /// Raw response text; parsed by the judgment scorer
    async fn judge(&self, request: &JudgmentRequest) -> Result<String, JudgeError>;
}

/// Secondary check separating grammar errors from recognition noise
#[async_trait::async_trait]
pub trait SemanticClassifier: Send + Sync {
    /// Whether the outlier transcript is implausible given the majority wording
    /// and the optional reference text
    async fn is_implausible(&self, outlier: &str, majority: &str, reference: Option<&str>) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::{CriteriaRegistry, ExamLevel};

    fn pronunciation() -> Criterion {
        CriteriaRegistry::builtin()
            .get(ExamLevel::Advanced, "HSKKCC2")
            .unwrap()
            .criterion(CriterionKind::Pronunciation)
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_scored_clamps_and_rounds() {
        let criterion = pronunciation();
        let over = CriterionScore::scored(&criterion, 7.5, "");
        assert_eq!(over.raw_score, Some(5.0));
        assert_eq!(over.percentage, Some(100.0));

        let under = CriterionScore::scored(&criterion, -1.0, "");
        assert_eq!(under.raw_score, Some(0.0));
        assert_eq!(under.quality_band, Some(QualityBand::Poor));

        let third = CriterionScore::scored(&criterion, 5.0 / 3.0, "");
        assert_eq!(third.raw_score, Some(1.67));
        assert_eq!(third.percentage, Some(33.4));
    }

    #[test]
    fn test_unscored_has_no_score() {
        let score = CriterionScore::unscored(&pronunciation(), "timeout");
        assert_eq!(score.raw_score, None);
        assert_eq!(score.status, CriterionStatus::Unscored);
        assert_eq!(score.note.as_deref(), Some("timeout"));
        assert!(!score.is_included());
    }

    #[test]
    fn test_degraded_only_applies_to_scored() {
        let criterion = pronunciation();
        let degraded = CriterionScore::scored(&criterion, 4.0, "").degraded("no reference");
        assert_eq!(degraded.status, CriterionStatus::Degraded);
        assert!(degraded.is_included());

        let still_unscored = CriterionScore::unscored(&criterion, "failed").degraded("x");
        assert_eq!(still_unscored.status, CriterionStatus::Unscored);
    }

    #[test]
    fn test_issue_labels_deduplicated_in_order() {
        let score = CriterionScore::scored(&pronunciation(), 1.0, "")
            .with_issues(["b", "a", "b"]);
        assert_eq!(score.detected_issues, vec!["b", "a"]);
    }

    #[test]
    fn test_quality_bands() {
        assert_eq!(QualityBand::from_percentage(90.0), QualityBand::Excellent);
        assert_eq!(QualityBand::from_percentage(70.0), QualityBand::Good);
        assert_eq!(QualityBand::from_percentage(50.0), QualityBand::Acceptable);
        assert_eq!(QualityBand::from_percentage(49.9), QualityBand::Poor);
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = AudioPayload::new(vec![1u8, 2, 3], "a.wav");
        let b = AudioPayload::new(vec![1u8, 2, 3], "b.mp3");
        assert_eq!(a.content_hash(), b.content_hash());
        assert_eq!(a.content_hash().len(), 64);
        assert_eq!(b.mime_type(), "audio/mpeg");
    }

    #[test]
    fn test_error_retryability() {
        assert!(SttError::Timeout.is_retryable());
        assert!(SttError::RateLimited("429".into()).is_retryable());
        assert!(!SttError::Auth("401".into()).is_retryable());
        assert!(!JudgeError::ContentFilter("blocked".into()).is_retryable());
        assert!(!AnalysisError::TooShort("0.2s".into()).is_retryable());
        assert!(AnalysisError::Timeout.is_retryable());
    }
}
