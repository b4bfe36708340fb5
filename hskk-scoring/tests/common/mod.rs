//! Collaborator doubles shared by the integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hskk_scoring::consensus::{ProviderSlot, ReferenceIntentClassifier, TranscriptAggregator};
use hskk_scoring::criteria::CriteriaRegistry;
use hskk_scoring::judgment::JudgmentScorer;
use hskk_scoring::types::{
    AcousticAnalyzer, AnalysisError, AudioPayload, Judge, JudgeError, JudgmentRequest, RawFeatures,
    SpeechToText, SttError, Transcription,
};
use hskk_scoring::Orchestrator;
use serde_json::{json, Value};

/// Measurements of a clean recording: excellent tiers, no fluency issue
pub fn clean_features() -> RawFeatures {
    let value = json!({
        "duration": 14.0,
        "pitch_mean": 195.0,
        "pitch_std": 30.0,
        "pitch_range": 110.0,
        "hnr_mean": 21.5,
        "jitter_local": 0.009,
        "shimmer_local": 0.045,
        "f1_mean": 600.0,
        "f2_mean": 1700.0,
        "speech_duration": 12.6,
        "pause_duration": 1.4,
        "pause_ratio": 0.1,
        "num_pauses": 2,
        "mean_pause_duration": 0.55,
        "speech_rate": 175.0,
        "articulation_rate": 190.0,
        "pitch_min": "--undefined--"
    });
    match value {
        Value::Object(map) => map,
        _ => RawFeatures::new(),
    }
}

pub struct FixedAnalyzer {
    result: Result<RawFeatures, AnalysisError>,
    delay: Duration,
    pub calls: AtomicUsize,
}

impl FixedAnalyzer {
    pub fn ok(features: RawFeatures) -> Self {
        Self {
            result: Ok(features),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl AcousticAnalyzer for FixedAnalyzer {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn analyze(&self, _audio: &AudioPayload) -> Result<RawFeatures, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.result.clone()
    }
}

pub struct FixedStt {
    id: String,
    result: Result<String, SttError>,
    delay: Duration,
}

impl FixedStt {
    pub fn ok(id: &str, text: &str) -> Self {
        Self {
            id: id.to_string(),
            result: Ok(text.to_string()),
            delay: Duration::ZERO,
        }
    }

    pub fn failing(id: &str, error: SttError) -> Self {
        Self {
            id: id.to_string(),
            result: Err(error),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl SpeechToText for FixedStt {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn transcribe(&self, _audio: &AudioPayload) -> Result<Transcription, SttError> {
        tokio::time::sleep(self.delay).await;
        self.result.clone().map(|text| Transcription {
            text,
            confidence: None,
        })
    }
}

/// Judge awarding a fixed share of every criterion's maximum
pub struct ShareJudge {
    share: f64,
    pub requests: std::sync::Mutex<Vec<JudgmentRequest>>,
}

impl ShareJudge {
    pub fn new(share: f64) -> Self {
        Self {
            share,
            requests: std::sync::Mutex::new(Vec::new()),
        }
    }
}

#[async_trait::async_trait]
impl Judge for ShareJudge {
    fn name(&self) -> &str {
        "share"
    }

    async fn judge(&self, request: &JudgmentRequest) -> Result<String, JudgeError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(format!(
            "```json\n{{\"score\": {}, \"feedback\": \"Trả lời đầy đủ\", \"issues\": []}}\n```",
            request.max_score * self.share
        ))
    }
}

/// Judge that always fails with the given error
pub struct FailingJudge(pub JudgeError);

#[async_trait::async_trait]
impl Judge for FailingJudge {
    fn name(&self) -> &str {
        "failing"
    }

    async fn judge(&self, _request: &JudgmentRequest) -> Result<String, JudgeError> {
        Err(self.0.clone())
    }
}

pub fn aggregator(providers: Vec<FixedStt>) -> TranscriptAggregator {
    let slots = providers
        .into_iter()
        .map(|p| ProviderSlot::new(Arc::new(p), Duration::from_millis(500)))
        .collect();
    TranscriptAggregator::new(slots, Arc::new(ReferenceIntentClassifier))
}

pub fn engine(analyzer: FixedAnalyzer, providers: Vec<FixedStt>, judge: Arc<dyn Judge>) -> Orchestrator {
    Orchestrator::new(
        Arc::new(CriteriaRegistry::builtin()),
        Arc::new(analyzer),
        aggregator(providers),
        "share",
        JudgmentScorer::new(judge, Duration::from_millis(500), 1),
    )
}

/// Three providers hearing the same sentence
pub fn agreeing_providers() -> Vec<FixedStt> {
    vec![
        FixedStt::ok("whisper", "我每天早上七点起床"),
        FixedStt::ok("funasr", "我每天早上七点起床。"),
        FixedStt::ok("gemini", "我每天早上七点起床"),
    ]
}

pub fn default_engine() -> Orchestrator {
    engine(
        FixedAnalyzer::ok(clean_features()),
        agreeing_providers(),
        Arc::new(ShareJudge::new(0.8)),
    )
}

pub fn audio() -> AudioPayload {
    AudioPayload::new(b"RIFF\x24\x00\x00\x00WAVEfmt ".to_vec(), "answer.wav")
}
