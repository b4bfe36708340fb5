//! Mock collaborators for unit tests

use crate::types::{
    AcousticAnalyzer, AnalysisError, AudioPayload, Judge, JudgeError, JudgmentRequest,
    RawFeatures, SemanticClassifier, SpeechToText, SttError, Transcription,
};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Analyzer returning a fixed result after an optional delay
pub struct MockAnalyzer {
    result: Result<RawFeatures, AnalysisError>,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl MockAnalyzer {
    pub fn ok(features: RawFeatures) -> Self {
        Self {
            result: Ok(features),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(error: AnalysisError) -> Self {
        Self {
            result: Err(error),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl AcousticAnalyzer for MockAnalyzer {
    fn name(&self) -> &str {
        "mock-analyzer"
    }

    async fn analyze(&self, _audio: &AudioPayload) -> Result<RawFeatures, AnalysisError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

/// STT provider returning a fixed result after an optional delay
pub struct MockStt {
    id: String,
    result: Result<String, SttError>,
    delay: Duration,
}

impl MockStt {
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

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl SpeechToText for MockStt {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn transcribe(&self, _audio: &AudioPayload) -> Result<Transcription, SttError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone().map(|text| Transcription {
            text,
            confidence: None,
        })
    }
}

/// Judge replaying scripted responses; the last one repeats
pub struct MockJudge {
    script: Mutex<VecDeque<Result<String, JudgeError>>>,
    last: Result<String, JudgeError>,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub requests: Arc<Mutex<Vec<JudgmentRequest>>>,
}

impl MockJudge {
    pub fn scripted(script: Vec<Result<String, JudgeError>>) -> Self {
        let last = script
            .last()
            .cloned()
            .unwrap_or_else(|| Err(JudgeError::Api("empty script".to_string())));
        Self {
            script: Mutex::new(script.into()),
            last,
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Always answers with the given score
    pub fn scoring(score: f64) -> Self {
        Self::scripted(vec![Ok(format!(
            r#"{{"score": {}, "feedback": "Good work.", "issues": []}}"#,
            score
        ))])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait::async_trait]
impl Judge for MockJudge {
    fn name(&self) -> &str {
        "mock-judge"
    }

    async fn judge(&self, request: &JudgmentRequest) -> Result<String, JudgeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let next = self.script.lock().unwrap().pop_front();
        next.unwrap_or_else(|| self.last.clone())
    }
}

/// Classifier with a fixed verdict
pub struct FixedClassifier(pub bool);

#[async_trait::async_trait]
impl SemanticClassifier for FixedClassifier {
    async fn is_implausible(&self, _outlier: &str, _majority: &str, _reference: Option<&str>) -> bool {
        self.0
    }
}
