//! Transcript aggregator
//!
//! Calls every configured STT provider concurrently, records each one as arrived or
//! absent, and classifies how well the transcripts agree.
//!
//! # Architecture
//! - Each provider call carries its own timeout; one slow or failing provider never
//!   blocks the others.
//! - Collection stops when every provider has answered, the request deadline passes,
//!   the request is cancelled, or (with a quorum configured) enough transcripts agree.
//!   Dropping the pending futures cancels the stragglers.
//! - Collection fails only when zero providers returned a transcript.
//!
//! # Classification
//! | Available transcripts | Agreement | Class |
//! |---|---|---|
//! | fewer than 2 | n/a | `insufficient_data` |
//! | all pairs at or above threshold | full | `consistent` |
//! | all but one agree, outlier implausible | majority | `grammar_suspect` |
//! | anything else | none | `phonetic_ambiguous` |
//!
//! The canonical transcript is the highest-priority member of the majority group,
//! or the highest-priority arrival when there is no majority.

pub mod similarity;

use crate::events::EventSink;
use crate::types::{
    AgreementClass, AudioPayload, CanonicalTranscript, ConsensusReport, SemanticClassifier,
    SpeechToText, SttError, TranscriptResult,
};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default similarity at or above which two transcripts agree
pub const DEFAULT_CONSENSUS_THRESHOLD: f64 = 0.85;

/// One provider with its call timeout
#[derive(Clone)]
pub struct ProviderSlot {
    pub provider: Arc<dyn SpeechToText>,
    pub timeout: Duration,
}

impl ProviderSlot {
    pub fn new(provider: Arc<dyn SpeechToText>, timeout: Duration) -> Self {
        Self { provider, timeout }
    }

    pub fn id(&self) -> &str {
        self.provider.provider_id()
    }
}

/// A provider that did not deliver a transcript
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub provider_id: String,
    pub reason: String,
    pub retryable: bool,
}

/// Zero providers returned a transcript
#[derive(Debug, Clone, Error, PartialEq)]
#[error("No transcription provider returned a transcript ({})", describe_failures(.failures))]
pub struct TranscriptionUnavailableError {
    pub failures: Vec<ProviderFailure>,
}

impl TranscriptionUnavailableError {
    /// Worth retrying when any provider failed transiently
    pub fn is_retryable(&self) -> bool {
        self.failures.iter().any(|f| f.retryable)
    }
}

fn describe_failures(failures: &[ProviderFailure]) -> String {
    if failures.is_empty() {
        return "no providers configured".to_string();
    }
    failures
        .iter()
        .map(|f| format!("{}: {}", f.provider_id, f.reason))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Provider id in a selector that is not configured
#[derive(Debug, Clone, Error, PartialEq)]
#[error("Unknown STT provider '{0}'")]
pub struct UnknownProvider(pub String);

// ============================================================================
// Classifier
// ============================================================================

/// Default plausibility check
///
/// With reference text, the outlier is implausible when it is further from the
/// reference than the majority wording. Without reference text the majority wins.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceIntentClassifier;

#[async_trait::async_trait]
impl SemanticClassifier for ReferenceIntentClassifier {
    async fn is_implausible(&self, outlier: &str, majority: &str, reference: Option<&str>) -> bool {
        match reference {
            Some(reference) if !reference.trim().is_empty() => {
                similarity::similarity(outlier, reference) < similarity::similarity(majority, reference)
            }
            _ => true,
        }
    }
}

// ============================================================================
// Aggregator
// ============================================================================

/// Parallel transcript collection and consensus classification
#[derive(Clone)]
pub struct TranscriptAggregator {
    /// Priority order
    slots: Vec<ProviderSlot>,
    threshold: f64,
    /// Agreeing arrivals that end collection early
    quorum: Option<usize>,
    classifier: Arc<dyn SemanticClassifier>,
}

impl TranscriptAggregator {
    pub fn new(slots: Vec<ProviderSlot>, classifier: Arc<dyn SemanticClassifier>) -> Self {
        Self {
            slots,
            threshold: DEFAULT_CONSENSUS_THRESHOLD,
            quorum: None,
            classifier,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Quorums below two cannot show agreement and are raised to two
    pub fn with_quorum(mut self, quorum: Option<usize>) -> Self {
        self.quorum = quorum.map(|q| q.max(2));
        self
    }

    pub fn provider_ids(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.id().to_string()).collect()
    }

    pub fn provider_count(&self) -> usize {
        self.slots.len()
    }

    /// Restrict to the selected providers, keeping configured priority order
    pub fn subset(&self, ids: &[String]) -> Result<Self, UnknownProvider> {
        for id in ids {
            if !self.slots.iter().any(|s| s.id() == id) {
                return Err(UnknownProvider(id.clone()));
            }
        }
        let mut subset = self.clone();
        subset.slots.retain(|s| ids.iter().any(|id| id == s.id()));
        Ok(subset)
    }

    /// Collect transcripts and classify their agreement
    pub async fn collect(
        &self,
        audio: &AudioPayload,
        reference: Option<&str>,
        deadline: Instant,
        cancel: &CancellationToken,
        events: &EventSink,
    ) -> Result<ConsensusReport, TranscriptionUnavailableError> {
        let mut results: Vec<Option<TranscriptResult>> = vec![None; self.slots.len()];
        let mut failures = Vec::new();

        let mut pending: FuturesUnordered<_> = self
            .slots
            .iter()
            .enumerate()
            .map(|(idx, slot)| async move {
                let started = std::time::Instant::now();
                let outcome = match tokio::time::timeout(slot.timeout, slot.provider.transcribe(audio)).await {
                    Ok(result) => result,
                    Err(_) => Err(SttError::Timeout),
                };
                (idx, outcome, started.elapsed().as_millis() as u64)
            })
            .collect();

        let stop_reason = loop {
            tokio::select! {
                _ = cancel.cancelled() => break "cancelled",
                _ = tokio::time::sleep_until(deadline) => break "deadline exceeded",
                next = pending.next() => match next {
                    None => break "complete",
                    Some((idx, outcome, latency_ms)) => {
                        let id = self.slots[idx].id();
                        let result = match outcome {
                            Ok(transcription) => {
                                debug!(provider = id, latency_ms, "Transcript received");
                                TranscriptResult::arrived(id, transcription, latency_ms)
                            }
                            Err(e) => {
                                warn!(provider = id, error = %e, latency_ms, "Transcription failed");
                                failures.push(ProviderFailure {
                                    provider_id: id.to_string(),
                                    reason: e.to_string(),
                                    retryable: e.is_retryable(),
                                });
                                TranscriptResult::absent(id, e.to_string(), latency_ms)
                            }
                        };
                        events.transcript_finished(id, result.arrived, latency_ms);
                        results[idx] = Some(result);

                        if self.quorum_reached(&results) {
                            break "quorum reached";
                        }
                    }
                },
            }
        };
        // Dropping the set cancels any provider still in flight
        drop(pending);

        let transcripts: Vec<TranscriptResult> = results
            .into_iter()
            .zip(self.slots.iter())
            .map(|(result, slot)| {
                result.unwrap_or_else(|| {
                    debug!(provider = slot.id(), reason = stop_reason, "Provider call abandoned");
                    failures.push(ProviderFailure {
                        provider_id: slot.id().to_string(),
                        reason: stop_reason.to_string(),
                        retryable: true,
                    });
                    TranscriptResult::absent(slot.id(), format!("cancelled: {}", stop_reason), 0)
                })
            })
            .collect();

        match classify(transcripts, self.threshold, self.classifier.as_ref(), reference).await {
            Some(report) => {
                info!(
                    classification = %report.classification,
                    available = report.available_count(),
                    providers = self.slots.len(),
                    canonical = %report.canonical.provider_id,
                    "Transcript consensus resolved"
                );
                Ok(report)
            }
            None => Err(TranscriptionUnavailableError { failures }),
        }
    }

    fn quorum_reached(&self, results: &[Option<TranscriptResult>]) -> bool {
        let Some(quorum) = self.quorum else {
            return false;
        };
        let texts: Vec<&str> = results
            .iter()
            .flatten()
            .filter(|r| r.arrived)
            .map(|r| r.text.as_deref().unwrap_or(""))
            .collect();
        texts.len() >= quorum
            && texts.iter().enumerate().all(|(i, a)| {
                texts[i + 1..]
                    .iter()
                    .all(|b| similarity::similarity(a, b) >= self.threshold)
            })
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Largest group of mutually agreeing transcripts (indices ascending)
///
/// Seeds are tried in priority order and candidates are added in priority order;
/// ties keep the group found first.
fn largest_agreeing_group(matrix: &[Vec<f64>], threshold: f64) -> Vec<usize> {
    let n = matrix.len();
    let mut best: Vec<usize> = Vec::new();
    for seed in 0..n {
        let mut group = vec![seed];
        for candidate in 0..n {
            if candidate != seed && group.iter().all(|&member| matrix[candidate][member] >= threshold) {
                group.push(candidate);
            }
        }
        if group.len() > best.len() {
            group.sort_unstable();
            best = group;
        }
    }
    best
}

/// Classify agreement over provider results in priority order
///
/// Returns `None` when no transcript arrived.
pub async fn classify(
    transcripts: Vec<TranscriptResult>,
    threshold: f64,
    classifier: &dyn SemanticClassifier,
    reference: Option<&str>,
) -> Option<ConsensusReport> {
    let available: Vec<(&str, &str)> = transcripts
        .iter()
        .filter(|t| t.arrived)
        .map(|t| (t.provider_id.as_str(), t.text.as_deref().unwrap_or("")))
        .collect();
    let first = *available.first()?;

    let similarities = similarity::pairwise(&available);
    let n = available.len();

    let canonical_of = |(provider_id, text): (&str, &str)| CanonicalTranscript {
        provider_id: provider_id.to_string(),
        text: text.to_string(),
    };

    let (classification, canonical) = if n < 2 {
        (AgreementClass::InsufficientData, canonical_of(first))
    } else if similarities.iter().all(|p| p.similarity >= threshold) {
        (AgreementClass::Consistent, canonical_of(first))
    } else {
        let mut matrix = vec![vec![1.0; n]; n];
        let mut pairs = similarities.iter();
        for i in 0..n {
            for j in i + 1..n {
                let s = pairs.next().map(|p| p.similarity).unwrap_or(0.0);
                matrix[i][j] = s;
                matrix[j][i] = s;
            }
        }

        let group = largest_agreeing_group(&matrix, threshold);
        let has_majority = group.len() * 2 > n;

        if has_majority && n >= 3 && group.len() == n - 1 {
            let outlier = (0..n).find(|i| !group.contains(i)).unwrap_or(n - 1);
            let majority = available[group[0]];
            let implausible = classifier
                .is_implausible(available[outlier].1, majority.1, reference)
                .await;
            debug!(
                outlier = available[outlier].0,
                implausible, "Single divergent transcript checked"
            );
            let class = if implausible {
                AgreementClass::GrammarSuspect
            } else {
                AgreementClass::PhoneticAmbiguous
            };
            (class, canonical_of(majority))
        } else if has_majority {
            (AgreementClass::PhoneticAmbiguous, canonical_of(available[group[0]]))
        } else {
            (AgreementClass::PhoneticAmbiguous, canonical_of(first))
        }
    };

    Some(ConsensusReport {
        transcripts,
        similarities,
        classification,
        canonical,
    })
}
