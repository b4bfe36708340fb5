//! Assessment progress events
//!
//! Optional observer channel for one assessment. Emission never blocks
//! scoring: a full or closed channel drops the event.

use crate::criteria::CriterionKind;
use crate::orchestrator::AssessmentState;
use crate::types::CriterionStatus;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::trace;
use uuid::Uuid;

/// Progress of one assessment request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AssessmentEvent {
    StateChanged {
        request_id: Uuid,
        from: AssessmentState,
        to: AssessmentState,
    },
    TranscriptFinished {
        request_id: Uuid,
        provider_id: String,
        arrived: bool,
        latency_ms: u64,
    },
    CriterionFinished {
        request_id: Uuid,
        criterion: CriterionKind,
        status: CriterionStatus,
    },
}

/// Sending half bound to one request
#[derive(Debug, Clone)]
pub struct EventSink {
    request_id: Uuid,
    sender: Option<mpsc::Sender<AssessmentEvent>>,
}

impl EventSink {
    pub fn new(request_id: Uuid, sender: Option<mpsc::Sender<AssessmentEvent>>) -> Self {
        Self { request_id, sender }
    }

    /// Sink that drops everything
    pub fn disabled() -> Self {
        Self::new(Uuid::nil(), None)
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn emit(&self, event: AssessmentEvent) {
        if let Some(sender) = &self.sender {
            if let Err(e) = sender.try_send(event) {
                trace!(request_id = %self.request_id, error = %e, "Assessment event dropped");
            }
        }
    }

    pub fn state_changed(&self, from: AssessmentState, to: AssessmentState) {
        self.emit(AssessmentEvent::StateChanged {
            request_id: self.request_id,
            from,
            to,
        });
    }

    pub fn transcript_finished(&self, provider_id: &str, arrived: bool, latency_ms: u64) {
        self.emit(AssessmentEvent::TranscriptFinished {
            request_id: self.request_id,
            provider_id: provider_id.to_string(),
            arrived,
            latency_ms,
        });
    }

    pub fn criterion_finished(&self, criterion: CriterionKind, status: CriterionStatus) {
        self.emit(AssessmentEvent::CriterionFinished {
            request_id: self.request_id,
            criterion,
            status,
        });
    }
}
