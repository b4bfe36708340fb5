//! hskk-scoring library interface
//!
//! Scores one HSKK spoken answer against its task's criteria. Pronunciation and
//! fluency come from acoustic measurements; the remaining criteria are judged by
//! a language model over a transcript agreed on by several STT providers.
//!
//! Exposes the engine for embedding and integration testing; the binary wraps
//! it in a small HTTP service.

pub mod aggregate;
pub mod api;
pub mod cache;
pub mod config;
pub mod consensus;
pub mod criteria;
pub mod error;
pub mod events;
pub mod intake;
pub mod judgment;
pub mod orchestrator;
pub mod providers;
pub mod rubric;
pub mod types;

#[cfg(test)]
pub mod mock;

pub use crate::error::{ApiError, ApiResult, ScoringError};
pub use crate::orchestrator::{AssessmentRequest, Orchestrator};

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Request body cap for both multipart uploads and base64 JSON bodies
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Orchestrator>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(engine: Orchestrator) -> Self {
        Self {
            engine: Arc::new(engine),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::health_routes())
        .merge(api::task_routes())
        .merge(api::assessment_routes())
        .merge(api::acoustic_routes())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
