//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Configured collaborators
#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    /// STT provider ids in priority order
    pub stt: Vec<String>,
    /// Default judge id
    pub judge: String,
    /// Every selectable judge, default first
    pub judges: Vec<String>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when no STT provider is configured
    pub status: String,
    /// Module name ("hskk-scoring")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    pub providers: ProviderSummary,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let stt = state.engine.stt_provider_ids();
    let status = if stt.is_empty() { "degraded" } else { "ok" };

    Json(HealthResponse {
        status: status.to_string(),
        module: "hskk-scoring".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        providers: ProviderSummary {
            stt,
            judge: state.engine.default_judge().to_string(),
            judges: state.engine.judge_ids(),
        },
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
