//! Acoustic-only scoring
//!
//! POST /api/v1/assess/acoustic scores pronunciation and fluency from the
//! acoustic measurements alone, without transcription or judgment, and returns
//! them with the measurement snapshot. Takes the same bodies as /api/v1/assess;
//! transcript and judge selectors are ignored.

use axum::{
    extract::{Request, State},
    routing::post,
    Json, Router,
};
use tracing::{info, warn};

use super::assessment::read_request;
use crate::error::ApiResult;
use crate::types::AcousticReport;
use crate::AppState;

/// POST /api/v1/assess/acoustic
pub async fn assess_acoustic(
    State(state): State<AppState>,
    request: Request,
) -> ApiResult<Json<AcousticReport>> {
    let request = read_request(&state, request).await?;

    match state.engine.assess_acoustic(request).await {
        Ok(report) => {
            info!(
                request_id = %report.request_id,
                task_code = %report.task_code,
                total = report.acoustic_score,
                max = report.acoustic_max_score,
                "Acoustic assessment completed"
            );
            Ok(Json(report))
        }
        Err(e) => {
            warn!(error = %e, kind = %e.kind(), "Acoustic assessment failed");
            Err(e.into())
        }
    }
}

pub fn acoustic_routes() -> Router<AppState> {
    Router::new().route("/api/v1/assess/acoustic", post(assess_acoustic))
}
