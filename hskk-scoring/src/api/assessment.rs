//! Assessment endpoint
//!
//! POST /api/v1/assess takes the recording plus the task identity and answers
//! with the full score report or the error envelope. Two body encodings are
//! accepted:
//! - `multipart/form-data`: `audio_file` (file), `exam_level`, `task_code`,
//!   optional `reference_text`, `stt_providers` (comma-separated or repeated), `judge`
//! - JSON: `AssessRequestBody` with base64 audio

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::{header, HeaderMap},
    routing::post,
    Json, Router,
};
use axum::extract::multipart::{Field, MultipartError};
use base64::Engine;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::criteria::ExamLevel;
use crate::error::{ApiError, ApiResult};
use crate::orchestrator::AssessmentRequest;
use crate::types::{AudioPayload, ScoreReport};
use crate::AppState;

const DEFAULT_FILENAME: &str = "recording.wav";

/// POST /api/v1/assess JSON request
#[derive(Debug, Deserialize)]
pub struct AssessRequestBody {
    pub audio_base64: String,
    /// Used for the MIME type handed to collaborators
    #[serde(default)]
    pub filename: Option<String>,
    pub exam_level: ExamLevel,
    pub task_code: String,
    #[serde(default)]
    pub reference_text: Option<String>,
    #[serde(default)]
    pub stt_providers: Option<Vec<String>>,
    #[serde(default)]
    pub judge: Option<String>,
}

/// Decode base64 audio, tolerating a `data:` URL prefix
fn decode_audio(encoded: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match encoded.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => encoded,
    };
    let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|e| ApiError::BadRequest(format!("audio_base64 is not valid base64: {}", e)))
}

fn filename_or_default(filename: Option<String>) -> String {
    filename
        .filter(|f| !f.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILENAME.to_string())
}

impl AssessRequestBody {
    fn into_request(self) -> Result<AssessmentRequest, ApiError> {
        let bytes = decode_audio(&self.audio_base64)?;
        let audio = AudioPayload::new(bytes, filename_or_default(self.filename));

        let mut request = AssessmentRequest::new(audio, self.exam_level, self.task_code);
        request.reference_text = self.reference_text.filter(|r| !r.trim().is_empty());
        request.stt_providers = self.stt_providers;
        request.judge = self.judge;
        Ok(request)
    }
}

// ============================================================================
// Multipart upload
// ============================================================================

/// Fields collected from a multipart upload
#[derive(Debug, Default)]
struct AssessForm {
    audio: Option<Vec<u8>>,
    filename: Option<String>,
    exam_level: Option<String>,
    task_code: Option<String>,
    reference_text: Option<String>,
    stt_providers: Option<Vec<String>>,
    judge: Option<String>,
}

fn multipart_error(e: MultipartError) -> ApiError {
    ApiError::BadRequest(format!("Malformed multipart body: {}", e))
}

async fn field_text(field: Field<'_>) -> Result<String, ApiError> {
    field.text().await.map_err(multipart_error)
}

impl AssessForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "audio_file" | "file" => {
                    form.filename = field.file_name().map(str::to_string);
                    let bytes = field.bytes().await.map_err(multipart_error)?;
                    form.audio = Some(Vec::from(bytes));
                }
                "exam_level" => form.exam_level = Some(field_text(field).await?),
                "task_code" => form.task_code = Some(field_text(field).await?),
                "reference_text" => form.reference_text = Some(field_text(field).await?),
                "judge" => form.judge = Some(field_text(field).await?),
                "stt_providers" => {
                    let text = field_text(field).await?;
                    form.stt_providers.get_or_insert_with(Vec::new).extend(
                        text.split(',')
                            .map(str::trim)
                            .filter(|id| !id.is_empty())
                            .map(str::to_string),
                    );
                }
                other => debug!(field = other, "Ignoring unknown form field"),
            }
        }
        Ok(form)
    }

    fn into_request(self) -> Result<AssessmentRequest, ApiError> {
        let bytes = self
            .audio
            .ok_or_else(|| ApiError::BadRequest("audio_file is required".to_string()))?;
        let exam_level: ExamLevel = self
            .exam_level
            .ok_or_else(|| ApiError::BadRequest("exam_level is required".to_string()))?
            .parse()?;
        let task_code = self
            .task_code
            .ok_or_else(|| ApiError::BadRequest("task_code is required".to_string()))?;

        let audio = AudioPayload::new(bytes, filename_or_default(self.filename));
        let mut request = AssessmentRequest::new(audio, exam_level, task_code);
        request.reference_text = self.reference_text.filter(|r| !r.trim().is_empty());
        request.stt_providers = self.stt_providers;
        request.judge = self.judge.filter(|j| !j.trim().is_empty());
        Ok(request)
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
}

/// Decode an assessment request from either body encoding
pub async fn read_request(state: &AppState, request: Request) -> Result<AssessmentRequest, ApiError> {
    if is_multipart(request.headers()) {
        let multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        AssessForm::read(multipart).await?.into_request()
    } else {
        let Json(body) = Json::<AssessRequestBody>::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
        body.into_request()
    }
}

/// POST /api/v1/assess
pub async fn assess(State(state): State<AppState>, request: Request) -> ApiResult<Json<ScoreReport>> {
    let request = read_request(&state, request).await?;

    match state.engine.assess(request).await {
        Ok(report) => {
            info!(
                request_id = %report.request_id,
                task_code = %report.task_code,
                total = report.overall_score,
                max = report.max_total_score,
                degraded = report.degraded,
                "Assessment completed"
            );
            Ok(Json(report))
        }
        Err(e) => {
            warn!(error = %e, kind = %e.kind(), "Assessment failed");
            Err(e.into())
        }
    }
}

pub fn assessment_routes() -> Router<AppState> {
    Router::new().route("/api/v1/assess", post(assess))
}
