//! Error types for hskk-scoring
//!
//! `ScoringError` is what an assessment can fail with; `ApiError` turns it (and
//! request-decoding problems) into the JSON error envelope.

use crate::consensus::{TranscriptionUnavailableError, UnknownProvider};
use crate::intake::FeatureValidationError;
use crate::types::AnalysisError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Machine-readable failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed client input, rejected before any external call
    Validation,
    /// An upstream collaborator failed
    CollaboratorUnavailable,
    /// Report produced with unscored criteria
    PartialDegradation,
    /// Nothing could be scored
    Fatal,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::CollaboratorUnavailable => "collaborator_unavailable",
            ErrorKind::PartialDegradation => "partial_degradation",
            ErrorKind::Fatal => "fatal",
            ErrorKind::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Assessment failure
#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Acoustic features rejected: {0}")]
    FeatureValidation(#[from] FeatureValidationError),

    #[error("Acoustic analysis failed: {0}")]
    AcousticUnavailable(#[from] AnalysisError),

    #[error(transparent)]
    TranscriptionUnavailable(#[from] TranscriptionUnavailableError),

    #[error("No criterion of task {task_code} could be scored")]
    NoScorableCriteria { task_code: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<UnknownProvider> for ScoringError {
    fn from(err: UnknownProvider) -> Self {
        ScoringError::Validation(err.to_string())
    }
}

impl ScoringError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScoringError::Validation(_) => ErrorKind::Validation,
            ScoringError::AcousticUnavailable(e) if e.is_client_audio_problem() => ErrorKind::Validation,
            ScoringError::AcousticUnavailable(_) => ErrorKind::CollaboratorUnavailable,
            // An outage worth retrying is reported like any other collaborator outage
            ScoringError::TranscriptionUnavailable(e) if e.is_retryable() => {
                ErrorKind::CollaboratorUnavailable
            }
            ScoringError::FeatureValidation(_)
            | ScoringError::TranscriptionUnavailable(_)
            | ScoringError::NoScorableCriteria { .. } => ErrorKind::Fatal,
            ScoringError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the same request may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            ScoringError::AcousticUnavailable(e) => e.is_retryable(),
            ScoringError::TranscriptionUnavailable(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Request body could not be decoded (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Scoring(#[from] ScoringError),

    /// hskk-common error
    #[error("Common error: {0}")]
    Common(#[from] hskk_common::Error),
}

impl ApiError {
    fn kind(&self) -> ErrorKind {
        match self {
            ApiError::BadRequest(_) => ErrorKind::Validation,
            ApiError::Scoring(e) => e.kind(),
            ApiError::Common(hskk_common::Error::InvalidInput(_)) => ErrorKind::Validation,
            ApiError::Common(_) => ErrorKind::Internal,
        }
    }

    fn is_retryable(&self) -> bool {
        match self {
            ApiError::Scoring(e) => e.is_retryable(),
            _ => false,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::CollaboratorUnavailable if self.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::CollaboratorUnavailable => StatusCode::BAD_GATEWAY,
            ErrorKind::Fatal | ErrorKind::PartialDegradation => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "success": false,
            "error_message": self.to_string(),
            "error_kind": self.kind(),
            "retryable": self.is_retryable(),
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::ProviderFailure;

    #[test]
    fn test_kinds_and_status_codes() {
        let validation = ApiError::from(ScoringError::Validation("empty audio".into()));
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let too_short = ApiError::from(ScoringError::from(AnalysisError::TooShort("0.1s".into())));
        assert_eq!(too_short.kind(), ErrorKind::Validation);

        let down = ApiError::from(ScoringError::from(AnalysisError::Network("refused".into())));
        assert_eq!(down.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(down.is_retryable());

        let broken = ApiError::from(ScoringError::from(AnalysisError::Api("bad gateway".into())));
        assert_eq!(broken.kind(), ErrorKind::CollaboratorUnavailable);

        let fatal = ApiError::from(ScoringError::NoScorableCriteria {
            task_code: "HSKKCC1".into(),
        });
        assert_eq!(fatal.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_transcription_retryability_follows_failures() {
        let err = ScoringError::from(TranscriptionUnavailableError {
            failures: vec![ProviderFailure {
                provider_id: "whisper".into(),
                reason: "Authentication failed".into(),
                retryable: false,
            }],
        });
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("whisper"));
    }

    #[test]
    fn test_collaborator_outages_share_one_classification() {
        let stt_down = ApiError::from(ScoringError::from(TranscriptionUnavailableError {
            failures: vec![
                ProviderFailure {
                    provider_id: "whisper".into(),
                    reason: "Transcription timed out".into(),
                    retryable: true,
                },
                ProviderFailure {
                    provider_id: "funasr".into(),
                    reason: "Transcription timed out".into(),
                    retryable: true,
                },
            ],
        }));
        let acoustic_down = ApiError::from(ScoringError::from(AnalysisError::Timeout));

        for err in [&stt_down, &acoustic_down] {
            assert_eq!(err.kind(), ErrorKind::CollaboratorUnavailable);
            assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
            assert!(err.is_retryable());
        }
    }

    #[test]
    fn test_mixed_outage_is_retryable_when_any_failure_is() {
        let err = ApiError::from(ScoringError::from(TranscriptionUnavailableError {
            failures: vec![
                ProviderFailure {
                    provider_id: "whisper".into(),
                    reason: "Authentication failed".into(),
                    retryable: false,
                },
                ProviderFailure {
                    provider_id: "gemini".into(),
                    reason: "Rate limited".into(),
                    retryable: true,
                },
            ],
        }));
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::CollaboratorUnavailable);
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unknown_provider_is_validation() {
        let err = ScoringError::from(UnknownProvider("deepgram".into()));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }
}
