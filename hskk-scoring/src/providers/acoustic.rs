//! Acoustic-analysis sidecar client
//!
//! The sidecar computes signal measurements (pitch, voice quality, pause timing)
//! from an uploaded recording.
//!
//! `POST {url}/features` with a multipart `file` field answers
//! `{ "success": true, "features": { ... } }` or
//! `{ "success": false, "error_kind": "too_short", "error_message": "..." }`.

use super::{http_client, snippet};
use crate::types::{AcousticAnalyzer, AnalysisError, AudioPayload, RawFeatures};
use hskk_common::Result;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct SidecarResponse {
    success: bool,
    #[serde(default)]
    features: Option<RawFeatures>,
    #[serde(default)]
    error_kind: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

/// HTTP client for the acoustic sidecar
pub struct SidecarAnalyzer {
    http_client: reqwest::Client,
    endpoint: String,
}

impl SidecarAnalyzer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: http_client(timeout)?,
            endpoint: format!("{}/features", base_url.trim_end_matches('/')),
        })
    }
}

/// Map a sidecar failure report onto the analysis error taxonomy
fn sidecar_error(kind: Option<&str>, message: String) -> AnalysisError {
    match kind {
        Some("unreadable") | Some("invalid_audio") => AnalysisError::Unreadable(message),
        Some("too_short") => AnalysisError::TooShort(message),
        Some("too_long") => AnalysisError::TooLong(message),
        _ => AnalysisError::Api(message),
    }
}

#[async_trait::async_trait]
impl AcousticAnalyzer for SidecarAnalyzer {
    fn name(&self) -> &str {
        "acoustic-sidecar"
    }

    async fn analyze(&self, audio: &AudioPayload) -> std::result::Result<RawFeatures, AnalysisError> {
        let part = Part::bytes(audio.bytes.to_vec())
            .file_name(audio.filename.clone())
            .mime_str(audio.mime_type())
            .map_err(|e| AnalysisError::Api(e.to_string()))?;
        let form = Form::new().part("file", part);

        debug!(endpoint = %self.endpoint, bytes = audio.len(), "Requesting acoustic features");

        let response = self
            .http_client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::Timeout
                } else {
                    AnalysisError::Network(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| AnalysisError::Network(e.to_string()))?;

        let parsed: SidecarResponse = match serde_json::from_str(&body) {
            Ok(parsed) => parsed,
            Err(_) if !status.is_success() => {
                return Err(AnalysisError::Api(format!(
                    "HTTP {}: {}",
                    status.as_u16(),
                    snippet(&body)
                )))
            }
            Err(e) => return Err(AnalysisError::Api(format!("Malformed sidecar response: {}", e))),
        };

        if !parsed.success {
            let message = parsed
                .error_message
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
            return Err(sidecar_error(parsed.error_kind.as_deref(), message));
        }

        parsed
            .features
            .ok_or_else(|| AnalysisError::Api("Sidecar response has no features".to_string()))
    }
}
