//! HTTP collaborator clients
//!
//! Concrete implementations of the collaborator traits over HTTP:
//! - `acoustic`: acoustic-analysis sidecar
//! - `openai`: OpenAI-compatible transcription and chat-completion judge
//!   (also any self-hosted server speaking the same API, e.g. a FunASR gateway)
//! - `gemini`: Gemini `generateContent` transcription and judge

pub mod acoustic;
pub mod gemini;
pub mod openai;

use crate::config::ApiKeys;
use crate::types::{JudgeError, SttError};
use hskk_common::config::{AcousticConfig, JudgeConfig, SttProviderConfig};
use hskk_common::{Error, Result};
use reqwest::StatusCode;
use std::sync::Arc;
use std::time::Duration;

pub use acoustic::SidecarAnalyzer;
pub use gemini::{GeminiJudge, GeminiStt};
pub use openai::{OpenAiJudge, OpenAiStt};

const USER_AGENT: &str = concat!("hskk-scoring/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client builder
pub(crate) fn http_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| Error::Internal(format!("Failed to build HTTP client: {}", e)))
}

/// Truncated response body for error messages
pub(crate) fn snippet(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}

pub(crate) fn stt_status_error(status: StatusCode, body: &str) -> SttError {
    let detail = format!("HTTP {}: {}", status.as_u16(), snippet(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => SttError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => SttError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SttError::Timeout,
        s if s.is_server_error() => SttError::Network(detail),
        _ => SttError::Api(detail),
    }
}

pub(crate) fn stt_transport_error(err: reqwest::Error) -> SttError {
    if err.is_timeout() {
        SttError::Timeout
    } else {
        SttError::Network(err.to_string())
    }
}

pub(crate) fn judge_status_error(status: StatusCode, body: &str) -> JudgeError {
    let detail = format!("HTTP {}: {}", status.as_u16(), snippet(body));
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => JudgeError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => JudgeError::RateLimited(detail),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => JudgeError::Timeout,
        s if s.is_server_error() => JudgeError::Network(detail),
        _ if body.contains("content_filter") || body.contains("content_policy") => {
            JudgeError::ContentFilter(detail)
        }
        _ => JudgeError::Api(detail),
    }
}

pub(crate) fn judge_transport_error(err: reqwest::Error) -> JudgeError {
    if err.is_timeout() {
        JudgeError::Timeout
    } else {
        JudgeError::Network(err.to_string())
    }
}

/// Build the acoustic sidecar client
pub fn build_analyzer(config: &AcousticConfig) -> Result<SidecarAnalyzer> {
    SidecarAnalyzer::new(&config.url, Duration::from_millis(config.timeout_ms))
}

/// Build one STT provider from its `[[stt]]` entry
pub fn build_stt(
    config: &SttProviderConfig,
    keys: &ApiKeys,
    default_timeout: Duration,
) -> Result<Arc<dyn crate::types::SpeechToText>> {
    let timeout = config
        .timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(default_timeout);
    match config.kind.as_str() {
        "openai" => {
            let key = keys.key_for("openai", config.api_key.as_deref());
            Ok(Arc::new(OpenAiStt::new(
                &config.id,
                config.base_url.as_deref(),
                config.model.as_deref(),
                key,
                timeout,
            )?))
        }
        "gemini" => {
            let key = keys.key_for("gemini", config.api_key.as_deref()).ok_or_else(|| {
                Error::Config(format!("STT provider '{}' needs a Gemini API key", config.id))
            })?;
            Ok(Arc::new(GeminiStt::new(
                &config.id,
                config.base_url.as_deref(),
                config.model.as_deref(),
                key,
                timeout,
            )?))
        }
        other => Err(Error::Config(format!(
            "STT provider '{}' has unknown kind '{}'",
            config.id, other
        ))),
    }
}

/// Build the judge from its `[judge]` entry
pub fn build_judge(
    config: &JudgeConfig,
    keys: &ApiKeys,
    timeout: Duration,
) -> Result<Arc<dyn crate::types::Judge>> {
    match config.kind.as_str() {
        "openai" => {
            let key = keys.key_for("openai", config.api_key.as_deref());
            Ok(Arc::new(OpenAiJudge::new(
                &config.id,
                config.base_url.as_deref(),
                &config.model,
                key,
                timeout,
            )?))
        }
        "gemini" => {
            let key = keys.key_for("gemini", config.api_key.as_deref()).ok_or_else(|| {
                Error::Config(format!("Judge '{}' needs a Gemini API key", config.id))
            })?;
            Ok(Arc::new(GeminiJudge::new(
                &config.id,
                config.base_url.as_deref(),
                &config.model,
                key,
                timeout,
            )?))
        }
        other => Err(Error::Config(format!(
            "Judge '{}' has unknown kind '{}'",
            config.id, other
        ))),
    }
}
