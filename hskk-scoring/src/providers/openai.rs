//! OpenAI-compatible clients
//!
//! - `OpenAiStt`: `POST {base}/audio/transcriptions` (multipart)
//! - `OpenAiJudge`: `POST {base}/chat/completions` with a JSON-object response format
//!
//! Any server implementing the same routes works by setting `base_url`.

use super::{
    http_client, judge_status_error, judge_transport_error, stt_status_error, stt_transport_error,
};
use crate::judgment::prompt;
use crate::types::{AudioPayload, Judge, JudgeError, JudgmentRequest, SpeechToText, SttError, Transcription};
use hskk_common::Result;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_STT_MODEL: &str = "whisper-1";
const TRANSCRIPTION_LANGUAGE: &str = "zh";

fn endpoint(base_url: Option<&str>, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/'),
        path
    )
}

// ============================================================================
// Transcription
// ============================================================================

/// `response_format=json` transcription reply
#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

pub struct OpenAiStt {
    id: String,
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiStt {
    pub fn new(
        id: &str,
        base_url: Option<&str>,
        model: Option<&str>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            http_client: http_client(timeout)?,
            endpoint: endpoint(base_url, "audio/transcriptions"),
            model: model.unwrap_or(DEFAULT_STT_MODEL).to_string(),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl SpeechToText for OpenAiStt {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn transcribe(&self, audio: &AudioPayload) -> std::result::Result<Transcription, SttError> {
        let part = Part::bytes(audio.bytes.to_vec())
            .file_name(audio.filename.clone())
            .mime_str(audio.mime_type())
            .map_err(|e| SttError::Api(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", self.model.clone())
            .text("language", TRANSCRIPTION_LANGUAGE)
            .text("temperature", "0")
            .text("response_format", "json");

        let mut request = self.http_client.post(&self.endpoint).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(stt_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(stt_transport_error)?;
        if !status.is_success() {
            return Err(stt_status_error(status, &body));
        }

        let parsed: TranscriptionResponse =
            serde_json::from_str(&body).map_err(|e| SttError::Api(format!("Malformed response: {}", e)))?;
        let text = parsed.text.trim().to_string();

        debug!(provider = %self.id, chars = text.chars().count(), "Transcription received");
        Ok(Transcription {
            text,
            confidence: None,
        })
    }
}

// ============================================================================
// Judge
// ============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

pub struct OpenAiJudge {
    id: String,
    http_client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiJudge {
    pub fn new(
        id: &str,
        base_url: Option<&str>,
        model: &str,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            http_client: http_client(timeout)?,
            endpoint: endpoint(base_url, "chat/completions"),
            model: model.to_string(),
            api_key,
        })
    }

    fn body(&self, request: &JudgmentRequest) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": prompt::system_prompt(request) },
                { "role": "user", "content": prompt::user_prompt(request) },
            ],
            "temperature": 0,
            "response_format": { "type": "json_object" },
        })
    }
}

/// Message content of the first choice, or why there is none
fn completion_content(completion: ChatCompletion) -> std::result::Result<String, JudgeError> {
    let choice = completion
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| JudgeError::Parsing("Completion response has no choices".to_string()))?;
    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(JudgeError::ContentFilter("completion stopped by content filter".to_string()));
    }
    if let Some(refusal) = choice.message.refusal {
        return Err(JudgeError::ContentFilter(refusal));
    }
    choice
        .message
        .content
        .ok_or_else(|| JudgeError::Parsing("Failed to parse content from completion response".to_string()))
}

#[async_trait::async_trait]
impl Judge for OpenAiJudge {
    fn name(&self) -> &str {
        &self.id
    }

    async fn judge(&self, request: &JudgmentRequest) -> std::result::Result<String, JudgeError> {
        let mut http = self.http_client.post(&self.endpoint).json(&self.body(request));
        if let Some(ref key) = self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http.send().await.map_err(judge_transport_error)?;
        let status = response.status();
        let body = response.text().await.map_err(judge_transport_error)?;
        if !status.is_success() {
            return Err(judge_status_error(status, &body));
        }

        let completion: ChatCompletion = serde_json::from_str(&body)
            .map_err(|e| JudgeError::Parsing(format!("Malformed completion response: {}", e)))?;
        completion_content(completion)
    }
}
