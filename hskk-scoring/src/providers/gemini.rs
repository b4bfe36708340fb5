//! Gemini clients
//!
//! Both use `POST {base}/models/{model}:generateContent`. Transcription sends the
//! audio inline as base64; the judge asks for a JSON response.

use super::{
    http_client, judge_status_error, judge_transport_error, stt_status_error, stt_transport_error,
};
use crate::judgment::prompt;
use crate::types::{AudioPayload, Judge, JudgeError, JudgmentRequest, SpeechToText, SttError, Transcription};
use base64::Engine;
use hskk_common::Result;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-lite";

const TRANSCRIPTION_PROMPT: &str = "Transcribe this Chinese audio to text.
Requirements:
1. Only output what was spoken, no explanations
2. Transcribe exactly as heard, don't correct grammar or pronunciation
3. Use [...] for unclear parts";

fn endpoint(base_url: Option<&str>, model: &str) -> String {
    format!(
        "{}/models/{}:generateContent",
        base_url.unwrap_or(DEFAULT_BASE_URL).trim_end_matches('/'),
        model
    )
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Deserialize)]
struct ContentPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate
    fn candidate_text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        Some(content.parts.iter().filter_map(|p| p.text.as_deref()).collect())
    }

    /// Whether the prompt or the candidate was blocked by safety filtering
    fn blocked_reason(&self) -> Option<String> {
        if let Some(reason) = self.prompt_feedback.as_ref().and_then(|f| f.block_reason.clone()) {
            return Some(reason);
        }
        match self.candidates.first()?.finish_reason.as_deref() {
            Some(reason @ ("SAFETY" | "PROHIBITED_CONTENT" | "BLOCKLIST")) => Some(reason.to_string()),
            _ => None,
        }
    }
}

/// Shared request plumbing
struct GeminiClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl GeminiClient {
    fn new(base_url: Option<&str>, model: &str, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            http_client: http_client(timeout)?,
            endpoint: endpoint(base_url, model),
            api_key,
        })
    }

    /// Send a request; `Err` carries the status and body of a non-success reply
    async fn generate(&self, body: &Value) -> std::result::Result<(reqwest::StatusCode, String), reqwest::Error> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;
        let status = response.status();
        let text = response.text().await?;
        Ok((status, text))
    }
}

// ============================================================================
// Transcription
// ============================================================================

pub struct GeminiStt {
    id: String,
    client: GeminiClient,
}

impl GeminiStt {
    pub fn new(
        id: &str,
        base_url: Option<&str>,
        model: Option<&str>,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            client: GeminiClient::new(base_url, model.unwrap_or(DEFAULT_MODEL), api_key, timeout)?,
        })
    }
}

#[async_trait::async_trait]
impl SpeechToText for GeminiStt {
    fn provider_id(&self) -> &str {
        &self.id
    }

    async fn transcribe(&self, audio: &AudioPayload) -> std::result::Result<Transcription, SttError> {
        let body = json!({
            "contents": [{
                "parts": [
                    { "text": TRANSCRIPTION_PROMPT },
                    { "inline_data": {
                        "mime_type": audio.mime_type(),
                        "data": base64::engine::general_purpose::STANDARD.encode(&audio.bytes),
                    }},
                ]
            }],
            "generationConfig": { "temperature": 0 },
        });

        let (status, text) = self.client.generate(&body).await.map_err(stt_transport_error)?;
        if !status.is_success() {
            return Err(stt_status_error(status, &text));
        }
        let parsed: GenerateContentResponse =
            serde_json::from_str(&text).map_err(|e| SttError::Api(format!("Malformed response: {}", e)))?;
        if let Some(reason) = parsed.blocked_reason() {
            return Err(SttError::Api(format!("Transcription blocked: {}", reason)));
        }
        let transcript = parsed
            .candidate_text()
            .ok_or_else(|| SttError::Api("Response has no candidate text".to_string()))?
            .trim()
            .to_string();

        debug!(provider = %self.id, chars = transcript.chars().count(), "Transcription received");
        Ok(Transcription {
            text: transcript,
            confidence: None,
        })
    }
}

// ============================================================================
// Judge
// ============================================================================

pub struct GeminiJudge {
    id: String,
    client: GeminiClient,
}

impl GeminiJudge {
    pub fn new(
        id: &str,
        base_url: Option<&str>,
        model: &str,
        api_key: String,
        timeout: Duration,
    ) -> Result<Self> {
        Ok(Self {
            id: id.to_string(),
            client: GeminiClient::new(base_url, model, api_key, timeout)?,
        })
    }
}

#[async_trait::async_trait]
impl Judge for GeminiJudge {
    fn name(&self) -> &str {
        &self.id
    }

    async fn judge(&self, request: &JudgmentRequest) -> std::result::Result<String, JudgeError> {
        let body = json!({
            "systemInstruction": { "parts": [{ "text": prompt::system_prompt(request) }] },
            "contents": [{ "role": "user", "parts": [{ "text": prompt::user_prompt(request) }] }],
            "generationConfig": {
                "temperature": 0,
                "responseMimeType": "application/json",
            },
        });

        let (status, text) = self.client.generate(&body).await.map_err(judge_transport_error)?;
        if !status.is_success() {
            return Err(judge_status_error(status, &text));
        }
        let parsed: GenerateContentResponse = serde_json::from_str(&text)
            .map_err(|e| JudgeError::Parsing(format!("Malformed response: {}", e)))?;
        if let Some(reason) = parsed.blocked_reason() {
            return Err(JudgeError::ContentFilter(reason));
        }
        parsed
            .candidate_text()
            .ok_or_else(|| JudgeError::Parsing("Response has no candidate text".to_string()))
    }
}
