//! Judge response parsing
//!
//! Judges are asked for a bare JSON object but routinely wrap it in Markdown fences
//! or a sentence of prose. Everything outside the outermost `{ ... }` is discarded.

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

/// Judge output that does not hold a usable score
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResponseParsingError {
    #[error("Response contains no JSON object")]
    NoJsonObject,

    #[error("Response JSON is malformed: {0}")]
    Malformed(String),

    #[error("Response has no score field")]
    MissingScore,

    #[error("Response score is not a finite number: {0}")]
    NonNumericScore(String),
}

/// Parsed judgment of one criterion
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedJudgment {
    /// Clamped into `[0, max_score]`
    pub score: f64,
    pub feedback: String,
    pub issues: Vec<String>,
    /// Score before clamping differed from `score`
    pub clamped: bool,
}

/// Extract the outermost JSON object from free text
fn json_slice(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        // Some judges quote numbers
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

/// Parse `{score, feedback, issues?}` and clamp the score
pub fn parse_response(raw: &str, max_score: f64) -> Result<ParsedJudgment, ResponseParsingError> {
    let slice = json_slice(raw).ok_or(ResponseParsingError::NoJsonObject)?;
    let json: Value =
        serde_json::from_str(slice).map_err(|e| ResponseParsingError::Malformed(e.to_string()))?;

    let score_value = json.get("score").ok_or(ResponseParsingError::MissingScore)?;
    let score = numeric(score_value)
        .filter(|s| s.is_finite())
        .ok_or_else(|| ResponseParsingError::NonNumericScore(score_value.to_string()))?;

    let clamped_score = score.clamp(0.0, max_score);
    let clamped = clamped_score != score;
    if clamped {
        warn!(score, max_score, "Judge score outside range, clamped");
    }

    let feedback = json
        .get("feedback")
        .and_then(Value::as_str)
        .map(str::trim)
        .unwrap_or_default()
        .to_string();

    let issues = json
        .get("issues")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().map(str::to_string))
                .filter(|item| !item.trim().is_empty())
                .collect()
        })
        .unwrap_or_default();

    Ok(ParsedJudgment {
        score: clamped_score,
        feedback,
        issues,
        clamped,
    })
}
