//! Configuration resolution for hskk-scoring
//!
//! Turns the TOML bootstrap configuration into a ready `Orchestrator`.
//! API keys resolve with ENV → TOML priority.

use crate::consensus::{ProviderSlot, ReferenceIntentClassifier, TranscriptAggregator};
use crate::criteria::CriteriaRegistry;
use crate::judgment::JudgmentScorer;
use crate::orchestrator::{Orchestrator, OrchestratorSettings};
use crate::providers;
use crate::rubric::{PronunciationPolicy, RubricScorer};
use hskk_common::config::{JudgeConfig, TomlConfig};
use hskk_common::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const OPENAI_KEY_ENV: &str = "HSKK_OPENAI_API_KEY";
pub const GEMINI_KEY_ENV: &str = "HSKK_GEMINI_API_KEY";

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Resolve one API key
///
/// **Priority:** ENV → TOML
pub fn resolve_api_key(label: &str, env_key: Option<&str>, toml_key: Option<&str>) -> Option<String> {
    let env_key = env_key.filter(|k| is_valid_key(k));
    let toml_key = toml_key.filter(|k| is_valid_key(k));

    match (env_key, toml_key) {
        (Some(env), Some(toml)) => {
            if env != toml {
                warn!(
                    "{} API key found in environment and TOML with different values. Using environment (highest priority).",
                    label
                );
            }
            info!("{} API key loaded from environment variable", label);
            Some(env.to_string())
        }
        (Some(env), None) => {
            info!("{} API key loaded from environment variable", label);
            Some(env.to_string())
        }
        (None, Some(toml)) => {
            info!("{} API key loaded from TOML config", label);
            Some(toml.to_string())
        }
        (None, None) => None,
    }
}

/// API keys taken from the environment at startup
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    pub openai: Option<String>,
    pub gemini: Option<String>,
}

impl ApiKeys {
    pub fn from_env() -> Self {
        Self {
            openai: std::env::var(OPENAI_KEY_ENV).ok(),
            gemini: std::env::var(GEMINI_KEY_ENV).ok(),
        }
    }

    /// Key for a provider kind, environment first, then the entry's TOML key
    pub fn key_for(&self, kind: &str, toml_key: Option<&str>) -> Option<String> {
        match kind {
            "openai" => resolve_api_key("OpenAI", self.openai.as_deref(), toml_key),
            "gemini" => resolve_api_key("Gemini", self.gemini.as_deref(), toml_key),
            _ => toml_key.filter(|k| is_valid_key(k)).map(str::to_string),
        }
    }
}

/// Task table: the configured tasks file, or the built-in table
pub fn load_registry(config: &TomlConfig) -> Result<CriteriaRegistry> {
    match &config.scoring.tasks_file {
        Some(path) => CriteriaRegistry::from_file(path),
        None => Ok(CriteriaRegistry::builtin()),
    }
}

/// Build the scoring engine from configuration
pub fn build_engine(config: &TomlConfig, keys: &ApiKeys) -> Result<Orchestrator> {
    let scoring = &config.scoring;

    if !(0.0..=1.0).contains(&scoring.consensus_threshold) {
        return Err(Error::Config(format!(
            "scoring.consensus_threshold must be within [0, 1], got {}",
            scoring.consensus_threshold
        )));
    }
    let policy: PronunciationPolicy = scoring.pronunciation_policy.parse().map_err(Error::Config)?;

    let registry = Arc::new(load_registry(config)?);

    let transcription_timeout = Duration::from_millis(scoring.transcription_timeout_ms);
    let mut slots = Vec::with_capacity(config.stt.len());
    for entry in &config.stt {
        if slots.iter().any(|s: &ProviderSlot| s.id() == entry.id) {
            return Err(Error::Config(format!("STT provider id '{}' declared twice", entry.id)));
        }
        let provider = providers::build_stt(entry, keys, transcription_timeout)?;
        let timeout = entry
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(transcription_timeout);
        slots.push(ProviderSlot::new(provider, timeout));
    }
    let transcripts = TranscriptAggregator::new(slots, Arc::new(ReferenceIntentClassifier))
        .with_threshold(scoring.consensus_threshold)
        .with_quorum(scoring.consensus_quorum);

    let judge_config = config.judge.clone().unwrap_or_else(JudgeConfig::default);
    let judgment_timeout = Duration::from_millis(scoring.judgment_timeout_ms);
    let judge = providers::build_judge(&judge_config, keys, judgment_timeout)?;
    let judge = JudgmentScorer::new(judge, judgment_timeout, scoring.judgment_retries);

    let analyzer = Arc::new(providers::build_analyzer(&config.acoustic)?);

    let mut engine = Orchestrator::new(registry, analyzer, transcripts, judge_config.id.clone(), judge)
        .with_rubric(RubricScorer::new(policy))
        .with_settings(OrchestratorSettings {
            request_deadline: Duration::from_millis(scoring.request_deadline_ms),
            acoustic_timeout: Duration::from_millis(config.acoustic.timeout_ms),
        });
    if config.acoustic.cache_capacity > 0 {
        engine = engine.with_feature_cache(config.acoustic.cache_capacity);
    }

    info!(
        tasks = engine.registry().len(),
        stt = ?engine.stt_provider_ids(),
        judge = %judge_config.id,
        judge_model = %judge_config.model,
        pronunciation_policy = policy.as_str(),
        "Scoring engine configured"
    );
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_wins_over_toml() {
        assert_eq!(
            resolve_api_key("OpenAI", Some("env-key"), Some("toml-key")).as_deref(),
            Some("env-key")
        );
        assert_eq!(
            resolve_api_key("OpenAI", None, Some("toml-key")).as_deref(),
            Some("toml-key")
        );
        assert_eq!(
            resolve_api_key("OpenAI", Some("   "), Some("toml-key")).as_deref(),
            Some("toml-key")
        );
        assert_eq!(resolve_api_key("OpenAI", None, Some("")), None);
    }

    #[test]
    fn test_key_for_kind() {
        let keys = ApiKeys {
            openai: Some("sk-env".into()),
            gemini: None,
        };
        assert_eq!(keys.key_for("openai", None).as_deref(), Some("sk-env"));
        assert_eq!(keys.key_for("gemini", Some("g-toml")).as_deref(), Some("g-toml"));
        assert_eq!(keys.key_for("gemini", None), None);
    }

    #[test]
    fn test_build_engine_from_toml() {
        let config: TomlConfig = toml::from_str(
            r#"
            [scoring]
            pronunciation_policy = "cumulative"

            [[stt]]
            id = "whisper"
            kind = "openai"

            [[stt]]
            id = "funasr"
            kind = "openai"
            base_url = "http://127.0.0.1:10095/v1"
            "#,
        )
        .unwrap();
        let engine = build_engine(&config, &ApiKeys::default()).unwrap();
        assert_eq!(engine.stt_provider_ids(), vec!["whisper", "funasr"]);
        assert_eq!(engine.default_judge(), "openai");
        assert_eq!(engine.registry().len(), 9);
    }

    #[test]
    fn test_build_engine_rejects_bad_settings() {
        let mut config = TomlConfig::default();
        config.scoring.pronunciation_policy = "average".into();
        assert!(matches!(build_engine(&config, &ApiKeys::default()), Err(Error::Config(_))));

        let mut config = TomlConfig::default();
        config.scoring.consensus_threshold = 1.5;
        assert!(build_engine(&config, &ApiKeys::default()).is_err());

        let config: TomlConfig = toml::from_str(
            r#"
            [[stt]]
            id = "gemini"
            kind = "gemini"
            "#,
        )
        .unwrap();
        // Gemini without any key
        assert!(build_engine(&config, &ApiKeys::default()).is_err());
    }
}
