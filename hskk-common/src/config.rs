//! Bootstrap configuration loading and config file resolution
//!
//! The TOML file is read once at startup and never written back. Every field
//! has a built-in default, so an absent file yields a runnable (if provider-less)
//! configuration.
//!
//! # Config File Priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`HSKK_CONFIG`)
//! 3. Platform config directory (`~/.config/hskk/config.toml` on Linux)
//! 4. Built-in defaults (no file)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "HSKK_CONFIG";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes to the TOML file.
#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Scoring engine deadlines and policies
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Acoustic analysis collaborator
    #[serde(default)]
    pub acoustic: AcousticConfig,

    /// Speech-to-text providers, in priority order
    #[serde(default)]
    pub stt: Vec<SttProviderConfig>,

    /// Language-model judge used for semantic criteria
    #[serde(default)]
    pub judge: Option<JudgeConfig>,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            scoring: ScoringConfig::default(),
            acoustic: AcousticConfig::default(),
            stt: Vec::new(),
            judge: None,
        }
    }
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    /// Default: 5780
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

/// Scoring engine settings
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringConfig {
    /// Overall per-request deadline
    #[serde(default = "default_request_deadline_ms")]
    pub request_deadline_ms: u64,

    /// Per-provider transcription timeout (also the transcript group deadline)
    #[serde(default = "default_transcription_timeout_ms")]
    pub transcription_timeout_ms: u64,

    /// Per-call judgment timeout
    #[serde(default = "default_judgment_timeout_ms")]
    pub judgment_timeout_ms: u64,

    /// Retries allowed per judgment criterion after the first attempt
    #[serde(default = "default_judgment_retries")]
    pub judgment_retries: u32,

    /// Pairwise similarity at or above which two transcripts agree
    #[serde(default = "default_consensus_threshold")]
    pub consensus_threshold: f64,

    /// Number of agreeing transcripts that ends collection early.
    /// Unset means wait for every provider.
    #[serde(default)]
    pub consensus_quorum: Option<usize>,

    /// `worst_tier` or `cumulative`
    #[serde(default = "default_pronunciation_policy")]
    pub pronunciation_policy: String,

    /// Optional TOML file replacing the built-in task table
    #[serde(default)]
    pub tasks_file: Option<PathBuf>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            request_deadline_ms: default_request_deadline_ms(),
            transcription_timeout_ms: default_transcription_timeout_ms(),
            judgment_timeout_ms: default_judgment_timeout_ms(),
            judgment_retries: default_judgment_retries(),
            consensus_threshold: default_consensus_threshold(),
            consensus_quorum: None,
            pronunciation_policy: default_pronunciation_policy(),
            tasks_file: None,
        }
    }
}

/// Acoustic analysis collaborator settings
#[derive(Debug, Clone, Deserialize)]
pub struct AcousticConfig {
    /// Base URL of the analysis service
    #[serde(default = "default_acoustic_url")]
    pub url: String,

    #[serde(default = "default_acoustic_timeout_ms")]
    pub timeout_ms: u64,

    /// Feature cache capacity in entries (0 disables the cache)
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for AcousticConfig {
    fn default() -> Self {
        Self {
            url: default_acoustic_url(),
            timeout_ms: default_acoustic_timeout_ms(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// One speech-to-text provider entry (`[[stt]]`)
#[derive(Debug, Clone, Deserialize)]
pub struct SttProviderConfig {
    /// Provider id used in reports and request selectors
    pub id: String,

    /// `openai` (OpenAI-compatible transcription endpoint) or `gemini`
    pub kind: String,

    #[serde(default)]
    pub model: Option<String>,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Overrides `scoring.transcription_timeout_ms` for this provider
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Judge settings (`[judge]`)
#[derive(Debug, Clone, Deserialize)]
pub struct JudgeConfig {
    #[serde(default = "default_judge_id")]
    pub id: String,

    /// `openai` (OpenAI-compatible chat completions) or `gemini`
    #[serde(default = "default_judge_kind")]
    pub kind: String,

    #[serde(default = "default_judge_model")]
    pub model: String,

    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for JudgeConfig {
    fn default() -> Self {
        Self {
            id: default_judge_id(),
            kind: default_judge_kind(),
            model: default_judge_model(),
            base_url: None,
            api_key: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_deadline_ms() -> u64 {
    90_000
}

fn default_transcription_timeout_ms() -> u64 {
    30_000
}

fn default_judgment_timeout_ms() -> u64 {
    30_000
}

fn default_judgment_retries() -> u32 {
    1
}

fn default_consensus_threshold() -> f64 {
    0.85
}

fn default_pronunciation_policy() -> String {
    "worst_tier".to_string()
}

fn default_acoustic_url() -> String {
    "http://127.0.0.1:5050".to_string()
}

fn default_acoustic_timeout_ms() -> u64 {
    60_000
}

fn default_cache_capacity() -> usize {
    256
}

fn default_judge_id() -> String {
    "openai".to_string()
}

fn default_judge_kind() -> String {
    "openai".to_string()
}

fn default_judge_model() -> String {
    "gpt-4o-mini".to_string()
}

/// Resolve the config file path
///
/// Returns `None` when no explicit path is given and no platform config file exists.
/// An explicit path (CLI or environment) is returned even if the file is missing so
/// the caller reports the error instead of silently running on defaults.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    default_config_file().filter(|path| path.exists())
}

/// Platform config file location
fn default_config_file() -> Option<PathBuf> {
    if cfg!(target_os = "linux") {
        let user_config = dirs::config_dir().map(|d| d.join("hskk").join("config.toml"));
        let system_config = PathBuf::from("/etc/hskk/config.toml");

        match user_config {
            Some(path) if path.exists() => Some(path),
            _ if system_config.exists() => Some(system_config),
            other => other,
        }
    } else {
        dirs::config_dir().map(|d| d.join("hskk").join("config.toml"))
    }
}

/// Load and parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Read config {} failed: {}", path.display(), e))
    })?;
    let config: TomlConfig = toml::from_str(&content)?;
    Ok(config)
}

/// Resolve and load the bootstrap configuration
///
/// Falls back to built-in defaults when no config file is found.
pub fn load_bootstrap_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
        Some(path) => {
            let config = load_toml_config(&path)?;
            info!("Configuration loaded from {}", path.display());
            if config.stt.is_empty() {
                warn!("No [[stt]] providers configured; every assessment will fail transcription");
            }
            Ok(config)
        }
        None => {
            info!("No configuration file found, using built-in defaults");
            Ok(TomlConfig::default())
        }
    }
}
