//! Configuration resolution tests
//!
//! Tests touching HSKK_* environment variables run under `#[serial]`.

use std::io::Write;

use hskk_common::config::{load_bootstrap_config, load_toml_config, TomlConfig, CONFIG_ENV_VAR};
use hskk_scoring::config::{build_engine, is_valid_key, ApiKeys, GEMINI_KEY_ENV, OPENAI_KEY_ENV};
use serial_test::serial;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{}", content).unwrap();
    file
}

#[test]
fn test_is_valid_key() {
    assert!(is_valid_key("sk-123"));
    assert!(!is_valid_key(""));
    assert!(!is_valid_key(" \t\n"));
}

#[test]
#[serial]
fn test_keys_from_env() {
    std::env::set_var(OPENAI_KEY_ENV, "sk-env");
    std::env::remove_var(GEMINI_KEY_ENV);

    let keys = ApiKeys::from_env();
    assert_eq!(keys.key_for("openai", Some("sk-toml")).as_deref(), Some("sk-env"));
    assert_eq!(keys.key_for("gemini", Some("g-toml")).as_deref(), Some("g-toml"));

    std::env::remove_var(OPENAI_KEY_ENV);
}

#[test]
#[serial]
fn test_gemini_provider_accepts_env_key() {
    std::env::set_var(GEMINI_KEY_ENV, "g-env");
    let file = write_config(
        r#"
        [[stt]]
        id = "gemini"
        kind = "gemini"

        [judge]
        id = "gemini-judge"
        kind = "gemini"
        model = "gemini-2.5-flash-lite"
        "#,
    );

    let config = load_toml_config(file.path()).unwrap();
    let engine = build_engine(&config, &ApiKeys::from_env()).unwrap();
    assert_eq!(engine.stt_provider_ids(), vec!["gemini"]);
    assert_eq!(engine.default_judge(), "gemini-judge");

    std::env::remove_var(GEMINI_KEY_ENV);
    assert!(build_engine(&config, &ApiKeys::from_env()).is_err());
}

#[test]
#[serial]
fn test_bootstrap_uses_env_path() {
    let file = write_config(
        r#"
        [server]
        port = 6100

        [scoring]
        consensus_threshold = 0.9
        consensus_quorum = 2
        "#,
    );
    std::env::set_var(CONFIG_ENV_VAR, file.path());

    let config = load_bootstrap_config(None).unwrap();
    assert_eq!(config.server.port, 6100);
    assert_eq!(config.scoring.consensus_quorum, Some(2));

    std::env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_bootstrap_explicit_missing_file_is_error() {
    std::env::remove_var(CONFIG_ENV_VAR);
    let dir = tempfile::tempdir().unwrap();
    assert!(load_bootstrap_config(Some(&dir.path().join("missing.toml"))).is_err());
}

#[test]
fn test_tasks_file_replaces_builtin_table() {
    let tasks = write_config(
        r#"
        [[tasks]]
        exam_level = "advanced"
        task_code = "HSKKCC9"
        name = "Kể chuyện"
        reference_text = "从前有一座山"

        [[tasks.criteria]]
        id = "task_achievement"
        max_score = 6.0
        requires_reference = true

        [[tasks.criteria]]
        id = "pronunciation"
        max_score = 4.0
        "#,
    );

    let mut config = TomlConfig::default();
    config.scoring.tasks_file = Some(tasks.path().to_path_buf());
    let engine = build_engine(&config, &ApiKeys::default()).unwrap();

    let registry = engine.registry();
    assert_eq!(registry.len(), 1);
    let task = registry
        .get(hskk_scoring::criteria::ExamLevel::Advanced, "hskkcc9")
        .unwrap();
    assert_eq!(task.max_total(), 10.0);
    assert_eq!(task.criteria[0].weight_within_task, 0.6);
    assert_eq!(task.reference_text.as_deref(), Some("从前有一座山"));
}

#[test]
fn test_invalid_tasks_file_fails_startup() {
    let tasks = write_config(
        r#"
        [[tasks]]
        exam_level = "103"
        task_code = "HSKKCC9"
        name = "Broken"
        criteria = []
        "#,
    );

    let mut config = TomlConfig::default();
    config.scoring.tasks_file = Some(tasks.path().to_path_buf());
    assert!(build_engine(&config, &ApiKeys::default()).is_err());
}
