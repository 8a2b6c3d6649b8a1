// tests/config_tests.rs

use key_broker::{
    config::{load_config, SelectionStrategy},
    setup_configuration, AppError,
};
use secrecy::ExposeSecret;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

const ENV_VARS: [&str; 8] = [
    "GROQ_API_KEY",
    "GROQ_API_KEY2",
    "GROQ_API_KEY3",
    "OPENAI_API_KEY",
    "BROKER_STRATEGY",
    "BROKER_MAX_RETRIES",
    "BROKER_ERROR_THRESHOLD",
    "PORT",
];

/// Removes every variable the loader reads so tests start from a clean environment.
fn clear_env() {
    for name in ENV_VARS {
        std::env::remove_var(name);
    }
}

fn yaml_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
#[serial]
fn test_load_from_yaml_file() {
    clear_env();
    let file = yaml_file(
        r#"
server:
  port: 9000
keys:
  - name: primary
    api_key: gsk_primary_000000001
  - name: backup
    api_key: gsk_backup_000000002
broker:
  strategy: sticky
  error_threshold: 5
fallback:
  placeholder_enabled: false
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.server.port, 9000);
    assert_eq!(config.key_names(), vec!["primary", "backup"]);
    assert_eq!(config.broker.strategy, SelectionStrategy::Sticky);
    assert_eq!(config.broker.error_threshold, 5);
    assert_eq!(config.broker.max_retries, 3);
    assert!(!config.fallback.placeholder_enabled);
}

#[test]
#[serial]
fn test_environment_only_configuration() {
    clear_env();
    std::env::set_var("GROQ_API_KEY", "gsk_env_one_00000001");
    std::env::set_var("GROQ_API_KEY2", "gsk_env_two_00000002");
    std::env::set_var("OPENAI_API_KEY", "sk-openai-00000003");
    std::env::set_var("BROKER_STRATEGY", "sticky");

    let missing = PathBuf::from("/nonexistent/key-broker/config.yaml");
    let config = setup_configuration(Some(missing)).unwrap();
    clear_env();

    assert_eq!(config.key_names(), vec!["GROQ_API_KEY", "GROQ_API_KEY2"]);
    assert_eq!(config.broker.strategy, SelectionStrategy::Sticky);
    let secondary = config.fallback.secondary.unwrap();
    assert_eq!(
        secondary.api_key.unwrap().expose_secret(),
        "sk-openai-00000003"
    );
}

#[test]
#[serial]
fn test_environment_keys_extend_file_keys() {
    clear_env();
    std::env::set_var("GROQ_API_KEY", "gsk_env_one_00000001");
    let file = yaml_file(
        r#"
keys:
  - name: from-file
    api_key: gsk_file_0000000001
"#,
    );

    let config = load_config(file.path()).unwrap();
    clear_env();

    assert_eq!(config.key_names(), vec!["from-file", "GROQ_API_KEY"]);
}

#[test]
#[serial]
fn test_invalid_yaml_is_a_parse_error() {
    clear_env();
    let file = yaml_file("keys: [this is: not valid");

    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, AppError::ConfigParse { .. }), "{err:?}");
}

#[test]
#[serial]
fn test_no_keys_fails_validation() {
    clear_env();
    let file = yaml_file("server:\n  port: 8081\n");

    let err = load_config(file.path()).unwrap_err();

    assert!(matches!(err, AppError::ConfigValidation { .. }), "{err:?}");
}

#[test]
#[serial]
fn test_inverted_backoff_fails_validation() {
    clear_env();
    let file = yaml_file(
        r#"
keys:
  - name: primary
    api_key: gsk_primary_000000001
broker:
  base_backoff_ms: 5000
  max_backoff_ms: 100
"#,
    );

    let err = load_config(file.path()).unwrap_err();

    assert!(err.to_string().contains("base_backoff_ms"), "{err}");
}

#[test]
#[serial]
fn test_bad_upstream_scheme_fails_validation() {
    clear_env();
    let file = yaml_file(
        r#"
keys:
  - name: primary
    api_key: gsk_primary_000000001
upstream:
  base_url: ftp://example.com/v1
"#,
    );

    assert!(load_config(file.path()).is_err());
}
