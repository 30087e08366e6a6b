//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::RlmConfig;
use std::path::Path;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_rlm_config.toml"));
    let err = result.unwrap_err();
    assert!(matches!(err, rlm_common::ConfigError::FileNotFound(_)));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[engine]
max_steps = 8

[sub_query]
max_calls = 12
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.engine.max_steps, 8);
    assert_eq!(config.sub_query.max_calls, 12);
    // Defaults preserved
    assert_eq!(config.sub_query.batch_concurrency, 8);
    assert_eq!(config.sandbox.exec_timeout_ms, 180_000);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, rlm_common::ConfigError::ParseError(_)));
}

#[test]
fn load_out_of_range_returns_validation_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[engine]\nmax_steps = 0\n").unwrap();

    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, rlm_common::ConfigError::ValidationError(_)));
}

#[test]
fn create_default_config_writes_loadable_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("config.toml");
    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config, RlmConfig::default());
}

#[test]
fn default_config_path_ends_with_rlm_config() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("rlm/config.toml"));
    }
}
