//! Tests for TOML config loading, creation, and path resolution.

use super::*;
use crate::schema::{BridgeConfig, LogLevel};
use std::path::Path;
use voicebridge_common::ConfigError;

#[test]
fn load_from_nonexistent_returns_file_not_found() {
    let result = load_from_path(Path::new("/tmp/nonexistent_voicebridge_config.toml"));
    assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
}

#[test]
fn load_valid_partial_toml() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r##"
[connection]
ready_timeout_ms = 45000

[presence]
idle_text = "Quiet in here"

[logging]
level = "debug"
"##,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.connection.ready_timeout_ms, 45_000);
    assert_eq!(config.presence.idle_text, "Quiet in here");
    assert_eq!(config.logging.level, LogLevel::Debug);
    // Defaults preserved
    assert_eq!(config.connection.recovery_window_ms, 5_000);
    assert_eq!(config.bridge.silence_ms, 200);
}

#[test]
fn load_invalid_toml_returns_parse_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "this is not valid toml {{{").unwrap();

    let result = load_from_path(&path);
    assert!(matches!(result, Err(ConfigError::ParseError(_))));
}

#[test]
fn load_config_with_invalid_values_falls_back_to_default() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[bridge]
gain = 9.0
"#,
    )
    .unwrap();

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.bridge.gain, 1.0);
}

#[test]
fn create_and_load_default_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voicebridge").join("config.toml");

    create_default_config(&path).unwrap();
    assert!(path.exists());

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.scheduler.voice_check_minutes, 2);
    assert_eq!(config.cues.volume, 0.3);
}

#[test]
fn default_config_toml_is_valid() {
    let config: BridgeConfig = toml::from_str(&default_config_toml()).unwrap();
    assert_eq!(config.bridge.silence_ms, 200);
}

#[test]
fn default_config_path_is_reasonable() {
    if let Ok(path) = default_config_path() {
        let path_str = path.to_string_lossy();
        assert!(path_str.contains("voicebridge"));
        assert!(path_str.ends_with("config.toml"));
    }
}
