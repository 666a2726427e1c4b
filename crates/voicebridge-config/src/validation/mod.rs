//! Full configuration validation.
//!
//! Each section is range-checked and every violation is collected into a
//! single `ConfigError`.

mod helpers;


use crate::schema::BridgeConfig;
use voicebridge_common::ConfigError;

use helpers::{validate_range, validate_range_f64};

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &BridgeConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_range(
        &mut errors,
        "connection.ready_timeout_ms",
        config.connection.ready_timeout_ms,
        1_000,
        120_000,
    );
    validate_range(
        &mut errors,
        "connection.recovery_window_ms",
        config.connection.recovery_window_ms,
        100,
        60_000,
    );

    validate_range(&mut errors, "bridge.silence_ms", config.bridge.silence_ms, 20, 5_000);
    validate_range_f64(&mut errors, "bridge.gain", config.bridge.gain, 0.0, 2.0);
    validate_range_f64(&mut errors, "cues.volume", config.cues.volume, 0.0, 1.0);

    validate_range(
        &mut errors,
        "scheduler.voice_check_minutes",
        u64::from(config.scheduler.voice_check_minutes),
        1,
        1_440,
    );
    validate_range(
        &mut errors,
        "scheduler.registry_reload_minutes",
        u64::from(config.scheduler.registry_reload_minutes),
        1,
        1_440,
    );

    if config.presence.idle_text.trim().is_empty() {
        errors.push("presence.idle_text must not be empty".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
