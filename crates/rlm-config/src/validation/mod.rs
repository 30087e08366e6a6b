//! Full configuration validation.
//!
//! Validates all numeric ranges. Each section has its own check function;
//! this orchestrator calls them all and collects errors into a single
//! `ConfigError`.

mod helpers;

#[cfg(test)]
mod tests;

use crate::schema::RlmConfig;
use helpers::{validate_range, validate_range_f64, validate_range_u64};
use rlm_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &RlmConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_engine(&mut errors, config);
    validate_sub_query(&mut errors, config);
    validate_sandbox(&mut errors, config);
    validate_model(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

fn validate_engine(errors: &mut Vec<String>, config: &RlmConfig) {
    let e = &config.engine;
    validate_range(errors, "engine.max_steps", e.max_steps, 1, 200);
    validate_range(
        errors,
        "engine.history_preview_chars",
        e.history_preview_chars,
        100,
        1_000_000,
    );
}

fn validate_sub_query(errors: &mut Vec<String>, config: &RlmConfig) {
    let s = &config.sub_query;
    validate_range(errors, "sub_query.max_calls", s.max_calls, 1, 10_000);
    validate_range(
        errors,
        "sub_query.max_context_chars",
        s.max_context_chars,
        100,
        10_000_000,
    );
    validate_range(errors, "sub_query.batch_concurrency", s.batch_concurrency, 1, 64);
    validate_range_f64(
        errors,
        "sub_query.high_water_fraction",
        s.high_water_fraction,
        0.0,
        1.0,
    );
}

fn validate_sandbox(errors: &mut Vec<String>, config: &RlmConfig) {
    let s = &config.sandbox;
    validate_range_u64(errors, "sandbox.exec_timeout_ms", s.exec_timeout_ms, 100, 3_600_000);
    validate_range(errors, "sandbox.memory_limit_mb", s.memory_limit_mb, 16, 4096);
    validate_range(errors, "sandbox.max_stack_kb", s.max_stack_kb, 64, 65_536);
    validate_range(
        errors,
        "sandbox.max_output_chars",
        s.max_output_chars,
        100,
        10_000_000,
    );
}

fn validate_model(errors: &mut Vec<String>, config: &RlmConfig) {
    let m = &config.model;
    if m.model.trim().is_empty() {
        errors.push("model.model must not be empty".into());
    }
    if let Some(name) = &m.sub_query_model {
        if name.trim().is_empty() {
            errors.push("model.sub_query_model must not be empty when set".into());
        }
    }
    validate_range(errors, "model.max_tokens", m.max_tokens, 1, 64_000);
    validate_range_f64(errors, "model.temperature", m.temperature, 0.0, 1.0);
    validate_range(
        errors,
        "model.request_timeout_secs",
        m.request_timeout_secs,
        1,
        3600,
    );
}
