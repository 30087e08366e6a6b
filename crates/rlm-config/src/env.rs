//! Environment variable overrides applied on top of the file config.

use crate::schema::RlmConfig;
use rlm_common::ConfigError;
use tracing::debug;

pub const ENV_MAX_STEPS: &str = "RLM_MAX_STEPS";
pub const ENV_MAX_SUB_QUERIES: &str = "RLM_MAX_SUB_QUERIES";
pub const ENV_EXEC_TIMEOUT_MS: &str = "RLM_EXEC_TIMEOUT_MS";

/// Apply `RLM_*` overrides from the process environment.
pub fn apply_env_overrides(config: &mut RlmConfig) -> Result<(), ConfigError> {
    apply_overrides_from(config, |key| std::env::var(key).ok())
}

/// Apply overrides using `lookup` to resolve variable names.
pub fn apply_overrides_from<F>(config: &mut RlmConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup(ENV_MAX_STEPS) {
        config.engine.max_steps = parse_var(ENV_MAX_STEPS, &v)?;
        debug!(max_steps = config.engine.max_steps, "env override");
    }
    if let Some(v) = lookup(ENV_MAX_SUB_QUERIES) {
        config.sub_query.max_calls = parse_var(ENV_MAX_SUB_QUERIES, &v)?;
        debug!(max_calls = config.sub_query.max_calls, "env override");
    }
    if let Some(v) = lookup(ENV_EXEC_TIMEOUT_MS) {
        config.sandbox.exec_timeout_ms = parse_var(ENV_EXEC_TIMEOUT_MS, &v)?;
        debug!(exec_timeout_ms = config.sandbox.exec_timeout_ms, "env override");
    }
    Ok(())
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::ParseError(format!("{key}: invalid value '{value}'")))
}
