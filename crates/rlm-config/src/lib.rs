//! rlm configuration system.
//!
//! Provides TOML-based configuration with environment overrides and full
//! validation. All config sections use sensible defaults so partial configs
//! work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use rlm_config::{load_config, config_to_json};
//!
//! let config = load_config().expect("failed to load config");
//! let json = config_to_json(&config);
//! println!("{json}");
//! ```

pub mod env;
pub mod schema;
pub mod toml_loader;
pub mod validation;

// Re-export core types for convenience
pub use schema::{
    EngineConfig, LogLevel, LoggingConfig, ModelConfig, RlmConfig, SandboxConfig,
    SubQueryConfig, CONFIG_SCHEMA_VERSION,
};

use rlm_common::ConfigError;
use std::path::Path;

/// Convenience function to load config from the platform default path.
///
/// Loads `config.toml` from the OS config directory, creates a default
/// if none exists, applies `RLM_*` environment overrides, and validates
/// the result.
pub fn load_config() -> Result<RlmConfig, ConfigError> {
    let mut config = toml_loader::load_default()?;
    env::apply_env_overrides(&mut config)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Load config from an explicit path, then apply environment overrides.
pub fn load_config_from(path: &Path) -> Result<RlmConfig, ConfigError> {
    let mut config = toml_loader::load_from_path(path)?;
    env::apply_env_overrides(&mut config)?;
    validation::validate(&config)?;
    Ok(config)
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &RlmConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_to_json_contains_all_sections() {
        let config = RlmConfig::default();
        let json = config_to_json(&config);
        assert!(json.contains("\"engine\""));
        assert!(json.contains("\"sub_query\""));
        assert!(json.contains("\"sandbox\""));
        assert!(json.contains("\"model\""));
        assert!(json.contains("\"logging\""));
    }

    #[test]
    fn config_to_json_uses_lowercase_level() {
        let json = config_to_json(&RlmConfig::default());
        assert!(json.contains("\"info\""));
    }
}
