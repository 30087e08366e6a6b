//! Configuration schema types for rlm.
//!
//! All structs use `serde(default)` so partial configs work correctly.
//! Missing fields are filled with defaults suitable for document-sized tasks.

mod engine;
mod logging;
mod model;
mod sandbox;
mod sub_query;

pub use engine::*;
pub use logging::*;
pub use model::*;
pub use sandbox::*;
pub use sub_query::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for rlm.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RlmConfig {
    pub engine: EngineConfig,
    pub sub_query: SubQueryConfig,
    pub sandbox: SandboxConfig,
    pub model: ModelConfig,
    pub logging: LoggingConfig,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_engine_limits() {
        let config = RlmConfig::default();
        assert_eq!(config.engine.max_steps, 20);
        assert_eq!(config.engine.history_preview_chars, 5_000);
    }

    #[test]
    fn default_sub_query_limits() {
        let config = RlmConfig::default();
        assert_eq!(config.sub_query.max_calls, 50);
        assert_eq!(config.sub_query.max_context_chars, 100_000);
        assert_eq!(config.sub_query.batch_concurrency, 8);
        assert!((config.sub_query.high_water_fraction - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn default_sandbox_limits() {
        let config = RlmConfig::default();
        assert_eq!(config.sandbox.exec_timeout_ms, 180_000);
        assert_eq!(config.sandbox.memory_limit_mb, 256);
        assert_eq!(config.sandbox.max_output_chars, 100_000);
    }

    #[test]
    fn default_model_has_no_sub_query_override() {
        let config = RlmConfig::default();
        assert!(config.model.sub_query_model.is_none());
        assert_eq!(config.model.max_tokens, 4096);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: RlmConfig = toml::from_str(
            r#"
[engine]
max_steps = 5

[logging]
level = "debug"
"#,
        )
        .unwrap();
        assert_eq!(config.engine.max_steps, 5);
        assert_eq!(config.engine.history_preview_chars, 5_000);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.sub_query, SubQueryConfig::default());
    }

    #[test]
    fn log_level_directives() {
        assert_eq!(LogLevel::Trace.as_directive(), "trace");
        assert_eq!(LogLevel::Info.as_directive(), "info");
        assert_eq!(LogLevel::Error.as_directive(), "error");
    }
}
