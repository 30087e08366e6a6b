use rlm_config::{EngineConfig, RlmConfig, SandboxConfig, SubQueryConfig};

/// Limits for one engine, taken from the loaded [`RlmConfig`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentConfig {
    pub engine: EngineConfig,
    pub sub_query: SubQueryConfig,
    pub sandbox: SandboxConfig,
}

impl From<&RlmConfig> for AgentConfig {
    fn from(config: &RlmConfig) -> Self {
        Self {
            engine: config.engine.clone(),
            sub_query: config.sub_query.clone(),
            sandbox: config.sandbox.clone(),
        }
    }
}
