use rlm_sandbox::SandboxError;

use crate::context::StepRecord;
use crate::AiError;

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The step ceiling was reached and fallback extraction failed.
    #[error(
        "step budget exhausted: {steps_completed}/{step_ceiling} steps, \
         {tokens_used} tokens, and fallback extraction failed"
    )]
    MaxSteps {
        steps_completed: u32,
        step_ceiling: u32,
        tokens_used: u64,
        step_records: Vec<StepRecord>,
    },

    #[error("model error: {0}")]
    Model(#[from] AiError),

    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl From<AgentError> for rlm_common::RlmError {
    fn from(err: AgentError) -> Self {
        match err {
            AgentError::Sandbox(e) => rlm_common::RlmError::Sandbox(e.to_string()),
            AgentError::Model(e) => rlm_common::RlmError::Model(e.to_string()),
            other => rlm_common::RlmError::Agent(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_steps_display_has_diagnostics() {
        let err = AgentError::MaxSteps {
            steps_completed: 3,
            step_ceiling: 3,
            tokens_used: 450,
            step_records: Vec::new(),
        };
        let msg = err.to_string();
        assert!(msg.contains("3/3 steps"));
        assert!(msg.contains("450 tokens"));
    }

    #[test]
    fn converts_into_rlm_error() {
        let err: rlm_common::RlmError = AgentError::Sandbox(SandboxError::Closed).into();
        assert!(matches!(err, rlm_common::RlmError::Sandbox(_)));

        let err: rlm_common::RlmError = AgentError::InvalidRequest("no fields".into()).into();
        assert_eq!(err.to_string(), "agent error: invalid request: no fields");
    }
}
