//! Agent loop for rlm.
//!
//! Drives a model through code-writing steps against a sandboxed session:
//! - Step engine with a step ceiling and one-shot fallback extraction
//! - Budgeted, optionally batched sub-queries callable from session code
//! - Tool schema and prompt assembly for each invocation
//! - Claude transport and token usage tracking

pub mod budget;
pub mod capability;
pub mod claude;
pub mod context;
pub mod dispatch;
pub mod engine;
pub mod fallback;
pub mod parse;
pub mod prompt;
pub mod schema;
pub mod token_tracker;

#[cfg(test)]
pub(crate) mod testing;

use async_trait::async_trait;

pub use budget::CallBudget;
pub use capability::{Capability, CapabilitySet, FnCapability};
pub use claude::{ClaudeClient, ClaudeConfig};
pub use context::{InvocationContext, StepRecord, TrajectoryEntry};
pub use dispatch::{Dispatcher, SubQuery};
pub use engine::{AgentConfig, AgentError, Engine, InvocationRequest, StepObserver};
pub use schema::{FieldSpec, FieldType, OutputSchema};
pub use token_tracker::TokenTracker;

#[async_trait]
pub trait AiClient: Send + Sync {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AiResponse, AiError>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct AiResponse {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: TokenUsage,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Rate limited")]
    RateLimited,
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("Timeout")]
    Timeout,
}

impl From<AiError> for rlm_common::RlmError {
    fn from(err: AiError) -> Self {
        rlm_common::RlmError::Model(err.to_string())
    }
}
