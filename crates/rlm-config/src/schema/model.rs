//! Model request configuration types.

use serde::{Deserialize, Serialize};

/// Model request parameters shared by step, sub-query and extraction calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub model: String,
    /// Optional cheaper model for sub-queries; falls back to `model`.
    pub sub_query_model: Option<String>,
    pub max_tokens: u32,
    pub temperature: f64,
    /// HTTP request timeout in seconds.
    pub request_timeout_secs: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model: "claude-sonnet-4-20250514".to_string(),
            sub_query_model: None,
            max_tokens: 4096,
            temperature: 0.0,
            request_timeout_secs: 120,
        }
    }
}
