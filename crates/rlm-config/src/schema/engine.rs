//! Step engine configuration types.

use serde::{Deserialize, Serialize};

/// Step engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Ceiling on model turns per invocation (valid range: 1-200).
    pub max_steps: u32,
    /// Characters of each trajectory output shown to the fallback extractor.
    pub history_preview_chars: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 20,
            history_preview_chars: 5_000,
        }
    }
}
