//! Sandbox session configuration types.

use serde::{Deserialize, Serialize};

/// Sandbox session configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Wall-clock limit for one code submission, in milliseconds.
    pub exec_timeout_ms: u64,
    /// Heap limit for the embedded runtime, in megabytes.
    pub memory_limit_mb: u32,
    /// Stack limit for the embedded runtime, in kilobytes.
    pub max_stack_kb: u32,
    /// Execution output longer than this is truncated.
    pub max_output_chars: u32,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            exec_timeout_ms: 180_000,
            memory_limit_mb: 256,
            max_stack_kb: 1024,
            max_output_chars: 100_000,
        }
    }
}
