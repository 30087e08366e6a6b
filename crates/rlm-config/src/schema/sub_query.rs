//! Sub-query dispatcher configuration types.

use serde::{Deserialize, Serialize};

/// Sub-query (recursive model call) limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SubQueryConfig {
    /// Ceiling on real sub-query calls per invocation, single or batched.
    pub max_calls: u32,
    /// Context strings longer than this are truncated before sending.
    pub max_context_chars: u32,
    /// Worker count for batched sub-queries (valid range: 1-64).
    pub batch_concurrency: u32,
    /// Fraction of `max_calls` after which results carry a wrap-up warning.
    pub high_water_fraction: f64,
}

impl Default for SubQueryConfig {
    fn default() -> Self {
        Self {
            max_calls: 50,
            max_context_chars: 100_000,
            batch_concurrency: 8,
            high_water_fraction: 0.8,
        }
    }
}
