//! Token usage tracking across the calls of one invocation.

use std::collections::HashMap;

use crate::TokenUsage;

/// Tracks cumulative token usage per call kind (step, sub-query, extraction).
#[derive(Debug)]
pub struct TokenTracker {
    /// Total usage across all call kinds.
    total: TokenUsage,
    /// Usage broken down by call kind.
    by_kind: HashMap<String, TokenUsage>,
    /// Number of API calls made.
    call_count: u64,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self {
            total: TokenUsage::default(),
            by_kind: HashMap::new(),
            call_count: 0,
        }
    }

    /// Record token usage from an API call.
    pub fn record(&mut self, kind: &str, usage: &TokenUsage) {
        self.total.input_tokens += usage.input_tokens;
        self.total.output_tokens += usage.output_tokens;
        self.call_count += 1;

        let entry = self.by_kind.entry(kind.to_string()).or_default();
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
    }

    /// Get total token usage.
    pub fn total(&self) -> &TokenUsage {
        &self.total
    }

    /// Get usage for a specific call kind.
    pub fn for_kind(&self, kind: &str) -> Option<&TokenUsage> {
        self.by_kind.get(kind)
    }

    /// Get total tokens (input + output).
    pub fn total_tokens(&self) -> u64 {
        self.total.total_tokens()
    }

    /// Get number of API calls.
    pub fn call_count(&self) -> u64 {
        self.call_count
    }
}

impl Default for TokenTracker {
    fn default() -> Self {
        Self::new()
    }
}
