//! Per-invocation state: budgets, step records and the execution trajectory.

use std::sync::{Arc, Mutex};

use rlm_common::InvocationId;
use serde::Serialize;

use crate::budget::CallBudget;
use crate::token_tracker::TokenTracker;
use crate::TokenUsage;

/// Appended after every model turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StepRecord {
    /// 1-based turn number.
    pub index: u32,
    pub usage: TokenUsage,
}

/// One code-bearing turn and what it printed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrajectoryEntry {
    pub code: String,
    pub output: String,
}

/// Owned by one invocation; never shared between invocations.
///
/// The call budget and token tracker are reference counted so the
/// sub-query dispatcher can draw on them while a step is executing.
#[derive(Debug)]
pub struct InvocationContext {
    id: InvocationId,
    budget: Arc<CallBudget>,
    usage: Arc<Mutex<TokenTracker>>,
    trajectory: Vec<TrajectoryEntry>,
    steps: Vec<StepRecord>,
}

impl InvocationContext {
    pub fn new(sub_query_ceiling: u32, high_water_fraction: f64) -> Self {
        Self {
            id: InvocationId::new(),
            budget: Arc::new(CallBudget::new(sub_query_ceiling, high_water_fraction)),
            usage: Arc::new(Mutex::new(TokenTracker::new())),
            trajectory: Vec::new(),
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> &InvocationId {
        &self.id
    }

    pub fn budget(&self) -> &Arc<CallBudget> {
        &self.budget
    }

    pub fn usage(&self) -> &Arc<Mutex<TokenTracker>> {
        &self.usage
    }

    /// Record a model turn and return its step record.
    pub fn record_step(&mut self, usage: TokenUsage) -> StepRecord {
        record_usage(&self.usage, "step", &usage);
        let record = StepRecord {
            index: self.steps.len() as u32 + 1,
            usage,
        };
        self.steps.push(record);
        record
    }

    pub fn push_trajectory(&mut self, code: impl Into<String>, output: impl Into<String>) {
        self.trajectory.push(TrajectoryEntry {
            code: code.into(),
            output: output.into(),
        });
    }

    pub fn trajectory(&self) -> &[TrajectoryEntry] {
        &self.trajectory
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn steps_completed(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Tokens used by every call of this invocation so far.
    pub fn total_tokens(&self) -> u64 {
        self.usage
            .lock()
            .map(|tracker| tracker.total_tokens())
            .unwrap_or_default()
    }
}

/// Add `usage` to a shared tracker under `kind`.
pub(crate) fn record_usage(tracker: &Mutex<TokenTracker>, kind: &str, usage: &TokenUsage) {
    if let Ok(mut tracker) = tracker.lock() {
        tracker.record(kind, usage);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(input: u64, output: u64) -> TokenUsage {
        TokenUsage {
            input_tokens: input,
            output_tokens: output,
        }
    }

    #[test]
    fn step_records_are_numbered_from_one() {
        let mut ctx = InvocationContext::new(5, 0.8);
        let first = ctx.record_step(usage(10, 2));
        let second = ctx.record_step(usage(20, 3));
        assert_eq!(first.index, 1);
        assert_eq!(second.index, 2);
        assert_eq!(ctx.steps_completed(), 2);
        assert_eq!(ctx.total_tokens(), 35);
    }

    #[test]
    fn trajectory_tracks_code_turns_only() {
        let mut ctx = InvocationContext::new(5, 0.8);
        ctx.record_step(usage(1, 1));
        ctx.push_trajectory("1 + 1", "2");
        ctx.record_step(usage(1, 1));
        assert_eq!(ctx.trajectory().len(), 1);
        assert_eq!(ctx.trajectory()[0].output, "2");
        assert_eq!(ctx.steps().len(), 2);
    }

    #[test]
    fn sub_query_usage_counts_toward_total() {
        let ctx = InvocationContext::new(5, 0.8);
        record_usage(ctx.usage(), "sub_query", &usage(7, 3));
        assert_eq!(ctx.total_tokens(), 10);
        assert_eq!(ctx.budget().ceiling(), 5);
    }
}
