//! Messages exchanged between a [`Session`](crate::Session) and its guest thread.
//!
//! The host and the guest never share state; every interaction is one of
//! these messages over a pair of unbounded channels. Capability calls are
//! correlated by the `id` the guest assigns when the call is raised.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::output::ExecOutcome;

/// Host to guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Install preloaded values and capability stubs. Always the first message.
    Initialize {
        values: Map<String, Value>,
        capability_names: Vec<String>,
    },
    /// Run one code fragment against the persistent scope.
    Execute { id: u64, code: String },
    /// Settle a capability call previously raised with `CallRequest`.
    CallResponse {
        id: u64,
        result: Result<Value, String>,
    },
    /// Reject outstanding calls and stop the guest thread.
    Close,
}

/// Guest to host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GuestMessage {
    Ready,
    CallRequest {
        id: u64,
        name: String,
        args: Vec<Value>,
    },
    ExecuteResult { id: u64, outcome: ExecOutcome },
    InitFailed { reason: String },
}

impl HostMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            HostMessage::Initialize { .. } => "initialize",
            HostMessage::Execute { .. } => "execute",
            HostMessage::CallResponse { .. } => "call_response",
            HostMessage::Close => "close",
        }
    }
}

impl GuestMessage {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            GuestMessage::Ready => "ready",
            GuestMessage::CallRequest { .. } => "call_request",
            GuestMessage::ExecuteResult { .. } => "execute_result",
            GuestMessage::InitFailed { .. } => "init_failed",
        }
    }
}
