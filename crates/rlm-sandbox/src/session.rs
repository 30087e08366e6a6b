//! Host side of a sandbox session.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{FuturesUnordered, StreamExt};
use rlm_common::SessionId;
use rlm_config::SandboxConfig;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::error::SandboxError;
use crate::guard;
use crate::guest;
use crate::output::ExecOutcome;
use crate::protocol::{GuestMessage, HostMessage};
use crate::CapabilityHandler;

/// An isolated script scope that persists across [`execute`](Session::execute) calls.
///
/// Dropping a session closes it.
pub struct Session {
    id: SessionId,
    config: SandboxConfig,
    values: Map<String, Value>,
    capability_names: Vec<String>,
    reserved: Vec<String>,
    to_guest: UnboundedSender<HostMessage>,
    from_guest: UnboundedReceiver<GuestMessage>,
    abort: Arc<AtomicBool>,
    next_execution_id: u64,
    execution_count: u64,
    closed: bool,
}

impl Session {
    /// Start a session with `values` preloaded and `capability_names` bound
    /// to async stubs that call back into the host.
    pub async fn create(
        values: Map<String, Value>,
        capability_names: Vec<String>,
        config: SandboxConfig,
    ) -> Result<Self, SandboxError> {
        let reserved = reserved_names(&values, &capability_names)?;
        let id = SessionId::new();
        let (to_guest, from_guest, abort) = boot(&id, &config, &values, &capability_names).await?;

        info!(
            session_id = %id,
            values = values.len(),
            capabilities = capability_names.len(),
            "sandbox session started"
        );

        Ok(Self {
            id,
            config,
            values,
            capability_names,
            reserved,
            to_guest,
            from_guest,
            abort,
            next_execution_id: 1,
            execution_count: 0,
            closed: false,
        })
    }

    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    /// Number of fragments that ran to completion in this session.
    pub fn execution_count(&self) -> u64 {
        self.execution_count
    }

    /// Preloaded value names plus capability names.
    pub fn reserved_names(&self) -> &[String] {
        &self.reserved
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Run `code` and return its rendered output.
    ///
    /// Guard rejections come back as `Ok` with a `[REJECTED]` message; the
    /// code is not run and session state is unchanged. On timeout the
    /// session is discarded and must be [`restart`](Session::restart)ed
    /// before further use.
    pub async fn execute(
        &mut self,
        code: &str,
        handler: &dyn CapabilityHandler,
    ) -> Result<String, SandboxError> {
        if self.closed {
            return Err(SandboxError::Closed);
        }
        if let Err(rejection) = guard::check_code(code, &self.reserved) {
            debug!(session_id = %self.id, "code rejected by guard");
            return Ok(rejection);
        }

        let execution_id = self.next_execution_id;
        self.next_execution_id += 1;
        self.to_guest
            .send(HostMessage::Execute {
                id: execution_id,
                code: code.to_string(),
            })
            .map_err(|_| SandboxError::Closed)?;

        let limit_ms = self.config.exec_timeout_ms;
        let pumped = tokio::time::timeout(
            Duration::from_millis(limit_ms),
            pump(&mut self.from_guest, &self.to_guest, execution_id, handler),
        )
        .await;

        match pumped {
            Ok(Ok(outcome)) => {
                self.execution_count += 1;
                debug!(
                    session_id = %self.id,
                    execution_id,
                    logs = outcome.logs.len(),
                    failed = outcome.error.is_some(),
                    "execution finished"
                );
                Ok(outcome.render(self.config.max_output_chars as usize))
            }
            Ok(Err(e)) => {
                warn!(session_id = %self.id, "session failed during execution: {e}");
                self.discard();
                Err(e)
            }
            Err(_) => {
                warn!(session_id = %self.id, limit_ms, "execution timed out, discarding session");
                self.discard();
                Err(SandboxError::Timeout { limit_ms })
            }
        }
    }

    /// Replace the guest with a fresh one holding the original preloaded
    /// values. All variables bound by earlier fragments are lost.
    pub async fn restart(&mut self) -> Result<(), SandboxError> {
        self.discard();
        let id = SessionId::new();
        let (to_guest, from_guest, abort) =
            boot(&id, &self.config, &self.values, &self.capability_names).await?;

        info!(previous = %self.id, session_id = %id, "sandbox session restarted");
        self.id = id;
        self.to_guest = to_guest;
        self.from_guest = from_guest;
        self.abort = abort;
        self.closed = false;
        Ok(())
    }

    /// Release the runtime. Outstanding capability calls are rejected.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.to_guest.send(HostMessage::Close);
        debug!(session_id = %self.id, "sandbox session closed");
    }

    /// Interrupt any running script and close.
    fn discard(&mut self) {
        self.abort.store(true, Ordering::Relaxed);
        self.close();
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

fn reserved_names(
    values: &Map<String, Value>,
    capability_names: &[String],
) -> Result<Vec<String>, SandboxError> {
    let mut reserved: Vec<String> = Vec::with_capacity(values.len() + capability_names.len());
    for name in values.keys().chain(capability_names.iter()) {
        if !guard::is_valid_identifier(name) {
            return Err(SandboxError::Init(format!(
                "'{name}' is not a valid identifier"
            )));
        }
        if reserved.contains(name) {
            return Err(SandboxError::Init(format!("'{name}' is bound twice")));
        }
        reserved.push(name.clone());
    }
    Ok(reserved)
}

async fn boot(
    id: &SessionId,
    config: &SandboxConfig,
    values: &Map<String, Value>,
    capability_names: &[String],
) -> Result<
    (
        UnboundedSender<HostMessage>,
        UnboundedReceiver<GuestMessage>,
        Arc<AtomicBool>,
    ),
    SandboxError,
> {
    let abort = Arc::new(AtomicBool::new(false));
    let mut handle = guest::spawn(id, config, abort.clone())?;

    handle
        .to_guest
        .send(HostMessage::Initialize {
            values: values.clone(),
            capability_names: capability_names.to_vec(),
        })
        .map_err(|_| SandboxError::Closed)?;

    match handle.from_guest.recv().await {
        Some(GuestMessage::Ready) => Ok((handle.to_guest, handle.from_guest, abort)),
        Some(GuestMessage::InitFailed { reason }) => Err(SandboxError::Init(reason)),
        Some(other) => Err(SandboxError::Protocol(format!(
            "expected ready, got {}",
            other.kind()
        ))),
        None => Err(SandboxError::Closed),
    }
}

/// Relay capability calls until the guest reports the outcome of `execution_id`.
///
/// Calls are resolved concurrently; responses go back in completion order.
async fn pump(
    from_guest: &mut UnboundedReceiver<GuestMessage>,
    to_guest: &UnboundedSender<HostMessage>,
    execution_id: u64,
    handler: &dyn CapabilityHandler,
) -> Result<ExecOutcome, SandboxError> {
    let mut in_flight = FuturesUnordered::new();

    loop {
        tokio::select! {
            message = from_guest.recv() => match message {
                Some(GuestMessage::CallRequest { id, name, args }) => {
                    debug!(call_id = id, name = %name, "resolving capability call");
                    in_flight.push(async move {
                        let result = handler.call(&name, args).await;
                        (id, result)
                    });
                }
                Some(GuestMessage::ExecuteResult { id, outcome }) if id == execution_id => {
                    return Ok(outcome);
                }
                Some(GuestMessage::ExecuteResult { id, .. }) => {
                    debug!(execution_id = id, "ignoring stale execution result");
                }
                Some(other) => {
                    return Err(SandboxError::Protocol(format!(
                        "unexpected {} during execution",
                        other.kind()
                    )));
                }
                None => return Err(SandboxError::Closed),
            },
            Some((id, result)) = in_flight.next(), if !in_flight.is_empty() => {
                to_guest
                    .send(HostMessage::CallResponse { id, result })
                    .map_err(|_| SandboxError::Closed)?;
            }
        }
    }
}
