//! Guest side of a session: owns the embedded runtime on its own thread.
//!
//! The runtime is single-threaded and not `Send`, so it is created inside
//! the guest thread and driven entirely by [`HostMessage`]s. While a
//! fragment is running the guest alternates between draining the job
//! queue, forwarding newly raised capability calls to the host, and
//! blocking on the host's responses.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rlm_common::SessionId;
use rlm_config::SandboxConfig;
use rquickjs::context::EvalOptions;
use rquickjs::{CatchResultExt, CaughtError, Context, Function, Runtime, Value as JsValue};
use serde::Deserialize;
use serde_json::{Map, Value};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, trace, warn};

use crate::output::ExecOutcome;
use crate::protocol::{GuestMessage, HostMessage};

const PRELUDE: &str = include_str!("prelude.js");

/// Extra native stack on top of the script stack limit.
const THREAD_STACK_HEADROOM: usize = 2 * 1024 * 1024;

/// Channel ends held by the host.
pub(crate) struct GuestHandle {
    pub to_guest: UnboundedSender<HostMessage>,
    pub from_guest: UnboundedReceiver<GuestMessage>,
}

#[derive(Debug, Clone, Copy)]
struct Limits {
    memory_bytes: usize,
    stack_bytes: usize,
}

impl From<&SandboxConfig> for Limits {
    fn from(config: &SandboxConfig) -> Self {
        Self {
            memory_bytes: config.memory_limit_mb as usize * 1024 * 1024,
            stack_bytes: config.max_stack_kb as usize * 1024,
        }
    }
}

/// Spawn the guest thread for session `id`.
///
/// Setting `abort` interrupts whatever script the guest is running.
pub(crate) fn spawn(
    id: &SessionId,
    config: &SandboxConfig,
    abort: Arc<AtomicBool>,
) -> std::io::Result<GuestHandle> {
    let (to_guest, inbox) = mpsc::unbounded_channel();
    let (outbox, from_guest) = mpsc::unbounded_channel();
    let limits = Limits::from(config);

    std::thread::Builder::new()
        .name(format!("rlm-session-{id}"))
        .stack_size(limits.stack_bytes + THREAD_STACK_HEADROOM)
        .spawn(move || run(inbox, outbox, limits, abort))?;

    Ok(GuestHandle {
        to_guest,
        from_guest,
    })
}

fn run(
    mut inbox: UnboundedReceiver<HostMessage>,
    outbox: UnboundedSender<GuestMessage>,
    limits: Limits,
    abort: Arc<AtomicBool>,
) {
    let mut guest = match Guest::boot(limits, abort, outbox.clone()) {
        Ok(guest) => guest,
        Err(reason) => {
            let _ = outbox.send(GuestMessage::InitFailed { reason });
            return;
        }
    };

    match inbox.blocking_recv() {
        Some(HostMessage::Initialize {
            values,
            capability_names,
        }) => {
            if let Err(reason) = guest.install(&values, &capability_names) {
                let _ = outbox.send(GuestMessage::InitFailed { reason });
                return;
            }
            let _ = outbox.send(GuestMessage::Ready);
        }
        Some(other) => {
            let _ = outbox.send(GuestMessage::InitFailed {
                reason: format!("expected initialize, got {}", other.kind()),
            });
            return;
        }
        None => return,
    }

    while let Some(message) = inbox.blocking_recv() {
        match message {
            HostMessage::Execute { id, code } => match guest.execute(&code, &mut inbox) {
                Flow::Finished(outcome) => {
                    let _ = outbox.send(GuestMessage::ExecuteResult { id, outcome });
                }
                Flow::Closed => break,
            },
            HostMessage::CallResponse { id, .. } => {
                trace!(call_id = id, "dropping response for a finished execution");
            }
            HostMessage::Initialize { .. } => {
                warn!("ignoring repeated initialize");
            }
            HostMessage::Close => break,
        }
    }

    guest.reject_all("session closed");
    debug!("guest thread exiting");
}

enum Flow {
    Finished(ExecOutcome),
    Closed,
}

#[derive(Default)]
struct Mailbox {
    /// Serialized `{id, name, args}` envelopes raised since the last flush.
    requests: Vec<String>,
    logs: Vec<String>,
    /// Serialized completion posted by `__rlm_track`.
    completion: Option<String>,
}

#[derive(Deserialize)]
struct CallEnvelope {
    id: u64,
    name: String,
    #[serde(default)]
    args: Vec<Value>,
}

#[derive(Deserialize)]
struct Completion {
    value: Option<String>,
    error: Option<String>,
}

struct Guest {
    runtime: Runtime,
    context: Context,
    mailbox: Rc<RefCell<Mailbox>>,
    /// Calls forwarded to the host and not yet settled, by call id.
    pending: HashMap<u64, String>,
    outbox: UnboundedSender<GuestMessage>,
}

impl Guest {
    fn boot(
        limits: Limits,
        abort: Arc<AtomicBool>,
        outbox: UnboundedSender<GuestMessage>,
    ) -> Result<Self, String> {
        let runtime = Runtime::new().map_err(|e| format!("failed to create runtime: {e}"))?;
        runtime.set_memory_limit(limits.memory_bytes);
        runtime.set_max_stack_size(limits.stack_bytes);
        runtime.set_interrupt_handler(Some(Box::new(move || abort.load(Ordering::Relaxed))));

        let context =
            Context::full(&runtime).map_err(|e| format!("failed to create context: {e}"))?;
        let mailbox = Rc::new(RefCell::new(Mailbox::default()));

        context.with(|ctx| -> Result<(), String> {
            let globals = ctx.globals();

            let mb = mailbox.clone();
            let post = Function::new(ctx.clone(), move |payload: String| {
                mb.borrow_mut().requests.push(payload);
            })
            .map_err(|e| e.to_string())?;

            let mb = mailbox.clone();
            let emit = Function::new(ctx.clone(), move |line: String| {
                mb.borrow_mut().logs.push(line);
            })
            .map_err(|e| e.to_string())?;

            let mb = mailbox.clone();
            let done = Function::new(ctx.clone(), move |payload: String| {
                mb.borrow_mut().completion = Some(payload);
            })
            .map_err(|e| e.to_string())?;

            globals.set("__rlm_post", post).map_err(|e| e.to_string())?;
            globals.set("__rlm_emit", emit).map_err(|e| e.to_string())?;
            globals.set("__rlm_done", done).map_err(|e| e.to_string())?;

            ctx.eval::<(), _>(PRELUDE)
                .catch(&ctx)
                .map_err(|e| format!("prelude failed: {}", describe(e)))
        })?;

        Ok(Self {
            runtime,
            context,
            mailbox,
            pending: HashMap::new(),
            outbox,
        })
    }

    /// Define preloaded values and capability stubs as read-only globals.
    fn install(&self, values: &Map<String, Value>, capability_names: &[String]) -> Result<(), String> {
        let mut script = String::new();
        for (name, value) in values {
            let name = json_literal(&Value::String(name.clone()));
            script.push_str(&format!("__rlm_define({name}, {});\n", json_literal(value)));
        }
        for name in capability_names {
            let name = json_literal(&Value::String(name.clone()));
            script.push_str(&format!("__rlm_define({name}, __rlm_stub({name}));\n"));
        }
        self.eval_script(&script)
    }

    fn execute(&mut self, code: &str, inbox: &mut UnboundedReceiver<HostMessage>) -> Flow {
        {
            let mut mb = self.mailbox.borrow_mut();
            mb.requests.clear();
            mb.logs.clear();
            mb.completion = None;
        }

        let started = self.context.with(|ctx| -> Result<(), String> {
            let mut options = EvalOptions::default();
            options.global = true;
            options.strict = false;
            options.promise = true;

            let promise: JsValue = ctx
                .eval_with_options(code, options)
                .catch(&ctx)
                .map_err(describe)?;
            let track: Function = ctx.globals().get("__rlm_track").catch(&ctx).map_err(describe)?;
            track.call::<_, ()>((promise,)).catch(&ctx).map_err(describe)
        });

        if let Err(message) = started {
            return Flow::Finished(self.finish(Some(message)));
        }

        loop {
            self.drain_jobs();
            self.flush_requests();

            if self.mailbox.borrow().completion.is_some() {
                break;
            }
            if self.pending.is_empty() {
                self.mailbox.borrow_mut().completion = Some(stalled_completion());
                break;
            }

            match inbox.blocking_recv() {
                Some(HostMessage::CallResponse { id, result }) => {
                    if self.pending.remove(&id).is_some() {
                        self.settle(id, result);
                    } else {
                        trace!(call_id = id, "ignoring response for unknown call");
                    }
                }
                Some(HostMessage::Execute { id, .. }) => {
                    let _ = self.outbox.send(GuestMessage::ExecuteResult {
                        id,
                        outcome: ExecOutcome::failed("session is busy with another execution"),
                    });
                }
                Some(HostMessage::Initialize { .. }) => {
                    warn!("ignoring initialize during execution");
                }
                Some(HostMessage::Close) | None => {
                    self.reject_all("session closed");
                    return Flow::Closed;
                }
            }
        }

        Flow::Finished(self.finish(None))
    }

    /// Collect the outcome and reject calls the fragment left unawaited.
    fn finish(&mut self, sync_error: Option<String>) -> ExecOutcome {
        let (logs, completion) = {
            let mut mb = self.mailbox.borrow_mut();
            (std::mem::take(&mut mb.logs), mb.completion.take())
        };

        let outcome = match sync_error {
            Some(error) => ExecOutcome {
                logs,
                value: None,
                error: Some(error),
            },
            None => match completion.as_deref().map(serde_json::from_str::<Completion>) {
                Some(Ok(c)) => ExecOutcome {
                    logs,
                    value: c.value,
                    error: c.error,
                },
                Some(Err(e)) => ExecOutcome {
                    logs,
                    value: None,
                    error: Some(format!("malformed completion: {e}")),
                },
                None => ExecOutcome {
                    logs,
                    value: None,
                    error: Some("execution produced no completion".to_string()),
                },
            },
        };

        self.reject_all("execution finished before the call was resolved");
        self.mailbox.borrow_mut().requests.clear();
        outcome
    }

    fn drain_jobs(&self) {
        loop {
            match self.runtime.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                // A job threw; the exception is already reported through its promise.
                Err(_) => continue,
            }
        }
    }

    fn flush_requests(&mut self) {
        let requests = std::mem::take(&mut self.mailbox.borrow_mut().requests);
        for raw in requests {
            match serde_json::from_str::<CallEnvelope>(&raw) {
                Ok(call) => {
                    debug!(call_id = call.id, name = %call.name, "capability call raised");
                    self.pending.insert(call.id, call.name.clone());
                    let _ = self.outbox.send(GuestMessage::CallRequest {
                        id: call.id,
                        name: call.name,
                        args: call.args,
                    });
                }
                Err(e) => warn!("dropping malformed capability call: {e}"),
            }
        }
    }

    fn settle(&self, id: u64, result: Result<Value, String>) {
        let (ok, payload) = match result {
            Ok(value) => (true, value),
            Err(message) => (false, Value::String(message)),
        };
        let script = format!("__rlm_settle({id}, {ok}, {});", json_literal(&payload));
        if let Err(e) = self.eval_script(&script) {
            warn!(call_id = id, "failed to settle capability call: {e}");
        }
    }

    fn reject_all(&mut self, reason: &str) {
        if self.pending.is_empty() {
            return;
        }
        self.pending.clear();
        let script = format!(
            "__rlm_reject_all({});",
            json_literal(&Value::String(reason.to_string()))
        );
        if let Err(e) = self.eval_script(&script) {
            warn!("failed to reject pending calls: {e}");
        }
        self.drain_jobs();
    }

    fn eval_script(&self, script: &str) -> Result<(), String> {
        self.context
            .with(|ctx| ctx.eval::<(), _>(script).catch(&ctx).map_err(describe))
    }
}

fn json_literal(value: &Value) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

fn stalled_completion() -> String {
    serde_json::json!({
        "value": null,
        "error": "execution stalled: awaited a promise that can never settle",
    })
    .to_string()
}

fn describe(err: CaughtError<'_>) -> String {
    match err {
        CaughtError::Exception(exception) => {
            let message = exception
                .message()
                .unwrap_or_else(|| "uncaught exception".to_string());
            let name: Option<String> = exception.get("name").ok();
            match name.as_deref() {
                Some("Error") | None => message,
                Some(name) => format!("{name}: {message}"),
            }
        }
        other => other.to_string(),
    }
}
