//! The step loop.
//!
//! Each step sends the conversation to the model and classifies the reply.
//! Code replies run in the session and their output becomes the next user
//! message; a completion ends the invocation. When the step ceiling is
//! reached the fallback extractor gets one attempt at the answer.

mod classify;
mod config;
mod error;


use std::sync::Arc;

use rlm_sandbox::{CapabilityHandler, SandboxError, Session};
use serde_json::{Map, Value};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::capability::{
    describe_builtins, CapabilityRouter, CapabilitySet, BUILTIN_CAPABILITIES,
};
use crate::context::{record_usage, InvocationContext, StepRecord};
use crate::dispatch::Dispatcher;
use crate::fallback::{self, ExtractionInput};
use crate::prompt::{
    action_system_prompt, budget_banner, corrective_message, describe_variables,
    opening_message, PromptLimits, VARIABLE_PREVIEW_CHARS,
};
use crate::schema::{step_tool, OutputSchema};
use crate::{AiClient, AiResponse, Message};

pub use classify::{classify_reply, StepReply};
pub use config::AgentConfig;
pub use error::AgentError;

/// Prefix of any step output produced after the session was restarted.
pub const RESET_TAG: &str = "[SESSION RESET]";

/// Called after every model turn.
pub type StepObserver = Arc<dyn Fn(&StepRecord) + Send + Sync>;

/// Everything one invocation needs from the caller.
pub struct InvocationRequest {
    /// Preloaded into the session as read-only globals.
    pub initial_values: Map<String, Value>,
    pub capabilities: CapabilitySet,
    pub instructions: String,
    pub schema: OutputSchema,
}

pub struct Engine {
    client: Arc<dyn AiClient>,
    sub_query_client: Option<Arc<dyn AiClient>>,
    config: AgentConfig,
    observer: Option<StepObserver>,
}

impl Engine {
    pub fn new(client: Arc<dyn AiClient>, config: AgentConfig) -> Self {
        Self {
            client,
            sub_query_client: None,
            config,
            observer: None,
        }
    }

    /// Send sub-queries to a different client than the step loop.
    pub fn with_sub_query_client(mut self, client: Arc<dyn AiClient>) -> Self {
        self.sub_query_client = Some(client);
        self
    }

    pub fn with_observer(mut self, observer: impl Fn(&StepRecord) + Send + Sync + 'static) -> Self {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Run one invocation to completion.
    pub async fn invoke(&self, request: InvocationRequest) -> Result<Map<String, Value>, AgentError> {
        let ctx = InvocationContext::new(
            self.config.sub_query.max_calls,
            self.config.sub_query.high_water_fraction,
        );
        let span = info_span!("rlm.invoke", invocation_id = %ctx.id());
        self.run(ctx, request).instrument(span).await
    }

    async fn run(
        &self,
        mut ctx: InvocationContext,
        request: InvocationRequest,
    ) -> Result<Map<String, Value>, AgentError> {
        let InvocationRequest {
            initial_values,
            capabilities,
            instructions,
            schema,
        } = request;

        schema.validate().map_err(AgentError::InvalidRequest)?;
        if let Some(name) = capabilities
            .names()
            .into_iter()
            .find(|name| BUILTIN_CAPABILITIES.contains(&name.as_str()))
        {
            return Err(AgentError::InvalidRequest(format!(
                "capability name '{name}' is reserved for the built-in sub-query functions"
            )));
        }

        let max_steps = self.config.engine.max_steps;
        let sub_query_ceiling = ctx.budget().ceiling();

        let sub_query_client = self
            .sub_query_client
            .clone()
            .unwrap_or_else(|| Arc::clone(&self.client));
        let dispatcher = Dispatcher::new(
            sub_query_client,
            Arc::clone(ctx.budget()),
            Arc::clone(ctx.usage()),
            &self.config.sub_query,
        );
        let router = CapabilityRouter::new(&dispatcher, &capabilities);

        let variables = describe_variables(&initial_values, VARIABLE_PREVIEW_CHARS);
        let mut capability_names: Vec<String> =
            BUILTIN_CAPABILITIES.iter().map(|name| name.to_string()).collect();
        capability_names.extend(capabilities.names());
        let mut session =
            Session::create(initial_values, capability_names, self.config.sandbox.clone()).await?;

        let caller_capabilities = capabilities.describe();
        let system = action_system_prompt(
            &instructions,
            &variables,
            &caller_capabilities,
            &schema,
            PromptLimits {
                max_steps,
                max_sub_queries: sub_query_ceiling,
            },
        );
        let tools = [step_tool(&schema)];
        let mut messages = vec![
            Message::system(system),
            Message::user(opening_message(max_steps, sub_query_ceiling)),
        ];

        info!(max_steps, sub_query_ceiling, "invocation started");

        for step in 1..=max_steps {
            debug!(step, "requesting step");
            let response = self.client.send_message(&messages, &tools).await?;

            let record = ctx.record_step(response.usage);
            if let Some(observer) = &self.observer {
                observer(&record);
            }

            match classify_reply(&response, &schema) {
                StepReply::Completion { fields } => {
                    info!(
                        step,
                        tokens = ctx.total_tokens(),
                        sub_queries = ctx.budget().used(),
                        "invocation completed"
                    );
                    session.close();
                    return Ok(fields);
                }
                StepReply::Code { reasoning, code } => {
                    debug!(step, %reasoning, "executing step code");
                    messages.push(Message::assistant(assistant_turn(&response)));

                    let output = self.execute_step(&mut session, &code, &router).await?;
                    ctx.push_trajectory(code, output.clone());

                    let banner =
                        budget_banner(step, max_steps, ctx.budget().used(), sub_query_ceiling);
                    messages.push(Message::user(format!("{output}\n\n{banner}")));
                }
                StepReply::Malformed { reason } => {
                    warn!(step, %reason, "unusable step reply");
                    messages.push(Message::assistant(assistant_turn(&response)));

                    let banner =
                        budget_banner(step, max_steps, ctx.budget().used(), sub_query_ceiling);
                    messages.push(Message::user(format!(
                        "{}\n\n{banner}",
                        corrective_message(&reason)
                    )));
                }
            }
        }

        session.close();
        warn!(
            steps = max_steps,
            trajectory = ctx.trajectory().len(),
            "step ceiling reached without an answer, falling back to extraction"
        );

        let mut all_capabilities = describe_builtins();
        all_capabilities.extend(caller_capabilities);
        let extraction = fallback::extract(
            self.client.as_ref(),
            ExtractionInput {
                instructions: &instructions,
                variables: &variables,
                capabilities: &all_capabilities,
                trajectory: ctx.trajectory(),
                schema: &schema,
                preview_chars: self.config.engine.history_preview_chars as usize,
            },
        )
        .await;

        match extraction {
            Ok(extraction) => {
                record_usage(ctx.usage(), "extract", &extraction.usage);
                info!(tokens = ctx.total_tokens(), "fallback extraction succeeded");
                Ok(extraction.fields)
            }
            Err(reason) => {
                warn!(%reason, "fallback extraction failed");
                Err(AgentError::MaxSteps {
                    steps_completed: ctx.steps_completed(),
                    step_ceiling: max_steps,
                    tokens_used: ctx.total_tokens(),
                    step_records: ctx.steps().to_vec(),
                })
            }
        }
    }

    /// Run step code, restarting the session and retrying once on timeout.
    ///
    /// A session left closed by an earlier double timeout is recreated
    /// first. Timeouts never fail the invocation; they come back as output
    /// tagged with [`RESET_TAG`], as does the first output of a recreated
    /// session.
    async fn execute_step(
        &self,
        session: &mut Session,
        code: &str,
        handler: &dyn CapabilityHandler,
    ) -> Result<String, AgentError> {
        let recreated = session.is_closed();
        if recreated {
            info!("recreating session closed by an earlier timeout");
            session.restart().await?;
        }

        let limit_ms = match session.execute(code, handler).await {
            Err(SandboxError::Timeout { limit_ms }) => limit_ms,
            other => {
                let output = other?;
                if recreated {
                    return Ok(format!(
                        "{RESET_TAG} the session was restarted after an earlier timeout and \
                         all variables were cleared. Output:\n{output}"
                    ));
                }
                return Ok(output);
            }
        };

        warn!(limit_ms, "step code timed out, restarting session and retrying once");
        session.restart().await?;

        match session.execute(code, handler).await {
            Ok(output) => Ok(format!(
                "{RESET_TAG} execution timed out after {limit_ms} ms; the session was \
                 restarted and all variables were cleared. Output of the retry:\n{output}"
            )),
            Err(SandboxError::Timeout { limit_ms }) => {
                warn!(limit_ms, "retry timed out as well");
                Ok(format!(
                    "{RESET_TAG} Error: execution timed out after {limit_ms} ms twice; the \
                     session was restarted and all variables were cleared. Split the work \
                     into smaller steps."
                ))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// The model's turn as it is replayed in the conversation.
fn assistant_turn(response: &AiResponse) -> String {
    if let Some(call) = response.tool_calls.first() {
        return call.arguments.to_string();
    }
    if response.content.trim().is_empty() {
        "(empty reply)".to_string()
    } else {
        response.content.clone()
    }
}
