//! Fake model clients for unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::schema::{EXTRACT_TOOL_NAME, STEP_TOOL_NAME};
use crate::{AiClient, AiError, AiResponse, Message, Role, TokenUsage, ToolCall, ToolDefinition};

fn last_user_message(messages: &[Message]) -> String {
    messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .unwrap_or_default()
}

fn usage() -> TokenUsage {
    TokenUsage {
        input_tokens: 10,
        output_tokens: 5,
    }
}

/// Answers every request with its last user message.
pub(crate) struct EchoClient {
    calls: AtomicUsize,
    fail_on: Option<String>,
    delay_per_char: Option<Duration>,
}

impl EchoClient {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_on: None,
            delay_per_char: None,
        }
    }

    /// Fail requests whose prompt contains `needle`.
    pub(crate) fn failing_on(needle: &str) -> Self {
        Self {
            fail_on: Some(needle.to_string()),
            ..Self::new()
        }
    }

    /// Sleep 5ms per prompt character, so longer prompts finish later.
    pub(crate) fn with_delay_for_query_length(mut self) -> Self {
        self.delay_per_char = Some(Duration::from_millis(5));
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AiClient for EchoClient {
    async fn send_message(
        &self,
        messages: &[Message],
        _tools: &[ToolDefinition],
    ) -> Result<AiResponse, AiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = last_user_message(messages);
        if let Some(delay) = self.delay_per_char {
            tokio::time::sleep(delay * prompt.chars().count() as u32).await;
        }
        if let Some(needle) = &self.fail_on {
            if prompt.contains(needle.as_str()) {
                return Err(AiError::ApiError("scripted failure".into()));
            }
        }
        Ok(AiResponse {
            content: prompt,
            tool_calls: Vec::new(),
            usage: usage(),
        })
    }
}

/// A step reply calling `next_step` with `arguments`.
pub(crate) fn tool_reply(name: &str, arguments: Value) -> AiResponse {
    AiResponse {
        content: String::new(),
        tool_calls: vec![ToolCall {
            id: "toolu_test".into(),
            name: name.into(),
            arguments,
        }],
        usage: usage(),
    }
}

pub(crate) fn code_step(code: &str) -> AiResponse {
    tool_reply(STEP_TOOL_NAME, json!({"reasoning": "exploring", "code": code}))
}

pub(crate) fn final_step(fields: Value) -> AiResponse {
    let mut arguments = json!({"reasoning": "done", "final": true});
    if let (Some(args), Some(fields)) = (arguments.as_object_mut(), fields.as_object()) {
        args.extend(fields.clone());
    }
    tool_reply(STEP_TOOL_NAME, arguments)
}

pub(crate) fn text_reply(text: &str) -> AiResponse {
    AiResponse {
        content: text.into(),
        tool_calls: Vec::new(),
        usage: usage(),
    }
}

/// Plays back scripted step and extraction replies; echoes sub-queries.
pub(crate) struct ScriptedClient {
    steps: Mutex<VecDeque<AiResponse>>,
    extractions: Mutex<VecDeque<Result<AiResponse, AiError>>>,
    /// Messages of every step request, in order.
    step_requests: Mutex<Vec<Vec<Message>>>,
    sub_queries: Mutex<Vec<String>>,
    /// Last user message of every extraction request.
    extraction_prompts: Mutex<Vec<String>>,
}

impl ScriptedClient {
    pub(crate) fn new(steps: Vec<AiResponse>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            extractions: Mutex::new(VecDeque::new()),
            step_requests: Mutex::new(Vec::new()),
            sub_queries: Mutex::new(Vec::new()),
            extraction_prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_extraction(self, reply: Result<AiResponse, AiError>) -> Self {
        self.extractions.lock().unwrap().push_back(reply);
        self
    }

    pub(crate) fn step_requests(&self) -> Vec<Vec<Message>> {
        self.step_requests.lock().unwrap().clone()
    }

    /// Last user message of step request `index` (0-based).
    pub(crate) fn step_prompt(&self, index: usize) -> String {
        last_user_message(&self.step_requests()[index])
    }

    pub(crate) fn sub_queries(&self) -> Vec<String> {
        self.sub_queries.lock().unwrap().clone()
    }

    pub(crate) fn extraction_requests(&self) -> usize {
        self.extraction_prompts.lock().unwrap().len()
    }

    pub(crate) fn extraction_prompt(&self, index: usize) -> String {
        self.extraction_prompts.lock().unwrap()[index].clone()
    }
}

#[async_trait]
impl AiClient for ScriptedClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AiResponse, AiError> {
        if tools.iter().any(|t| t.name == STEP_TOOL_NAME) {
            self.step_requests.lock().unwrap().push(messages.to_vec());
            return self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| AiError::ApiError("step script exhausted".into()));
        }

        if tools.iter().any(|t| t.name == EXTRACT_TOOL_NAME) {
            self.extraction_prompts
                .lock()
                .unwrap()
                .push(last_user_message(messages));
            return self
                .extractions
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AiError::ApiError("extraction script exhausted".into())));
        }

        let prompt = last_user_message(messages);
        self.sub_queries.lock().unwrap().push(prompt.clone());
        Ok(AiResponse {
            content: format!("answer: {prompt}"),
            tool_calls: Vec::new(),
            usage: usage(),
        })
    }
}

/// Sends each request to the first client whose key appears in any message.
pub(crate) struct RoutingClient {
    routes: Vec<(String, Arc<ScriptedClient>)>,
}

impl RoutingClient {
    pub(crate) fn new(routes: Vec<(&str, Arc<ScriptedClient>)>) -> Self {
        Self {
            routes: routes
                .into_iter()
                .map(|(key, client)| (key.to_string(), client))
                .collect(),
        }
    }
}

#[async_trait]
impl AiClient for RoutingClient {
    async fn send_message(
        &self,
        messages: &[Message],
        tools: &[ToolDefinition],
    ) -> Result<AiResponse, AiError> {
        let route = self.routes.iter().find(|(key, _)| {
            messages
                .iter()
                .any(|m| m.content.contains(key.as_str()))
        });
        match route {
            Some((_, client)) => client.send_message(messages, tools).await,
            None => Err(AiError::ApiError("no route for request".into())),
        }
    }
}
