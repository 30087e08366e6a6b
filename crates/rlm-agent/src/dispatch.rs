//! Budgeted sub-queries issued by code running in the session.
//!
//! Every failure mode is reported in-band as a tagged string so session
//! code never has to guard a sub-query with `try`.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use futures_util::future::join_all;
use rlm_config::SubQueryConfig;
use serde_json::Value;
use tracing::{debug, warn};

use crate::budget::CallBudget;
use crate::context::record_usage;
use crate::prompt::SUB_QUERY_SYSTEM_PROMPT;
use crate::token_tracker::TokenTracker;
use crate::{AiClient, Message};

/// Prefix of every in-band sub-query failure.
pub const ERROR_TAG: &str = "[ERROR]";

/// Prefix of the soft budget warning appended to results.
pub const WARNING_TAG: &str = "[WARNING]";

/// One question plus the text it is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubQuery {
    pub query: String,
    pub context: Option<String>,
}

impl SubQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            context: None,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Parse `llm_query(query, context?)` or `llm_query({query, context})`.
    pub fn from_args(args: &[Value]) -> Result<Self, String> {
        match args {
            [] => Err("llm_query expects a query string".into()),
            [Value::Object(_)] => Self::from_item(&args[0]),
            [query, rest @ ..] => {
                let query = query
                    .as_str()
                    .ok_or("llm_query expects the query to be a string")?;
                Ok(Self {
                    query: query.to_string(),
                    context: rest.first().and_then(context_text),
                })
            }
        }
    }

    /// Parse `llm_query_batched([...])` where each item is a query string
    /// or a `{query, context}` object.
    ///
    /// Only a non-array argument fails the whole call; items are parsed
    /// one by one so a bad item cannot take its siblings down with it.
    pub fn batch_from_args(args: &[Value]) -> Result<Vec<Result<Self, String>>, String> {
        let items = args
            .first()
            .and_then(Value::as_array)
            .ok_or("llm_query_batched expects an array of {query, context} objects")?;
        Ok(items.iter().map(Self::from_item).collect())
    }

    fn from_item(item: &Value) -> Result<Self, String> {
        match item {
            Value::String(query) => Ok(Self::new(query.clone())),
            Value::Object(map) => {
                let query = map
                    .get("query")
                    .and_then(Value::as_str)
                    .ok_or("each sub-query needs a string `query`")?;
                Ok(Self {
                    query: query.to_string(),
                    context: map.get("context").and_then(context_text),
                })
            }
            _ => Err("each sub-query must be a string or a {query, context} object".into()),
        }
    }
}

/// Strings are used as-is; other JSON is serialized.
fn context_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Runs sub-queries against the model within one invocation's budget.
pub struct Dispatcher {
    client: Arc<dyn AiClient>,
    budget: Arc<CallBudget>,
    usage: Arc<Mutex<TokenTracker>>,
    max_context_chars: usize,
    concurrency: usize,
}

impl Dispatcher {
    pub fn new(
        client: Arc<dyn AiClient>,
        budget: Arc<CallBudget>,
        usage: Arc<Mutex<TokenTracker>>,
        config: &SubQueryConfig,
    ) -> Self {
        Self {
            client,
            budget,
            usage,
            max_context_chars: config.max_context_chars as usize,
            concurrency: (config.batch_concurrency as usize).max(1),
        }
    }

    pub fn budget(&self) -> &CallBudget {
        &self.budget
    }

    /// Run one sub-query. Never fails; problems come back as `[ERROR]` text.
    pub async fn query(&self, sub_query: &SubQuery) -> String {
        if sub_query.query.trim().is_empty() {
            return format!("{ERROR_TAG} empty query; nothing was sent");
        }

        let Some(call_number) = self.budget.try_acquire() else {
            debug!(ceiling = self.budget.ceiling(), "sub-query refused, budget exhausted");
            return format!(
                "{ERROR_TAG} sub-query budget exhausted ({ceiling}/{ceiling} calls used); \
                 finish with the information you already have",
                ceiling = self.budget.ceiling()
            );
        };

        let messages = [
            Message::system(SUB_QUERY_SYSTEM_PROMPT),
            Message::user(self.render_prompt(sub_query)),
        ];

        debug!(call_number, "sub-query");
        let mut text = match self.client.send_message(&messages, &[]).await {
            Ok(response) => {
                record_usage(&self.usage, "sub_query", &response.usage);
                response.content
            }
            Err(e) => {
                warn!(call_number, "sub-query failed: {e}");
                format!("{ERROR_TAG} sub-query failed: {e}")
            }
        };

        if self.budget.is_past_high_water(call_number) {
            text.push_str(&format!(
                "\n\n{WARNING_TAG} {call_number}/{} sub-queries used; wrap up soon.",
                self.budget.ceiling()
            ));
        }
        text
    }

    /// Run many sub-queries through a bounded worker pool.
    ///
    /// Result `i` always answers query `i`, whatever order calls finish in.
    pub async fn query_batched(&self, queries: &[SubQuery]) -> Vec<String> {
        if queries.is_empty() {
            return Vec::new();
        }

        let workers = self.concurrency.min(queries.len());
        let cursor = AtomicUsize::new(0);
        let cursor = &cursor;

        let runs = (0..workers).map(move |_| async move {
            let mut done = Vec::new();
            loop {
                let index = cursor.fetch_add(1, Ordering::SeqCst);
                let Some(sub_query) = queries.get(index) else {
                    break;
                };
                done.push((index, self.query(sub_query).await));
            }
            done
        });

        let mut results = vec![String::new(); queries.len()];
        for (index, text) in join_all(runs).await.into_iter().flatten() {
            results[index] = text;
        }
        results
    }

    /// Run a parsed batch. Items that failed to parse answer with an
    /// `[ERROR]` string at their index and take no budget.
    pub async fn query_items(&self, items: &[Result<SubQuery, String>]) -> Vec<String> {
        let (indexes, queries): (Vec<usize>, Vec<SubQuery>) = items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| item.as_ref().ok().map(|q| (index, q.clone())))
            .unzip();

        let mut results: Vec<String> = items
            .iter()
            .map(|item| match item {
                Err(reason) => format!("{ERROR_TAG} {reason}"),
                Ok(_) => String::new(),
            })
            .collect();
        let answers = self.query_batched(&queries).await;
        for (index, answer) in indexes.into_iter().zip(answers) {
            results[index] = answer;
        }
        results
    }

    fn render_prompt(&self, sub_query: &SubQuery) -> String {
        match &sub_query.context {
            Some(context) => {
                let total = context.chars().count();
                let context = if total > self.max_context_chars {
                    let clipped: String = context.chars().take(self.max_context_chars).collect();
                    format!(
                        "{clipped}\n... [context truncated to {}/{total} chars]",
                        self.max_context_chars
                    )
                } else {
                    context.clone()
                };
                format!("{}\n\nContext:\n{context}", sub_query.query)
            }
            None => sub_query.query.clone(),
        }
    }
}
