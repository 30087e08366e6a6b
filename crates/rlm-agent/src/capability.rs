//! Host capabilities exposed to session code.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rlm_sandbox::CapabilityHandler;
use serde_json::Value;
use tracing::debug;

use crate::dispatch::{Dispatcher, SubQuery};

/// Built-in single sub-query.
pub const LLM_QUERY: &str = "llm_query";

/// Built-in batched sub-query.
pub const LLM_QUERY_BATCHED: &str = "llm_query_batched";

/// Names always bound in a session, ahead of caller capabilities.
pub const BUILTIN_CAPABILITIES: [&str; 2] = [LLM_QUERY, LLM_QUERY_BATCHED];

/// `(name, description)` of the built-ins, in binding order.
pub fn describe_builtins() -> Vec<(String, String)> {
    vec![
        (
            LLM_QUERY.to_string(),
            "Ask a sub-model one question about a context string.".to_string(),
        ),
        (
            LLM_QUERY_BATCHED.to_string(),
            "Run many {query, context} sub-queries concurrently, answers in order.".to_string(),
        ),
    ]
}

/// An async host function callable from session code.
#[async_trait]
pub trait Capability: Send + Sync {
    /// One line shown to the model.
    fn description(&self) -> &str;

    async fn call(&self, args: Vec<Value>) -> Result<Value, String>;
}

/// Adapts a synchronous closure into a [`Capability`].
pub struct FnCapability<F> {
    description: String,
    func: F,
}

impl<F> FnCapability<F>
where
    F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync,
{
    pub fn new(description: impl Into<String>, func: F) -> Self {
        Self {
            description: description.into(),
            func,
        }
    }
}

#[async_trait]
impl<F> Capability for FnCapability<F>
where
    F: Fn(Vec<Value>) -> Result<Value, String> + Send + Sync,
{
    fn description(&self) -> &str {
        &self.description
    }

    async fn call(&self, args: Vec<Value>) -> Result<Value, String> {
        (self.func)(args)
    }
}

/// Caller-supplied capabilities keyed by name.
#[derive(Clone, Default)]
pub struct CapabilitySet {
    entries: BTreeMap<String, Arc<dyn Capability>>,
}

impl CapabilitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, capability: Arc<dyn Capability>) {
        self.entries.insert(name.into(), capability);
    }

    pub fn with(mut self, name: impl Into<String>, capability: impl Capability + 'static) -> Self {
        self.insert(name, Arc::new(capability));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Capability>> {
        self.entries.get(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `(name, description)` pairs for prompts.
    pub fn describe(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .map(|(name, cap)| (name.clone(), cap.description().to_string()))
            .collect()
    }
}

/// Resolves session capability calls: built-ins go to the dispatcher,
/// everything else to the caller's capability set.
pub(crate) struct CapabilityRouter<'a> {
    dispatcher: &'a Dispatcher,
    capabilities: &'a CapabilitySet,
}

impl<'a> CapabilityRouter<'a> {
    pub(crate) fn new(dispatcher: &'a Dispatcher, capabilities: &'a CapabilitySet) -> Self {
        Self {
            dispatcher,
            capabilities,
        }
    }
}

#[async_trait]
impl<'a> CapabilityHandler for CapabilityRouter<'a> {
    async fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, String> {
        match name {
            LLM_QUERY => {
                let sub_query = SubQuery::from_args(&args)?;
                Ok(Value::String(self.dispatcher.query(&sub_query).await))
            }
            LLM_QUERY_BATCHED => {
                let batch = SubQuery::batch_from_args(&args)?;
                debug!(size = batch.len(), "batched sub-query");
                let results = self.dispatcher.query_items(&batch).await;
                Ok(Value::Array(results.into_iter().map(Value::String).collect()))
            }
            other => match self.capabilities.get(other) {
                Some(capability) => capability.call(args).await,
                None => Err(format!("unknown capability '{other}'")),
            },
        }
    }
}
