//! One-shot recovery when the step budget runs out.
//!
//! The extractor sees the full execution history and must answer with the
//! output fields directly. It gets exactly one attempt.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::context::TrajectoryEntry;
use crate::parse::extract_json_object;
use crate::prompt::{extraction_prompt, VariableInfo};
use crate::schema::{extract_tool, OutputSchema, EXTRACT_TOOL_NAME};
use crate::{AiClient, Message, TokenUsage};

const EXTRACT_SYSTEM_PROMPT: &str = "You turn an unfinished analysis into a final answer. \
Use only facts shown in the execution history.";

/// Everything the extractor is shown.
pub struct ExtractionInput<'a> {
    pub instructions: &'a str,
    pub variables: &'a [VariableInfo],
    /// `(name, description)` of every function bound in the session.
    pub capabilities: &'a [(String, String)],
    pub trajectory: &'a [TrajectoryEntry],
    pub schema: &'a OutputSchema,
    /// Per-entry output clip.
    pub preview_chars: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub fields: Map<String, Value>,
    pub usage: TokenUsage,
}

/// Ask the model once for the output fields.
///
/// `Err` carries a short reason; the caller turns it into a budget error.
pub async fn extract(client: &dyn AiClient, input: ExtractionInput<'_>) -> Result<Extraction, String> {
    let messages = [
        Message::system(EXTRACT_SYSTEM_PROMPT),
        Message::user(extraction_prompt(
            input.instructions,
            input.variables,
            input.capabilities,
            input.trajectory,
            input.schema,
            input.preview_chars,
        )),
    ];
    let tools = [extract_tool(input.schema)];

    info!(entries = input.trajectory.len(), "running fallback extraction");
    let response = client
        .send_message(&messages, &tools)
        .await
        .map_err(|e| format!("extraction call failed: {e}"))?;

    let values = response
        .tool_calls
        .iter()
        .find(|call| call.name == EXTRACT_TOOL_NAME)
        .and_then(|call| call.arguments.as_object().cloned())
        .or_else(|| extract_json_object(&response.content))
        .ok_or_else(|| "extraction reply contained no output fields".to_string())?;

    let problems = input.schema.check(&values);
    if !problems.is_empty() {
        let reason = format!("extraction reply was incomplete: {}", problems.join(", "));
        warn!("{reason}");
        return Err(reason);
    }

    Ok(Extraction {
        fields: input.schema.extract(&values),
        usage: response.usage,
    })
}
