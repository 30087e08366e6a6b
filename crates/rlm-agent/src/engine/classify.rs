//! Classification of one model reply.

use serde_json::{Map, Value};

use crate::parse::{extract_json_object, strip_code_fences};
use crate::schema::{OutputSchema, STEP_TOOL_NAME};
use crate::AiResponse;

/// What a step reply asks the engine to do.
#[derive(Debug, Clone, PartialEq)]
pub enum StepReply {
    /// Run `code` in the session.
    Code { reasoning: String, code: String },
    /// `"final": true` with every required field present.
    Completion { fields: Map<String, Value> },
    /// Neither; `reason` is fed back to the model.
    Malformed { reason: String },
}

/// Classify a reply. A completion signal wins over code in the same reply.
pub fn classify_reply(response: &AiResponse, schema: &OutputSchema) -> StepReply {
    let arguments = response
        .tool_calls
        .iter()
        .find(|call| call.name == STEP_TOOL_NAME)
        .or_else(|| response.tool_calls.first())
        .and_then(|call| call.arguments.as_object().cloned())
        .or_else(|| extract_json_object(&response.content));

    let Some(arguments) = arguments else {
        return StepReply::Malformed {
            reason: format!("the reply had no `{STEP_TOOL_NAME}` call or JSON object"),
        };
    };

    if arguments.get("final") == Some(&Value::Bool(true)) {
        let problems = schema.check(&arguments);
        if !problems.is_empty() {
            return StepReply::Malformed {
                reason: format!(
                    "the final answer is incomplete ({})",
                    problems.join(", ")
                ),
            };
        }
        return StepReply::Completion {
            fields: schema.extract(&arguments),
        };
    }

    let reasoning = arguments
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match arguments.get("code").and_then(Value::as_str) {
        Some(code) if !code.trim().is_empty() => StepReply::Code {
            reasoning,
            code: strip_code_fences(code),
        },
        _ => StepReply::Malformed {
            reason: "the reply had neither code to run nor \"final\": true".to_string(),
        },
    }
}
