//! Instruction templates presented to the model.

use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::context::TrajectoryEntry;
use crate::schema::{OutputSchema, EXTRACT_TOOL_NAME, STEP_TOOL_NAME};

/// Characters of each preloaded value shown in the variable listing.
pub const VARIABLE_PREVIEW_CHARS: usize = 500;

const ACTION_INSTRUCTIONS: &str = r#"You are working inside a persistent JavaScript session.
Large inputs are NOT in this prompt; they are preloaded as global variables.
Explore them with code instead of guessing.

Protocol:
- Every reply is a single `next_step` call.
- To run code, put JavaScript in `code`. Top-level `await` works and
  variables you declare persist into later steps.
- Use `console.log(...)` or `print(...)` to see values. The value of the
  last expression is shown too. Output is truncated when very long.
- Preloaded variables and functions are read-only. Copy them into new
  variables if you need to transform them.
- When the output fields hold your answer, call `next_step` with
  `"final": true` and the fields filled in. Do not send code in that reply.

Built-in functions:
- `await llm_query(query, context)` asks a sub-model one question about
  `context` (a string) and returns its answer as a string.
- `await llm_query_batched([{query, context}, ...])` runs many of those
  concurrently and returns the answers in the same order.
  Sub-queries share one budget; a call past the budget returns a string
  starting with "[ERROR]" instead of an answer.
"#;

/// System prompt for sub-queries issued from session code.
pub const SUB_QUERY_SYSTEM_PROMPT: &str = "You are a focused sub-model answering one \
question about the supplied context for a larger analysis. Answer directly with the \
requested information only. If the context does not contain the answer, say so plainly.";

const EXTRACT_INSTRUCTIONS: &str = "The step budget ran out before a final answer was \
submitted. Using only the execution history below, produce the best answer you can. \
You cannot run more code.";

/// Description of one preloaded value for the system prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableInfo {
    pub name: String,
    pub type_name: &'static str,
    pub total_length: usize,
    pub preview: String,
}

impl VariableInfo {
    pub fn from_json(name: impl Into<String>, value: &Value, preview_chars: usize) -> Self {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            other => other.to_string(),
        };
        let total_length = text.chars().count();
        let preview = if total_length > preview_chars {
            text.chars().take(preview_chars).collect::<String>() + "..."
        } else {
            text
        };

        Self {
            name: name.into(),
            type_name: json_type_name(value),
            total_length,
            preview,
        }
    }

    pub fn format(&self) -> String {
        format!(
            "Variable: `{}`\nType: {}\nTotal length: {} chars\nPreview:\n```\n{}\n```",
            self.name, self.type_name, self.total_length, self.preview
        )
    }
}

/// Describe every preloaded value.
pub fn describe_variables(values: &Map<String, Value>, preview_chars: usize) -> Vec<VariableInfo> {
    values
        .iter()
        .map(|(name, value)| VariableInfo::from_json(name.as_str(), value, preview_chars))
        .collect()
}

pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Limits quoted to the model.
#[derive(Debug, Clone, Copy)]
pub struct PromptLimits {
    pub max_steps: u32,
    pub max_sub_queries: u32,
}

/// System prompt for the step loop.
pub fn action_system_prompt(
    instructions: &str,
    variables: &[VariableInfo],
    capabilities: &[(String, String)],
    schema: &OutputSchema,
    limits: PromptLimits,
) -> String {
    let mut prompt = String::from(ACTION_INSTRUCTIONS);

    if !capabilities.is_empty() {
        prompt.push_str("\nHost functions (async, call with `await`):\n");
        for (name, description) in capabilities {
            let _ = writeln!(prompt, "- `{name}`: {description}");
        }
    }

    let _ = write!(
        prompt,
        "\nBudgets: at most {} steps and {} sub-queries for this task.\n",
        limits.max_steps, limits.max_sub_queries
    );

    prompt.push_str("\nPreloaded variables:\n");
    if variables.is_empty() {
        prompt.push_str("(none)\n");
    }
    for variable in variables {
        prompt.push_str(&variable.format());
        prompt.push('\n');
    }

    let _ = write!(
        prompt,
        "\nOutput fields (sent with `\"final\": true` in `{STEP_TOOL_NAME}`):\n{}\n",
        schema.describe()
    );
    let _ = write!(prompt, "\nTask:\n{instructions}\n");
    prompt
}

/// Appended to the result of every step so the model can pace itself.
pub fn budget_banner(step: u32, max_steps: u32, sub_queries_used: u32, sub_query_ceiling: u32) -> String {
    let remaining = max_steps.saturating_sub(step);
    let mut banner = format!(
        "[step {step}/{max_steps} | sub-queries {sub_queries_used}/{sub_query_ceiling}]"
    );
    if remaining == 1 {
        banner.push_str(" One step left: finish with \"final\": true now.");
    }
    banner
}

/// First user message of an invocation.
pub fn opening_message(max_steps: u32, sub_query_ceiling: u32) -> String {
    format!(
        "Begin by inspecting the preloaded variables with code.\n{}",
        budget_banner(0, max_steps, 0, sub_query_ceiling)
    )
}

/// Feedback for a reply that neither ran code nor finished.
pub fn corrective_message(reason: &str) -> String {
    format!(
        "Your last reply could not be used: {reason}.\nReply with one `{STEP_TOOL_NAME}` call \
         that either has non-empty `code`, or has `\"final\": true` and every required \
         output field."
    )
}

/// Format one trajectory entry, clipping long output.
pub fn format_trajectory_entry(index: usize, entry: &TrajectoryEntry, max_output_chars: usize) -> String {
    let total = entry.output.chars().count();
    let output = if total > max_output_chars {
        let clipped: String = entry.output.chars().take(max_output_chars).collect();
        format!("{clipped}\n... (truncated to {max_output_chars}/{total})")
    } else {
        entry.output.clone()
    };

    let mut formatted = String::new();
    let _ = writeln!(formatted, "=== Step {} ===", index + 1);
    let _ = writeln!(formatted, "Code:\n```js\n{}\n```", entry.code);
    let _ = write!(formatted, "Output:\n{output}");
    formatted
}

/// User message for the fallback extractor.
pub fn extraction_prompt(
    instructions: &str,
    variables: &[VariableInfo],
    capabilities: &[(String, String)],
    trajectory: &[TrajectoryEntry],
    schema: &OutputSchema,
    max_output_chars: usize,
) -> String {
    let mut prompt = String::from(EXTRACT_INSTRUCTIONS);
    let _ = write!(prompt, "\n\nTask:\n{instructions}\n");

    prompt.push_str("\nPreloaded variables:\n");
    for variable in variables {
        let _ = writeln!(
            prompt,
            "- `{}` ({}, {} chars)",
            variable.name, variable.type_name, variable.total_length
        );
    }

    if !capabilities.is_empty() {
        prompt.push_str("\nFunctions the code could call:\n");
        for (name, description) in capabilities {
            let _ = writeln!(prompt, "- `{name}`: {description}");
        }
    }

    prompt.push_str("\nExecution history:\n");
    if trajectory.is_empty() {
        prompt.push_str("(no code was run)\n");
    }
    for (index, entry) in trajectory.iter().enumerate() {
        prompt.push_str(&format_trajectory_entry(index, entry, max_output_chars));
        prompt.push_str("\n\n");
    }

    let _ = write!(
        prompt,
        "Call `{EXTRACT_TOOL_NAME}` with these fields:\n{}\n",
        schema.describe()
    );
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;

    fn schema() -> OutputSchema {
        OutputSchema::new().field("summary", FieldType::String, "Short summary")
    }

    #[test]
    fn variable_preview_is_clipped() {
        let info = VariableInfo::from_json("doc", &json!("abcdefghij"), 4);
        assert_eq!(info.type_name, "string");
        assert_eq!(info.total_length, 10);
        assert_eq!(info.preview, "abcd...");
        assert!(info.format().contains("Variable: `doc`"));
    }

    #[test]
    fn variable_preview_of_object_is_json() {
        let info = VariableInfo::from_json("meta", &json!({"pages": 3}), 100);
        assert_eq!(info.type_name, "object");
        assert!(info.preview.contains("\"pages\": 3"));
    }

    #[test]
    fn action_prompt_mentions_everything() {
        let vars = vec![VariableInfo::from_json("doc", &json!("The quick fox"), 100)];
        let caps = vec![("lookup".to_string(), "Look up a term".to_string())];
        let prompt = action_system_prompt(
            "Summarize the document.",
            &vars,
            &caps,
            &schema(),
            PromptLimits {
                max_steps: 7,
                max_sub_queries: 9,
            },
        );
        assert!(prompt.contains("llm_query_batched"));
        assert!(prompt.contains("`lookup`: Look up a term"));
        assert!(prompt.contains("at most 7 steps and 9 sub-queries"));
        assert!(prompt.contains("Variable: `doc`"));
        assert!(prompt.contains("`summary` (string)"));
        assert!(prompt.ends_with("Summarize the document.\n"));
    }

    #[test]
    fn banner_warns_on_last_step() {
        assert_eq!(budget_banner(1, 5, 0, 10), "[step 1/5 | sub-queries 0/10]");
        assert!(budget_banner(4, 5, 2, 10).contains("One step left"));
    }

    #[test]
    fn trajectory_entry_is_clipped() {
        let entry = TrajectoryEntry {
            code: "print(doc)".into(),
            output: "x".repeat(20),
        };
        let text = format_trajectory_entry(0, &entry, 5);
        assert!(text.starts_with("=== Step 1 ==="));
        assert!(text.contains("print(doc)"));
        assert!(text.contains("(truncated to 5/20)"));
    }

    #[test]
    fn extraction_prompt_includes_history() {
        let trajectory = vec![TrajectoryEntry {
            code: "doc.length".into(),
            output: "13".into(),
        }];
        let vars = vec![VariableInfo::from_json("doc", &json!("The quick fox"), 100)];
        let caps = vec![("lookup".to_string(), "Look up a term".to_string())];
        let prompt = extraction_prompt("Summarize.", &vars, &caps, &trajectory, &schema(), 100);
        assert!(prompt.contains("=== Step 1 ==="));
        assert!(prompt.contains("- `doc` (string, 13 chars)"));
        assert!(prompt.contains("- `lookup`: Look up a term"));
        assert!(prompt.contains("doc.length"));
        assert!(prompt.contains(EXTRACT_TOOL_NAME));
        assert!(!prompt.contains("no code was run"));
    }

    #[test]
    fn corrective_message_names_reason() {
        let msg = corrective_message("'summary' is missing");
        assert!(msg.contains("'summary' is missing"));
        assert!(msg.contains("\"final\": true"));
    }
}
