//! Rendering of execution results into the text fed back to the model.

use serde::{Deserialize, Serialize};

/// Rendered when a fragment logs nothing and has no completion value.
pub const NO_OUTPUT: &str = "[no output]";

/// Rendered when the completion value is an explicit empty string.
pub const EMPTY_STRING_OUTPUT: &str = "\"\"";

/// What one code fragment produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecOutcome {
    /// `console.log` / `print` lines in emission order.
    pub logs: Vec<String>,
    /// Completion value, already formatted. `None` when the fragment
    /// evaluated to `undefined`.
    pub value: Option<String>,
    /// Message of an uncaught error, if the fragment threw.
    pub error: Option<String>,
}

impl ExecOutcome {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }

    /// Render logs, then the error, then the completion value.
    pub fn render(&self, max_chars: usize) -> String {
        let mut parts: Vec<String> = self.logs.clone();
        if let Some(error) = &self.error {
            parts.push(format!("Error: {error}"));
        }
        if let Some(value) = &self.value {
            if value.is_empty() {
                parts.push(EMPTY_STRING_OUTPUT.to_string());
            } else {
                parts.push(value.clone());
            }
        }

        if parts.is_empty() {
            return NO_OUTPUT.to_string();
        }
        truncate_output(&parts.join("\n"), max_chars)
    }
}

/// Clip `text` to `max_chars` characters, appending a marker when clipped.
pub fn truncate_output(text: &str, max_chars: usize) -> String {
    let total = text.chars().count();
    if total <= max_chars {
        return text.to_string();
    }
    let kept: String = text.chars().take(max_chars).collect();
    format!("{kept}\n... [output truncated: showing {max_chars} of {total} chars]")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_outcome_is_no_output() {
        assert_eq!(ExecOutcome::default().render(100), NO_OUTPUT);
    }

    #[test]
    fn empty_string_value_is_distinct_from_no_output() {
        let outcome = ExecOutcome {
            value: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(outcome.render(100), "\"\"");
    }

    #[test]
    fn logs_then_error_then_value() {
        let outcome = ExecOutcome {
            logs: vec!["first".into(), "second".into()],
            value: Some("42".into()),
            error: Some("boom".into()),
        };
        assert_eq!(outcome.render(100), "first\nsecond\nError: boom\n42");
    }

    #[test]
    fn failed_renders_error_only() {
        assert_eq!(
            ExecOutcome::failed("x is not defined").render(100),
            "Error: x is not defined"
        );
    }

    #[test]
    fn truncation_marks_clipped_output() {
        let text = "abcdefghij";
        let out = truncate_output(text, 4);
        assert!(out.starts_with("abcd\n"));
        assert!(out.contains("showing 4 of 10 chars"));
        assert_eq!(truncate_output(text, 10), text);
    }

    #[test]
    fn truncation_counts_chars_not_bytes() {
        let text = "ééééé";
        assert_eq!(truncate_output(text, 5), text);
        assert!(truncate_output(text, 2).starts_with("éé\n"));
    }
}
