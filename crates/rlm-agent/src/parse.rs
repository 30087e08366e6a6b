//! Lenient parsing of model replies.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\s*```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap()
});

/// Find a JSON object in free text.
///
/// Tries the whole text first, then the span from the first `{` to the
/// last `}` (which covers fenced or prefixed replies).
pub fn extract_json_object(text: &str) -> Option<Map<String, Value>> {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text.trim()) {
        return Some(map);
    }
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }
    match serde_json::from_str::<Value>(&text[start..=end]) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Remove a single Markdown code fence wrapped around `code`.
pub fn strip_code_fences(code: &str) -> String {
    match CODE_FENCE.captures(code) {
        Some(caps) => caps
            .get(1)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        None => code.to_string(),
    }
}
