//! Static checks applied to submitted code before it reaches the runtime.
//!
//! Preloaded values and capability names are read-only inside a session.
//! Code that would reassign or redeclare one of them is rejected with a
//! descriptive message instead of being executed.

use regex::Regex;
use std::sync::LazyLock;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").unwrap());

static USE_STRICT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?m)(?:^|[{;])\s*["']use strict["']"#).unwrap());

/// Whether `name` can be installed as a global binding.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER.is_match(name)
}

/// Check `code` against the session's reserved names.
///
/// Returns `Err` with a `[REJECTED]` message the model can act on.
pub fn check_code(code: &str, reserved: &[String]) -> Result<(), String> {
    if USE_STRICT.is_match(code) {
        return Err(
            "[REJECTED] \"use strict\" is not allowed: strict evaluation drops variables \
             between steps. Remove the directive and resubmit."
                .to_string(),
        );
    }

    let masked = mask_literals(code);
    for name in reserved {
        if touches_reserved(code, &masked, name) {
            return Err(format!(
                "[REJECTED] code reassigns or redeclares the reserved name '{name}'. \
                 Preloaded values and capabilities are read-only; copy the value into \
                 a new variable instead."
            ));
        }
    }

    Ok(())
}

/// `masked` is `code` after [`mask_literals`]; bracketed `globalThis`
/// writes name their target in a string, so that pattern sees `code`.
fn touches_reserved(code: &str, masked: &str, name: &str) -> bool {
    let n = regex::escape(name);
    // `x.name = ...` is a property write on another object, hence the `.` exclusion.
    let patterns = [
        format!(r"(?m)(?:^|[^\w$.])(?:let|const|var|function|class)\s+{n}(?:[^\w$]|$)"),
        format!(
            r"(?m)(?:^|[^\w$.]){n}\s*(?:\*\*|<<|>>>?|&&|\|\||\?\?|[-+*/%&|^])?=(?:[^=>]|$)"
        ),
        format!(r"(?m)(?:^|[^\w$.]){n}\s*(?:\+\+|--)"),
        format!(r"(?m)(?:\+\+|--)\s*{n}(?:[^\w$]|$)"),
        format!(r"globalThis\s*\.\s*{n}\s*(?:[-+*/%&|^]|\*\*|<<|>>>?|&&|\|\||\?\?)?=(?:[^=]|$)"),
        format!(r"(?m)(?:^|[^\w$.])delete\s+(?:globalThis\s*\.\s*)?{n}(?:[^\w$]|$)"),
    ];
    let bracketed = format!(r#"globalThis\s*\[\s*["'`]{n}["'`]\s*\]\s*=(?:[^=]|$)"#);

    let matches = |pattern: &str, text: &str| match Regex::new(pattern) {
        Ok(re) => re.is_match(text),
        Err(_) => false,
    };
    patterns.iter().any(|pattern| matches(pattern.as_str(), masked))
        || matches(bracketed.as_str(), code)
}

fn blank(c: char) -> char {
    if c == '\n' {
        '\n'
    } else {
        ' '
    }
}

/// Replace the contents of string literals, template text and comments
/// with spaces. Delimiters, line breaks and `${...}` expressions are kept.
fn mask_literals(code: &str) -> String {
    let chars: Vec<char> = code.chars().collect();
    let mut out = String::with_capacity(code.len());
    // Brace depth at which each open `${` was entered, innermost last.
    let mut templates: Vec<usize> = Vec::new();
    let mut depth = 0usize;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        match c {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                out.push_str("  ");
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    out.push(blank(chars[i]));
                    i += 1;
                }
                if i < chars.len() {
                    out.push_str("  ");
                    i += 2;
                }
            }
            '\'' | '"' => {
                out.push(c);
                i += 1;
                while i < chars.len() && chars[i] != c && chars[i] != '\n' {
                    if chars[i] == '\\' && i + 1 < chars.len() {
                        out.push(' ');
                        out.push(blank(chars[i + 1]));
                        i += 2;
                    } else {
                        out.push(' ');
                        i += 1;
                    }
                }
                if i < chars.len() {
                    out.push(chars[i]);
                    i += 1;
                }
            }
            '`' => {
                out.push('`');
                i = mask_template_text(&chars, i + 1, &mut out, &mut templates, depth);
            }
            '{' => {
                depth += 1;
                out.push('{');
                i += 1;
            }
            '}' if templates.last() == Some(&depth) => {
                templates.pop();
                out.push('}');
                i = mask_template_text(&chars, i + 1, &mut out, &mut templates, depth);
            }
            '}' => {
                depth = depth.saturating_sub(1);
                out.push('}');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    out
}

/// Blank template text starting at `i` up to the closing backtick or the
/// next `${`, whose depth is pushed onto `templates`. Returns the index to
/// resume scanning code from.
fn mask_template_text(
    chars: &[char],
    mut i: usize,
    out: &mut String,
    templates: &mut Vec<usize>,
    depth: usize,
) -> usize {
    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(' ');
                out.push(blank(chars[i + 1]));
                i += 2;
            }
            '`' => {
                out.push('`');
                return i + 1;
            }
            '$' if chars.get(i + 1) == Some(&'{') => {
                out.push_str("${");
                templates.push(depth);
                return i + 2;
            }
            c => {
                out.push(blank(c));
                i += 1;
            }
        }
    }
    i
}
