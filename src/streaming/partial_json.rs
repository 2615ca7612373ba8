//! Incremental reconstruction of values from truncated JSON.
//!
//! Tool-call argument streams and structured-output streams both arrive as a
//! monotonically growing prefix of valid JSON, token by token. This module
//! produces the best still-parseable value after every increment, without
//! error-based control flow for expected truncation.

use serde_json::Value;

/// Accumulates JSON text fragments and tracks the last-known-good parse.
#[derive(Debug, Default, Clone)]
pub struct PartialJson {
    buffer: String,
    last_good: Option<Value>,
}

impl PartialJson {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and attempt a tolerant parse of the whole buffer.
    ///
    /// Returns `Some(value)` only when the tolerant parse succeeds; that
    /// value becomes the new last-known-good. Returns `None` when the buffer
    /// is not yet parseable; the caller should omit `parsed` from the
    /// outgoing delta rather than report a stale value as current. An empty
    /// fragment performs no parse attempt.
    pub fn push(&mut self, fragment: &str) -> Option<Value> {
        if fragment.is_empty() {
            return None;
        }
        self.buffer.push_str(fragment);
        match parse_prefix(&self.buffer) {
            Some(value) => {
                self.last_good = Some(value.clone());
                Some(value)
            }
            None => None,
        }
    }

    /// The raw accumulated text.
    pub fn raw(&self) -> &str {
        &self.buffer
    }

    /// The last-known-good parse, if any.
    pub fn value(&self) -> Option<&Value> {
        self.last_good.as_ref()
    }

    /// Final exact parse of the full accumulated text.
    ///
    /// Once the stream has delivered complete JSON, this must equal parsing
    /// the accumulated text in one pass (no drift between incremental and
    /// final parse).
    pub fn finish(&self) -> Option<Value> {
        serde_json::from_str(&self.buffer).ok()
    }
}

/// Tolerant parse of a prefix of valid JSON.
///
/// Pure function: strict parse first; on failure, complete the prefix
/// (close strings, drop dangling escapes/commas/partial literals, close
/// open containers) and parse that. Returns `None` when no still-valid
/// completion exists.
pub fn parse_prefix(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }
    let completed = complete_prefix(trimmed)?;
    serde_json::from_str(&completed).ok()
}

/// Build a syntactically complete JSON text from a truncated prefix, or
/// `None` when the prefix cannot be completed.
fn complete_prefix(text: &str) -> Option<String> {
    let mut stack: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                // Mismatched close means the input is not a prefix of
                // valid JSON at all.
                if stack.pop() != Some(c) {
                    return None;
                }
            }
            '"' => in_string = true,
            _ => {}
        }
    }

    let mut out = text.to_string();
    if escaped {
        // A dangling backslash cannot be completed meaningfully; drop it
        // so the string closes at the last complete lexeme.
        out.pop();
    }
    if in_string {
        out.push('"');
    }

    trim_dangling(&mut out);
    for close in stack.iter().rev() {
        out.push(*close);
    }
    Some(out)
}

/// Remove trailing artifacts that would make the completed text invalid:
/// trailing commas, half-written literals (`tru`, `12.`, `-`), and a
/// dangling `"key":` (completed with `null`).
fn trim_dangling(out: &mut String) {
    loop {
        let trimmed = out.trim_end();
        if trimmed.len() != out.len() {
            out.truncate(trimmed.len());
        }
        if out.ends_with(',') {
            out.pop();
            continue;
        }
        if out.ends_with(':') {
            out.push_str("null");
            return;
        }
        // Trim a trailing partial literal (identifier or number fragment)
        // unless it already forms a complete one. The boundary character may
        // be multi-byte, so advance by its encoded length.
        let tail_start = out
            .char_indices()
            .rev()
            .find(|(_, c)| !(c.is_ascii_alphanumeric() || "+-.eE".contains(*c)))
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        let tail = &out[tail_start..];
        if tail.is_empty() {
            return;
        }
        // A complete literal (or one a strict parse would accept after
        // closing brackets) is left alone.
        if matches!(tail, "true" | "false" | "null") || serde_json::from_str::<Value>(tail).is_ok()
        {
            return;
        }
        // Prefixes of keyword literals can be completed instead of dropped.
        for keyword in ["true", "false", "null"] {
            if keyword.starts_with(tail) {
                let missing = &keyword[tail.len()..];
                out.push_str(missing);
                return;
            }
        }
        out.truncate(tail_start);
    }
}
