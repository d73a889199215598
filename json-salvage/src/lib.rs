//! Tolerant recovery of JSON from LLM output.
//!
//! Models produce three failure shapes this crate undoes: prose wrapped
//! around an otherwise valid document, several documents glued together,
//! and documents cut off mid-value by a token limit. `salvage_objects`
//! handles the first two by scanning for balanced objects; `parse_partial`
//! handles truncation by closing whatever was left open and retrying.

#![allow(clippy::indexing_slicing)]

pub mod toolcalls;

use serde_json::Value;

/// Scan `text` for balanced `{...}` regions (string- and escape-aware) and
/// return every region that parses as a JSON object, in order of
/// appearance. An unbalanced trailing region is simply not returned.
pub fn salvage_objects(text: &str) -> Vec<Value> {
    let chars: Vec<char> = text.chars().collect();
    let mut results = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i] != '{' {
            i += 1;
            continue;
        }
        match balanced_end(&chars, i) {
            Some(end) => {
                let candidate: String = chars[i..=end].iter().collect();
                if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&candidate) {
                    results.push(value);
                    i = end + 1;
                    continue;
                }
                // Balanced but invalid; step inside in case a nested object
                // is well-formed on its own.
                i += 1;
            }
            None => {
                i += 1;
            }
        }
    }

    results
}

/// Index of the `}` closing the object opened at `start`, or `None` when
/// the text ends first.
fn balanced_end(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &ch) in chars[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse possibly-truncated JSON. A document that parses as-is is returned
/// unchanged; otherwise an unterminated string is closed, incomplete
/// trailing tokens are cut back to the last completed value, open arrays
/// and objects are closed, and the repaired document is parsed. `None`
/// means nothing recoverable was found.
pub fn parse_partial(text: &str) -> Option<Value> {
    let trimmed = strip_noise(text);
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Some(value);
    }

    let mut chars: Vec<char> = trimmed.chars().collect();
    if scan(&chars).ends_in_string {
        chars.push('"');
    }

    // Try the longest prefix first, then back off through points where a
    // value had just completed.
    let mut cuts = vec![chars.len()];
    cuts.extend(scan(&chars).clean_points.into_iter().rev().map(|i| i + 1));
    cuts.dedup();

    for cut in cuts.into_iter().take(24) {
        if let Some(value) = try_close_and_parse(&chars[..cut]) {
            return Some(value);
        }
    }
    None
}

/// Drop prose before the first structural opener and after the last
/// plausible JSON character (markdown fences, "Here is the JSON:" wrap).
fn strip_noise(text: &str) -> &str {
    let Some(start) = text.find(['{', '[']) else {
        return "";
    };
    let end = text
        .rfind(|c: char| matches!(c, '}' | ']' | '"') || c.is_ascii_alphanumeric())
        .map_or(text.len(), |i| i + 1);
    if end <= start {
        return "";
    }
    text.get(start..end).unwrap_or("")
}

struct ScanState {
    ends_in_string: bool,
    /// Indices where a value has just completed and containers may close.
    clean_points: Vec<usize>,
}

fn scan(chars: &[char]) -> ScanState {
    let mut in_string = false;
    let mut escaped = false;
    let mut clean_points = Vec::new();

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
                clean_points.push(i);
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '}' | ']' => clean_points.push(i),
            c if c.is_ascii_digit() => clean_points.push(i),
            'e' | 'l' => clean_points.push(i), // true/false/null tails
            _ => {}
        }
    }

    ScanState {
        ends_in_string: in_string,
        clean_points,
    }
}

fn try_close_and_parse(prefix: &[char]) -> Option<Value> {
    let mut repaired: String = prefix.iter().collect::<String>().trim_end().to_string();
    if repaired.ends_with(',') {
        repaired.pop();
    } else if repaired.ends_with(':') {
        repaired.push_str("null");
    }

    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for ch in repaired.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }
    if in_string {
        return None;
    }
    while let Some(closer) = closers.pop() {
        repaired.push(closer);
    }

    serde_json::from_str::<Value>(&repaired).ok()
}
