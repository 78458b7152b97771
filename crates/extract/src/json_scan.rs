//! Locate and parse the JSON object embedded in a model response.
//!
//! Models wrap their JSON in prose, markdown fences and apologies, and the JSON itself is
//! often slightly off (trailing commas, single quotes, raw newlines inside strings). The
//! scanner here collects every *balanced* `{...}` span in one pass, tracking string literals
//! so a brace inside a quoted value does not end a span early, and tries them in start order,
//! giving each candidate one repaired retry before moving on.

use serde_json::{Map, Value};
use std::collections::HashSet;
use std::ops::Range;

/// A JSON object found in free text.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonCandidate {
    pub object: Map<String, Value>,
    /// Byte range of the object inside the scanned text.
    pub span: Range<usize>,
    /// True when the object only parsed after textual repair.
    pub repaired: bool,
}

/// Candidates past this many get only the plain parse; repair is linear in the span, and
/// deeply nested junk would otherwise repair the same bytes once per level.
const MAX_REPAIR_ATTEMPTS: usize = 32;

/// Extra passes allowed after a pass ends inside an unterminated string.
const MAX_RESCANS: usize = 4;

/// Find the first balanced span, by start offset, that parses (possibly after repair) into
/// a JSON object. A span that fails does not hide the objects nested inside it.
pub fn find_first_object(text: &str) -> Option<JsonCandidate> {
    let mut repairs_left = MAX_REPAIR_ATTEMPTS;
    let mut tried = HashSet::new();
    let mut from = 0;

    for _ in 0..=MAX_RESCANS {
        let scan = scan_spans(text, from);

        for span in scan.spans {
            if !tried.insert(span.clone()) {
                continue;
            }
            let candidate = &text[span.clone()];
            if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(candidate) {
                return Some(JsonCandidate {
                    object,
                    span,
                    repaired: false,
                });
            }
            if repairs_left > 0 {
                repairs_left -= 1;
                if let Ok(Value::Object(object)) = serde_json::from_str::<Value>(&repair(candidate))
                {
                    return Some(JsonCandidate {
                        object,
                        span,
                        repaired: true,
                    });
                }
            }
            tracing::debug!(start = span.start, end = span.end, "balanced span is not valid JSON, skipping");
        }

        match scan.resume_at {
            Some(next) => from = next,
            None => break,
        }
    }

    None
}

struct Scan {
    /// Balanced spans sorted by start offset.
    spans: Vec<Range<usize>>,
    /// Set when the pass ended inside a string: a stray quote after an unclosed brace
    /// may have swallowed later objects, so scanning again past that brace can help.
    resume_at: Option<usize>,
}

/// Every balanced `{...}` span from `from` onwards, in one left-to-right pass.
///
/// Double-quoted strings are tracked only while a brace is open, so quotes in the
/// surrounding prose do not matter. Braces that never close yield no span.
fn scan_spans(text: &str, from: usize) -> Scan {
    let mut open: Vec<usize> = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in text.as_bytes().iter().enumerate().skip(from) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' if !open.is_empty() => in_string = true,
            b'{' => open.push(i),
            b'}' => {
                if let Some(start) = open.pop() {
                    spans.push(start..i + 1);
                }
            }
            _ => {}
        }
    }

    spans.sort_by_key(|span| span.start);
    Scan {
        spans,
        resume_at: if in_string {
            open.first().map(|&start| start + 1)
        } else {
            None
        },
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Quote {
    None,
    Double,
    Single,
}

/// Bounded textual repair for near-JSON.
///
/// - trailing commas before `}` or `]` are dropped
/// - single-quoted strings outside double-quoted bodies become double-quoted
/// - raw control characters inside strings are escaped
pub fn repair(candidate: &str) -> String {
    let chars: Vec<char> = candidate.chars().collect();
    let mut out = String::with_capacity(candidate.len() + 8);
    let mut quote = Quote::None;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        match quote {
            Quote::None => match c {
                '"' => {
                    quote = Quote::Double;
                    out.push(c);
                }
                '\'' => {
                    quote = Quote::Single;
                    out.push('"');
                }
                ',' if closes_next(&chars[i + 1..]) => {}
                _ => out.push(c),
            },
            Quote::Double => {
                if escaped {
                    escaped = false;
                    out.push(c);
                } else if c == '\\' {
                    escaped = true;
                    out.push(c);
                } else if c == '"' {
                    quote = Quote::None;
                    out.push(c);
                } else {
                    push_string_char(&mut out, c);
                }
            }
            Quote::Single => {
                if escaped {
                    escaped = false;
                    if c != '\'' {
                        out.push('\\');
                    }
                    out.push(c);
                } else if c == '\\' {
                    escaped = true;
                } else if c == '\'' {
                    quote = Quote::None;
                    out.push('"');
                } else if c == '"' {
                    out.push_str("\\\"");
                } else {
                    push_string_char(&mut out, c);
                }
            }
        }
    }

    out
}

fn closes_next(rest: &[char]) -> bool {
    matches!(
        rest.iter().find(|c| !c.is_whitespace()),
        Some('}') | Some(']')
    )
}

fn push_string_char(out: &mut String, c: char) {
    match c {
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push(c),
    }
}
