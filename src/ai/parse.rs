//! Normalization of free-text model replies.
//!
//! Models asked for JSON routinely wrap it in prose or code fences, return a
//! different envelope than requested, or ignore the format entirely. These
//! functions recover what they can and never fail.

use serde_json::{Map, Value};

use super::TestSummary;

pub const RAW_FALLBACK_TITLE: &str = "AI output (raw)";
const EMPTY_REPLY: &str = "The model returned an empty response";

/// Outcome of summary parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SummaryParse {
    /// A JSON array of summaries was recovered.
    Parsed(Vec<TestSummary>),
    /// Nothing usable was found; the trimmed reply text.
    RawFallback(String),
}

impl SummaryParse {
    /// Flatten into a list. The fallback becomes a single catch-all summary.
    pub fn into_summaries(self) -> Vec<TestSummary> {
        match self {
            SummaryParse::Parsed(summaries) => summaries,
            SummaryParse::RawFallback(raw) => {
                let description = if raw.is_empty() { EMPTY_REPLY.to_string() } else { raw };
                vec![TestSummary {
                    title: RAW_FALLBACK_TITLE.to_string(),
                    description,
                    file: None,
                }]
            }
        }
    }
}

/// Parse a summaries reply. First match wins:
/// strict array, `testSummaries` field, API envelope text, embedded JSON, raw fallback.
pub fn parse_summaries(raw: &str) -> SummaryParse {
    let text = raw.trim();

    match serde_json::from_str::<Value>(text) {
        Ok(value) => {
            if let Some(summaries) = summaries_from_value(&value) {
                return SummaryParse::Parsed(summaries);
            }
        }
        Err(_) => {
            if let Some(Value::Array(items)) = embedded_json(text, b"{[")
                .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
            {
                return SummaryParse::Parsed(normalize_items(&items, None));
            }
        }
    }

    SummaryParse::RawFallback(text.to_string())
}

fn summaries_from_value(value: &Value) -> Option<Vec<TestSummary>> {
    match value {
        Value::Array(items) => Some(normalize_items(items, None)),
        Value::Object(map) => {
            if let Some(Value::Array(items)) = map.get("testSummaries") {
                return Some(normalize_items(items, None));
            }
            let inner = value.pointer("/candidates/0/content/parts/0/text")?.as_str()?;
            match serde_json::from_str::<Value>(inner.trim()) {
                Ok(Value::Array(items)) => Some(normalize_items(&items, None)),
                _ => None,
            }
        }
        _ => None,
    }
}

fn normalize_items(items: &[Value], file: Option<&str>) -> Vec<TestSummary> {
    let mut summaries = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match item {
            Value::Object(map) => {
                if let Some(Value::Array(nested)) = map.get("testSummaries") {
                    let tag = non_empty_str(map, "file").or(file);
                    summaries.extend(normalize_items(nested, tag));
                    continue;
                }
                let title = non_empty_str(map, "title")
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Item {}", index + 1));
                let description = non_empty_str(map, "description")
                    .map(str::to_string)
                    .unwrap_or_else(|| item.to_string());
                summaries.push(TestSummary {
                    title,
                    description,
                    file: non_empty_str(map, "file").or(file).map(str::to_string),
                });
            }
            Value::String(text) if text.trim().is_empty() => {}
            Value::String(text) => summaries.push(TestSummary {
                title: format!("Item {}", index + 1),
                description: text.trim().to_string(),
                file: file.map(str::to_string),
            }),
            Value::Null => {}
            other => summaries.push(TestSummary {
                title: format!("Item {}", index + 1),
                description: other.to_string(),
                file: file.map(str::to_string),
            }),
        }
    }
    summaries
}

fn non_empty_str<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    map.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Pull the test body out of a code reply: `{"code": ...}` strictly, then
/// embedded in text, else the trimmed reply verbatim.
pub fn extract_test_code(raw: &str) -> String {
    let text = raw.trim();

    if let Some(code) = serde_json::from_str::<Value>(text).ok().as_ref().and_then(code_field) {
        return code;
    }
    if let Some(code) = embedded_json(text, b"{")
        .and_then(|candidate| serde_json::from_str::<Value>(candidate).ok())
        .as_ref()
        .and_then(code_field)
    {
        return code;
    }
    text.to_string()
}

fn code_field(value: &Value) -> Option<String> {
    value
        .get("code")
        .and_then(Value::as_str)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
}

/// Locate the first JSON object or array embedded in `text`.
///
/// Starts at the first byte in `openers` and returns the balanced span,
/// honouring string literals and escapes. If the brackets never balance the
/// span runs to the last matching closer instead.
pub fn embedded_json<'a>(text: &'a str, openers: &[u8]) -> Option<&'a str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|b| openers.contains(b))?;
    let closer = if bytes[start] == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    let end = bytes.iter().rposition(|&b| b == closer)?;
    (end > start).then(|| &text[start..=end])
}
