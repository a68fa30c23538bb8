//! Extracting structured payloads from model text.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde_json::Value;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```([A-Za-z]*)\s*(.*?)\s*```").unwrap());

/// Parse a JSON object out of model output.
///
/// Accepts bare JSON, or the first fenced block tagged `json` (or untagged).
pub fn parse_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim();

    if trimmed.starts_with('{') {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str(trimmed) {
            return Some(value);
        }
    }

    FENCED_BLOCK
        .captures_iter(trimmed)
        .filter(|captures| {
            let tag = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
            tag.is_empty() || tag.eq_ignore_ascii_case("json")
        })
        .find_map(|captures| {
            let body = captures.get(2)?.as_str();
            match serde_json::from_str(body) {
                Ok(value @ Value::Object(_)) => Some(value),
                _ => None,
            }
        })
}

/// Remove a surrounding code fence (e.g. ```html) from text output.
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    match FENCED_BLOCK.captures(trimmed) {
        Some(captures) if captures.get(0).map(|m| m.as_str()) == Some(trimmed) => captures
            .get(2)
            .map(|m| m.as_str().to_string())
            .unwrap_or_default(),
        _ => trimmed.to_string(),
    }
}
