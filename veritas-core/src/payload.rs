//! Structured payload extraction from generated text.
//!
//! Models return JSON wrapped in Markdown fences more often than not, and
//! occasionally bare JSON. Every pipeline stage funnels its responses
//! through [`parse_payload`] and applies its own fallback when the payload
//! cannot be decoded — parse failures never reach the run caller.

use crate::error::ParseError;
use serde::de::DeserializeOwned;

/// Extract the JSON body from generated text and decode it as `T`.
///
/// Extraction rule: a ```` ```json ```` fenced block wins; otherwise the
/// first fenced block of any tag; otherwise the whole text is treated as
/// the payload.
pub fn parse_payload<T: DeserializeOwned>(text: &str) -> Result<T, ParseError> {
    let body = extract_json_block(text);
    serde_json::from_str(body.trim()).map_err(|e| ParseError::InvalidJson {
        message: e.to_string(),
    })
}

/// Return the interior of the first fenced block, preferring a `json` tag.
fn extract_json_block(text: &str) -> &str {
    if let Some(inner) = fenced_interior(text, "```json") {
        return inner;
    }
    if let Some(inner) = fenced_interior(text, "```") {
        return inner;
    }
    text
}

fn fenced_interior<'a>(text: &'a str, open: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find("```")?;
    Some(&text[start..start + end])
}

/// Truncate a string to at most `max` characters on a char boundary.
///
/// The pipeline truncates content at several fixed budgets (extraction
/// input, stored raw content, cross-verification excerpts); byte slicing
/// would panic on multi-byte boundaries.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    #[test]
    fn test_parse_tagged_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```\nDone.";
        let parsed: Value = parse_payload(text).unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn test_parse_untagged_fence() {
        let text = "```\n[1, 2, 3]\n```";
        let parsed: Value = parse_payload(text).unwrap();
        assert_eq!(parsed, json!([1, 2, 3]));
    }

    #[test]
    fn test_parse_bare_json() {
        let parsed: Value = parse_payload("{\"ok\": true}").unwrap();
        assert_eq!(parsed, json!({"ok": true}));
    }

    #[test]
    fn test_round_trip() {
        let payload = json!({"title": "T", "scores": [0.1, 0.9]});
        let wrapped = format!("```json\n{payload}\n```");
        let parsed: Value = parse_payload(&wrapped).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn test_non_json_fails() {
        let result: Result<Value, _> = parse_payload("this is prose, not JSON");
        assert!(matches!(result, Err(ParseError::InvalidJson { .. })));
    }

    #[test]
    fn test_typed_decode() {
        #[derive(serde::Deserialize)]
        struct Point {
            title: String,
        }
        let p: Point = parse_payload("```json\n{\"title\": \"X\"}\n```").unwrap();
        assert_eq!(p.title, "X");
    }

    #[test]
    fn test_truncate_chars_ascii() {
        assert_eq!(truncate_chars("hello", 3), "hel");
        assert_eq!(truncate_chars("hi", 10), "hi");
    }

    #[test]
    fn test_truncate_chars_multibyte() {
        // Must not panic on non-ASCII boundaries
        assert_eq!(truncate_chars("héllo", 2), "hé");
    }
}
