//! Greeting-wrapper payload parsing.
//!
//! The dispatch scheduler stores contacts without an explicit message as a
//! JSON wrapper `{greeting: [...], content: ..., csvVariables: {...}}` so
//! the worker opens with small talk and defers the real content to the
//! reply-triggered flow. Depending on how the payload travelled it may be
//! singly or doubly string-encoded; both must parse to the same structure.
//! Raw JSON must never reach a recipient: when the wrapper will not parse,
//! a regex recovery of the `content` field is attempted, and failing that
//! the payload is `Unparseable`: a hard failure requiring operator
//! attention, not a silent pass-through.

use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::OnceLock;

static CONTENT_RE: OnceLock<Regex> = OnceLock::new();

fn content_re() -> &'static Regex {
    CONTENT_RE.get_or_init(|| {
        Regex::new(r#""content"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex")
    })
}

/// The logical greeting-wrapper structure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GreetingWrapper {
    pub greeting: Vec<String>,
    pub content: String,
    #[serde(default, rename = "csvVariables")]
    pub csv_variables: HashMap<String, String>,
}

/// Parse result for a stored campaign message.
#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    /// A well-formed greeting wrapper.
    Wrapped(GreetingWrapper),
    /// Plain text, sent as-is (after spintax resolution).
    PlainText(String),
    /// Looks like a wrapper but cannot be parsed or recovered.
    Unparseable(String),
}

/// Classify a stored message, tolerating one extra level of string encoding.
pub fn parse_message(raw: &str) -> MessagePayload {
    let trimmed = raw.trim();

    if !trimmed.starts_with('{') && !trimmed.starts_with('"') {
        return MessagePayload::PlainText(raw.to_string());
    }

    if let Ok(wrapper) = serde_json::from_str::<GreetingWrapper>(trimmed) {
        return MessagePayload::Wrapped(wrapper);
    }

    // Double-encoded: a JSON string whose contents are the wrapper.
    if let Ok(inner) = serde_json::from_str::<String>(trimmed) {
        if let Ok(wrapper) = serde_json::from_str::<GreetingWrapper>(&inner) {
            return MessagePayload::Wrapped(wrapper);
        }
    }

    // JSON-ish text that mentions the wrapper fields: try to salvage the
    // content before declaring it unparseable.
    if trimmed.contains("greeting") || trimmed.contains("content") {
        if let Some(content) = recover_content(trimmed) {
            return MessagePayload::PlainText(content);
        }
        return MessagePayload::Unparseable(raw.to_string());
    }

    MessagePayload::PlainText(raw.to_string())
}

/// Best-effort extraction of the `content` field from malformed wrapper text.
fn recover_content(raw: &str) -> Option<String> {
    let caps = content_re().captures(raw)?;
    let escaped = caps.get(1)?.as_str();
    if escaped.is_empty() {
        return None;
    }
    Some(escaped.replace("\\\"", "\"").replace("\\\\", "\\"))
}
