//! JSON recovery from free-form model output
//!
//! Vision models asked to "return only JSON" still wrap the object in
//! markdown fences or surround it with prose. Recovery order:
//! 1. Fenced code blocks holding a `{...}` body, in document order
//! 2. The span from the first `{` to the last `}` in the whole text
//!
//! The first candidate that parses as a JSON object wins.

use crate::types::ExtractionResult;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Lazy body so nested braces stop at the first closing fence.
static RE_JSON_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```(?i:json)?\s*(\{.*?\})\s*```").unwrap());

/// Failure to recover a JSON object from model output
#[derive(Debug, Error)]
pub enum ExtractError {
    /// No fenced block parsed and the text has no `{ ... }` span
    #[error("No valid JSON object found in response")]
    NotFound,

    /// The outermost `{ ... }` span exists but is not valid JSON
    #[error("Failed to parse model response as JSON: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Recover a single JSON object from model output
pub fn extract_json_object(text: &str) -> Result<ExtractionResult, ExtractError> {
    let text = text.trim();

    for block in fenced_candidates(text) {
        match serde_json::from_str::<Value>(block) {
            Ok(value) => {
                if let Some(result) = ExtractionResult::from_value(value) {
                    return Ok(result);
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "Skipping fenced block that is not valid JSON");
            }
        }
    }

    let span = outer_brace_span(text).ok_or(ExtractError::NotFound)?;
    match serde_json::from_str::<Value>(span) {
        Ok(value) => ExtractionResult::from_value(value).ok_or(ExtractError::NotFound),
        Err(e) => {
            tracing::error!(error = %e, attempted = %truncate_raw(span, 500), "JSON decode error");
            Err(ExtractError::Malformed(e))
        }
    }
}

/// Bodies of fenced code blocks, in the order they appear
fn fenced_candidates(text: &str) -> impl Iterator<Item = &str> {
    RE_JSON_FENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|body| body.as_str().trim())
}

/// Substring from the first `{` through the last `}`, inclusive
fn outer_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    Some(&text[start..=end])
}

/// Truncate to at most `max_chars` characters for diagnostics
pub fn truncate_raw(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
