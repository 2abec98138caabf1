//! Recovery of JSON payloads from free-form model output.

use serde::de::DeserializeOwned;

use crate::error::GenerationError;

const FENCE: &str = "```";

/// Strip the noise models wrap JSON in and return the candidate payload.
///
/// Trims the text, keeps only the inside of the first fenced block (minus a
/// leading `json` tag) and drops everything before the first `{` or `[`.
pub fn extract_json(raw: &str) -> &str {
    let mut text = raw.trim();

    if let Some(open) = text.find(FENCE) {
        let after = &text[open + FENCE.len()..];
        if let Some(close) = after.find(FENCE) {
            let inner = &after[..close];
            let inner = match inner.get(..4) {
                Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
                _ => inner,
            };
            text = inner.trim();
        }
    }

    match text.find(['{', '[']) {
        Some(start) => &text[start..],
        None => text,
    }
}

/// Parse model output as `T`, mapping any failure to
/// [`GenerationError::MalformedOutput`].
pub fn parse_json<T: DeserializeOwned>(raw: &str) -> Result<T, GenerationError> {
    let payload = extract_json(raw);
    serde_json::from_str(payload).map_err(|e| {
        tracing::debug!(error = %e, raw = %raw, "unparseable generation output");
        GenerationError::MalformedOutput(e.to_string())
    })
}
