//! Recovery of JSON objects from free-form model output.
//!
//! Models wrap JSON in markdown fences or prose, and sometimes cut it short.
//! [`sanitize`] pulls out the outermost brace-delimited span without parsing;
//! [`parse_object`] builds on it to get a typed object.

use serde::de::Error as _;
use serde_json::{Map, Value};

const EMPTY_OBJECT: &str = "{}";

/// Best-effort extraction of a JSON-looking object from `raw`. Never fails.
///
/// Fence markers are stripped, then the text from the first `{` to the last
/// `}` (inclusive) is returned. Without such a span the trimmed text is
/// returned as is. Empty or absent input yields `"{}"`.
pub fn sanitize<'a>(raw: impl Into<Option<&'a str>>) -> String {
    let Some(raw) = raw.into().filter(|raw| !raw.is_empty()) else {
        return EMPTY_OBJECT.to_string();
    };

    let cleaned = raw.replace("```json", "").replace("```", "");

    match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => cleaned[start..=end].to_string(),
        _ => cleaned.trim().to_string(),
    }
}

/// Parse `raw` as a JSON object, falling back to the sanitized span when the
/// text is not clean JSON.
pub fn parse_object(raw: &str) -> Result<Map<String, Value>, serde_json::Error> {
    let value = match serde_json::from_str::<Value>(raw.trim()) {
        Ok(value) => value,
        Err(_) => serde_json::from_str::<Value>(&sanitize(raw))?,
    };

    match value {
        Value::Object(object) => Ok(object),
        other => Err(serde_json::Error::custom(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_fenced_block() {
        let raw = "```json\n{\"a\": 1, \"b\": {\"c\": 2}}\n```";
        assert_eq!(sanitize(raw), "{\"a\": 1, \"b\": {\"c\": 2}}");
    }

    #[test]
    fn extracts_object_from_surrounding_prose() {
        let raw = "Here is the payload you asked for: {\"ok\": true} Let me know!";
        assert_eq!(sanitize(raw), "{\"ok\": true}");
    }

    #[test]
    fn extracts_from_fences_and_prose_together() {
        let raw = "Sure!\n```json\n{\"items\": [{\"id\": 1}]}\n```\nDone.";
        assert_eq!(sanitize(raw), "{\"items\": [{\"id\": 1}]}");
    }

    #[test]
    fn empty_or_absent_input_yields_empty_object() {
        assert_eq!(sanitize(""), "{}");
        assert_eq!(sanitize(None), "{}");
    }

    #[test]
    fn text_without_braces_is_returned_trimmed() {
        assert_eq!(sanitize("  no json here \n"), "no json here");
    }

    #[test]
    fn closing_brace_before_opening_is_not_a_span() {
        assert_eq!(sanitize(" } then { "), "} then {");
    }

    #[test]
    fn truncated_object_is_returned_from_first_brace() {
        // Nothing closes the last object, so the span ends at the inner brace.
        assert_eq!(sanitize("{\"a\": {\"b\": 1}, \"c\": "), "{\"a\": {\"b\": 1}");
    }

    #[test]
    fn parse_object_reads_clean_and_wrapped_json() {
        let clean = parse_object("{\"x\": 1}").unwrap();
        assert_eq!(clean["x"], 1);

        let wrapped = parse_object("Result:\n```json\n{\"x\": 2}\n```").unwrap();
        assert_eq!(wrapped["x"], 2);
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        let error = parse_object("[1, 2, 3]").unwrap_err();
        assert!(error.to_string().contains("expected a JSON object"));
        assert!(parse_object("I could not find anything.").is_err());
    }
}
