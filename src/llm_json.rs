//! Helpers for reading JSON out of untrusted model output.

use serde_json::{Map, Value};

/// Extract a JSON object from potentially noisy LLM output.
///
/// Handles:
/// - Pure JSON responses
/// - JSON wrapped in markdown code fences
/// - JSON embedded in prose
pub fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();

    if trimmed.starts_with('{') {
        if let Some(end) = find_matching_brace(trimmed) {
            return &trimmed[..end];
        }
    }

    if let Some(start) = trimmed.find('{') {
        let remainder = &trimmed[start..];
        if let Some(end) = find_matching_brace(remainder) {
            return &remainder[..end];
        }
    }

    trimmed
}

/// Byte offset just past the brace closing the first one, ignoring braces
/// inside JSON strings.
fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;

    for (i, c) in s.char_indices() {
        if escape {
            escape = false;
            continue;
        }
        if c == '\\' && in_string {
            escape = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
            continue;
        }
        if in_string {
            continue;
        }
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first JSON object in `raw`.
pub fn parse_object(raw: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(extract_json(raw)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected a JSON object, got {}", type_name(&other))),
        Err(e) => Err(e.to_string()),
    }
}

/// A finite numeric field. Strings, nulls and missing keys yield `None`.
pub fn number_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key)
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_pure() {
        let input = r#"{"index": 0, "confidence": 0.8}"#;
        assert_eq!(extract_json(input), input);
    }

    #[test]
    fn extract_json_with_prose_and_fences() {
        let input = "Sure!\n```json\n{\"index\": 2}\n```\nHope that helps.";
        assert_eq!(extract_json(input), r#"{"index": 2}"#);
    }

    #[test]
    fn extract_json_ignores_braces_in_strings() {
        let input = r#"{"name": "curly } brace", "calories": 10} trailing"#;
        assert_eq!(
            extract_json(input),
            r#"{"name": "curly } brace", "calories": 10}"#
        );
    }

    #[test]
    fn parse_object_rejects_non_objects() {
        assert!(parse_object("[1, 2]").is_err());
        assert!(parse_object("not json").is_err());
        assert!(parse_object("").is_err());
        assert_eq!(parse_object(r#"{"a": 1}"#).unwrap().len(), 1);
    }

    #[test]
    fn number_field_requires_numbers() {
        let map = parse_object(r#"{"a": 1.5, "b": "2", "c": null}"#).unwrap();
        assert_eq!(number_field(&map, "a"), Some(1.5));
        assert_eq!(number_field(&map, "b"), None);
        assert_eq!(number_field(&map, "c"), None);
        assert_eq!(number_field(&map, "d"), None);
    }
}
