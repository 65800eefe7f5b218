//! JSON extraction from LLM output.
//!
//! Planner responses arrive with markdown fences, leading prose, or
//! trailing commentary around the JSON payload. The extractor strips
//! fences and scans for the first balanced JSON object, string-aware so
//! braces inside string literals do not confuse the depth count.

use crate::error::{AdapterError, AdapterResult};

/// Extract the first balanced JSON object from free-form model output.
pub fn extract_json_object(text: &str) -> AdapterResult<&str> {
    let text = strip_fences(text);

    let start = text
        .find('{')
        .ok_or_else(|| AdapterError::Malformed("no JSON object in response".to_string()))?;

    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if *byte == b'\\' {
                escaped = true;
            } else if *byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&text[start..=start + offset]);
                }
            }
            _ => {}
        }
    }

    Err(AdapterError::Malformed(
        "unbalanced JSON object in response".to_string(),
    ))
}

/// Strip leading/trailing markdown code fences.
fn strip_fences(text: &str) -> &str {
    let text = text.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    text.strip_suffix("```").unwrap_or(text).trim()
}

/// Extract and deserialize the first JSON object in the text.
pub fn extract_and_parse<T: for<'de> serde::Deserialize<'de>>(text: &str) -> AdapterResult<T> {
    let json = extract_json_object(text)?;
    serde_json::from_str(json).map_err(|e| AdapterError::Malformed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_object() {
        assert_eq!(extract_json_object(r#"{"a": 1}"#).unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn test_fenced_object() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json_object(text).unwrap(), r#"{"a": 1}"#);
    }

    #[test]
    fn test_surrounding_prose() {
        let text = "Here is your script:\n{\"title\": \"Ad\"}\nLet me know!";
        assert_eq!(extract_json_object(text).unwrap(), r#"{"title": "Ad"}"#);
    }

    #[test]
    fn test_braces_inside_strings() {
        let text = r#"{"prompt": "show {product} on a table"}"#;
        assert_eq!(extract_json_object(text).unwrap(), text);
    }

    #[test]
    fn test_nested_objects() {
        let text = r#"noise {"a": {"b": {"c": 1}}} trailing"#;
        assert_eq!(
            extract_json_object(text).unwrap(),
            r#"{"a": {"b": {"c": 1}}}"#
        );
    }

    #[test]
    fn test_unbalanced_is_malformed() {
        assert!(matches!(
            extract_json_object(r#"{"a": 1"#),
            Err(AdapterError::Malformed(_))
        ));
        assert!(matches!(
            extract_json_object("no json here"),
            Err(AdapterError::Malformed(_))
        ));
    }

    #[test]
    fn test_escaped_quotes() {
        let text = r#"{"say": "he said \"{\" loudly"}"#;
        assert_eq!(extract_json_object(text).unwrap(), text);
    }

    #[test]
    fn test_extract_and_parse() {
        #[derive(serde::Deserialize)]
        struct Out {
            title: String,
        }
        let out: Out = extract_and_parse("```json\n{\"title\": \"Eco\"}\n```").unwrap();
        assert_eq!(out.title, "Eco");
    }
}
