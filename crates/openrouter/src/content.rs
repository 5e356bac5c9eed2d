use serde_json::Value;

/// Flattens the assorted shapes of assistant `content` into plain text.
///
/// Providers answer with a string, `null`, a list of content blocks
/// (`[{"type": "text", "text": "..."}]`) or occasionally a single block
/// object. Anything unrecognized falls back to its JSON representation, so
/// this function never loses a payload silently.
pub fn normalize_content(content: &Value) -> String {
    match content {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Object(map) => match map.get("text") {
            Some(Value::String(text)) => text.clone(),
            Some(Value::Null) | None => content.to_string(),
            Some(text) => normalize_content(text),
        },
        Value::Array(blocks) => blocks
            .iter()
            .filter_map(|block| match block {
                Value::Object(map) => match map.get("text") {
                    Some(Value::String(text)) if !text.is_empty() => {
                        Some(text.clone())
                    }
                    Some(Value::String(_) | Value::Null | Value::Bool(false))
                    | None => None,
                    Some(text) => Some(text.to_string()),
                },
                Value::String(text) => Some(text.clone()),
                other => Some(other.to_string()),
            })
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_plain_shapes() {
        assert_eq!(normalize_content(&Value::Null), "");
        assert_eq!(normalize_content(&json!("4")), "4");
        assert_eq!(normalize_content(&json!(42)), "42");
    }

    #[test]
    fn test_content_blocks() {
        let content = json!([
            {"type": "text", "text": "Apple closed at 227.5."},
            {"type": "reasoning", "text": ""},
            {"type": "image_url", "image_url": {"url": "https://x"}},
            "trailing note"
        ]);
        assert_eq!(
            normalize_content(&content),
            "Apple closed at 227.5.\ntrailing note"
        );
    }

    #[test]
    fn test_object_fallbacks() {
        assert_eq!(normalize_content(&json!({"text": "hi"})), "hi");
        assert_eq!(
            normalize_content(&json!({"text": [{"text": "nested"}]})),
            "nested"
        );
        assert_eq!(
            normalize_content(&json!({"unexpected": true})),
            r#"{"unexpected":true}"#
        );
    }
}
