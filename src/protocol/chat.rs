//! Chat components as they appear in disconnect reasons and status descriptions.

use serde_json::{json, Value};

/// True for text that already is a component: a JSON object, array or string.
pub fn is_json(text: &str) -> bool {
    matches!(
        serde_json::from_str::<Value>(text),
        Ok(Value::Object(_) | Value::Array(_) | Value::String(_))
    )
}

/// Wraps a plain reason into a text component; components pass through untouched.
pub fn escape(reason: &str) -> String {
    if is_json(reason) {
        reason.to_owned()
    } else {
        json!({ "text": reason }).to_string()
    }
}

/// Flattens a component into the text a player would read.
pub fn plain_text(component: &str) -> String {
    match serde_json::from_str::<Value>(component) {
        Ok(value) => {
            let mut out = String::new();
            flatten(&value, &mut out);
            out
        }
        Err(_) => component.to_owned(),
    }
}

fn flatten(value: &Value, out: &mut String) {
    match value {
        Value::String(text) => out.push_str(text),
        Value::Array(parts) => parts.iter().for_each(|part| flatten(part, out)),
        Value::Object(map) => {
            if let Some(Value::String(text)) = map.get("text") {
                out.push_str(text);
            }
            if let Some(extra) = map.get("extra") {
                flatten(extra, out);
            }
        }
        Value::Null => {}
        other => out.push_str(&other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_plain_reason() {
        assert_eq!(escape("Invalid nonce!"), r#"{"text":"Invalid nonce!"}"#);
    }

    #[test]
    fn test_json_reason_untouched() {
        let reason = r#"{"text":"bye","color":"red"}"#;
        assert_eq!(escape(reason), reason);
    }

    #[test]
    fn test_scalar_json_is_wrapped() {
        assert_eq!(escape("42"), r#"{"text":"42"}"#);
        assert_eq!(escape("true"), r#"{"text":"true"}"#);
        assert_eq!(escape("null"), r#"{"text":"null"}"#);
        assert_eq!(escape(r#""quoted""#), r#""quoted""#);
        assert_eq!(escape(r#"["a","b"]"#), r#"["a","b"]"#);
        assert!(!is_json("1.5"));
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(plain_text(r#"{"text":"Outdated ","extra":["client",{"text":"!"}]}"#), "Outdated client!");
        assert_eq!(plain_text(r#""quoted""#), "quoted");
        assert_eq!(plain_text("not json at all"), "not json at all");
    }
}
