//! Best-effort parsing of a JSON object that is still being streamed.
//!
//! [`complete_json`] closes whatever is left open in a prefix so that a
//! lenient decode has a chance to succeed. Both [`parse_partial`] and
//! [`parse_partial_map`] go through it, so they see identical text for the
//! same input. Decode errors mean "not parseable yet" and are never raised.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

/// Closes open strings, arrays and objects in `prefix`.
///
/// Returns `None` for blank input or when the result does not start with
/// `{`. Closers are appended as all `]` followed by all `}`, so some nested
/// shapes come out malformed; callers treat that as not parseable yet.
pub fn complete_json(prefix: &str) -> Option<String> {
    let partial = prefix.trim();
    if partial.is_empty() {
        return None;
    }

    let mut brace_depth: i64 = 0;
    let mut bracket_depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in partial.chars() {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' && in_string {
            escaped = true;
            continue;
        }
        if c == '"' {
            in_string = !in_string;
        } else if !in_string {
            match c {
                '{' => brace_depth += 1,
                '}' => brace_depth -= 1,
                '[' => bracket_depth += 1,
                ']' => bracket_depth -= 1,
                _ => {}
            }
        }
    }

    let mut result = String::with_capacity(partial.len() + 8);
    result.push_str(partial);
    if in_string {
        result.push('"');
    }

    let trimmed_len = result.trim_end().len();
    result.truncate(trimmed_len);
    if result.ends_with(',') {
        result.pop();
    } else if result.ends_with(':') {
        result.push_str("null");
    }

    for _ in 0..bracket_depth.max(0) {
        result.push(']');
    }
    for _ in 0..brace_depth.max(0) {
        result.push('}');
    }

    if !result.starts_with('{') {
        return None;
    }
    Some(result)
}

/// Decodes a prefix into `T`, whose fields should all tolerate absence
/// (`Option` or `#[serde(default)]`). Unknown fields must not be denied.
pub fn parse_partial<T: DeserializeOwned>(prefix: &str) -> Option<T> {
    let completed = complete_json(prefix)?;
    serde_json::from_str(&completed).ok()
}

/// Decodes a prefix into an insertion-ordered map.
pub fn parse_partial_map(prefix: &str) -> Option<Map<String, Value>> {
    let completed = complete_json(prefix)?;
    serde_json::from_str(&completed).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq, serde::Deserialize)]
    struct PartialPerson {
        name: Option<String>,
        age: Option<u32>,
        tags: Option<Vec<String>>,
    }

    #[test]
    fn empty_and_blank_input_is_unavailable() {
        assert_eq!(complete_json(""), None);
        assert_eq!(complete_json("   \n"), None);
        assert_eq!(parse_partial_map(""), None);
    }

    #[test]
    fn closed_object_is_unchanged() {
        let text = r#"{"name":"Ada","tags":["a","b"]}"#;
        assert_eq!(complete_json(text).as_deref(), Some(text));
    }

    #[test]
    fn closes_open_string_and_object() {
        assert_eq!(
            complete_json(r#"{"name":"Ad"#).as_deref(),
            Some(r#"{"name":"Ad"}"#)
        );
        assert_eq!(
            parse_partial::<PartialPerson>(r#"{"name":"Ad"#),
            Some(PartialPerson {
                name: Some("Ad".into()),
                ..Default::default()
            })
        );
    }

    #[test]
    fn trailing_comma_dropped_and_dangling_key_nulled() {
        assert_eq!(
            complete_json(r#"{"name":"Ada", "#).as_deref(),
            Some(r#"{"name":"Ada"}"#)
        );
        assert_eq!(
            complete_json(r#"{"name":"Ada","age":"#).as_deref(),
            Some(r#"{"name":"Ada","age":null}"#)
        );
        assert_eq!(
            parse_partial::<PartialPerson>(r#"{"name":"Ada","age": "#),
            Some(PartialPerson {
                name: Some("Ada".into()),
                age: None,
                tags: None,
            })
        );
    }

    #[test]
    fn closes_open_array() {
        assert_eq!(
            parse_partial::<PartialPerson>(r#"{"tags":["x","y"#).and_then(|p| p.tags),
            Some(vec!["x".to_string(), "y".to_string()])
        );
    }

    #[test]
    fn escaped_quotes_do_not_toggle_string_state() {
        let completed = complete_json(r#"{"quote":"say \"hi"#).expect("completed");
        assert_eq!(completed, r#"{"quote":"say \"hi"}"#);
        let map = parse_partial_map(r#"{"quote":"say \"hi"#).expect("map");
        assert_eq!(map.get("quote"), Some(&Value::String("say \"hi".into())));
    }

    #[test]
    fn braces_inside_strings_are_ignored() {
        assert_eq!(
            complete_json(r#"{"code":"fn main() {"#).as_deref(),
            Some(r#"{"code":"fn main() {"}"#)
        );
    }

    #[test]
    fn non_object_input_is_rejected() {
        assert_eq!(complete_json("[1, 2"), None);
        assert_eq!(complete_json("\"text"), None);
        assert_eq!(complete_json("42"), None);
    }

    #[test]
    fn adversarial_input_never_panics() {
        for input in ["{", "\"", "{\"", "{\"a", "{\"a\":", "}}}", "]]{", "{\\", "{\"a\\", "{[}]", "\u{0}"] {
            let _ = complete_json(input);
            let _ = parse_partial_map(input);
            let _ = parse_partial::<PartialPerson>(input);
        }
        assert!(parse_partial_map("{").expect("lone brace").is_empty());
    }

    #[test]
    fn map_preserves_insertion_order() {
        let map = parse_partial_map(r#"{"zeta":1,"alpha":2,"mid":"#).expect("map");
        let keys: Vec<&str> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn every_prefix_of_a_valid_object_is_safe() {
        let source = serde_json::json!({
            "title": "Report \"Q1\"",
            "score": 12.5,
            "ok": true,
            "items": [{"id": 1, "labels": ["a", "b"]}, {"id": 2, "labels": []}],
            "nested": {"deep": {"value": null}},
            "unicode": "caf\u{e9}"
        });
        let text = serde_json::to_string(&source).expect("serialize");
        let mut parsed_full = None;
        for (k, _) in text.char_indices().chain(std::iter::once((text.len(), ' '))) {
            let prefix = &text[..k];
            if let Some(completed) = complete_json(prefix) {
                // Either it parses or it is reported as not ready.
                let as_value = serde_json::from_str::<Value>(&completed).ok();
                let as_map = parse_partial_map(prefix);
                assert_eq!(as_value.is_some(), as_map.is_some(), "prefix {prefix:?}");
            }
            parsed_full = parse_partial_map(prefix);
        }
        assert_eq!(parsed_full.map(Value::Object), Some(source));
    }
}
