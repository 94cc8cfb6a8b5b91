//! Prompt templating: `{{path.to.field}}` substitution by dot-path.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use tier0::{EngineError, ErrorKind};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.$-]+)\s*\}\}").expect("valid regex"));

/// Look up a dot-path in a JSON value.
fn lookup<'a>(input: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = input;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Render a value for interpolation: strings verbatim, scalars via
/// display, objects and arrays as JSON.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

/// Substitute every `{{path}}` placeholder in `template` from `input`.
///
/// A placeholder whose path resolves to nothing fails with
/// `MissingVariable` — callers check templates before any model call.
pub fn render_template(template: &str, input: &Value) -> Result<String, EngineError> {
    let mut missing: Option<String> = None;
    let rendered = PLACEHOLDER.replace_all(template, |caps: &regex::Captures<'_>| {
        let path = &caps[1];
        match lookup(input, path) {
            Some(value) => render_value(value),
            None => {
                if missing.is_none() {
                    missing = Some(path.to_string());
                }
                String::new()
            }
        }
    });

    match missing {
        Some(path) => Err(EngineError::new(
            ErrorKind::MissingVariable,
            format!("template variable not found in input: {path}"),
        )),
        None => Ok(rendered.into_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn substitutes_simple_and_nested_paths() {
        let input = json!({"name": "Ada", "job": {"title": "engineer"}});
        let out = render_template("{{name}} is an {{job.title}}", &input).unwrap();
        assert_eq!(out, "Ada is an engineer");
    }

    #[test]
    fn objects_render_as_json() {
        let input = json!({"cfg": {"a": 1}});
        let out = render_template("config: {{cfg}}", &input).unwrap();
        assert_eq!(out, "config: {\"a\":1}");
    }

    #[test]
    fn numbers_and_bools_render_plainly() {
        let input = json!({"n": 42, "ok": true});
        assert_eq!(render_template("{{n}} {{ok}}", &input).unwrap(), "42 true");
    }

    #[test]
    fn array_index_paths() {
        let input = json!({"items": ["a", "b"]});
        assert_eq!(render_template("{{items.1}}", &input).unwrap(), "b");
    }

    #[test]
    fn missing_variable_fails_with_path() {
        let input = json!({"a": 1});
        let err = render_template("{{a}} {{b.c}}", &input).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MissingVariable);
        assert!(err.message.contains("b.c"));
    }

    #[test]
    fn no_placeholders_is_identity() {
        let input = json!({});
        assert_eq!(
            render_template("plain text", &input).unwrap(),
            "plain text"
        );
    }

    #[test]
    fn whitespace_inside_braces_tolerated() {
        let input = json!({"x": "y"});
        assert_eq!(render_template("{{ x }}", &input).unwrap(), "y");
    }
}
