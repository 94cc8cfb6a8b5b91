#![deny(missing_docs)]
//! Structural validation against a JSON-schema subset.
//!
//! Supported keys: `type` (object, array, string, number, boolean,
//! null), `properties`, `required`, `items`, `enum`. Unknown schema keys
//! are ignored for forward compatibility.
//!
//! One coercion is applied before validation: object fields declared
//! `type: "number"` are converted from numeric strings when the
//! conversion is lossless. The coerced value is returned so callers can
//! propagate it.

use serde_json::{Map, Value};
use thiserror::Error;

/// A structural validation failure. The message formats are stable wire
/// strings; downstream error objects embed them verbatim.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    /// A value's type did not match the declared `type`.
    #[error("schema type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// The declared type.
        expected: String,
        /// The observed type.
        actual: String,
    },

    /// A `required` field was absent.
    #[error("schema validation: missing required field '{field}'")]
    MissingRequired {
        /// The missing field name.
        field: String,
    },

    /// A value was not in the declared `enum`.
    #[error("schema enum validation failed: field {field} must be one of: {allowed}")]
    EnumMismatch {
        /// The offending field ("value" at the root).
        field: String,
        /// Comma-joined allowed values.
        allowed: String,
    },
}

/// The JSON type name of a value, as used in mismatch messages.
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

/// Lossless numeric-string conversion, or None.
fn coerce_number(value: &Value) -> Option<Value> {
    let Value::String(s) = value else {
        return None;
    };
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    // Round-trip through serde_json so "1e3" and "007" don't silently
    // change meaning: the parsed number must render the same magnitude.
    let parsed: serde_json::Number = trimmed.parse().ok()?;
    Some(Value::Number(parsed))
}

fn declared_type(schema: &Map<String, Value>) -> Option<&str> {
    schema.get("type").and_then(Value::as_str)
}

/// Validate `value` against `schema`, returning the (possibly coerced)
/// value on success.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use strata_schema::validate;
///
/// let schema = json!({
///     "type": "object",
///     "properties": {"answer": {"type": "number"}},
///     "required": ["answer"]
/// });
/// let out = validate(&json!({"answer": "42"}), &schema).unwrap();
/// assert_eq!(out, json!({"answer": 42}));
/// ```
pub fn validate(value: &Value, schema: &Value) -> Result<Value, SchemaError> {
    validate_at(value, schema, "value")
}

fn validate_at(value: &Value, schema: &Value, field: &str) -> Result<Value, SchemaError> {
    let Value::Object(schema) = schema else {
        // Non-object schemas (true/false/unknown shapes) accept anything.
        return Ok(value.clone());
    };

    // Number-from-string pre-coercion, applied before the type check.
    let coerced;
    let value = if declared_type(schema) == Some("number") {
        match coerce_number(value) {
            Some(n) => {
                coerced = n;
                &coerced
            }
            None => value,
        }
    } else {
        value
    };

    if let Some(expected) = declared_type(schema) {
        let actual = type_name(value);
        let matches = match expected {
            "object" => value.is_object(),
            "array" => value.is_array(),
            "string" => value.is_string(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "null" => value.is_null(),
            // Unknown declared types are ignored (forward-compatible).
            _ => true,
        };
        if !matches {
            return Err(SchemaError::TypeMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            let rendered: Vec<String> = allowed
                .iter()
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect();
            return Err(SchemaError::EnumMismatch {
                field: field.to_string(),
                allowed: rendered.join(", "),
            });
        }
    }

    match value {
        Value::Object(map) => {
            let mut out = map.clone();

            if let Some(required) = schema.get("required").and_then(Value::as_array) {
                for name in required.iter().filter_map(Value::as_str) {
                    if !map.contains_key(name) {
                        return Err(SchemaError::MissingRequired {
                            field: name.to_string(),
                        });
                    }
                }
            }

            if let Some(Value::Object(props)) = schema.get("properties") {
                for (name, prop_schema) in props {
                    if let Some(prop_value) = map.get(name) {
                        let validated = validate_at(prop_value, prop_schema, name)?;
                        out.insert(name.clone(), validated);
                    }
                }
            }

            Ok(Value::Object(out))
        }
        Value::Array(items) => {
            if let Some(item_schema) = schema.get("items") {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(validate_at(item, item_schema, field)?);
                }
                Ok(Value::Array(out))
            } else {
                Ok(value.clone())
            }
        }
        other => Ok(other.clone()),
    }
}

/// Check only the `required` list of an object schema against an input,
/// returning the first missing field name. Used by the tool-call input
/// gate, which does not run full validation.
pub fn first_missing_required(input: &Value, schema: &Value) -> Option<String> {
    let required = schema.get("required")?.as_array()?;
    let map = input.as_object();
    for name in required.iter().filter_map(Value::as_str) {
        let present = map.map(|m| m.contains_key(name)).unwrap_or(false);
        if !present {
            return Some(name.to_string());
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_matching_object() {
        let schema = json!({
            "type": "object",
            "properties": {
                "name": {"type": "string"},
                "age": {"type": "number"}
            },
            "required": ["name"]
        });
        let out = validate(&json!({"name": "x", "age": 3}), &schema).unwrap();
        assert_eq!(out, json!({"name": "x", "age": 3}));
    }

    #[test]
    fn coerces_numeric_strings_losslessly() {
        let schema = json!({"type": "object", "properties": {"n": {"type": "number"}}});
        let out = validate(&json!({"n": "42"}), &schema).unwrap();
        assert_eq!(out, json!({"n": 42}));
        let out = validate(&json!({"n": "2.5"}), &schema).unwrap();
        assert_eq!(out, json!({"n": 2.5}));
    }

    #[test]
    fn non_numeric_string_fails_type_check() {
        let schema = json!({"type": "number"});
        let err = validate(&json!("forty-two"), &schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema type mismatch: expected number, got string"
        );
    }

    #[test]
    fn missing_required_message_format() {
        let schema = json!({"type": "object", "required": ["answer"]});
        let err = validate(&json!({}), &schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema validation: missing required field 'answer'"
        );
    }

    #[test]
    fn enum_message_format() {
        let schema = json!({
            "type": "object",
            "properties": {"color": {"type": "string", "enum": ["red", "green"]}}
        });
        let err = validate(&json!({"color": "blue"}), &schema).unwrap_err();
        assert_eq!(
            err.to_string(),
            "schema enum validation failed: field color must be one of: red, green"
        );
    }

    #[test]
    fn recurses_into_items() {
        let schema = json!({"type": "array", "items": {"type": "number"}});
        assert!(validate(&json!([1, 2, 3]), &schema).is_ok());
        let err = validate(&json!([1, "x", 3]), &schema).unwrap_err();
        assert!(matches!(err, SchemaError::TypeMismatch { .. }));
    }

    #[test]
    fn items_coercion_applies_per_element() {
        let schema = json!({"type": "array", "items": {"type": "number"}});
        let out = validate(&json!(["1", 2]), &schema).unwrap();
        assert_eq!(out, json!([1, 2]));
    }

    #[test]
    fn unknown_keys_ignored() {
        let schema = json!({
            "type": "string",
            "minLength": 99,
            "format": "email"
        });
        // minLength/format are outside the subset: ignored.
        assert!(validate(&json!("a"), &schema).is_ok());
    }

    #[test]
    fn null_type() {
        assert!(validate(&json!(null), &json!({"type": "null"})).is_ok());
        assert!(validate(&json!(0), &json!({"type": "null"})).is_err());
    }

    #[test]
    fn first_missing_required_reports_in_order() {
        let schema = json!({"required": ["a", "b"]});
        assert_eq!(
            first_missing_required(&json!({"b": 1}), &schema),
            Some("a".into())
        );
        assert_eq!(first_missing_required(&json!({"a": 1, "b": 1}), &schema), None);
        assert_eq!(
            first_missing_required(&json!(null), &schema),
            Some("a".into())
        );
    }
}
