//! Invocation input validation against a task's JSON Schema.
//!
//! A stored schema may be a full JSON Schema document or a bare property map
//! such as `{"amount": {"type": "integer"}}`. A property map is recognised
//! when none of its keys is a schema keyword and every value is an object; it
//! is treated as `{"type": "object", "properties": <map>}`.

use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

/// Top-level keywords that mark a value as a full schema document.
const SCHEMA_KEYWORDS: &[&str] = &[
    "$schema",
    "$id",
    "$ref",
    "$defs",
    "definitions",
    "type",
    "properties",
    "patternProperties",
    "additionalProperties",
    "required",
    "items",
    "prefixItems",
    "enum",
    "const",
    "allOf",
    "anyOf",
    "oneOf",
    "not",
    "if",
    "then",
    "else",
    "format",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "pattern",
    "title",
    "description",
    "default",
];

/// Returns the full schema document for a stored schema.
#[must_use]
pub fn normalize(schema: &Value) -> Value {
    match schema {
        Value::Object(map) if is_property_map(map) => json!({
            "type": "object",
            "properties": schema,
        }),
        other => other.clone(),
    }
}

fn is_property_map(map: &Map<String, Value>) -> bool {
    !map.is_empty()
        && map.keys().all(|key| !SCHEMA_KEYWORDS.contains(&key.as_str()))
        && map.values().all(Value::is_object)
}

/// Checks that `schema` is itself a valid JSON Schema.
///
/// # Errors
///
/// Returns a validation error naming the schema problem.
pub fn check_schema(schema: &Value) -> Result<()> {
    compile(schema).map(|_| ())
}

fn compile(schema: &Value) -> Result<jsonschema::Validator> {
    jsonschema::options()
        .should_validate_formats(true)
        .build(&normalize(schema))
        .map_err(|e| Error::validation_with_details("invalid schema", vec![e.to_string()]))
}

/// Parses raw invocation input. Empty or blank input is `{}`.
///
/// # Errors
///
/// Returns a validation error if the input is not JSON.
pub fn parse_input(raw: &str) -> Result<Value> {
    if raw.trim().is_empty() {
        return Ok(Value::Object(Map::new()));
    }
    serde_json::from_str(raw)
        .map_err(|e| Error::validation_with_details("input is not valid JSON", vec![e.to_string()]))
}

/// Validates raw invocation input against `schema`.
///
/// # Errors
///
/// Returns a validation error listing every violation, or if the input or
/// schema is malformed.
pub fn validate(schema: &Value, raw_input: &str) -> Result<()> {
    let validator = compile(schema)?;
    let input = parse_input(raw_input)?;
    let details: Vec<String> = validator.iter_errors(&input).map(|e| e.to_string()).collect();
    if details.is_empty() {
        Ok(())
    } else {
        Err(Error::validation_with_details(
            "input does not match the task schema",
            details,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount_schema() -> Value {
        json!({"amount": {"type": "integer"}})
    }

    #[test]
    fn property_map_is_wrapped() {
        let normalized = normalize(&amount_schema());
        assert_eq!(normalized["type"], "object");
        assert_eq!(normalized["properties"]["amount"]["type"], "integer");
    }

    #[test]
    fn full_documents_are_untouched() {
        let schema = json!({"type": "object", "required": ["a"]});
        assert_eq!(normalize(&schema), schema);
    }

    #[test]
    fn rejects_wrong_type() {
        let err = validate(&amount_schema(), r#"{"amount":"x"}"#).unwrap_err();
        match err {
            Error::Validation { details, .. } => assert_eq!(details.len(), 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn accepts_conforming_input() {
        assert!(validate(&amount_schema(), r#"{"amount":5}"#).is_ok());
    }

    #[test]
    fn empty_input_validates_as_empty_object() {
        assert!(validate(&amount_schema(), "").is_ok());
        let required = json!({"type": "object", "required": ["amount"]});
        assert!(validate(&required, "  ").unwrap_err().is_validation());
    }

    #[test]
    fn malformed_input_is_rejected() {
        assert!(validate(&amount_schema(), "{not json").unwrap_err().is_validation());
    }

    #[test]
    fn malformed_schema_is_rejected() {
        assert!(check_schema(&json!({"type": 12})).is_err());
        assert!(check_schema(&amount_schema()).is_ok());
    }

    #[test]
    fn formats_are_enforced() {
        let schema = json!({
            "type": "object",
            "properties": {"when": {"type": "string", "format": "date"}}
        });
        assert!(validate(&schema, r#"{"when":"2024-02-30x"}"#).is_err());
        assert!(validate(&schema, r#"{"when":"2024-02-03"}"#).is_ok());
    }
}
