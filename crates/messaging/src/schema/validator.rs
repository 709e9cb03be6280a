use serde_json::{Map, Value};
use uuid::Uuid;

use super::{FieldViolation, Schema, SchemaValidator, ValidationError};

/// Validator for the JSON-Schema subset used by message schemas.
///
/// Supported keywords: `type` (single or list), `enum`, `required`,
/// `properties`, `additionalProperties` (boolean or schema), `items`,
/// `minItems`, `maxItems`, `minLength`, `maxLength`, `minimum`, `maximum`
/// and `format: "uuid"`. Unknown keywords are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSchemaValidator;

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self
    }

    fn check(&self, schema: &Value, value: &Value, path: &str, out: &mut Vec<FieldViolation>) {
        let schema = match schema {
            Value::Bool(true) => return,
            Value::Bool(false) => {
                out.push(FieldViolation::new(path, "no value is allowed here"));
                return;
            }
            Value::Object(schema) => schema,
            _ => return,
        };

        if let Some(types) = schema.get("type")
            && !type_matches(types, value)
        {
            out.push(FieldViolation::new(
                path,
                format!(
                    "expected {}, found {}",
                    describe_types(types),
                    json_type(value)
                ),
            ));
            return;
        }

        if let Some(Value::Array(allowed)) = schema.get("enum")
            && !allowed.contains(value)
        {
            out.push(FieldViolation::new(
                path,
                format!("must be one of {}", Value::Array(allowed.clone())),
            ));
            return;
        }

        match value {
            Value::Object(map) => self.check_object(schema, map, path, out),
            Value::Array(items) => self.check_array(schema, items, path, out),
            Value::String(s) => check_string(schema, s, path, out),
            Value::Number(n) => {
                if let Some(n) = n.as_f64() {
                    check_number(schema, n, path, out);
                }
            }
            Value::Bool(_) | Value::Null => {}
        }
    }

    fn check_object(
        &self,
        schema: &Map<String, Value>,
        map: &Map<String, Value>,
        path: &str,
        out: &mut Vec<FieldViolation>,
    ) {
        if let Some(Value::Array(required)) = schema.get("required") {
            for name in required.iter().filter_map(Value::as_str) {
                if !map.contains_key(name) {
                    out.push(FieldViolation::new(join(path, name), "is required"));
                }
            }
        }

        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(properties) = properties {
            for (name, sub_schema) in properties {
                if let Some(field) = map.get(name) {
                    self.check(sub_schema, field, &join(path, name), out);
                }
            }
        }

        if let Some(additional) = schema.get("additionalProperties") {
            let extra = map
                .iter()
                .filter(|(name, _)| !properties.is_some_and(|p| p.contains_key(*name)));

            for (name, field) in extra {
                match additional {
                    Value::Bool(false) => {
                        out.push(FieldViolation::new(join(path, name), "is not allowed"));
                    }
                    Value::Object(_) => self.check(additional, field, &join(path, name), out),
                    _ => {}
                }
            }
        }
    }

    fn check_array(
        &self,
        schema: &Map<String, Value>,
        items: &[Value],
        path: &str,
        out: &mut Vec<FieldViolation>,
    ) {
        if let Some(min) = schema.get("minItems").and_then(Value::as_u64)
            && (items.len() as u64) < min
        {
            out.push(FieldViolation::new(
                path,
                format!("must contain at least {min} items"),
            ));
        }
        if let Some(max) = schema.get("maxItems").and_then(Value::as_u64)
            && (items.len() as u64) > max
        {
            out.push(FieldViolation::new(
                path,
                format!("must contain at most {max} items"),
            ));
        }
        if let Some(item_schema) = schema.get("items") {
            for (index, item) in items.iter().enumerate() {
                self.check(item_schema, item, &format!("{path}[{index}]"), out);
            }
        }
    }
}

impl SchemaValidator for JsonSchemaValidator {
    fn validate(&self, schema: &Schema, payload: &Value) -> Result<(), ValidationError> {
        let mut violations = Vec::new();
        self.check(schema, payload, "", &mut violations);
        if violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::new(violations))
        }
    }
}

fn check_string(schema: &Map<String, Value>, s: &str, path: &str, out: &mut Vec<FieldViolation>) {
    let length = s.chars().count() as u64;

    if let Some(min) = schema.get("minLength").and_then(Value::as_u64)
        && length < min
    {
        out.push(FieldViolation::new(
            path,
            format!("must be at least {min} characters long"),
        ));
    }
    if let Some(max) = schema.get("maxLength").and_then(Value::as_u64)
        && length > max
    {
        out.push(FieldViolation::new(
            path,
            format!("must be at most {max} characters long"),
        ));
    }
    if schema.get("format").and_then(Value::as_str) == Some("uuid") && Uuid::parse_str(s).is_err()
    {
        out.push(FieldViolation::new(path, "must be a valid uuid"));
    }
}

fn check_number(schema: &Map<String, Value>, n: f64, path: &str, out: &mut Vec<FieldViolation>) {
    if let Some(min) = schema.get("minimum").and_then(Value::as_f64)
        && n < min
    {
        out.push(FieldViolation::new(path, format!("must be >= {min}")));
    }
    if let Some(max) = schema.get("maximum").and_then(Value::as_f64)
        && n > max
    {
        out.push(FieldViolation::new(path, format!("must be <= {max}")));
    }
}

fn join(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{path}.{name}")
    }
}

fn type_matches(types: &Value, value: &Value) -> bool {
    match types {
        Value::String(t) => single_type_matches(t, value),
        Value::Array(ts) => ts
            .iter()
            .filter_map(Value::as_str)
            .any(|t| single_type_matches(t, value)),
        _ => true,
    }
}

fn single_type_matches(t: &str, value: &Value) -> bool {
    match t {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => match value {
            Value::Number(n) => {
                n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            _ => false,
        },
        _ => false,
    }
}

fn describe_types(types: &Value) -> String {
    match types {
        Value::String(t) => t.clone(),
        Value::Array(ts) => ts
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(" or "),
        other => other.to_string(),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
