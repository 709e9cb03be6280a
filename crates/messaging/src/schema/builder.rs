//! Helpers for writing message schemas.

use serde_json::{Map, Value, json};

use super::Schema;

/// An object schema.
///
/// `required` and `optional` list property names with their schemas. When
/// `allow_additional` is false, unknown properties are rejected.
pub fn object(
    required: Vec<(&str, Schema)>,
    optional: Vec<(&str, Schema)>,
    allow_additional: bool,
) -> Schema {
    let mut properties = Map::new();
    let mut required_names = Vec::new();

    for (name, schema) in required {
        required_names.push(Value::String(name.to_string()));
        properties.insert(name.to_string(), schema);
    }
    for (name, schema) in optional {
        properties.insert(name.to_string(), schema);
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required_names,
        "additionalProperties": allow_additional,
    })
}

/// An object schema without properties.
pub fn empty_object() -> Schema {
    object(vec![], vec![], false)
}

pub fn string() -> Schema {
    json!({"type": "string"})
}

/// A string with at least `min` characters.
pub fn string_min(min: usize) -> Schema {
    json!({"type": "string", "minLength": min})
}

pub fn integer() -> Schema {
    json!({"type": "integer"})
}

/// An integer within `[min, max]`.
pub fn integer_range(min: i64, max: i64) -> Schema {
    json!({"type": "integer", "minimum": min, "maximum": max})
}

pub fn number() -> Schema {
    json!({"type": "number"})
}

pub fn boolean() -> Schema {
    json!({"type": "boolean"})
}

/// A string holding a UUID.
pub fn uuid() -> Schema {
    json!({"type": "string", "format": "uuid"})
}

pub fn array(items: Schema) -> Schema {
    json!({"type": "array", "items": items})
}

/// A value restricted to the given constants.
pub fn enum_of(values: impl IntoIterator<Item = Value>) -> Schema {
    json!({"enum": values.into_iter().collect::<Vec<_>>()})
}

/// Allows `null` in addition to whatever `schema` accepts.
pub fn nullable(schema: Schema) -> Schema {
    let mut map = match schema {
        Value::Object(map) => map,
        other => return other,
    };

    match map.remove("type") {
        Some(Value::String(t)) => {
            map.insert("type".to_string(), json!([t, "null"]));
        }
        Some(Value::Array(mut types)) => {
            if !types.contains(&json!("null")) {
                types.push(json!("null"));
            }
            map.insert("type".to_string(), Value::Array(types));
        }
        Some(other) => {
            map.insert("type".to_string(), other);
        }
        None => {}
    }

    if let Some(Value::Array(values)) = map.get_mut("enum")
        && !values.contains(&Value::Null)
    {
        values.push(Value::Null);
    }

    Value::Object(map)
}
