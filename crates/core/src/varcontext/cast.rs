use serde_json::{Map, Number, Value};

pub const TYPE_OBJECT: &str = "object";
pub const TYPE_BOOLEAN: &str = "boolean";
pub const TYPE_ARRAY: &str = "array";
pub const TYPE_NUMBER: &str = "number";
pub const TYPE_STRING: &str = "string";
pub const TYPE_INTEGER: &str = "integer";

/// True for the JSON-schema type names a variable may declare.
pub fn is_json_schema_type(t: &str) -> bool {
    matches!(
        t,
        TYPE_OBJECT | TYPE_BOOLEAN | TYPE_ARRAY | TYPE_NUMBER | TYPE_STRING | TYPE_INTEGER
    )
}

/// Convert an evaluated value to the declared JSON type.
///
/// Strings holding JSON are parsed for `object` and `array`. An empty type
/// leaves the value unchanged.
pub fn cast_to(value: Value, json_type: &str) -> Result<Value, String> {
    let fail = |v: &Value| format!("unable to cast {v} to {json_type}");
    match json_type {
        "" => Ok(value),
        TYPE_OBJECT => match value {
            Value::Object(_) => Ok(value),
            Value::String(ref s) => match serde_json::from_str::<Map<String, Value>>(s) {
                Ok(m) => Ok(Value::Object(m)),
                Err(_) => Err(fail(&value)),
            },
            Value::Null => Ok(Value::Object(Map::new())),
            other => Err(fail(&other)),
        },
        TYPE_ARRAY => match value {
            Value::Array(_) => Ok(value),
            Value::String(ref s) => match serde_json::from_str::<Vec<Value>>(s) {
                Ok(items) => Ok(Value::Array(items)),
                Err(_) => Err(fail(&value)),
            },
            other => Err(fail(&other)),
        },
        TYPE_BOOLEAN => match value {
            Value::Bool(_) => Ok(value),
            Value::Null => Ok(Value::Bool(false)),
            Value::Number(ref n) => Ok(Value::Bool(n.as_f64().is_some_and(|f| f != 0.0))),
            Value::String(ref s) => match s.as_str() {
                "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(Value::Bool(true)),
                "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(Value::Bool(false)),
                _ => Err(fail(&value)),
            },
            other => Err(fail(&other)),
        },
        TYPE_NUMBER => match value {
            Value::Number(_) => Ok(value),
            Value::Null => Ok(Value::from(0.0)),
            Value::Bool(b) => Ok(Value::from(if b { 1.0 } else { 0.0 })),
            Value::String(ref s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| fail(&value)),
            other => Err(fail(&other)),
        },
        TYPE_INTEGER => match value {
            Value::Number(ref n) => match (n.as_i64(), n.as_f64()) {
                (Some(i), _) => Ok(Value::from(i)),
                (None, Some(f)) => Ok(Value::from(f.trunc() as i64)),
                _ => Err(fail(&value)),
            },
            Value::Null => Ok(Value::from(0)),
            Value::Bool(b) => Ok(Value::from(i64::from(b))),
            Value::String(ref s) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| fail(&value)),
            other => Err(fail(&other)),
        },
        TYPE_STRING => match value {
            Value::String(_) => Ok(value),
            Value::Null => Ok(Value::String(String::new())),
            Value::Bool(b) => Ok(Value::String(b.to_string())),
            Value::Number(n) => Ok(Value::String(n.to_string())),
            other => Err(fail(&other)),
        },
        unknown => Err(format!("couldn't cast {value} to {unknown}, unknown type")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn string_json_to_object() {
        assert_eq!(
            cast_to(json!(r#"{"a":1}"#), TYPE_OBJECT).unwrap(),
            json!({"a": 1})
        );
        assert!(cast_to(json!("not json"), TYPE_OBJECT).is_err());
    }

    #[test]
    fn scalars_from_rendered_strings() {
        assert_eq!(cast_to(json!("33"), TYPE_INTEGER).unwrap(), json!(33));
        assert_eq!(cast_to(json!("1.5"), TYPE_NUMBER).unwrap(), json!(1.5));
        assert_eq!(cast_to(json!("true"), TYPE_BOOLEAN).unwrap(), json!(true));
        assert_eq!(cast_to(json!(42), TYPE_STRING).unwrap(), json!("42"));
        assert_eq!(cast_to(json!(r#"["a"]"#), TYPE_ARRAY).unwrap(), json!(["a"]));
    }

    #[test]
    fn empty_type_is_identity_and_unknown_type_fails() {
        assert_eq!(cast_to(json!("x"), "").unwrap(), json!("x"));
        let err = cast_to(json!("x"), "bogus").unwrap_err();
        assert!(err.contains("unknown type"));
    }
}
