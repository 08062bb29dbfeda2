use serde_json::{json, Map, Value};

use super::variable::BrokerVariable;
use crate::varcontext::VarContextError;

const SCHEMA_DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// Build an object schema whose properties are the declared variables.
pub fn create_json_schema(vars: &[BrokerVariable]) -> Value {
    let mut properties = Map::new();
    let mut required: Vec<String> = Vec::new();
    for v in vars {
        properties.insert(v.field_name.clone(), Value::Object(v.to_schema()));
        if v.required {
            required.push(v.field_name.clone());
        }
    }
    required.sort();
    required.dedup();

    let mut schema = json!({
        "$schema": SCHEMA_DRAFT,
        "type": "object",
        "properties": properties,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

/// Validate resolved parameters against the schema of the declared variables.
pub fn validate_variables(
    parameters: &Map<String, Value>,
    vars: &[BrokerVariable],
) -> Result<(), VarContextError> {
    validate_against_schema(parameters, &create_json_schema(vars))
}

pub fn validate_against_schema(
    parameters: &Map<String, Value>,
    schema: &Value,
) -> Result<(), VarContextError> {
    let validator = jsonschema::validator_for(schema)
        .map_err(|e| VarContextError::single(format!("invalid schema: {e}")))?;
    let instance = Value::Object(parameters.clone());
    let errors: Vec<String> = validator
        .iter_errors(&instance)
        .map(|e| format!("{}", e))
        .collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(VarContextError { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, t: &str, required: bool) -> BrokerVariable {
        BrokerVariable {
            field_name: name.into(),
            var_type: t.into(),
            required,
            ..BrokerVariable::default()
        }
    }

    #[test]
    fn schema_lists_required_sorted() {
        let schema = create_json_schema(&[
            var("zeta", "string", true),
            var("alpha", "integer", true),
            var("beta", "boolean", false),
        ]);
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["alpha", "zeta"]));
        assert_eq!(schema["properties"]["alpha"]["type"], "integer");
    }

    #[test]
    fn schema_omits_required_when_none() {
        let schema = create_json_schema(&[var("a", "string", false)]);
        assert!(schema.get("required").is_none());
    }

    #[test]
    fn validation_collects_errors() {
        let vars = [var("name", "string", true), var("size", "integer", false)];
        let params = json!({"size": "big"}).as_object().cloned().unwrap();
        let err = validate_variables(&params, &vars).unwrap_err();
        assert_eq!(err.errors.len(), 2, "{err}");
        assert!(err.to_string().starts_with("2 error(s) occurred: "));
    }

    #[test]
    fn validation_passes_for_conforming_params() {
        let vars = [var("name", "string", true)];
        let params = json!({"name": "db", "extra": 1}).as_object().cloned().unwrap();
        assert!(validate_variables(&params, &vars).is_ok());
    }
}
