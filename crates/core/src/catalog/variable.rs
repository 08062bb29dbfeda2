use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::{err_if_blank, FieldError};
use crate::varcontext::cast::{is_json_schema_type, TYPE_INTEGER, TYPE_NUMBER};
use crate::varcontext::DefaultVariable;

/// A user-facing input declared by a service definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BrokerVariable {
    pub field_name: String,
    #[serde(default, rename = "type")]
    pub var_type: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub default: Value,
    /// Allowed values mapped to a human description.
    #[serde(default, rename = "enum", skip_serializing_if = "Map::is_empty")]
    pub enum_values: Map<String, Value>,
    /// Extra JSON-schema keywords (`maxLength`, `pattern`, ...).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub constraints: Map<String, Value>,
    #[serde(default)]
    pub prohibit_update: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tf_attribute: String,
}

impl BrokerVariable {
    pub fn validate(&self) -> Result<(), FieldError> {
        let mut errs = err_if_blank(&self.field_name, "field_name");
        if !self.var_type.is_empty() && !is_json_schema_type(&self.var_type) {
            errs = errs.also(FieldError::new(
                "field must match '^(|object|boolean|array|number|string|integer)$'",
                "type",
            ));
        }
        errs.into_result()
    }

    /// The JSON-schema fragment describing this variable.
    pub fn to_schema(&self) -> Map<String, Value> {
        let mut schema = self.constraints.clone();
        if !self.enum_values.is_empty() {
            let values: Vec<Value> = self
                .enum_values
                .keys()
                .map(|k| self.enum_key_value(k))
                .collect();
            schema.insert("enum".to_string(), Value::Array(values));
        }
        schema.insert("title".to_string(), Value::String(field_title(&self.field_name)));
        if !self.details.is_empty() {
            schema.insert("description".to_string(), Value::String(self.details.clone()));
        }
        if !self.var_type.is_empty() {
            schema.insert("type".to_string(), Value::String(self.var_type.clone()));
        }
        if !self.default.is_null() {
            schema.insert("default".to_string(), self.default.clone());
        }
        schema
    }

    // enum keys arrive as object keys; numeric types need numeric values
    fn enum_key_value(&self, key: &str) -> Value {
        match self.var_type.as_str() {
            TYPE_INTEGER => key.parse::<i64>().map(Value::from).unwrap_or_else(|_| key.into()),
            TYPE_NUMBER => key
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_else(|| key.into()),
            _ => Value::String(key.to_string()),
        }
    }

    /// The fill-only default this variable contributes to a context.
    pub fn as_default(&self) -> DefaultVariable {
        DefaultVariable {
            name: self.field_name.clone(),
            default: self.default.clone(),
            overwrite: false,
            var_type: self.var_type.clone(),
        }
    }
}

/// A property that can be read back from an existing deployment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportVariable {
    pub field_name: String,
    #[serde(default, rename = "type")]
    pub var_type: String,
    #[serde(default)]
    pub details: String,
    #[serde(default)]
    pub tf_resource: String,
}

/// `storage_class` -> `Storage Class`.
fn field_title(field_name: &str) -> String {
    field_name
        .split(['_', '-'])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}
