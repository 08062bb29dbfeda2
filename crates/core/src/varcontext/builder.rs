use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::cast::{cast_to, is_json_schema_type};
use super::interpolation::Evaluator;
use super::{VarContext, VarContextError};
use crate::validation::FieldError;

/// A variable whose value is filled from a (possibly templated) default.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DefaultVariable {
    pub name: String,
    #[serde(default)]
    pub default: Value,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default, rename = "type")]
    pub var_type: String,
}

impl DefaultVariable {
    pub fn validate(&self) -> Result<(), FieldError> {
        let mut errs = FieldError::none();
        if self.name.trim().is_empty() {
            errs = errs.also(FieldError::missing("name"));
        }
        if self.default.is_null() {
            errs = errs.also(FieldError::missing("default"));
        }
        if !self.var_type.is_empty() && !is_json_schema_type(&self.var_type) {
            errs = errs.also(FieldError::invalid_value(&self.var_type, "type"));
        }
        errs.into_result()
    }
}

/// Accumulates layered maps into a [`VarContext`].
///
/// Later merges overwrite earlier ones, except `merge_defaults` entries whose
/// `overwrite` flag is false. Errors are collected and reported together by
/// [`ContextBuilder::build`].
#[derive(Debug, Default)]
pub struct ContextBuilder {
    errors: Vec<String>,
    context: Map<String, Value>,
    constants: Map<String, Value>,
    config: Option<Arc<Value>>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values visible to templates but not copied into the result.
    pub fn set_eval_constants(mut self, constants: Map<String, Value>) -> Self {
        self.constants = constants;
        self
    }

    /// Raw configuration document backing the `config(key)` function.
    pub fn set_config(mut self, config: Option<Arc<Value>>) -> Self {
        self.config = config;
        self
    }

    pub fn merge_map(mut self, data: &Map<String, Value>) -> Self {
        for (k, v) in data {
            self.context.insert(k.clone(), v.clone());
        }
        self
    }

    /// Merge a raw JSON object; an empty input is a no-op.
    pub fn merge_json_object(self, raw: &str) -> Self {
        if raw.trim().is_empty() {
            return self;
        }
        match serde_json::from_str::<Map<String, Value>>(raw) {
            Ok(data) => self.merge_map(&data),
            Err(e) => {
                let mut b = self;
                b.errors.push(e.to_string());
                b
            }
        }
    }

    /// Fill from defaults. String defaults are evaluated as templates over
    /// the current context plus constants and cast to the declared type.
    pub fn merge_defaults(mut self, vars: &[DefaultVariable]) -> Self {
        for v in vars {
            if v.default.is_null() {
                continue;
            }
            if self.context.contains_key(&v.name) && !v.overwrite {
                continue;
            }
            match &v.default {
                Value::String(template) => {
                    self = self.merge_eval_result(&v.name, template, &v.var_type);
                }
                other => {
                    self.context.insert(v.name.clone(), other.clone());
                }
            }
        }
        self
    }

    pub fn merge_eval_result(mut self, key: &str, template: &str, result_type: &str) -> Self {
        let mut scope = self.context.clone();
        for (k, v) in &self.constants {
            scope.insert(k.clone(), v.clone());
        }

        let mut evaluator = Evaluator::new(&scope);
        if let Some(cfg) = self.config.as_deref() {
            evaluator = evaluator.with_config(cfg);
        }
        let result = match evaluator.eval(template) {
            Ok(r) => r,
            Err(e) => {
                self.errors.push(format!(
                    "couldn't compute the value for {key:?}, template: {template:?}, {e}"
                ));
                return self;
            }
        };

        match cast_to(result, result_type) {
            Ok(converted) => {
                self.context.insert(key.to_string(), converted);
            }
            Err(e) => self.errors.push(e),
        }
        self
    }

    pub fn build(self) -> Result<VarContext, VarContextError> {
        if !self.errors.is_empty() {
            return Err(VarContextError {
                errors: self.errors,
            });
        }
        Ok(VarContext::new(self.context))
    }
}
