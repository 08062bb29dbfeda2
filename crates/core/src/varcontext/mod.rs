//! Layered variable resolution.
//!
//! A [`ContextBuilder`] merges maps in priority order and evaluates templated
//! defaults; the resulting [`VarContext`] is the flat map handed to a service
//! provider.

mod builder;
pub mod cast;
pub mod interpolation;

use serde_json::{Map, Value};

pub use builder::{ContextBuilder, DefaultVariable};

/// Every error collected while building a context, reported on one line.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{} error(s) occurred: {}", .errors.len(), .errors.join("; "))]
pub struct VarContextError {
    pub errors: Vec<String>,
}

impl VarContextError {
    pub fn single(message: impl Into<String>) -> Self {
        Self {
            errors: vec![message.into()],
        }
    }
}

/// The resolved variables for one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarContext {
    context: Map<String, Value>,
}

impl VarContext {
    pub fn new(context: Map<String, Value>) -> Self {
        Self { context }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.context.get(key)
    }

    pub fn has_key(&self, key: &str) -> bool {
        self.context.contains_key(key)
    }

    /// String value for `key`; numbers and booleans are rendered.
    pub fn get_string(&self, key: &str) -> Result<String, VarContextError> {
        match self.context.get(key) {
            None => Err(VarContextError::single(format!(
                "missing value for key {key:?}"
            ))),
            Some(v) => cast::cast_to(v.clone(), cast::TYPE_STRING)
                .ok()
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| {
                    VarContextError::single(format!("value for {key:?} must be a string"))
                }),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.context.insert(key.into(), value);
    }

    pub fn to_map(&self) -> Map<String, Value> {
        self.context.clone()
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.context
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.context.clone())
    }
}
