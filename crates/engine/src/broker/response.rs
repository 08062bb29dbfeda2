use serde::Serialize;
use serde_json::Value;

use broker_storage::{JsonObject, OperationState};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProvisionedServiceSpec {
    #[serde(skip)]
    pub is_async: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dashboard_url: String,
    #[serde(rename = "operation", skip_serializing_if = "String::is_empty")]
    pub operation_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateServiceSpec {
    #[serde(skip)]
    pub is_async: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dashboard_url: String,
    #[serde(rename = "operation", skip_serializing_if = "String::is_empty")]
    pub operation_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DeprovisionServiceSpec {
    #[serde(skip)]
    pub is_async: bool,
    #[serde(rename = "operation", skip_serializing_if = "String::is_empty")]
    pub operation_data: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Binding {
    pub credentials: Value,
}

/// The OSB `last_operation` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LastOperation {
    pub state: OperationState,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
}

impl LastOperation {
    pub fn new(state: OperationState, description: impl Into<String>) -> Self {
        Self {
            state,
            description: description.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GetInstanceDetailsSpec {
    pub service_id: String,
    pub plan_id: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub dashboard_url: String,
    pub parameters: JsonObject,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GetBindingSpec {
    pub parameters: JsonObject,
}
