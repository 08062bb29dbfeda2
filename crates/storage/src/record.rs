use std::fmt;

use serde::{Deserialize, Serialize};

/// A JSON object as stored for outputs, credentials and request parameters.
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

/// The operation a service instance record was last marked with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Provision,
    Update,
    Upgrade,
    Deprovision,
    Bind,
    Unbind,
    #[default]
    Clear,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Provision => "provision",
            OperationType::Update => "update",
            OperationType::Upgrade => "upgrade",
            OperationType::Deprovision => "deprovision",
            OperationType::Bind => "bind",
            OperationType::Unbind => "unbind",
            OperationType::Clear => "",
        }
    }

    /// Inverse of [`OperationType::as_str`]; unknown names map to `Clear`.
    pub fn from_name(name: &str) -> Self {
        match name {
            "provision" => OperationType::Provision,
            "update" => OperationType::Update,
            "upgrade" => OperationType::Upgrade,
            "deprovision" => OperationType::Deprovision,
            "bind" => OperationType::Bind,
            "unbind" => OperationType::Unbind,
            _ => OperationType::Clear,
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the last operation recorded on a deployment row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OperationState {
    #[default]
    #[serde(rename = "in progress")]
    InProgress,
    #[serde(rename = "succeeded")]
    Succeeded,
    #[serde(rename = "failed")]
    Failed,
}

impl OperationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationState::InProgress => "in progress",
            OperationState::Succeeded => "succeeded",
            OperationState::Failed => "failed",
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The broker's record of a provisioned service instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceInstanceDetails {
    pub guid: String,
    pub name: String,
    pub location: String,
    pub url: String,
    /// Outputs written by the provider when an operation completes.
    pub outputs: JsonObject,
    pub service_guid: String,
    pub plan_guid: String,
    pub space_guid: String,
    pub organization_guid: String,
    pub operation_type: OperationType,
    /// Provider token for the in-flight async operation; empty when none.
    pub operation_guid: String,
}

/// Credentials returned by the provider for one binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceBindingCredentials {
    pub service_guid: String,
    pub service_instance_guid: String,
    pub binding_guid: String,
    pub credentials: JsonObject,
}

/// What the platform sent at bind time: user parameters and the bind resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindRequestDetails {
    pub service_instance_guid: String,
    pub binding_guid: String,
    pub parameters: JsonObject,
    pub bind_resource: JsonObject,
}

/// A deployment row owned by the service provider, keyed by tf id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TerraformDeployment {
    pub id: String,
    /// Opaque provider workspace state.
    pub workspace: serde_json::Value,
    pub last_operation_type: String,
    pub last_operation_state: OperationState,
    pub last_operation_message: String,
}

impl TerraformDeployment {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }
}
