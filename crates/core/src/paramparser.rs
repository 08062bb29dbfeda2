//! Normalizes inbound OSB request bodies into typed details.
//!
//! `parameters` and `context` arrive as arbitrary JSON; both must be objects
//! when present. Absent or `null` blobs decode to empty maps.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::catalog::MaintenanceInfo;
use crate::version::{Version, VersionError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("error parsing request parameters: {0}")]
    Parameters(String),
    #[error("error parsing request context: {0}")]
    Context(String),
    #[error("error parsing maintenance info: {0}")]
    MaintenanceInfo(VersionError),
    #[error("error parsing previous maintenance info: {0}")]
    PreviousMaintenanceInfo(VersionError),
    #[error("no app GUID or credential client ID were provided in the binding request")]
    NoAppGuidOrCredentialClient,
}

impl ParseError {
    /// Whether the failure came from a malformed user-supplied JSON blob.
    pub fn is_invalid_user_input(&self) -> bool {
        matches!(self, ParseError::Parameters(_) | ParseError::Context(_))
    }
}

// ── Wire records ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub organization_guid: String,
    #[serde(default)]
    pub space_guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<MaintenanceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PreviousValues {
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub organization_id: String,
    #[serde(default)]
    pub space_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<MaintenanceInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateRequest {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<MaintenanceInfo>,
    #[serde(default)]
    pub previous_values: PreviousValues,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindResource {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub app_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub space_guid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub credential_client_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub backup_agent: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BindRequest {
    #[serde(default)]
    pub service_id: String,
    #[serde(default)]
    pub plan_id: String,
    #[serde(default)]
    pub app_guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_resource: Option<BindResource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

// ── Parsed details ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvisionDetails {
    pub service_id: String,
    pub plan_id: String,
    pub organization_guid: String,
    pub space_guid: String,
    pub request_params: Map<String, Value>,
    pub request_context: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateDetails {
    pub service_id: String,
    pub plan_id: String,
    pub maintenance_info_version: Option<Version>,
    pub previous_plan_id: String,
    pub previous_service_id: String,
    pub previous_org_id: String,
    pub previous_space_id: String,
    pub previous_maintenance_info_version: Option<Version>,
    pub request_params: Map<String, Value>,
    pub request_context: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct BindDetails {
    pub app_guid: String,
    pub credential_client_id: String,
    pub plan_id: String,
    pub service_id: String,
    /// Secret-store actor granted read access to the credentials.
    pub credhub_actor: String,
    pub request_params: Map<String, Value>,
    pub request_context: Map<String, Value>,
    pub request_bind_resource: Map<String, Value>,
}

fn decode_object(
    blob: Option<&Value>,
    err: fn(String) -> ParseError,
) -> Result<Map<String, Value>, ParseError> {
    match blob {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(m)) => Ok(m.clone()),
        Some(other) => Err(err(format!("expected a JSON object, got {other}"))),
    }
}

fn parse_mi(
    mi: Option<&MaintenanceInfo>,
    err: fn(VersionError) -> ParseError,
) -> Result<Option<Version>, ParseError> {
    match mi {
        Some(mi) if !mi.version.is_empty() => Version::parse(&mi.version).map(Some).map_err(err),
        _ => Ok(None),
    }
}

pub fn parse_provision_details(input: &ProvisionRequest) -> Result<ProvisionDetails, ParseError> {
    let mut result = ProvisionDetails {
        service_id: input.service_id.clone(),
        plan_id: input.plan_id.clone(),
        organization_guid: input.organization_guid.clone(),
        space_guid: input.space_guid.clone(),
        request_params: decode_object(input.parameters.as_ref(), ParseError::Parameters)?,
        request_context: decode_object(input.context.as_ref(), ParseError::Context)?,
    };

    if result.request_context.get("platform").and_then(Value::as_str) == Some("cloudfoundry") {
        result.request_context.remove("organization_annotations");
        result.request_context.remove("space_annotations");
    }
    if let Some(Value::String(org)) = result.request_context.get("organization_guid") {
        result.organization_guid = org.clone();
    }
    if let Some(Value::String(space)) = result.request_context.get("space_guid") {
        result.space_guid = space.clone();
    }
    Ok(result)
}

pub fn parse_update_details(input: &UpdateRequest) -> Result<UpdateDetails, ParseError> {
    let prev = &input.previous_values;
    Ok(UpdateDetails {
        service_id: input.service_id.clone(),
        plan_id: input.plan_id.clone(),
        maintenance_info_version: parse_mi(
            input.maintenance_info.as_ref(),
            ParseError::MaintenanceInfo,
        )?,
        previous_plan_id: prev.plan_id.clone(),
        previous_service_id: prev.service_id.clone(),
        previous_org_id: prev.organization_id.clone(),
        previous_space_id: prev.space_id.clone(),
        previous_maintenance_info_version: parse_mi(
            prev.maintenance_info.as_ref(),
            ParseError::PreviousMaintenanceInfo,
        )?,
        request_params: decode_object(input.parameters.as_ref(), ParseError::Parameters)?,
        request_context: decode_object(input.context.as_ref(), ParseError::Context)?,
    })
}

fn bind_resource_map(input: Option<&BindResource>) -> Map<String, Value> {
    let Some(r) = input else {
        return Map::new();
    };
    let mut out = Map::new();
    for (key, value) in [
        ("app_guid", &r.app_guid),
        ("space_guid", &r.space_guid),
        ("route", &r.route),
        ("credential_client_id", &r.credential_client_id),
    ] {
        if !value.is_empty() {
            out.insert(key.to_string(), Value::String(value.clone()));
        }
    }
    if r.backup_agent {
        out.insert("backup_agent".to_string(), Value::Bool(true));
    }
    out
}

pub fn parse_bind_details(input: &BindRequest) -> Result<BindDetails, ParseError> {
    let mut resource = bind_resource_map(input.bind_resource.as_ref());

    let app_guid = match resource.get("app_guid").and_then(Value::as_str) {
        Some(guid) => guid.to_string(),
        None => {
            resource.insert("app_guid".to_string(), Value::String(input.app_guid.clone()));
            input.app_guid.clone()
        }
    };
    let credential_client_id = resource
        .get("credential_client_id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let credhub_actor = if !app_guid.is_empty() {
        format!("mtls-app:{app_guid}")
    } else if !credential_client_id.is_empty() {
        format!("uaa-client:{credential_client_id}")
    } else {
        return Err(ParseError::NoAppGuidOrCredentialClient);
    };

    Ok(BindDetails {
        app_guid,
        credential_client_id,
        plan_id: input.plan_id.clone(),
        service_id: input.service_id.clone(),
        credhub_actor,
        request_params: decode_object(input.parameters.as_ref(), ParseError::Parameters)?,
        request_context: decode_object(input.context.as_ref(), ParseError::Context)?,
        request_bind_resource: resource,
    })
}

/// Rebuild bind details from what was persisted at bind time.
pub fn parse_stored_bind_details(
    parameters: Map<String, Value>,
    bind_resource: Map<String, Value>,
    plan_id: &str,
    service_id: &str,
) -> BindDetails {
    let app_guid = bind_resource
        .get("app_guid")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    BindDetails {
        app_guid,
        plan_id: plan_id.to_string(),
        service_id: service_id.to_string(),
        request_params: parameters,
        request_bind_resource: bind_resource,
        ..BindDetails::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn provision_context_overrides_org_and_space() {
        let req: ProvisionRequest = serde_json::from_value(json!({
            "service_id": "svc",
            "plan_id": "plan",
            "organization_guid": "org-top",
            "space_guid": "space-top",
            "parameters": {"foo": "bar"},
            "context": {
                "platform": "cloudfoundry",
                "organization_guid": "org-ctx",
                "space_guid": "space-ctx",
                "organization_annotations": {"a": "b"}
            }
        }))
        .unwrap();
        let d = parse_provision_details(&req).unwrap();
        assert_eq!(d.organization_guid, "org-ctx");
        assert_eq!(d.space_guid, "space-ctx");
        assert_eq!(d.request_params["foo"], "bar");
        assert!(!d.request_context.contains_key("organization_annotations"));
    }

    #[test]
    fn absent_blobs_are_empty_maps() {
        let d = parse_provision_details(&ProvisionRequest::default()).unwrap();
        assert!(d.request_params.is_empty());
        assert!(d.request_context.is_empty());
    }

    #[test]
    fn non_object_parameters_are_user_input_errors() {
        let req = ProvisionRequest {
            parameters: Some(json!([1, 2])),
            ..ProvisionRequest::default()
        };
        let err = parse_provision_details(&req).unwrap_err();
        assert!(err.is_invalid_user_input());
        assert!(err.to_string().starts_with("error parsing request parameters"));

        let req = UpdateRequest {
            context: Some(json!("ctx")),
            ..UpdateRequest::default()
        };
        assert!(matches!(
            parse_update_details(&req).unwrap_err(),
            ParseError::Context(_)
        ));
    }

    #[test]
    fn update_parses_maintenance_versions() {
        let req: UpdateRequest = serde_json::from_value(json!({
            "service_id": "svc",
            "plan_id": "plan-2",
            "maintenance_info": {"version": "1.1.0"},
            "previous_values": {
                "plan_id": "plan-1",
                "organization_id": "org",
                "space_id": "space",
                "maintenance_info": {"version": "1.0"}
            }
        }))
        .unwrap();
        let d = parse_update_details(&req).unwrap();
        assert_eq!(d.previous_plan_id, "plan-1");
        assert_eq!(d.previous_org_id, "org");
        assert_eq!(d.maintenance_info_version, Some(Version::parse("1.1.0").unwrap()));
        assert_eq!(
            d.previous_maintenance_info_version,
            Some(Version::parse("1.0.0").unwrap())
        );
    }

    #[test]
    fn update_rejects_bad_maintenance_version() {
        let req = UpdateRequest {
            maintenance_info: Some(MaintenanceInfo {
                version: "latest".into(),
                description: String::new(),
            }),
            ..UpdateRequest::default()
        };
        assert!(matches!(
            parse_update_details(&req).unwrap_err(),
            ParseError::MaintenanceInfo(_)
        ));
    }

    #[test]
    fn bind_prefers_resource_app_guid() {
        let req: BindRequest = serde_json::from_value(json!({
            "app_guid": "top-level",
            "bind_resource": {"app_guid": "from-resource", "space_guid": "space"}
        }))
        .unwrap();
        let d = parse_bind_details(&req).unwrap();
        assert_eq!(d.app_guid, "from-resource");
        assert_eq!(d.credhub_actor, "mtls-app:from-resource");
        assert_eq!(d.request_bind_resource["space_guid"], "space");
    }

    #[test]
    fn bind_falls_back_to_top_level_app_guid() {
        let req = BindRequest {
            app_guid: "app".into(),
            ..BindRequest::default()
        };
        let d = parse_bind_details(&req).unwrap();
        assert_eq!(d.app_guid, "app");
        assert_eq!(d.request_bind_resource["app_guid"], "app");
    }

    #[test]
    fn bind_uses_credential_client_when_no_app() {
        let req = BindRequest {
            bind_resource: Some(BindResource {
                credential_client_id: "client".into(),
                ..BindResource::default()
            }),
            ..BindRequest::default()
        };
        let d = parse_bind_details(&req).unwrap();
        assert_eq!(d.credhub_actor, "uaa-client:client");
        assert_eq!(d.app_guid, "");
    }

    #[test]
    fn bind_without_actor_fails() {
        assert_eq!(
            parse_bind_details(&BindRequest::default()).unwrap_err(),
            ParseError::NoAppGuidOrCredentialClient
        );
    }

    #[test]
    fn stored_bind_details_recover_app_guid() {
        let d = parse_stored_bind_details(
            json!({"role": "reader"}).as_object().cloned().unwrap(),
            json!({"app_guid": "app"}).as_object().cloned().unwrap(),
            "plan",
            "svc",
        );
        assert_eq!(d.app_guid, "app");
        assert_eq!(d.request_params["role"], "reader");
    }
}
