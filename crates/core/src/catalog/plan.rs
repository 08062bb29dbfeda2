use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::{err_if_blank, err_if_not_uuid, FieldError};
use crate::version::{Version, VersionError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceInfo {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
}

/// A tier of a service offering.
///
/// `service_properties` are operator-owned values forced into every
/// provision; users may not override them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServicePlan {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub free: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bindable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_updatable: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maintenance_info: Option<MaintenanceInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default)]
    pub service_properties: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub provision_overrides: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub bind_overrides: Map<String, Value>,
}

const PLAN_KEYS: &[&str] = &[
    "id",
    "name",
    "description",
    "free",
    "bindable",
    "plan_updatable",
    "maintenance_info",
    "metadata",
    "service_properties",
    "provision_overrides",
    "bind_overrides",
];

impl ServicePlan {
    pub fn validate(&self) -> Result<(), FieldError> {
        err_if_blank(&self.name, "Name")
            .also(err_if_not_uuid(&self.id, "ID"))
            .into_result()
    }

    /// Decode an operator plan object. Keys that are not plan fields become
    /// service properties; `guid` stands in for a missing `id`.
    pub fn from_user_json(raw: &Value) -> Result<Self, serde_json::Error> {
        let mut plan: ServicePlan = serde_json::from_value(raw.clone())?;
        if let Some(obj) = raw.as_object() {
            for (k, v) in obj {
                if !PLAN_KEYS.contains(&k.as_str()) {
                    plan.service_properties.insert(k.clone(), v.clone());
                }
            }
        }
        if plan.id.is_empty() {
            if let Some(Value::String(guid)) = plan.service_properties.get("guid") {
                plan.id = guid.clone();
            }
        }
        Ok(plan)
    }

    /// The plan's maintenance version, if one is declared.
    pub fn maintenance_info_version(&self) -> Result<Option<Version>, VersionError> {
        match &self.maintenance_info {
            Some(mi) if !mi.version.is_empty() => Version::parse(&mi.version).map(Some),
            _ => Ok(None),
        }
    }

    /// The OSB catalog form of the plan.
    pub fn catalog_entry(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("id".into(), Value::String(self.id.clone()));
        entry.insert("name".into(), Value::String(self.name.clone()));
        entry.insert("description".into(), Value::String(self.description.clone()));
        if let Some(free) = self.free {
            entry.insert("free".into(), Value::Bool(free));
        }
        if let Some(bindable) = self.bindable {
            entry.insert("bindable".into(), Value::Bool(bindable));
        }
        if let Some(updatable) = self.plan_updatable {
            entry.insert("plan_updateable".into(), Value::Bool(updatable));
        }
        if let Some(mi) = &self.maintenance_info {
            if let Ok(v) = serde_json::to_value(mi) {
                entry.insert("maintenance_info".into(), v);
            }
        }
        if let Some(metadata) = &self.metadata {
            entry.insert("metadata".into(), metadata.clone());
        }
        Value::Object(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_plan_extra_keys_become_properties() {
        let plan = ServicePlan::from_user_json(&json!({
            "name": "small",
            "guid": "8b52a460-b246-11eb-a8f5-d349948e2480",
            "tier": "db-n1-standard-1",
            "description": "A small plan"
        }))
        .unwrap();
        assert_eq!(plan.id, "8b52a460-b246-11eb-a8f5-d349948e2480");
        assert_eq!(plan.name, "small");
        assert_eq!(plan.description, "A small plan");
        assert_eq!(plan.service_properties["tier"], "db-n1-standard-1");
        assert!(!plan.service_properties.contains_key("name"));
    }

    #[test]
    fn validate_reports_name_and_id() {
        let err = ServicePlan::default().validate().unwrap_err().to_string();
        assert_eq!(err, "field must be a UUID: ID\nmissing field(s): Name");
    }

    #[test]
    fn maintenance_version_parses() {
        let mut plan = ServicePlan::default();
        assert_eq!(plan.maintenance_info_version().unwrap(), None);
        plan.maintenance_info = Some(MaintenanceInfo {
            version: "1.2".into(),
            description: String::new(),
        });
        assert_eq!(
            plan.maintenance_info_version().unwrap(),
            Some(Version::parse("1.2.0").unwrap())
        );
        plan.maintenance_info.as_mut().unwrap().version = "nope".into();
        assert!(plan.maintenance_info_version().is_err());
    }

    #[test]
    fn catalog_entry_omits_operator_fields() {
        let plan = ServicePlan {
            id: "id".into(),
            name: "small".into(),
            service_properties: json!({"tier": "1"}).as_object().cloned().unwrap(),
            maintenance_info: Some(MaintenanceInfo {
                version: "1.0.0".into(),
                description: "first".into(),
            }),
            ..ServicePlan::default()
        };
        let entry = plan.catalog_entry();
        assert!(entry.get("service_properties").is_none());
        assert_eq!(entry["maintenance_info"], json!({"version": "1.0.0", "description": "first"}));
    }
}
