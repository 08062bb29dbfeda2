use std::collections::BTreeMap;

use broker_storage::ServiceInstanceDetails;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::plan::ServicePlan;
use super::schema::{create_json_schema, validate_variables};
use super::variable::{BrokerVariable, ImportVariable};
use super::CatalogError;
use crate::identity::identity_constant;
use crate::labels::default_labels;
use crate::paramparser::{BindDetails, ProvisionDetails, UpdateDetails};
use crate::settings::Settings;
use crate::validation::{
    err_if_duplicate, err_if_not_osb_name, err_if_not_url, err_if_not_uuid, FieldError,
};
use crate::varcontext::{ContextBuilder, DefaultVariable, VarContext, VarContextError};

/// Key under which every resolved context carries its deployment id.
pub const TF_ID_KEY: &str = "tf_id";

/// A service offering: its catalog metadata, plans and declared variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    pub display_name: String,
    pub image_url: String,
    pub documentation_url: String,
    pub support_url: String,
    pub provider_display_name: String,
    pub tags: Vec<String>,
    pub bindable: bool,
    pub plan_updateable: bool,
    pub requires: Vec<String>,
    pub plans: Vec<ServicePlan>,

    pub provision_input_variables: Vec<BrokerVariable>,
    pub import_input_variables: Vec<ImportVariable>,
    pub provision_computed_variables: Vec<DefaultVariable>,
    pub bind_input_variables: Vec<BrokerVariable>,
    pub bind_output_variables: Vec<BrokerVariable>,
    pub bind_computed_variables: Vec<DefaultVariable>,
    pub plan_variables: Vec<BrokerVariable>,

    pub default_role_whitelist: Vec<String>,
    pub global_labels: BTreeMap<String, String>,
}

fn validate_each<T>(
    errs: FieldError,
    items: &[T],
    field: &str,
    check: impl Fn(&T) -> Result<(), FieldError>,
) -> FieldError {
    items.iter().enumerate().fold(errs, |errs, (i, item)| {
        errs.also(FieldError::from(check(item)).via_field_index(field, i))
    })
}

impl ServiceDefinition {
    pub fn validate(&self) -> Result<(), FieldError> {
        let mut errs = err_if_not_uuid(&self.id, "Id").also(err_if_not_osb_name(&self.name, "Name"));

        for (value, field) in [
            (&self.image_url, "ImageUrl"),
            (&self.documentation_url, "DocumentationUrl"),
            (&self.support_url, "SupportUrl"),
        ] {
            if !value.is_empty() {
                errs = errs.also(err_if_not_url(value, field));
            }
        }

        errs = self.validate_plans(errs);
        errs = validate_each(errs, &self.provision_input_variables, "ProvisionInputVariables", BrokerVariable::validate);
        errs = validate_each(errs, &self.provision_computed_variables, "ProvisionComputedVariables", DefaultVariable::validate);
        errs = validate_each(errs, &self.bind_input_variables, "BindInputVariables", BrokerVariable::validate);
        errs = validate_each(errs, &self.bind_output_variables, "BindOutputVariables", BrokerVariable::validate);
        errs = validate_each(errs, &self.bind_computed_variables, "BindComputedVariables", DefaultVariable::validate);
        errs = validate_each(errs, &self.plan_variables, "PlanVariables", BrokerVariable::validate);
        errs.into_result()
    }

    fn validate_plans(&self, mut errs: FieldError) -> FieldError {
        let mut names = std::collections::HashSet::new();
        let mut ids = std::collections::HashSet::new();
        for (i, plan) in self.plans.iter().enumerate() {
            errs = errs
                .also(FieldError::from(plan.validate()).via_field_index("Plans", i))
                .also(err_if_duplicate(&plan.name, "Name", &mut names).via_field_index("Plans", i))
                .also(err_if_duplicate(&plan.id, "Id", &mut ids).via_field_index("Plans", i));
        }
        errs
    }

    /// Plans supplied by the operator under `service.<name>.plans`.
    pub fn user_defined_plans(&self, settings: &Settings) -> Result<Vec<ServicePlan>, String> {
        settings
            .user_plans(&self.name)
            .iter()
            .map(|raw| {
                let plan = ServicePlan::from_user_json(raw).map_err(|e| e.to_string())?;
                self.validate_user_plan(&plan)?;
                Ok(plan)
            })
            .collect()
    }

    fn validate_user_plan(&self, plan: &ServicePlan) -> Result<(), String> {
        if plan.id.is_empty() {
            return Err(format!("{} custom plan {plan:?} is missing an id", self.name));
        }
        if plan.name.is_empty() {
            return Err(format!("{} custom plan {plan:?} is missing a name", self.name));
        }
        for var in self.plan_variables.iter().filter(|v| v.required) {
            if !plan.service_properties.contains_key(&var.field_name) {
                return Err(format!(
                    "{} custom plan {plan:?} is missing required property {}",
                    self.name, var.field_name
                ));
            }
        }
        Ok(())
    }

    pub fn get_plan_by_id(&self, plan_id: &str) -> Result<&ServicePlan, CatalogError> {
        self.plans
            .iter()
            .find(|p| p.id == plan_id)
            .ok_or_else(|| CatalogError::UnknownPlan(plan_id.to_string()))
    }

    pub fn is_role_whitelist_enabled(&self) -> bool {
        !self.default_role_whitelist.is_empty()
    }

    /// Field names a user may pass on provision or update.
    pub fn provision_field_names(&self) -> Vec<&str> {
        self.provision_input_variables
            .iter()
            .map(|v| v.field_name.as_str())
            .chain(self.import_input_variables.iter().map(|v| v.field_name.as_str()))
            .collect()
    }

    pub fn bind_field_names(&self) -> Vec<&str> {
        self.bind_input_variables
            .iter()
            .map(|v| v.field_name.as_str())
            .collect()
    }

    /// False when `params` touches a variable that forbids updates.
    pub fn allowed_update(&self, params: &Map<String, Value>) -> bool {
        !self
            .provision_input_variables
            .iter()
            .any(|v| v.prohibit_update && params.contains_key(&v.field_name))
    }

    /// The OSB catalog object for this service.
    pub fn catalog_entry(&self) -> Value {
        let schemas = json!({
            "service_instance": {
                "create": {"parameters": create_json_schema(&self.provision_input_variables)},
                "update": {"parameters": create_json_schema(&self.provision_input_variables)},
            },
            "service_binding": {
                "create": {"parameters": create_json_schema(&self.bind_input_variables)},
            },
        });
        let plans: Vec<Value> = self
            .plans
            .iter()
            .map(|p| {
                let mut entry = p.catalog_entry();
                entry["schemas"] = schemas.clone();
                entry
            })
            .collect();

        let mut metadata = Map::new();
        for (key, value) in [
            ("displayName", &self.display_name),
            ("longDescription", &self.description),
            ("documentationUrl", &self.documentation_url),
            ("imageUrl", &self.image_url),
            ("supportUrl", &self.support_url),
            ("providerDisplayName", &self.provider_display_name),
        ] {
            if !value.is_empty() {
                metadata.insert(key.to_string(), Value::String(value.clone()));
            }
        }

        let mut entry = json!({
            "id": self.id,
            "name": self.name,
            "description": self.description,
            "bindable": self.bindable,
            "plan_updateable": self.plan_updateable,
            "tags": self.tags,
            "metadata": metadata,
            "plans": plans,
        });
        if !self.requires.is_empty() {
            entry["requires"] = json!(self.requires);
        }
        entry
    }

    fn provision_defaults(&self) -> Vec<DefaultVariable> {
        self.provision_input_variables
            .iter()
            .map(BrokerVariable::as_default)
            .collect()
    }

    fn bind_defaults(&self) -> Vec<DefaultVariable> {
        self.bind_input_variables
            .iter()
            .map(BrokerVariable::as_default)
            .collect()
    }

    fn variables(
        &self,
        constants: Map<String, Value>,
        params: &Map<String, Value>,
        plan: &ServicePlan,
        settings: &Settings,
    ) -> Result<VarContext, VarContextError> {
        let builder = ContextBuilder::new()
            .set_eval_constants(constants)
            .set_config(settings.raw.clone())
            .merge_map(&settings.provision_defaults)
            .merge_map(&settings.provision_default_overrides(&self.name))
            .merge_map(params)
            .merge_map(&plan.provision_overrides)
            .merge_defaults(&self.provision_defaults())
            .merge_map(&plan.service_properties)
            .merge_defaults(&self.provision_computed_variables)
            .merge_defaults(&[tf_id_variable("tf:${request.instance_id}:")]);
        build_and_validate(builder, &self.provision_input_variables)
    }

    pub fn provision_variables(
        &self,
        instance_id: &str,
        details: &ProvisionDetails,
        plan: &ServicePlan,
        originating_identity: Option<&Value>,
        settings: &Settings,
    ) -> Result<VarContext, VarContextError> {
        let labels = default_labels(
            &self.global_labels,
            instance_id,
            &details.organization_guid,
            &details.space_guid,
        );
        let constants = constants([
            ("request.plan_id", json!(details.plan_id)),
            ("request.service_id", json!(details.service_id)),
            ("request.instance_id", json!(instance_id)),
            ("request.default_labels", Value::Object(labels)),
            ("request.context", Value::Object(details.request_context.clone())),
            (
                "request.x_broker_api_originating_identity",
                identity_constant(originating_identity),
            ),
        ]);
        self.variables(constants, &details.request_params, plan, settings)
    }

    /// `merged_params` is the stored provision parameters overlaid with
    /// imported properties and the update request's parameters.
    pub fn update_variables(
        &self,
        instance_id: &str,
        details: &UpdateDetails,
        merged_params: &Map<String, Value>,
        plan: &ServicePlan,
        originating_identity: Option<&Value>,
        settings: &Settings,
    ) -> Result<VarContext, VarContextError> {
        let labels = default_labels(
            &self.global_labels,
            instance_id,
            &details.previous_org_id,
            &details.previous_space_id,
        );
        let constants = constants([
            ("request.plan_id", json!(plan.id)),
            ("request.service_id", json!(self.id)),
            ("request.instance_id", json!(instance_id)),
            ("request.default_labels", Value::Object(labels)),
            ("request.context", Value::Object(details.request_context.clone())),
            (
                "request.x_broker_api_originating_identity",
                identity_constant(originating_identity),
            ),
        ]);
        self.variables(constants, merged_params, plan, settings)
    }

    pub fn bind_variables(
        &self,
        instance: &ServiceInstanceDetails,
        binding_id: &str,
        details: &BindDetails,
        plan: &ServicePlan,
        originating_identity: Option<&Value>,
        settings: &Settings,
    ) -> Result<VarContext, VarContextError> {
        let constants = constants([
            (
                "request.x_broker_api_originating_identity",
                identity_constant(originating_identity),
            ),
            ("request.binding_id", json!(binding_id)),
            ("request.instance_id", json!(instance.guid)),
            ("request.context", Value::Object(details.request_context.clone())),
            ("request.plan_id", json!(instance.plan_guid)),
            ("request.service_id", json!(instance.service_guid)),
            ("request.app_guid", json!(details.app_guid)),
            ("request.plan_properties", Value::Object(plan.service_properties.clone())),
            ("instance.name", json!(instance.name)),
            ("instance.details", Value::Object(instance.outputs.clone())),
        ]);

        let builder = ContextBuilder::new()
            .set_eval_constants(constants)
            .set_config(settings.raw.clone())
            .merge_map(&settings.bind_default_overrides(&self.name))
            .merge_map(&details.request_params)
            .merge_map(&plan.bind_overrides)
            .merge_defaults(&self.bind_defaults())
            .merge_defaults(&self.bind_computed_variables)
            .merge_defaults(&[tf_id_variable("tf:${request.instance_id}:${request.binding_id}")]);
        build_and_validate(builder, &self.bind_input_variables)
    }
}

/// Every context names the deployment row it addresses under `tf_id`.
fn tf_id_variable(template: &str) -> DefaultVariable {
    DefaultVariable {
        name: TF_ID_KEY.to_string(),
        default: Value::String(template.to_string()),
        overwrite: true,
        var_type: String::new(),
    }
}

fn constants<const N: usize>(entries: [(&str, Value); N]) -> Map<String, Value> {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect()
}

fn build_and_validate(
    builder: ContextBuilder,
    vars: &[BrokerVariable],
) -> Result<VarContext, VarContextError> {
    let vc = builder.build()?;
    validate_variables(&vc.to_map(), vars)?;
    Ok(vc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ServiceSettings;

    const SERVICE_ID: &str = "b9e4332e-b42b-4680-bda5-ea1506797474";
    const PLAN_ID: &str = "e1d11f65-da66-46ad-977c-6d56513baf43";

    fn obj(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap_or_default()
    }

    fn definition() -> ServiceDefinition {
        serde_json::from_value(json!({
            "id": SERVICE_ID,
            "name": "test-service",
            "plans": [{
                "id": PLAN_ID,
                "name": "small",
                "service_properties": {"tier": "small"},
                "provision_overrides": {"region": "forced"}
            }],
            "provision_input_variables": [
                {"field_name": "name", "type": "string", "default": "db-${request.instance_id}"},
                {"field_name": "region", "type": "string", "default": "us"},
                {"field_name": "size", "type": "integer", "default": 5, "prohibit_update": true}
            ],
            "provision_computed_variables": [
                {"name": "labels", "default": "${json.marshal(request.default_labels)}", "overwrite": true, "type": "object"},
                {"name": "tier", "default": "override", "overwrite": false, "type": "string"}
            ],
            "bind_input_variables": [
                {"field_name": "role", "type": "string", "default": "reader"}
            ],
            "bind_computed_variables": [
                {"name": "instance_name", "default": "${instance.name}", "overwrite": true, "type": "string"},
                {"name": "app", "default": "${request.app_guid}", "overwrite": true, "type": "string"}
            ],
            "global_labels": {"team": "data"}
        }))
        .unwrap()
    }

    #[test]
    fn definition_validates() {
        definition().validate().unwrap();
    }

    #[test]
    fn validation_collects_nested_errors() {
        let mut def = definition();
        def.id = "nope".into();
        def.support_url = "not a url".into();
        def.plans.push(def.plans[0].clone());
        def.provision_input_variables[0].field_name.clear();
        let msg = def.validate().unwrap_err().to_string();
        assert!(msg.contains("field must be a UUID: Id"), "{msg}");
        assert!(msg.contains("field must be a URL: SupportUrl"), "{msg}");
        assert!(msg.contains("duplicate value: small: Plans[1].Name"), "{msg}");
        assert!(msg.contains("ProvisionInputVariables[0].field_name"), "{msg}");
    }

    #[test]
    fn provision_layers_resolve_in_order() {
        let def = definition();
        let mut settings = Settings::default();
        settings.provision_defaults = obj(json!({"size": 1, "global": "g"}));
        let details = ProvisionDetails {
            service_id: SERVICE_ID.into(),
            plan_id: PLAN_ID.into(),
            organization_guid: "org".into(),
            space_guid: "space".into(),
            request_params: obj(json!({"region": "user", "size": 3})),
            ..ProvisionDetails::default()
        };
        let plan = def.get_plan_by_id(PLAN_ID).unwrap();
        let vc = def
            .provision_variables("inst", &details, plan, None, &settings)
            .unwrap();
        assert_eq!(vc.get("global"), Some(&json!("g")));
        assert_eq!(vc.get("size"), Some(&json!(3)));
        assert_eq!(vc.get("region"), Some(&json!("forced")));
        assert_eq!(vc.get("name"), Some(&json!("db-inst")));
        assert_eq!(vc.get(TF_ID_KEY), Some(&json!("tf:inst:")));
        // plan service properties beat fill-only computed defaults
        assert_eq!(vc.get("tier"), Some(&json!("small")));
        assert_eq!(
            vc.get("labels"),
            Some(&json!({
                "team": "data",
                "pcf-organization-guid": "org",
                "pcf-space-guid": "space",
                "pcf-instance-id": "inst"
            }))
        );
    }

    #[test]
    fn service_scoped_defaults_beat_global() {
        let def = definition();
        let mut settings = Settings::default();
        settings.provision_defaults = obj(json!({"size": 1}));
        settings.services.insert(
            "test-service".into(),
            ServiceSettings {
                provision_defaults: obj(json!({"size": 2})),
                ..ServiceSettings::default()
            },
        );
        let plan = def.get_plan_by_id(PLAN_ID).unwrap();
        let vc = def
            .provision_variables("inst", &ProvisionDetails::default(), plan, None, &settings)
            .unwrap();
        assert_eq!(vc.get("size"), Some(&json!(2)));
    }

    #[test]
    fn schema_failures_surface_as_context_errors() {
        let def = definition();
        let details = ProvisionDetails {
            request_params: obj(json!({"size": "huge"})),
            ..ProvisionDetails::default()
        };
        let plan = def.get_plan_by_id(PLAN_ID).unwrap();
        let err = def
            .provision_variables("inst", &details, plan, None, &Settings::default())
            .unwrap_err();
        assert!(err.to_string().starts_with("1 error(s) occurred: "), "{err}");
    }

    #[test]
    fn bind_variables_see_instance_constants() {
        let def = definition();
        let instance = ServiceInstanceDetails {
            guid: "inst".into(),
            name: "my-db".into(),
            plan_guid: PLAN_ID.into(),
            service_guid: SERVICE_ID.into(),
            ..ServiceInstanceDetails::default()
        };
        let details = BindDetails {
            app_guid: "app".into(),
            ..BindDetails::default()
        };
        let plan = def.get_plan_by_id(PLAN_ID).unwrap();
        let vc = def
            .bind_variables(&instance, "bind", &details, plan, None, &Settings::default())
            .unwrap();
        assert_eq!(
            vc.to_json(),
            json!({
                "role": "reader",
                "instance_name": "my-db",
                "app": "app",
                "tf_id": "tf:inst:bind"
            })
        );
    }

    #[test]
    fn bind_overrides_beat_params() {
        let mut def = definition();
        def.plans[0].bind_overrides = obj(json!({"role": "admin"}));
        let details = BindDetails {
            request_params: obj(json!({"role": "writer"})),
            ..BindDetails::default()
        };
        let plan = def.plans[0].clone();
        let vc = def
            .bind_variables(
                &ServiceInstanceDetails::default(),
                "bind",
                &details,
                &plan,
                None,
                &Settings::default(),
            )
            .unwrap();
        assert_eq!(vc.get("role"), Some(&json!("admin")));
    }

    #[test]
    fn prohibited_fields_block_update() {
        let def = definition();
        assert!(def.allowed_update(&obj(json!({"region": "eu"}))));
        assert!(!def.allowed_update(&obj(json!({"size": 10}))));
    }

    #[test]
    fn user_plans_are_validated() {
        let mut def = definition();
        def.plan_variables = vec![BrokerVariable {
            field_name: "tier".into(),
            required: true,
            ..BrokerVariable::default()
        }];
        let mut settings = Settings::default();
        settings.services.insert(
            "test-service".into(),
            ServiceSettings {
                plans: vec![json!({"id": "x", "name": "custom"})],
                ..ServiceSettings::default()
            },
        );
        let err = def.user_defined_plans(&settings).unwrap_err();
        assert!(err.contains("is missing required property tier"), "{err}");

        settings.services.get_mut("test-service").unwrap().plans =
            vec![json!({"id": "x", "name": "custom", "tier": "big"})];
        let plans = def.user_defined_plans(&settings).unwrap();
        assert_eq!(plans[0].service_properties["tier"], "big");
    }

    #[test]
    fn catalog_entry_carries_schemas_and_metadata() {
        let mut def = definition();
        def.display_name = "Test".into();
        let entry = def.catalog_entry();
        assert_eq!(entry["metadata"]["displayName"], "Test");
        assert_eq!(entry["plans"][0]["id"], PLAN_ID);
        assert_eq!(
            entry["plans"][0]["schemas"]["service_binding"]["create"]["parameters"]["properties"]
                ["role"]["type"],
            "string"
        );
        assert!(entry.get("requires").is_none());
    }
}
