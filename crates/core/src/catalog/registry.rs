use std::collections::{BTreeMap, HashSet};

use super::definition::ServiceDefinition;
use super::CatalogError;
use crate::settings::{FeatureFlags, Settings};
use crate::validation::{err_if_duplicate, FieldError};

/// The registered services, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct BrokerRegistry {
    services: BTreeMap<String, ServiceDefinition>,
}

impl BrokerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service after merging its operator plans and validating it.
    pub fn register(
        &mut self,
        mut service: ServiceDefinition,
        settings: &Settings,
    ) -> Result<(), CatalogError> {
        let name = service.name.clone();
        if self.services.contains_key(&name) {
            return Err(CatalogError::Duplicate(name));
        }

        let user_plans = service
            .user_defined_plans(settings)
            .map_err(|message| CatalogError::UserPlans {
                name: name.clone(),
                message,
            })?;
        service.plans.extend(user_plans);

        if service.plans.is_empty() {
            return Err(CatalogError::NoPlans(name));
        }
        service
            .validate()
            .map_err(|source| CatalogError::Invalid {
                name: name.clone(),
                source,
            })?;

        tracing::debug!(service = %name, plans = service.plans.len(), "registered service");
        self.services.insert(name, service);
        Ok(())
    }

    /// Enforce unique service ids, service names and plan ids.
    pub fn validate(&self) -> Result<(), FieldError> {
        let mut service_ids = HashSet::new();
        let mut service_names = HashSet::new();
        let mut plan_ids = HashSet::new();
        let mut errs = FieldError::none();
        for (i, s) in self.get_all_services().into_iter().enumerate() {
            errs = errs
                .also(err_if_duplicate(&s.id, "Id", &mut service_ids).via_field_index("services", i))
                .also(
                    err_if_duplicate(&s.name, "Name", &mut service_names)
                        .via_field_index("services", i),
                );
            for (j, p) in s.plans.iter().enumerate() {
                errs = errs.also(
                    err_if_duplicate(&p.id, "Id", &mut plan_ids)
                        .via_field_index("Plans", j)
                        .via_field_index("services", i),
                );
            }
        }
        errs.into_result()
    }

    /// Every service, sorted by name.
    pub fn get_all_services(&self) -> Vec<&ServiceDefinition> {
        self.services.values().collect()
    }

    /// Services whose lifecycle tags are all enabled, sorted by name.
    pub fn get_enabled_services(&self, flags: &FeatureFlags) -> Vec<&ServiceDefinition> {
        self.services
            .values()
            .filter(|svc| svc.tags.iter().all(|tag| flags.lifecycle_tag_enabled(tag)))
            .collect()
    }

    pub fn get_service_by_id(&self, id: &str) -> Result<&ServiceDefinition, CatalogError> {
        self.services
            .values()
            .find(|svc| svc.id == id)
            .ok_or_else(|| CatalogError::UnknownService(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ServicePlan;
    use crate::settings::ServiceSettings;
    use serde_json::json;

    fn service(id: &str, name: &str, plan_id: &str) -> ServiceDefinition {
        ServiceDefinition {
            id: id.into(),
            name: name.into(),
            plans: vec![ServicePlan {
                id: plan_id.into(),
                name: "default".into(),
                ..ServicePlan::default()
            }],
            ..ServiceDefinition::default()
        }
    }

    const ID_A: &str = "11111111-1111-1111-1111-111111111111";
    const ID_B: &str = "22222222-2222-2222-2222-222222222222";
    const PLAN_A: &str = "aaaaaaaa-aaaa-aaaa-aaaa-aaaaaaaaaaaa";
    const PLAN_B: &str = "bbbbbbbb-bbbb-bbbb-bbbb-bbbbbbbbbbbb";

    #[test]
    fn register_rejects_duplicate_names() {
        let mut reg = BrokerRegistry::new();
        let settings = Settings::default();
        reg.register(service(ID_A, "db", PLAN_A), &settings).unwrap();
        let err = reg.register(service(ID_B, "db", PLAN_B), &settings).unwrap_err();
        assert_eq!(err.to_string(), "tried to register multiple instances of: \"db\"");
    }

    #[test]
    fn register_rejects_invalid_services() {
        let mut reg = BrokerRegistry::new();
        let err = reg
            .register(service("bad-id", "db", PLAN_A), &Settings::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "error validating service \"db\", field must be a UUID: Id"
        );
    }

    #[test]
    fn register_requires_plans() {
        let mut svc = service(ID_A, "db", PLAN_A);
        svc.plans.clear();
        let err = BrokerRegistry::new()
            .register(svc, &Settings::default())
            .unwrap_err();
        assert!(matches!(err, CatalogError::NoPlans(_)));
    }

    #[test]
    fn register_merges_user_plans() {
        let mut svc = service(ID_A, "db", PLAN_A);
        svc.plans.clear();
        let mut settings = Settings::default();
        settings.services.insert(
            "db".into(),
            ServiceSettings {
                plans: vec![json!({"id": PLAN_B, "name": "custom", "tier": "1"})],
                ..ServiceSettings::default()
            },
        );
        let mut reg = BrokerRegistry::new();
        reg.register(svc, &settings).unwrap();
        let svc = reg.get_service_by_id(ID_A).unwrap();
        assert_eq!(svc.plans.len(), 1);
        assert_eq!(svc.get_plan_by_id(PLAN_B).unwrap().name, "custom");
    }

    #[test]
    fn validate_finds_duplicate_ids_across_services() {
        let mut reg = BrokerRegistry::new();
        let settings = Settings::default();
        reg.register(service(ID_A, "alpha", PLAN_A), &settings).unwrap();
        reg.register(service(ID_A, "beta", PLAN_A), &settings).unwrap();
        let msg = reg.validate().unwrap_err().to_string();
        assert!(msg.contains(&format!("duplicate value: {ID_A}: services[1].Id")), "{msg}");
        assert!(
            msg.contains(&format!("duplicate value: {PLAN_A}: services[1].Plans[0].Id")),
            "{msg}"
        );
    }

    #[test]
    fn lookup_by_id() {
        let mut reg = BrokerRegistry::new();
        reg.register(service(ID_A, "db", PLAN_A), &Settings::default())
            .unwrap();
        assert_eq!(reg.get_service_by_id(ID_A).unwrap().name, "db");
        assert_eq!(
            reg.get_service_by_id("missing").unwrap_err().to_string(),
            "unknown service ID: \"missing\""
        );
    }

    #[test]
    fn enabled_services_respect_lifecycle_tags() {
        let settings = Settings::default();
        let mut reg = BrokerRegistry::new();
        let mut eol = service(ID_A, "zeta", PLAN_A);
        eol.tags = vec!["eol".into()];
        let mut preview = service(ID_B, "alpha", PLAN_B);
        preview.tags = vec!["preview".into(), "database".into()];
        reg.register(eol, &settings).unwrap();
        reg.register(preview, &settings).unwrap();

        let names: Vec<&str> = reg
            .get_enabled_services(&settings.flags)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["alpha"]);

        let flags = FeatureFlags {
            enable_eol_services: true,
            ..FeatureFlags::default()
        };
        let names: Vec<&str> = reg
            .get_enabled_services(&flags)
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, ["alpha", "zeta"]);
    }
}
