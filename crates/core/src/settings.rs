//! Operator settings consumed by the registry and the lifecycle engine.
//!
//! `Settings` is built once at start-up and shared read-only; nothing here
//! is mutated after construction.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

/// Per-service overrides keyed under `service.<name>`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub provision_defaults: Map<String, Value>,
    pub bind_defaults: Map<String, Value>,
    /// Raw plan objects appended to the service's catalog plans.
    pub plans: Vec<Value>,
}

/// Lifecycle tag toggles and request validation switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    pub enable_preview_services: bool,
    pub enable_unmaintained_services: bool,
    pub enable_eol_services: bool,
    pub enable_beta_services: bool,
    pub enable_deprecated_services: bool,
    pub enable_terraform_services: bool,
    pub property_validation_disabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_preview_services: true,
            enable_unmaintained_services: false,
            enable_eol_services: false,
            enable_beta_services: true,
            enable_deprecated_services: false,
            enable_terraform_services: false,
            property_validation_disabled: false,
        }
    }
}

impl FeatureFlags {
    /// Whether services carrying `tag` may appear in the catalog.
    /// Tags without a toggle are always allowed.
    pub fn lifecycle_tag_enabled(&self, tag: &str) -> bool {
        match tag {
            "preview" => self.enable_preview_services,
            "unmaintained" => self.enable_unmaintained_services,
            "eol" => self.enable_eol_services,
            "beta" => self.enable_beta_services,
            "deprecated" => self.enable_deprecated_services,
            "terraform" => self.enable_terraform_services,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Global `provision.defaults`.
    pub provision_defaults: Map<String, Value>,
    pub services: BTreeMap<String, ServiceSettings>,
    pub flags: FeatureFlags,
    /// The whole configuration document, read by the `config()` template function.
    pub raw: Option<Arc<Value>>,
}

impl Settings {
    pub fn service(&self, name: &str) -> Option<&ServiceSettings> {
        self.services.get(name)
    }

    pub fn provision_default_overrides(&self, service_name: &str) -> Map<String, Value> {
        self.service(service_name)
            .map(|s| s.provision_defaults.clone())
            .unwrap_or_default()
    }

    pub fn bind_default_overrides(&self, service_name: &str) -> Map<String, Value> {
        self.service(service_name)
            .map(|s| s.bind_defaults.clone())
            .unwrap_or_default()
    }

    pub fn user_plans(&self, service_name: &str) -> &[Value] {
        self.service(service_name)
            .map(|s| s.plans.as_slice())
            .unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn flag_defaults() {
        let flags = FeatureFlags::default();
        assert!(flags.lifecycle_tag_enabled("preview"));
        assert!(flags.lifecycle_tag_enabled("beta"));
        assert!(!flags.lifecycle_tag_enabled("eol"));
        assert!(!flags.lifecycle_tag_enabled("terraform"));
        assert!(flags.lifecycle_tag_enabled("database"));
        assert!(!flags.property_validation_disabled);
    }

    #[test]
    fn partial_flags_keep_defaults() {
        let flags: FeatureFlags =
            serde_json::from_value(json!({"enable_eol_services": true})).unwrap();
        assert!(flags.enable_eol_services);
        assert!(flags.enable_preview_services);
    }

    #[test]
    fn service_lookups_fall_back_to_empty() {
        let mut settings = Settings::default();
        settings.services.insert(
            "db".into(),
            ServiceSettings {
                bind_defaults: json!({"role": "reader"}).as_object().cloned().unwrap(),
                ..ServiceSettings::default()
            },
        );
        assert_eq!(settings.bind_default_overrides("db")["role"], "reader");
        assert!(settings.provision_default_overrides("db").is_empty());
        assert!(settings.user_plans("other").is_empty());
    }
}
