//! The OSB lifecycle handlers.
//!
//! [`ServiceBroker`] owns the catalog, the storage façade, the service
//! provider and the optional secret store. Each handler validates the
//! request, asks the provider to act, then records what happened. Handlers
//! hold no locks; concurrent operations on one instance are arbitrated by
//! the provider through `check_operation_constraints`.

mod bind;
mod deprovision;
mod fetch;
mod last_operation;
mod params;
mod provision;
mod response;
mod unbind;
mod update;

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use broker_core::{BrokerRegistry, ServiceDefinition, Settings};
use broker_storage::BrokerStorage;

use crate::credstore::CredStore;
use crate::error::BrokerError;
use crate::provider::ServiceProvider;
use crate::tracker::TaskTracker;

pub use response::{
    Binding, DeprovisionServiceSpec, GetBindingSpec, GetInstanceDetailsSpec, LastOperation,
    ProvisionedServiceSpec, UpdateServiceSpec,
};

const CREDHUB_CLIENT_IDENTIFIER: &str = "csb";

/// Deployment id of a service instance.
pub fn tf_instance_id(instance_id: &str) -> String {
    format!("tf:{instance_id}:")
}

/// Deployment id of a service binding.
pub fn tf_binding_id(instance_id: &str, binding_id: &str) -> String {
    format!("tf:{instance_id}:{binding_id}")
}

/// Secret-store path holding a binding's credentials.
pub fn credential_name(service_name: &str, binding_id: &str) -> String {
    format!("/c/{CREDHUB_CLIENT_IDENTIFIER}/{service_name}/{binding_id}/secrets-and-services")
}

/// The `service_id` and `plan_id` query parameters OSB sends on deletes,
/// polls and fetches. Empty means "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlanQuery {
    pub service_id: String,
    pub plan_id: String,
}

impl PlanQuery {
    pub fn new(service_id: impl Into<String>, plan_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            plan_id: plan_id.into(),
        }
    }

    /// The supplied plan id, or `fallback` when none was sent.
    fn plan_or<'a>(&'a self, fallback: &'a str) -> &'a str {
        if self.plan_id.is_empty() {
            fallback
        } else {
            &self.plan_id
        }
    }

    /// Whether a record with these ids satisfies the query.
    fn matches(&self, service_id: &str, plan_id: &str) -> bool {
        (self.service_id.is_empty() || self.service_id == service_id)
            && (self.plan_id.is_empty() || self.plan_id == plan_id)
    }
}

pub struct ServiceBroker {
    registry: Arc<BrokerRegistry>,
    storage: Arc<dyn BrokerStorage>,
    provider: Arc<dyn ServiceProvider>,
    credstore: Option<Arc<dyn CredStore>>,
    settings: Arc<Settings>,
    upgrades: Arc<TaskTracker>,
}

impl ServiceBroker {
    pub fn new(
        registry: Arc<BrokerRegistry>,
        storage: Arc<dyn BrokerStorage>,
        provider: Arc<dyn ServiceProvider>,
        settings: Arc<Settings>,
    ) -> Self {
        Self {
            registry,
            storage,
            provider,
            credstore: None,
            settings,
            upgrades: Arc::new(TaskTracker::default()),
        }
    }

    /// Keep binding credentials in `credstore` instead of returning them.
    pub fn with_credstore(mut self, credstore: Arc<dyn CredStore>) -> Self {
        self.credstore = Some(credstore);
        self
    }

    pub fn registry(&self) -> &BrokerRegistry {
        &self.registry
    }

    pub fn storage(&self) -> &Arc<dyn BrokerStorage> {
        &self.storage
    }

    /// Catalog entries of every enabled service.
    pub fn services(&self) -> Vec<Value> {
        self.registry
            .get_enabled_services(&self.settings.flags)
            .into_iter()
            .map(ServiceDefinition::catalog_entry)
            .collect()
    }

    /// Upgrade tails still running.
    pub fn pending_upgrades(&self) -> usize {
        self.upgrades.len()
    }

    /// Wait for every in-flight upgrade tail to finish.
    pub async fn drain(&self) {
        self.upgrades.drain().await;
    }

    fn definition(&self, service_id: &str) -> Result<&ServiceDefinition, BrokerError> {
        Ok(self.registry.get_service_by_id(service_id)?)
    }

    async fn instance_exists(&self, instance_id: &str) -> Result<bool, BrokerError> {
        self.storage
            .exists_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("database error checking for existing instance", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deployment_ids() {
        assert_eq!(tf_instance_id("i-1"), "tf:i-1:");
        assert_eq!(tf_binding_id("i-1", "b-1"), "tf:i-1:b-1");
    }

    #[test]
    fn plan_query_matching() {
        let q = PlanQuery::default();
        assert!(q.matches("svc", "plan"));
        assert_eq!(q.plan_or("stored"), "stored");

        let q = PlanQuery::new("svc", "");
        assert!(q.matches("svc", "anything"));
        assert!(!q.matches("other", "anything"));

        let q = PlanQuery::new("", "plan");
        assert!(!q.matches("svc", "other-plan"));
        assert_eq!(q.plan_or("stored"), "plan");
    }

    #[test]
    fn credential_path() {
        assert_eq!(
            credential_name("my-db", "b-1"),
            "/c/csb/my-db/b-1/secrets-and-services"
        );
    }
}
