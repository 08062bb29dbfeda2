//! In-process `BrokerStorage` backend.
//!
//! Records live in `BTreeMap`s behind a single `tokio::sync::RwLock`, so each
//! call is atomic with respect to the others. Nothing survives a restart;
//! this backend serves the dry-run binary and tests.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::StorageError;
use crate::record::{
    BindRequestDetails, JsonObject, OperationState, ServiceBindingCredentials,
    ServiceInstanceDetails, TerraformDeployment,
};
use crate::traits::{BrokerStorage, RECOVERED_FAILED_MESSAGE};

type BindingKey = (String, String);

#[derive(Debug, Default)]
struct Tables {
    instances: BTreeMap<String, ServiceInstanceDetails>,
    provision_details: BTreeMap<String, JsonObject>,
    // keyed by (instance_id, binding_id) so a range scan yields an instance's bindings
    bindings: BTreeMap<BindingKey, ServiceBindingCredentials>,
    bind_details: BTreeMap<BindingKey, BindRequestDetails>,
    deployments: BTreeMap<String, TerraformDeployment>,
}

/// Volatile storage backend.
#[derive(Debug, Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(binding_id: &str, instance_id: &str) -> BindingKey {
    (instance_id.to_string(), binding_id.to_string())
}

#[async_trait]
impl BrokerStorage for InMemoryStorage {
    async fn store_service_instance_details(
        &self,
        details: ServiceInstanceDetails,
    ) -> Result<(), StorageError> {
        if details.guid.is_empty() {
            return Err(StorageError::Backend(
                "service instance details require a guid".to_string(),
            ));
        }
        let mut t = self.tables.write().await;
        t.instances.insert(details.guid.clone(), details);
        Ok(())
    }

    async fn get_service_instance_details(
        &self,
        instance_id: &str,
    ) -> Result<ServiceInstanceDetails, StorageError> {
        let t = self.tables.read().await;
        t.instances
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StorageError::InstanceNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    async fn exists_service_instance_details(
        &self,
        instance_id: &str,
    ) -> Result<bool, StorageError> {
        Ok(self.tables.read().await.instances.contains_key(instance_id))
    }

    async fn delete_service_instance_details(
        &self,
        instance_id: &str,
    ) -> Result<(), StorageError> {
        self.tables.write().await.instances.remove(instance_id);
        Ok(())
    }

    async fn store_provision_request_details(
        &self,
        instance_id: &str,
        details: JsonObject,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .provision_details
            .insert(instance_id.to_string(), details);
        Ok(())
    }

    async fn get_provision_request_details(
        &self,
        instance_id: &str,
    ) -> Result<JsonObject, StorageError> {
        let t = self.tables.read().await;
        t.provision_details
            .get(instance_id)
            .cloned()
            .ok_or_else(|| StorageError::ProvisionDetailsNotFound {
                instance_id: instance_id.to_string(),
            })
    }

    async fn delete_provision_request_details(
        &self,
        instance_id: &str,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .provision_details
            .remove(instance_id);
        Ok(())
    }

    async fn create_service_binding_credentials(
        &self,
        binding: ServiceBindingCredentials,
    ) -> Result<(), StorageError> {
        let k = key(&binding.binding_guid, &binding.service_instance_guid);
        let mut t = self.tables.write().await;
        if t.bindings.contains_key(&k) {
            return Err(StorageError::BindingAlreadyExists {
                binding_id: binding.binding_guid,
                instance_id: binding.service_instance_guid,
            });
        }
        t.bindings.insert(k, binding);
        Ok(())
    }

    async fn get_service_binding_credentials(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<ServiceBindingCredentials, StorageError> {
        let t = self.tables.read().await;
        t.bindings
            .get(&key(binding_id, instance_id))
            .cloned()
            .ok_or_else(|| StorageError::BindingNotFound {
                binding_id: binding_id.to_string(),
                instance_id: instance_id.to_string(),
            })
    }

    async fn exists_service_binding_credentials(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<bool, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .bindings
            .contains_key(&key(binding_id, instance_id)))
    }

    async fn delete_service_binding_credentials(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .bindings
            .remove(&key(binding_id, instance_id));
        Ok(())
    }

    async fn get_service_binding_ids_for_service_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<String>, StorageError> {
        let t = self.tables.read().await;
        Ok(t.bindings
            .keys()
            .filter(|(inst, _)| inst == instance_id)
            .map(|(_, binding)| binding.clone())
            .collect())
    }

    async fn store_bind_request_details(
        &self,
        details: BindRequestDetails,
    ) -> Result<(), StorageError> {
        let k = key(&details.binding_guid, &details.service_instance_guid);
        self.tables
            .write()
            .await
            .bind_details
            .insert(k, details);
        Ok(())
    }

    async fn get_bind_request_details(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<Option<BindRequestDetails>, StorageError> {
        Ok(self
            .tables
            .read()
            .await
            .bind_details
            .get(&key(binding_id, instance_id))
            .cloned())
    }

    async fn delete_bind_request_details(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .bind_details
            .remove(&key(binding_id, instance_id));
        Ok(())
    }

    async fn store_terraform_deployment(
        &self,
        deployment: TerraformDeployment,
    ) -> Result<(), StorageError> {
        self.tables
            .write()
            .await
            .deployments
            .insert(deployment.id.clone(), deployment);
        Ok(())
    }

    async fn get_terraform_deployment(&self, id: &str) -> Result<TerraformDeployment, StorageError> {
        let t = self.tables.read().await;
        t.deployments
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::DeploymentNotFound { id: id.to_string() })
    }

    async fn exists_terraform_deployment(&self, id: &str) -> Result<bool, StorageError> {
        Ok(self.tables.read().await.deployments.contains_key(id))
    }

    async fn delete_terraform_deployment(&self, id: &str) -> Result<(), StorageError> {
        self.tables.write().await.deployments.remove(id);
        Ok(())
    }

    async fn recover_in_progress_operations(&self) -> Result<Vec<String>, StorageError> {
        let mut t = self.tables.write().await;
        let mut recovered = Vec::new();
        for deployment in t.deployments.values_mut() {
            if deployment.last_operation_state == OperationState::InProgress {
                deployment.last_operation_state = OperationState::Failed;
                deployment.last_operation_message = RECOVERED_FAILED_MESSAGE.to_string();
                tracing::info!(workspace_id = %deployment.id, "mark-as-failed");
                recovered.push(deployment.id.clone());
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conformance::run_conformance_suite;

    #[tokio::test]
    async fn in_memory_passes_conformance() {
        let report = run_conformance_suite(|| async { InMemoryStorage::new() }).await;
        assert!(report.failed == 0, "{report}");
        assert!(report.total > 0);
    }

    #[tokio::test]
    async fn binding_ids_are_scoped_to_instance() {
        let s = InMemoryStorage::new();
        for (inst, bid) in [("i-1", "b-2"), ("i-1", "b-1"), ("i-2", "b-3")] {
            s.create_service_binding_credentials(ServiceBindingCredentials {
                service_guid: "svc".into(),
                service_instance_guid: inst.into(),
                binding_guid: bid.into(),
                credentials: JsonObject::new(),
            })
            .await
            .unwrap();
        }
        let ids = s
            .get_service_binding_ids_for_service_instance("i-1")
            .await
            .unwrap();
        assert_eq!(ids, vec!["b-1".to_string(), "b-2".to_string()]);
    }
}
