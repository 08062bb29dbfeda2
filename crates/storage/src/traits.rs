use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::{
    BindRequestDetails, JsonObject, ServiceBindingCredentials, ServiceInstanceDetails,
    TerraformDeployment,
};

/// Message written to deployment rows that were still running when the
/// broker went down.
pub const RECOVERED_FAILED_MESSAGE: &str = "the broker restarted while the operation was in progress";

/// The storage trait for service broker backends.
///
/// A `BrokerStorage` implementation is the single writer of persistent broker
/// state: service instances, the request parameters they were provisioned
/// with, binding credentials, bind parameters, and the provider's deployment
/// rows.
///
/// ## Existence vs. error
///
/// Every `exists_*` predicate returns `Ok(false)` for absence and reserves
/// `Err` for backend failures. Callers rely on that distinction to map
/// absence to OSB "does not exist" responses.
///
/// ## Write semantics
///
/// `store_*` methods are upserts with last-write-wins semantics.
/// `create_service_binding_credentials` is insert-only and returns
/// `Err(StorageError::BindingAlreadyExists)` when the row is present.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` to be shared through
/// axum application state and detached upgrade tasks.
#[async_trait]
pub trait BrokerStorage: Send + Sync + 'static {
    // ── Service instances ────────────────────────────────────────────────────

    /// Insert or replace the instance record keyed by `details.guid`.
    async fn store_service_instance_details(
        &self,
        details: ServiceInstanceDetails,
    ) -> Result<(), StorageError>;

    /// Returns `Err(StorageError::InstanceNotFound)` if absent.
    async fn get_service_instance_details(
        &self,
        instance_id: &str,
    ) -> Result<ServiceInstanceDetails, StorageError>;

    async fn exists_service_instance_details(&self, instance_id: &str)
        -> Result<bool, StorageError>;

    /// Deleting an absent record is not an error.
    async fn delete_service_instance_details(&self, instance_id: &str)
        -> Result<(), StorageError>;

    // ── Provision request details ────────────────────────────────────────────

    async fn store_provision_request_details(
        &self,
        instance_id: &str,
        details: JsonObject,
    ) -> Result<(), StorageError>;

    /// Returns `Err(StorageError::ProvisionDetailsNotFound)` if absent.
    async fn get_provision_request_details(
        &self,
        instance_id: &str,
    ) -> Result<JsonObject, StorageError>;

    async fn delete_provision_request_details(&self, instance_id: &str)
        -> Result<(), StorageError>;

    // ── Binding credentials ──────────────────────────────────────────────────

    async fn create_service_binding_credentials(
        &self,
        binding: ServiceBindingCredentials,
    ) -> Result<(), StorageError>;

    /// Returns `Err(StorageError::BindingNotFound)` if absent.
    async fn get_service_binding_credentials(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<ServiceBindingCredentials, StorageError>;

    async fn exists_service_binding_credentials(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<bool, StorageError>;

    async fn delete_service_binding_credentials(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<(), StorageError>;

    /// Binding ids of every binding on the instance, sorted.
    async fn get_service_binding_ids_for_service_instance(
        &self,
        instance_id: &str,
    ) -> Result<Vec<String>, StorageError>;

    // ── Bind request details ─────────────────────────────────────────────────

    async fn store_bind_request_details(
        &self,
        details: BindRequestDetails,
    ) -> Result<(), StorageError>;

    /// `Ok(None)` when nothing was stored for the binding.
    async fn get_bind_request_details(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<Option<BindRequestDetails>, StorageError>;

    async fn delete_bind_request_details(
        &self,
        binding_id: &str,
        instance_id: &str,
    ) -> Result<(), StorageError>;

    // ── Deployment rows ──────────────────────────────────────────────────────

    async fn store_terraform_deployment(
        &self,
        deployment: TerraformDeployment,
    ) -> Result<(), StorageError>;

    /// Returns `Err(StorageError::DeploymentNotFound)` if absent.
    async fn get_terraform_deployment(&self, id: &str)
        -> Result<TerraformDeployment, StorageError>;

    async fn exists_terraform_deployment(&self, id: &str) -> Result<bool, StorageError>;

    async fn delete_terraform_deployment(&self, id: &str) -> Result<(), StorageError>;

    /// Mark every deployment row still `in progress` as `failed` with
    /// [`RECOVERED_FAILED_MESSAGE`]. Returns the ids that were changed.
    async fn recover_in_progress_operations(&self) -> Result<Vec<String>, StorageError>;
}
