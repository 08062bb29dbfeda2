//! The contract between the lifecycle engine and whatever actually creates
//! and destroys service resources.

use async_trait::async_trait;
use tokio::sync::oneshot;

use broker_core::catalog::ImportVariable;
use broker_core::VarContext;
use broker_storage::{JsonObject, OperationType, ServiceInstanceDetails, StorageError};

use crate::context::RequestContext;

/// Resolves when the provider has finished upgrading an instance.
///
/// A dropped sender counts as completion.
pub type UpgradeSignal = oneshot::Receiver<()>;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{0}")]
    Failed(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ProviderError {
    pub fn failed(message: impl Into<String>) -> Self {
        ProviderError::Failed(message.into())
    }
}

/// Result of polling the provider for an instance's in-flight operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResult {
    pub done: bool,
    pub message: String,
    pub last_operation_type: OperationType,
}

/// Performs the provisioning side of every broker request.
///
/// Providers must not touch broker-owned records (instances, bindings,
/// request details); those are written by the engine. Provider-owned state
/// lives in deployment rows keyed by tf id.
///
/// Operation failures that happen after an asynchronous call returned are
/// reported through [`ServiceProvider::poll_instance`], not as errors from
/// the initiating call.
#[async_trait]
pub trait ServiceProvider: Send + Sync + 'static {
    async fn provision(
        &self,
        ctx: &RequestContext,
        vars: &VarContext,
    ) -> Result<ServiceInstanceDetails, ProviderError>;

    async fn update(
        &self,
        ctx: &RequestContext,
        vars: &VarContext,
    ) -> Result<ServiceInstanceDetails, ProviderError>;

    /// `Ok(None)` means the instance is already gone; `Ok(Some(op))` names
    /// the asynchronous operation still running.
    async fn deprovision(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        vars: &VarContext,
    ) -> Result<Option<String>, ProviderError>;

    async fn bind(&self, ctx: &RequestContext, vars: &VarContext)
        -> Result<JsonObject, ProviderError>;

    async fn unbind(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        binding_id: &str,
        vars: &VarContext,
    ) -> Result<(), ProviderError>;

    async fn poll_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<PollResult, ProviderError>;

    /// Fails when the deployment is behind the current version and must be
    /// upgraded before anything else touches it.
    async fn check_upgrade_available(&self, deployment_id: &str) -> Result<(), ProviderError>;

    /// Fails when `operation` may not start on the deployment right now.
    async fn check_operation_constraints(
        &self,
        deployment_id: &str,
        operation: OperationType,
    ) -> Result<(), ProviderError>;

    async fn get_terraform_outputs(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<JsonObject, ProviderError>;

    /// Properties discovered on an imported resource, keyed by field name.
    async fn get_imported_properties(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        declared: &[ImportVariable],
        initial: &JsonObject,
    ) -> Result<JsonObject, ProviderError>;

    async fn upgrade_instance(
        &self,
        ctx: &RequestContext,
        vars: &VarContext,
    ) -> Result<UpgradeSignal, ProviderError>;

    async fn upgrade_bindings(
        &self,
        ctx: &RequestContext,
        instance_vars: &VarContext,
        binding_vars: &[VarContext],
    ) -> Result<(), ProviderError>;
}
