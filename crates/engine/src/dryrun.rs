//! A provider that records deployment rows without deploying anything.
//!
//! Every operation completes as soon as it is requested. The resolved
//! variables are kept in the row's workspace so operators can inspect what
//! a real provider would have received.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use broker_core::catalog::{ImportVariable, TF_ID_KEY};
use broker_core::VarContext;
use broker_storage::{
    BrokerStorage, JsonObject, OperationState, OperationType, ServiceInstanceDetails,
    TerraformDeployment,
};

use crate::broker::tf_instance_id;
use crate::context::RequestContext;
use crate::provider::{PollResult, ProviderError, ServiceProvider, UpgradeSignal};

pub struct DryRunProvider {
    storage: Arc<dyn BrokerStorage>,
}

impl DryRunProvider {
    pub fn new(storage: Arc<dyn BrokerStorage>) -> Self {
        Self { storage }
    }

    fn deployment_id(vars: &VarContext) -> Result<String, ProviderError> {
        vars.get_string(TF_ID_KEY)
            .map_err(|e| ProviderError::failed(e.to_string()))
    }

    async fn record(
        &self,
        id: &str,
        operation: OperationType,
        state: OperationState,
        vars: Option<&VarContext>,
    ) -> Result<TerraformDeployment, ProviderError> {
        let mut deployment = if self.storage.exists_terraform_deployment(id).await? {
            self.storage.get_terraform_deployment(id).await?
        } else {
            TerraformDeployment::new(id)
        };
        if let Some(vars) = vars {
            deployment.workspace = json!({
                "inputs": vars.to_json(),
                "outputs": {"status": format!("{operation} succeeded (dry run)")},
            });
        }
        deployment.last_operation_type = operation.to_string();
        deployment.last_operation_state = state;
        deployment.last_operation_message = format!("{operation} {state}");
        self.storage
            .store_terraform_deployment(deployment.clone())
            .await?;
        tracing::debug!(deployment_id = id, %operation, %state, "dry run deployment recorded");
        Ok(deployment)
    }

    /// Run `operation` start to finish on the deployment row.
    async fn complete(
        &self,
        id: &str,
        operation: OperationType,
        vars: &VarContext,
    ) -> Result<TerraformDeployment, ProviderError> {
        self.record(id, operation, OperationState::InProgress, Some(vars))
            .await?;
        self.record(id, operation, OperationState::Succeeded, None)
            .await
    }

    fn outputs(deployment: &TerraformDeployment) -> JsonObject {
        deployment
            .workspace
            .get("outputs")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl ServiceProvider for DryRunProvider {
    async fn provision(
        &self,
        _ctx: &RequestContext,
        vars: &VarContext,
    ) -> Result<ServiceInstanceDetails, ProviderError> {
        let id = Self::deployment_id(vars)?;
        let deployment = self.complete(&id, OperationType::Provision, vars).await?;
        Ok(ServiceInstanceDetails {
            outputs: Self::outputs(&deployment),
            operation_type: OperationType::Provision,
            operation_guid: id,
            ..ServiceInstanceDetails::default()
        })
    }

    async fn update(
        &self,
        _ctx: &RequestContext,
        vars: &VarContext,
    ) -> Result<ServiceInstanceDetails, ProviderError> {
        let id = Self::deployment_id(vars)?;
        let deployment = self.complete(&id, OperationType::Update, vars).await?;
        Ok(ServiceInstanceDetails {
            outputs: Self::outputs(&deployment),
            operation_type: OperationType::Update,
            operation_guid: id,
            ..ServiceInstanceDetails::default()
        })
    }

    async fn deprovision(
        &self,
        _ctx: &RequestContext,
        instance_id: &str,
        vars: &VarContext,
    ) -> Result<Option<String>, ProviderError> {
        let id = tf_instance_id(instance_id);
        self.complete(&id, OperationType::Deprovision, vars).await?;
        Ok(Some(id))
    }

    async fn bind(
        &self,
        _ctx: &RequestContext,
        vars: &VarContext,
    ) -> Result<JsonObject, ProviderError> {
        let id = Self::deployment_id(vars)?;
        let deployment = self.complete(&id, OperationType::Bind, vars).await?;
        Ok(Self::outputs(&deployment))
    }

    async fn unbind(
        &self,
        _ctx: &RequestContext,
        _instance_id: &str,
        _binding_id: &str,
        vars: &VarContext,
    ) -> Result<(), ProviderError> {
        let id = Self::deployment_id(vars)?;
        self.storage.delete_terraform_deployment(&id).await?;
        Ok(())
    }

    async fn poll_instance(
        &self,
        _ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<PollResult, ProviderError> {
        let id = tf_instance_id(instance_id);
        let deployment = self.storage.get_terraform_deployment(&id).await?;
        let operation = OperationType::from_name(&deployment.last_operation_type);
        match deployment.last_operation_state {
            OperationState::Failed => Err(ProviderError::failed(deployment.last_operation_message)),
            OperationState::InProgress => Ok(PollResult {
                done: false,
                message: deployment.last_operation_message,
                last_operation_type: operation,
            }),
            OperationState::Succeeded => {
                if operation == OperationType::Deprovision {
                    self.storage.delete_terraform_deployment(&id).await?;
                }
                Ok(PollResult {
                    done: true,
                    message: deployment.last_operation_message,
                    last_operation_type: operation,
                })
            }
        }
    }

    async fn check_upgrade_available(&self, _deployment_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn check_operation_constraints(
        &self,
        deployment_id: &str,
        operation: OperationType,
    ) -> Result<(), ProviderError> {
        if !self.storage.exists_terraform_deployment(deployment_id).await? {
            return Ok(());
        }
        let deployment = self.storage.get_terraform_deployment(deployment_id).await?;
        if deployment.last_operation_state == OperationState::InProgress {
            return Err(ProviderError::failed(format!(
                "{operation} not allowed: {} is still in progress",
                deployment.last_operation_type
            )));
        }
        Ok(())
    }

    async fn get_terraform_outputs(
        &self,
        _ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<JsonObject, ProviderError> {
        let deployment = self
            .storage
            .get_terraform_deployment(&tf_instance_id(instance_id))
            .await?;
        Ok(Self::outputs(&deployment))
    }

    async fn get_imported_properties(
        &self,
        _ctx: &RequestContext,
        _instance_id: &str,
        _declared: &[ImportVariable],
        _initial: &JsonObject,
    ) -> Result<JsonObject, ProviderError> {
        Ok(JsonObject::new())
    }

    async fn upgrade_instance(
        &self,
        _ctx: &RequestContext,
        vars: &VarContext,
    ) -> Result<UpgradeSignal, ProviderError> {
        let id = Self::deployment_id(vars)?;
        self.record(&id, OperationType::Upgrade, OperationState::InProgress, Some(vars))
            .await?;
        let (done, signal) = oneshot::channel();
        let _ = done.send(());
        Ok(signal)
    }

    async fn upgrade_bindings(
        &self,
        _ctx: &RequestContext,
        instance_vars: &VarContext,
        binding_vars: &[VarContext],
    ) -> Result<(), ProviderError> {
        for vars in binding_vars {
            let id = Self::deployment_id(vars)?;
            self.complete(&id, OperationType::Upgrade, vars).await?;
        }
        let id = Self::deployment_id(instance_vars)?;
        self.record(&id, OperationType::Upgrade, OperationState::Succeeded, None)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_storage::InMemoryStorage;
    use serde_json::Map;

    fn vars(tf_id: &str) -> VarContext {
        let mut m = Map::new();
        m.insert(TF_ID_KEY.into(), json!(tf_id));
        m.insert("name".into(), json!("db"));
        VarContext::new(m)
    }

    fn provider() -> (Arc<InMemoryStorage>, DryRunProvider) {
        let storage = Arc::new(InMemoryStorage::new());
        let provider = DryRunProvider::new(storage.clone());
        (storage, provider)
    }

    #[tokio::test]
    async fn provision_completes_immediately() {
        let (storage, provider) = provider();
        let ctx = RequestContext::default();
        let details = provider.provision(&ctx, &vars("tf:i1:")).await.unwrap();
        assert_eq!(details.outputs["status"], "provision succeeded (dry run)");

        let row = storage.get_terraform_deployment("tf:i1:").await.unwrap();
        assert_eq!(row.last_operation_state, OperationState::Succeeded);
        assert_eq!(row.workspace["inputs"]["name"], "db");

        let poll = provider.poll_instance(&ctx, "i1").await.unwrap();
        assert!(poll.done);
        assert_eq!(poll.last_operation_type, OperationType::Provision);
        assert_eq!(poll.message, "provision succeeded");
    }

    #[tokio::test]
    async fn constraints_block_work_on_a_busy_deployment() {
        let (storage, provider) = provider();
        let mut row = TerraformDeployment::new("tf:i1:");
        row.last_operation_type = "update".into();
        storage.store_terraform_deployment(row).await.unwrap();

        let err = provider
            .check_operation_constraints("tf:i1:", OperationType::Deprovision)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "deprovision not allowed: update is still in progress");
        assert!(provider
            .check_operation_constraints("tf:other:", OperationType::Deprovision)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn failed_rows_poll_as_errors() {
        let (storage, provider) = provider();
        let mut row = TerraformDeployment::new("tf:i1:");
        row.last_operation_state = OperationState::Failed;
        row.last_operation_message = "upgrade failed: boom".into();
        storage.store_terraform_deployment(row).await.unwrap();

        let err = provider
            .poll_instance(&RequestContext::default(), "i1")
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "upgrade failed: boom");
    }

    #[tokio::test]
    async fn upgrade_signals_then_bindings_finish_it() {
        let (storage, provider) = provider();
        let ctx = RequestContext::default();
        let signal = provider.upgrade_instance(&ctx, &vars("tf:i1:")).await.unwrap();
        signal.await.unwrap();
        let row = storage.get_terraform_deployment("tf:i1:").await.unwrap();
        assert_eq!(row.last_operation_state, OperationState::InProgress);

        provider
            .upgrade_bindings(&ctx, &vars("tf:i1:"), &[vars("tf:i1:b1")])
            .await
            .unwrap();
        let row = storage.get_terraform_deployment("tf:i1:").await.unwrap();
        assert_eq!(row.last_operation_state, OperationState::Succeeded);
        let binding = storage.get_terraform_deployment("tf:i1:b1").await.unwrap();
        assert_eq!(binding.last_operation_type, "upgrade");
    }
}
