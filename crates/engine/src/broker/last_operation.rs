use broker_storage::{OperationState, OperationType};

use super::{LastOperation, ServiceBroker};
use crate::context::RequestContext;
use crate::error::BrokerError;

impl ServiceBroker {
    /// `GET /v2/service_instances/{instance_id}/last_operation`
    ///
    /// Provider errors are reported as a `failed` operation rather than as
    /// an error. When a finished operation cannot be recorded the error is
    /// returned with the succeeded state attached.
    pub async fn last_operation(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
    ) -> Result<LastOperation, BrokerError> {
        tracing::info!(correlation_id = %ctx.correlation_id, instance_id, "last_operation");

        if !self.instance_exists(instance_id).await? {
            return Err(BrokerError::InstanceDoesNotExist);
        }

        let poll = match self.provider.poll_instance(ctx, instance_id).await {
            Ok(poll) => poll,
            Err(err) => {
                tracing::warn!(correlation_id = %ctx.correlation_id, instance_id, error = %err, "operation failed");
                return Ok(LastOperation::new(OperationState::Failed, err.to_string()));
            }
        };
        if !poll.done {
            return Ok(LastOperation::new(OperationState::InProgress, poll.message));
        }

        let operation = LastOperation::new(OperationState::Succeeded, poll.message);
        match self
            .complete_operation(ctx, instance_id, poll.last_operation_type)
            .await
        {
            Ok(()) => Ok(operation),
            Err(err) => {
                tracing::error!(correlation_id = %ctx.correlation_id, instance_id, error = %err, "failed to record completed operation");
                Err(BrokerError::Cleanup {
                    operation,
                    message: err.to_string(),
                })
            }
        }
    }

    async fn complete_operation(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        last_operation_type: OperationType,
    ) -> Result<(), BrokerError> {
        if last_operation_type == OperationType::Deprovision {
            return self.remove_instance_data(instance_id).await;
        }

        let mut instance = self
            .storage
            .get_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("error getting instance details from database", e))?;
        instance.outputs = self
            .provider
            .get_terraform_outputs(ctx, instance_id)
            .await
            .map_err(|e| BrokerError::internal("error getting new instance details", e))?;
        instance.operation_type = OperationType::Clear;
        instance.operation_guid.clear();
        self.storage
            .store_service_instance_details(instance)
            .await
            .map_err(|e| BrokerError::internal("error saving instance details to database", e))
    }

    /// `GET /v2/service_instances/{instance_id}/service_bindings/{binding_id}/last_operation`
    ///
    /// Bindings are always synchronous.
    pub async fn last_binding_operation(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        binding_id: &str,
    ) -> Result<LastOperation, BrokerError> {
        tracing::info!(correlation_id = %ctx.correlation_id, instance_id, binding_id, "last_binding_operation");
        Err(BrokerError::AsyncRequired)
    }
}
