use broker_core::paramparser::parse_stored_bind_details;

use super::{credential_name, PlanQuery, ServiceBroker};
use crate::context::RequestContext;
use crate::error::BrokerError;

impl ServiceBroker {
    /// `DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}`
    pub async fn unbind(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        binding_id: &str,
        query: &PlanQuery,
    ) -> Result<(), BrokerError> {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            instance_id,
            binding_id,
            plan_id = %query.plan_id,
            "unbind"
        );

        let exists = self
            .storage
            .exists_service_binding_credentials(binding_id, instance_id)
            .await
            .map_err(|e| BrokerError::internal("error locating service binding", e))?;
        if !exists {
            return Err(BrokerError::BindingDoesNotExist);
        }

        let instance = self
            .storage
            .get_service_instance_details(instance_id)
            .await
            .map_err(|_| BrokerError::InstanceDoesNotExist)?;
        let definition = self.definition(&instance.service_guid)?;
        let plan = definition.get_plan_by_id(query.plan_or(&instance.plan_guid))?;

        let stored = self
            .storage
            .get_bind_request_details(binding_id, instance_id)
            .await
            .map_err(|e| {
                BrokerError::internal(
                    &format!("error retrieving bind request details for {instance_id:?}"),
                    e,
                )
            })?
            .unwrap_or_default();
        let details = parse_stored_bind_details(
            stored.parameters,
            stored.bind_resource,
            &plan.id,
            &definition.id,
        );

        let vars = definition.bind_variables(
            &instance,
            binding_id,
            &details,
            plan,
            ctx.identity(),
            &self.settings,
        )?;

        self.provider
            .unbind(ctx, instance_id, binding_id, &vars)
            .await?;

        if let Some(credstore) = &self.credstore {
            let path = credential_name(&definition.name, binding_id);
            if let Err(err) = credstore.delete_permissions(&path).await {
                tracing::error!(
                    correlation_id = %ctx.correlation_id,
                    binding_id,
                    path,
                    error = %err,
                    "failed to delete credhub permissions"
                );
            }
            credstore.delete(&path).await.map_err(|e| {
                BrokerError::internal("unbind failure: unable to delete credential from Credstore", e)
            })?;
        }

        self.storage
            .delete_service_binding_credentials(binding_id, instance_id)
            .await
            .map_err(|e| {
                BrokerError::Internal(format!(
                    "error soft-deleting credentials from database: {e}. WARNING: these credentials will remain visible in cf. Contact your operator for cleanup"
                ))
            })?;
        self.storage
            .delete_bind_request_details(binding_id, instance_id)
            .await
            .map_err(|e| BrokerError::internal("error soft-deleting bind request details from database", e))?;

        Ok(())
    }
}
