use broker_core::ProvisionDetails;
use broker_storage::OperationType;

use super::{tf_instance_id, DeprovisionServiceSpec, PlanQuery, ServiceBroker};
use crate::context::RequestContext;
use crate::error::BrokerError;

impl ServiceBroker {
    /// `DELETE /v2/service_instances/{instance_id}`
    pub async fn deprovision(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        query: &PlanQuery,
        async_allowed: bool,
    ) -> Result<DeprovisionServiceSpec, BrokerError> {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            instance_id,
            plan_id = %query.plan_id,
            accepts_incomplete = async_allowed,
            "deprovision"
        );

        if !async_allowed {
            return Err(BrokerError::AsyncRequired);
        }
        if !self.instance_exists(instance_id).await? {
            return Err(BrokerError::InstanceDoesNotExist);
        }

        let mut instance = self
            .storage
            .get_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("database error getting existing instance", e))?;
        let definition = self.definition(&instance.service_guid)?;

        let deployment_id = tf_instance_id(instance_id);
        self.provider
            .check_operation_constraints(&deployment_id, OperationType::Deprovision)
            .await?;
        self.provider
            .check_upgrade_available(&deployment_id)
            .await
            .map_err(|e| BrokerError::internal("failed to delete", e))?;

        let plan = definition.get_plan_by_id(query.plan_or(&instance.plan_guid))?;
        let parameters = self
            .storage
            .get_provision_request_details(instance_id)
            .await
            .map_err(|e| {
                BrokerError::internal(
                    &format!("error retrieving provision request details for {instance_id:?}"),
                    e,
                )
            })?;

        let details = ProvisionDetails {
            service_id: definition.id.clone(),
            plan_id: plan.id.clone(),
            organization_guid: instance.organization_guid.clone(),
            space_guid: instance.space_guid.clone(),
            request_params: parameters,
            ..ProvisionDetails::default()
        };
        let vars = definition.provision_variables(
            instance_id,
            &details,
            plan,
            ctx.identity(),
            &self.settings,
        )?;

        let Some(operation_id) = self.provider.deprovision(ctx, instance_id, &vars).await? else {
            self.remove_instance_data(instance_id).await?;
            tracing::info!(correlation_id = %ctx.correlation_id, instance_id, "deprovisioned synchronously");
            return Ok(DeprovisionServiceSpec::default());
        };

        instance.operation_type = OperationType::Deprovision;
        instance.operation_guid = operation_id.clone();
        self.storage
            .store_service_instance_details(instance)
            .await
            .map_err(|e| {
                BrokerError::Internal(format!(
                    "error saving instance details to database: {e}. WARNING: this instance will remain visible in cf. Contact your operator for cleanup"
                ))
            })?;

        Ok(DeprovisionServiceSpec {
            is_async: true,
            operation_data: operation_id,
        })
    }

    pub(super) async fn remove_instance_data(&self, instance_id: &str) -> Result<(), BrokerError> {
        self.storage
            .delete_service_instance_details(instance_id)
            .await
            .map_err(|e| {
                BrokerError::Internal(format!(
                    "error deleting instance details from database: {e}. WARNING: this instance will remain visible in cf. Contact your operator for cleanup"
                ))
            })?;
        self.storage
            .delete_provision_request_details(instance_id)
            .await
            .map_err(|e| {
                BrokerError::internal("error deleting provision request details from the database", e)
            })
    }
}
