use broker_storage::OperationType;

use super::{GetBindingSpec, GetInstanceDetailsSpec, PlanQuery, ServiceBroker};
use crate::context::RequestContext;
use crate::error::BrokerError;

impl ServiceBroker {
    /// `GET /v2/service_instances/{instance_id}`
    pub async fn get_instance(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        query: &PlanQuery,
    ) -> Result<GetInstanceDetailsSpec, BrokerError> {
        tracing::info!(correlation_id = %ctx.correlation_id, instance_id, "get_instance");

        let exists = self
            .storage
            .exists_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("error checking for existing instance", e))?;
        if !exists {
            return Err(BrokerError::NotFound);
        }

        let instance = self
            .storage
            .get_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("error retrieving service instance details", e))?;
        if !query.matches(&instance.service_guid, &instance.plan_guid) {
            return Err(BrokerError::NotFound);
        }

        let poll = self
            .provider
            .poll_instance(ctx, instance_id)
            .await
            .map_err(|e| BrokerError::internal("error polling instance status", e))?;
        if !poll.done {
            match poll.last_operation_type {
                OperationType::Provision => return Err(BrokerError::NotFound),
                OperationType::Update | OperationType::Upgrade => {
                    return Err(BrokerError::ConcurrencyError)
                }
                _ => {}
            }
        }

        let parameters = self
            .storage
            .get_provision_request_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("error retrieving provision request details", e))?;

        Ok(GetInstanceDetailsSpec {
            service_id: instance.service_guid,
            plan_id: instance.plan_guid,
            dashboard_url: String::new(),
            parameters,
        })
    }

    /// `GET /v2/service_instances/{instance_id}/service_bindings/{binding_id}`
    ///
    /// Returns the bind parameters only; credentials are never read back.
    pub async fn get_binding(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        binding_id: &str,
        query: &PlanQuery,
    ) -> Result<GetBindingSpec, BrokerError> {
        tracing::info!(correlation_id = %ctx.correlation_id, instance_id, binding_id, "get_binding");

        let exists = self
            .storage
            .exists_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("error checking for existing instance", e))?;
        if !exists {
            return Err(BrokerError::NotFound);
        }

        let instance = self
            .storage
            .get_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("error retrieving service instance details", e))?;
        let definition = self.definition(&instance.service_guid)?;
        if !definition.bindable {
            return Err(BrokerError::BadRequest);
        }
        if !query.matches(&instance.service_guid, &instance.plan_guid) {
            return Err(BrokerError::NotFound);
        }

        let exists = self
            .storage
            .exists_service_binding_credentials(binding_id, instance_id)
            .await
            .map_err(|e| BrokerError::internal("error checking for existing binding", e))?;
        if !exists {
            return Err(BrokerError::NotFound);
        }

        let details = self
            .storage
            .get_bind_request_details(binding_id, instance_id)
            .await
            .map_err(|e| BrokerError::internal("error retrieving bind request details", e))?
            .unwrap_or_default();

        Ok(GetBindingSpec {
            parameters: details.parameters,
        })
    }
}
