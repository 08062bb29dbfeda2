use broker_core::paramparser::{parse_provision_details, ProvisionRequest};

use super::params::validate_provision_parameters;
use super::{tf_instance_id, ProvisionedServiceSpec, ServiceBroker};
use crate::context::RequestContext;
use crate::error::BrokerError;

/// Stripped from stored parameters; it only ever signals an empty request.
const VACANT_KEY: &str = "vacant";

impl ServiceBroker {
    /// `PUT /v2/service_instances/{instance_id}`
    pub async fn provision(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        request: &ProvisionRequest,
        async_allowed: bool,
    ) -> Result<ProvisionedServiceSpec, BrokerError> {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            instance_id,
            service_id = %request.service_id,
            plan_id = %request.plan_id,
            accepts_incomplete = async_allowed,
            "provision"
        );

        if !async_allowed {
            return Err(BrokerError::AsyncRequired);
        }
        if self.instance_exists(instance_id).await? {
            return Err(BrokerError::InstanceAlreadyExists);
        }

        let details = parse_provision_details(request).map_err(|_| BrokerError::InvalidUserInput)?;
        let definition = self.definition(&details.service_id)?;
        let plan = definition.get_plan_by_id(&details.plan_id)?;

        validate_provision_parameters(
            &details.request_params,
            &definition.provision_field_names(),
            plan,
            &self.settings.flags,
        )?;

        let vars = definition.provision_variables(
            instance_id,
            &details,
            plan,
            ctx.identity(),
            &self.settings,
        )?;

        let mut instance = self.provider.provision(ctx, &vars).await?;
        instance.guid = instance_id.to_string();
        instance.service_guid = details.service_id.clone();
        instance.plan_guid = details.plan_id.clone();
        instance.space_guid = details.space_guid.clone();
        instance.organization_guid = details.organization_guid.clone();

        if let Err(err) = self.storage.store_service_instance_details(instance).await {
            tracing::error!(correlation_id = %ctx.correlation_id, instance_id, error = %err, "instance provisioned but not recorded");
            return Err(BrokerError::Internal(format!(
                "error saving instance details to database: {err}. WARNING: this instance cannot be deprovisioned through cf. Contact your operator for cleanup"
            )));
        }

        let mut stored_params = details.request_params;
        stored_params.remove(VACANT_KEY);
        if let Err(err) = self
            .storage
            .store_provision_request_details(instance_id, stored_params)
            .await
        {
            tracing::error!(correlation_id = %ctx.correlation_id, instance_id, error = %err, "provision parameters not recorded");
            return Err(BrokerError::Internal(format!(
                "error saving provision request details to database: {err}. Services relying on async provisioning will not be able to complete provisioning"
            )));
        }

        Ok(ProvisionedServiceSpec {
            is_async: true,
            dashboard_url: String::new(),
            operation_data: tf_instance_id(instance_id),
        })
    }
}
