use serde_json::Value;

use broker_core::paramparser::{parse_bind_details, BindRequest};
use broker_core::varcontext::ContextBuilder;
use broker_storage::{BindRequestDetails, ServiceBindingCredentials, StorageError};

use super::params::validate_bind_parameters;
use super::{credential_name, tf_instance_id, Binding, ServiceBroker};
use crate::context::RequestContext;
use crate::credstore::credential_reference;
use crate::error::BrokerError;

impl ServiceBroker {
    /// `PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}`
    pub async fn bind(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        binding_id: &str,
        request: &BindRequest,
    ) -> Result<Binding, BrokerError> {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            instance_id,
            binding_id,
            plan_id = %request.plan_id,
            "bind"
        );

        let exists = self
            .storage
            .exists_service_binding_credentials(binding_id, instance_id)
            .await
            .map_err(|e| BrokerError::internal("error checking for existing binding", e))?;
        if exists {
            return Err(BrokerError::BindingAlreadyExists);
        }

        let instance = self
            .storage
            .get_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("error retrieving service instance details", e))?;
        let definition = self.definition(&instance.service_guid)?;

        let details = parse_bind_details(request)?;
        let plan = definition.get_plan_by_id(&details.plan_id)?;

        validate_bind_parameters(
            &details.request_params,
            &definition.bind_field_names(),
            &self.settings.flags,
        )?;

        self.provider
            .check_upgrade_available(&tf_instance_id(instance_id))
            .await
            .map_err(|e| BrokerError::internal("failed to bind", e))?;

        let vars = definition.bind_variables(
            &instance,
            binding_id,
            &details,
            plan,
            ctx.identity(),
            &self.settings,
        )?;

        let credentials = self.provider.bind(ctx, &vars).await?;

        let record = ServiceBindingCredentials {
            service_guid: details.service_id.clone(),
            service_instance_guid: instance_id.to_string(),
            binding_guid: binding_id.to_string(),
            credentials: credentials.clone(),
        };
        match self.storage.create_service_binding_credentials(record).await {
            Ok(()) => {}
            Err(StorageError::BindingAlreadyExists { .. }) => {
                tracing::warn!(correlation_id = %ctx.correlation_id, instance_id, binding_id, "binding recorded by a concurrent request");
                return Err(BrokerError::BindingAlreadyExists);
            }
            Err(err) => {
                tracing::error!(correlation_id = %ctx.correlation_id, instance_id, binding_id, error = %err, "binding created but not recorded");
                return Err(BrokerError::Internal(format!(
                    "error saving credentials to database: {err}. WARNING: these credentials cannot be unbound through cf. Please contact your operator for cleanup"
                )));
            }
        }

        let bind_request = BindRequestDetails {
            service_instance_guid: instance_id.to_string(),
            binding_guid: binding_id.to_string(),
            parameters: details.request_params.clone(),
            bind_resource: details.request_bind_resource.clone(),
        };
        if let Err(err) = self.storage.store_bind_request_details(bind_request).await {
            tracing::error!(correlation_id = %ctx.correlation_id, instance_id, binding_id, error = %err, "bind parameters not recorded");
            return Err(BrokerError::Internal(format!(
                "error saving bind request details to database: {err}. Unbind operations will not be able to complete"
            )));
        }

        let merged = ContextBuilder::new()
            .merge_map(&instance.outputs)
            .merge_map(&credentials)
            .build()
            .map_err(|e| BrokerError::internal("error building credentials", e))?
            .into_map();

        let Some(credstore) = &self.credstore else {
            return Ok(Binding {
                credentials: Value::Object(merged),
            });
        };

        let path = credential_name(&definition.name, binding_id);
        credstore
            .put(&path, &merged)
            .await
            .map_err(|e| BrokerError::internal("bind failure: unable to put credentials in Credstore", e))?;
        credstore
            .add_permission(&path, &details.credhub_actor, &["read"])
            .await
            .map_err(|e| {
                BrokerError::internal("bind failure: unable to add Credstore permissions to app", e)
            })?;

        tracing::debug!(correlation_id = %ctx.correlation_id, binding_id, path, "credentials stored in credhub");
        Ok(Binding {
            credentials: credential_reference(&path),
        })
    }
}
