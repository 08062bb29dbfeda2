use std::sync::Arc;

use serde_json::{Map, Value};

use broker_core::paramparser::{parse_stored_bind_details, parse_update_details, UpdateRequest};
use broker_core::varcontext::ContextBuilder;
use broker_core::{
    decide_operation, Operation, ServiceDefinition, ServicePlan, Settings, UpdateDetails,
    VarContext,
};
use broker_storage::{BrokerStorage, OperationState, ServiceInstanceDetails, TerraformDeployment};

use super::params::validate_provision_parameters;
use super::{tf_instance_id, ServiceBroker, UpdateServiceSpec};
use crate::context::RequestContext;
use crate::error::BrokerError;
use crate::provider::{ServiceProvider, UpgradeSignal};

const UPGRADE_OPERATION: &str = "upgrade";

impl ServiceBroker {
    /// `PATCH /v2/service_instances/{instance_id}`
    ///
    /// Runs either a parameter/plan update or a maintenance upgrade,
    /// depending on what the request changes.
    pub async fn update(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        request: &UpdateRequest,
        async_allowed: bool,
    ) -> Result<UpdateServiceSpec, BrokerError> {
        tracing::info!(
            correlation_id = %ctx.correlation_id,
            instance_id,
            plan_id = %request.plan_id,
            accepts_incomplete = async_allowed,
            "update"
        );

        if !self.instance_exists(instance_id).await? {
            return Err(BrokerError::InstanceDoesNotExist);
        }
        let instance = self
            .storage
            .get_service_instance_details(instance_id)
            .await
            .map_err(|e| BrokerError::internal("database error getting existing instance", e))?;
        let definition = self.definition(&instance.service_guid)?;

        let mut details = parse_update_details(request)?;
        fill_previous_values(&mut details, &instance);

        let plan_id = if details.plan_id.is_empty() {
            instance.plan_guid.clone()
        } else {
            details.plan_id.clone()
        };
        let plan = definition.get_plan_by_id(&plan_id)?;

        if !async_allowed {
            return Err(BrokerError::AsyncRequired);
        }

        let plan_mi = plan
            .maintenance_info_version()
            .map_err(|e| BrokerError::internal("invalid plan maintenance_info", e))?;
        match decide_operation(plan_mi.as_ref(), &details)? {
            Operation::Update => {
                self.do_update(ctx, instance, definition, plan, &details)
                    .await
            }
            Operation::Upgrade => {
                self.do_upgrade(ctx, instance, definition, plan, &details)
                    .await
            }
        }
    }

    async fn do_update(
        &self,
        ctx: &RequestContext,
        mut instance: ServiceInstanceDetails,
        definition: &ServiceDefinition,
        plan: &ServicePlan,
        details: &UpdateDetails,
    ) -> Result<UpdateServiceSpec, BrokerError> {
        let instance_id = instance.guid.clone();
        validate_provision_parameters(
            &details.request_params,
            &definition.provision_field_names(),
            plan,
            &self.settings.flags,
        )?;
        if !definition.allowed_update(&details.request_params) {
            return Err(BrokerError::NonUpdatableParameter);
        }

        let merged = self
            .merged_parameters(ctx, &instance_id, definition, &details.request_params)
            .await?;
        let vars = definition.update_variables(
            &instance_id,
            details,
            &merged,
            plan,
            ctx.identity(),
            &self.settings,
        )?;

        self.provider
            .check_upgrade_available(&tf_instance_id(&instance_id))
            .await
            .map_err(|e| BrokerError::internal("failed to update", e))?;

        self.provider.update(ctx, &vars).await?;

        if instance.plan_guid != plan.id {
            instance.plan_guid = plan.id.clone();
            if let Err(err) = self.storage.store_service_instance_details(instance).await {
                return Err(BrokerError::Internal(format!(
                    "error saving instance details to database: {err}. WARNING: this instance cannot be deprovisioned through cf. Contact your operator for cleanup"
                )));
            }
        }

        if let Err(err) = self
            .storage
            .store_provision_request_details(&instance_id, merged)
            .await
        {
            tracing::error!(correlation_id = %ctx.correlation_id, instance_id, error = %err, "updated parameters not recorded");
            return Err(BrokerError::Internal(format!(
                "error saving provision request details to database: {err}. Services relying on async deprovisioning will not be able to complete deprovisioning"
            )));
        }

        Ok(UpdateServiceSpec {
            is_async: true,
            dashboard_url: String::new(),
            operation_data: tf_instance_id(&instance_id),
        })
    }

    async fn do_upgrade(
        &self,
        ctx: &RequestContext,
        instance: ServiceInstanceDetails,
        definition: &ServiceDefinition,
        plan: &ServicePlan,
        details: &UpdateDetails,
    ) -> Result<UpdateServiceSpec, BrokerError> {
        let instance_id = instance.guid.clone();
        let merged = self
            .merged_parameters(ctx, &instance_id, definition, &details.request_params)
            .await?;
        let instance_vars = definition.update_variables(
            &instance_id,
            details,
            &merged,
            plan,
            ctx.identity(),
            &self.settings,
        )?;

        let signal = self.provider.upgrade_instance(ctx, &instance_vars).await?;

        let tail = UpgradeTail {
            ctx: ctx.background(),
            instance_id: instance_id.clone(),
            definition: definition.clone(),
            plan: plan.clone(),
            instance_vars,
            storage: Arc::clone(&self.storage),
            provider: Arc::clone(&self.provider),
            settings: Arc::clone(&self.settings),
        };
        self.upgrades.spawn(tail.run(signal));
        tracing::info!(correlation_id = %ctx.correlation_id, instance_id, "upgrade started");

        Ok(UpdateServiceSpec {
            is_async: true,
            dashboard_url: String::new(),
            operation_data: tf_instance_id(&instance_id),
        })
    }

    /// Stored provision parameters overlaid with imported properties and then
    /// the request's parameters.
    async fn merged_parameters(
        &self,
        ctx: &RequestContext,
        instance_id: &str,
        definition: &ServiceDefinition,
        request_params: &Map<String, Value>,
    ) -> Result<Map<String, Value>, BrokerError> {
        let stored = self
            .storage
            .get_provision_request_details(instance_id)
            .await
            .map_err(|e| {
                BrokerError::internal(
                    &format!("error retrieving provision request details for {instance_id:?}"),
                    e,
                )
            })?;
        let imported = self
            .provider
            .get_imported_properties(ctx, instance_id, &definition.import_input_variables, &stored)
            .await
            .map_err(|e| {
                BrokerError::internal(
                    &format!("error retrieving subsume parameters for {instance_id:?}"),
                    e,
                )
            })?;

        let merged = ContextBuilder::new()
            .merge_map(&stored)
            .merge_map(&imported)
            .merge_map(request_params)
            .build()
            .map_err(|e| BrokerError::internal("error merging update and provision details", e))?;
        Ok(merged.into_map())
    }
}

/// Platforms may omit `previous_values`; the instance record knows them.
fn fill_previous_values(details: &mut UpdateDetails, instance: &ServiceInstanceDetails) {
    for (field, stored) in [
        (&mut details.previous_plan_id, &instance.plan_guid),
        (&mut details.previous_service_id, &instance.service_guid),
        (&mut details.previous_org_id, &instance.organization_guid),
        (&mut details.previous_space_id, &instance.space_guid),
    ] {
        if field.is_empty() {
            field.clone_from(stored);
        }
    }
}

/// Work left after the provider has been asked to upgrade an instance:
/// refresh its outputs, then upgrade every binding against them.
struct UpgradeTail {
    ctx: RequestContext,
    instance_id: String,
    definition: ServiceDefinition,
    plan: ServicePlan,
    instance_vars: VarContext,
    storage: Arc<dyn BrokerStorage>,
    provider: Arc<dyn ServiceProvider>,
    settings: Arc<Settings>,
}

impl UpgradeTail {
    async fn run(self, signal: UpgradeSignal) {
        let _ = signal.await;

        let deployment_id = tf_instance_id(&self.instance_id);
        let deployment = match self.storage.get_terraform_deployment(&deployment_id).await {
            Ok(deployment) => deployment,
            Err(err) => {
                tracing::error!(correlation_id = %self.ctx.correlation_id, deployment_id, error = %err, "upgrade tail could not read deployment");
                let mut fallback = TerraformDeployment::new(deployment_id.as_str());
                fallback.last_operation_type = UPGRADE_OPERATION.to_string();
                self.record_failure(&deployment_id, fallback, &err).await;
                return;
            }
        };
        if deployment.last_operation_state != OperationState::InProgress {
            tracing::info!(
                correlation_id = %self.ctx.correlation_id,
                deployment_id,
                state = %deployment.last_operation_state,
                "instance upgrade did not complete, skipping bindings"
            );
            return;
        }

        let Err(err) = self.upgrade_bindings().await else {
            tracing::info!(correlation_id = %self.ctx.correlation_id, deployment_id, "upgrade finished");
            return;
        };

        tracing::error!(correlation_id = %self.ctx.correlation_id, deployment_id, error = %err, "upgrade failed");
        let latest = self
            .storage
            .get_terraform_deployment(&deployment_id)
            .await
            .unwrap_or(deployment);
        self.record_failure(&deployment_id, latest, &err).await;
    }

    /// Leave a `failed` row so the next poll reports `err`.
    async fn record_failure(
        &self,
        deployment_id: &str,
        mut deployment: TerraformDeployment,
        err: &(dyn std::fmt::Display + Sync),
    ) {
        if deployment.last_operation_type.is_empty() {
            deployment.last_operation_type = UPGRADE_OPERATION.to_string();
        }
        deployment.last_operation_state = OperationState::Failed;
        deployment.last_operation_message =
            format!("{} failed: {err}", deployment.last_operation_type);
        if let Err(store_err) = self.storage.store_terraform_deployment(deployment).await {
            tracing::error!(correlation_id = %self.ctx.correlation_id, deployment_id, error = %store_err, "could not record upgrade failure");
        }
    }

    async fn upgrade_bindings(&self) -> Result<(), BrokerError> {
        let mut instance = self
            .storage
            .get_service_instance_details(&self.instance_id)
            .await?;
        instance.outputs = self
            .provider
            .get_terraform_outputs(&self.ctx, &self.instance_id)
            .await?;
        self.storage
            .store_service_instance_details(instance.clone())
            .await?;

        let binding_ids = self
            .storage
            .get_service_binding_ids_for_service_instance(&self.instance_id)
            .await?;
        let mut binding_vars = Vec::with_capacity(binding_ids.len());
        for binding_id in binding_ids {
            let stored = self
                .storage
                .get_bind_request_details(&binding_id, &self.instance_id)
                .await?
                .unwrap_or_default();
            let details = parse_stored_bind_details(
                stored.parameters,
                stored.bind_resource,
                &self.plan.id,
                &self.definition.id,
            );
            binding_vars.push(self.definition.bind_variables(
                &instance,
                &binding_id,
                &details,
                &self.plan,
                None,
                &self.settings,
            )?);
        }

        self.provider
            .upgrade_bindings(&self.ctx, &self.instance_vars, &binding_vars)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn previous_values_fall_back_to_the_instance() {
        let instance = ServiceInstanceDetails {
            plan_guid: "plan".into(),
            service_guid: "svc".into(),
            organization_guid: "org".into(),
            space_guid: "space".into(),
            ..Default::default()
        };
        let mut details = UpdateDetails {
            previous_plan_id: "sent-plan".into(),
            ..Default::default()
        };
        fill_previous_values(&mut details, &instance);
        assert_eq!(details.previous_plan_id, "sent-plan");
        assert_eq!(details.previous_service_id, "svc");
        assert_eq!(details.previous_org_id, "org");
        assert_eq!(details.previous_space_id, "space");
    }
}
