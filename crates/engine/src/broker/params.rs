use std::collections::BTreeSet;

use serde_json::{Map, Value};

use broker_core::{FeatureFlags, ServicePlan};

use crate::error::BrokerError;

/// Reject request parameters that would override plan-owned properties or
/// that no declared variable accepts. Skipped entirely when validation is
/// switched off.
pub(crate) fn validate_provision_parameters(
    params: &Map<String, Value>,
    valid_fields: &[&str],
    plan: &ServicePlan,
    flags: &FeatureFlags,
) -> Result<(), BrokerError> {
    if params.is_empty() || flags.property_validation_disabled {
        return Ok(());
    }
    validate_no_plan_overrides(params, plan)?;
    validate_defined_params(params, valid_fields)
}

pub(crate) fn validate_bind_parameters(
    params: &Map<String, Value>,
    valid_fields: &[&str],
    flags: &FeatureFlags,
) -> Result<(), BrokerError> {
    if params.is_empty() || flags.property_validation_disabled {
        return Ok(());
    }
    validate_defined_params(params, valid_fields)
}

fn validate_no_plan_overrides(
    params: &Map<String, Value>,
    plan: &ServicePlan,
) -> Result<(), BrokerError> {
    let clashing: BTreeSet<&str> = params
        .keys()
        .filter(|k| plan.service_properties.contains_key(k.as_str()))
        .map(String::as_str)
        .collect();
    if clashing.is_empty() {
        return Ok(());
    }
    Err(BrokerError::InvalidParameters(format!(
        "plan defined properties cannot be changed: {}",
        join(clashing)
    )))
}

fn validate_defined_params(
    params: &Map<String, Value>,
    valid_fields: &[&str],
) -> Result<(), BrokerError> {
    let unknown: BTreeSet<&str> = params
        .keys()
        .map(String::as_str)
        .filter(|k| !valid_fields.contains(k))
        .collect();
    if unknown.is_empty() {
        return Ok(());
    }
    Err(BrokerError::InvalidParameters(format!(
        "additional properties are not allowed: {}",
        join(unknown)
    )))
}

fn join(keys: BTreeSet<&str>) -> String {
    keys.into_iter().collect::<Vec<_>>().join(", ")
}
