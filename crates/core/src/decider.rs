//! Classifies an update request as a plain update or a maintenance upgrade.

use crate::paramparser::UpdateDetails;
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Update,
    Upgrade,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeciderError {
    #[error("maintenance_info.version is not supported for this plan")]
    MaintenanceInfoNilConflict,
    #[error("passed maintenance_info does not match the catalog maintenance_info")]
    MaintenanceInfoConflict,
    #[error("service instance needs to be upgraded before updating")]
    UpgradeBeforeUpdate,
}

/// Decide what an update request asks for. The first matching rule wins:
/// a maintenance version that disagrees with the plan fails, changing
/// parameters or plan while the instance is behind fails, parameter or plan
/// changes update, a maintenance change alone upgrades, and anything else
/// is a no-op update.
pub fn decide_operation(
    plan_mi_version: Option<&Version>,
    details: &UpdateDetails,
) -> Result<Operation, DeciderError> {
    let request_mi = details.maintenance_info_version.as_ref();
    let previous_mi = details.previous_maintenance_info_version.as_ref();

    let has_params = !details.request_params.is_empty();
    let has_plan_change = !details.plan_id.is_empty() && details.plan_id != details.previous_plan_id;
    let has_update = has_params || has_plan_change;

    let has_mi = request_mi.is_some();
    let has_upgrade = matches!((request_mi, previous_mi), (Some(req), Some(prev)) if req != prev);
    let introduces_mi = has_mi && previous_mi.is_none();
    let removes_mi = !has_mi && previous_mi.is_some();
    let mi_mismatch = has_mi && request_mi != plan_mi_version;

    if mi_mismatch && plan_mi_version.is_none() {
        return Err(DeciderError::MaintenanceInfoNilConflict);
    }
    if mi_mismatch {
        return Err(DeciderError::MaintenanceInfoConflict);
    }
    if has_update && has_upgrade {
        return Err(DeciderError::UpgradeBeforeUpdate);
    }
    if has_update {
        return Ok(Operation::Update);
    }
    if has_upgrade || introduces_mi || removes_mi {
        return Ok(Operation::Upgrade);
    }
    Ok(Operation::Update)
}
