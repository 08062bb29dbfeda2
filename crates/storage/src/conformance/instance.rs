use std::future::Future;

use super::{make_instance, TestResult};
use crate::record::OperationType;
use crate::{BrokerStorage, JsonObject, StorageError};

pub(super) async fn run_instance_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "instance",
            "store_then_get_instance",
            store_then_get_instance(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "store_overwrites_instance",
            store_overwrites_instance(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "exists_distinguishes_absence",
            exists_distinguishes_absence(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "get_missing_instance_returns_not_found",
            get_missing_instance_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "delete_instance_removes_record",
            delete_instance_removes_record(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "provision_details_round_trip",
            provision_details_round_trip(factory).await,
        ),
        TestResult::from_result(
            "instance",
            "missing_provision_details_is_error",
            missing_provision_details_is_error(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn store_then_get_instance<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let want = make_instance("inst-1");
    s.store_service_instance_details(want.clone())
        .await
        .map_err(|e| e.to_string())?;
    let got = s
        .get_service_instance_details("inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if got != want {
        return Err(format!("expected {want:?}, got {got:?}"));
    }
    Ok(())
}

/// A second store with the same guid replaces the record (last write wins).
async fn store_overwrites_instance<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.store_service_instance_details(make_instance("inst-1"))
        .await
        .map_err(|e| e.to_string())?;

    let mut updated = make_instance("inst-1");
    updated.operation_type = OperationType::Deprovision;
    updated.operation_guid = "op-7".to_string();
    s.store_service_instance_details(updated)
        .await
        .map_err(|e| e.to_string())?;

    let got = s
        .get_service_instance_details("inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if got.operation_type != OperationType::Deprovision || got.operation_guid != "op-7" {
        return Err(format!("update not applied: {got:?}"));
    }
    Ok(())
}

async fn exists_distinguishes_absence<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    if s.exists_service_instance_details("inst-1")
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("empty storage reported instance as existing".to_string());
    }
    s.store_service_instance_details(make_instance("inst-1"))
        .await
        .map_err(|e| e.to_string())?;
    if !s
        .exists_service_instance_details("inst-1")
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("stored instance reported as absent".to_string());
    }
    Ok(())
}

async fn get_missing_instance_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_service_instance_details("nope").await {
        Err(StorageError::InstanceNotFound { instance_id }) if instance_id == "nope" => Ok(()),
        other => Err(format!("expected InstanceNotFound, got {other:?}")),
    }
}

async fn delete_instance_removes_record<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.store_service_instance_details(make_instance("inst-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_service_instance_details("inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if s.exists_service_instance_details("inst-1")
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("instance still present after delete".to_string());
    }
    // second delete of an absent record is fine
    s.delete_service_instance_details("inst-1")
        .await
        .map_err(|e| e.to_string())
}

async fn provision_details_round_trip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut params = JsonObject::new();
    params.insert("foo".to_string(), serde_json::json!("bar"));
    s.store_provision_request_details("inst-1", params.clone())
        .await
        .map_err(|e| e.to_string())?;

    params.insert("baz".to_string(), serde_json::json!(3));
    s.store_provision_request_details("inst-1", params.clone())
        .await
        .map_err(|e| e.to_string())?;

    let got = s
        .get_provision_request_details("inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if got != params {
        return Err(format!("expected {params:?}, got {got:?}"));
    }

    s.delete_provision_request_details("inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if s.get_provision_request_details("inst-1").await.is_ok() {
        return Err("provision details still readable after delete".to_string());
    }
    Ok(())
}

async fn missing_provision_details_is_error<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_provision_request_details("nope").await {
        Err(StorageError::ProvisionDetailsNotFound { .. }) => Ok(()),
        other => Err(format!("expected ProvisionDetailsNotFound, got {other:?}")),
    }
}
