use std::future::Future;

use super::{make_binding, TestResult};
use crate::record::BindRequestDetails;
use crate::{BrokerStorage, JsonObject, StorageError};

pub(super) async fn run_binding_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "binding",
            "create_then_get_binding",
            create_then_get_binding(factory).await,
        ),
        TestResult::from_result(
            "binding",
            "duplicate_create_returns_already_exists",
            duplicate_create_returns_already_exists(factory).await,
        ),
        TestResult::from_result(
            "binding",
            "same_binding_id_on_other_instance_is_independent",
            same_binding_id_on_other_instance_is_independent(factory).await,
        ),
        TestResult::from_result(
            "binding",
            "delete_binding_allows_recreate",
            delete_binding_allows_recreate(factory).await,
        ),
        TestResult::from_result(
            "binding",
            "binding_ids_listed_sorted",
            binding_ids_listed_sorted(factory).await,
        ),
        TestResult::from_result(
            "binding",
            "bind_details_absent_is_none",
            bind_details_absent_is_none(factory).await,
        ),
        TestResult::from_result(
            "binding",
            "bind_details_round_trip",
            bind_details_round_trip(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn create_then_get_binding<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let want = make_binding("bind-1", "inst-1");
    s.create_service_binding_credentials(want.clone())
        .await
        .map_err(|e| e.to_string())?;
    let got = s
        .get_service_binding_credentials("bind-1", "inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if got != want {
        return Err(format!("expected {want:?}, got {got:?}"));
    }
    Ok(())
}

async fn duplicate_create_returns_already_exists<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.create_service_binding_credentials(make_binding("bind-1", "inst-1"))
        .await
        .map_err(|e| e.to_string())?;
    match s
        .create_service_binding_credentials(make_binding("bind-1", "inst-1"))
        .await
    {
        Err(StorageError::BindingAlreadyExists {
            binding_id,
            instance_id,
        }) if binding_id == "bind-1" && instance_id == "inst-1" => Ok(()),
        other => Err(format!("expected BindingAlreadyExists, got {other:?}")),
    }
}

async fn same_binding_id_on_other_instance_is_independent<S, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.create_service_binding_credentials(make_binding("bind-1", "inst-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.create_service_binding_credentials(make_binding("bind-1", "inst-2"))
        .await
        .map_err(|e| e.to_string())?;
    let exists = s
        .exists_service_binding_credentials("bind-1", "inst-2")
        .await
        .map_err(|e| e.to_string())?;
    if !exists {
        return Err("binding on second instance not found".to_string());
    }
    Ok(())
}

async fn delete_binding_allows_recreate<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.create_service_binding_credentials(make_binding("bind-1", "inst-1"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_service_binding_credentials("bind-1", "inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if s.exists_service_binding_credentials("bind-1", "inst-1")
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("binding still present after delete".to_string());
    }
    match s.get_service_binding_credentials("bind-1", "inst-1").await {
        Err(StorageError::BindingNotFound { .. }) => {}
        other => return Err(format!("expected BindingNotFound, got {other:?}")),
    }
    s.create_service_binding_credentials(make_binding("bind-1", "inst-1"))
        .await
        .map_err(|e| e.to_string())
}

async fn binding_ids_listed_sorted<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    for id in ["bind-c", "bind-a", "bind-b"] {
        s.create_service_binding_credentials(make_binding(id, "inst-1"))
            .await
            .map_err(|e| e.to_string())?;
    }
    s.create_service_binding_credentials(make_binding("bind-z", "inst-2"))
        .await
        .map_err(|e| e.to_string())?;

    let ids = s
        .get_service_binding_ids_for_service_instance("inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if ids != ["bind-a", "bind-b", "bind-c"] {
        return Err(format!("unexpected binding ids {ids:?}"));
    }
    Ok(())
}

async fn bind_details_absent_is_none<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    match s.get_bind_request_details("bind-1", "inst-1").await {
        Ok(None) => Ok(()),
        other => Err(format!("expected Ok(None), got {other:?}")),
    }
}

async fn bind_details_round_trip<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut params = JsonObject::new();
    params.insert("role".to_string(), serde_json::json!("reader"));
    let mut resource = JsonObject::new();
    resource.insert("app_guid".to_string(), serde_json::json!("app-1"));
    let details = BindRequestDetails {
        service_instance_guid: "inst-1".to_string(),
        binding_guid: "bind-1".to_string(),
        parameters: params,
        bind_resource: resource,
    };
    s.store_bind_request_details(details.clone())
        .await
        .map_err(|e| e.to_string())?;

    let got = s
        .get_bind_request_details("bind-1", "inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if got.as_ref() != Some(&details) {
        return Err(format!("expected {details:?}, got {got:?}"));
    }

    s.delete_bind_request_details("bind-1", "inst-1")
        .await
        .map_err(|e| e.to_string())?;
    let after = s
        .get_bind_request_details("bind-1", "inst-1")
        .await
        .map_err(|e| e.to_string())?;
    if after.is_some() {
        return Err("bind details still present after delete".to_string());
    }
    Ok(())
}
