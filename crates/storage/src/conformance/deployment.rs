use std::future::Future;

use super::{make_deployment, TestResult};
use crate::record::OperationState;
use crate::{BrokerStorage, StorageError, RECOVERED_FAILED_MESSAGE};

pub(super) async fn run_deployment_tests<S, F, Fut>(factory: &F) -> Vec<TestResult>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    vec![
        TestResult::from_result(
            "deployment",
            "store_then_get_deployment",
            store_then_get_deployment(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "get_missing_deployment_returns_not_found",
            get_missing_deployment_returns_not_found(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "delete_deployment_removes_row",
            delete_deployment_removes_row(factory).await,
        ),
        TestResult::from_result(
            "deployment",
            "recover_marks_only_in_progress_rows",
            recover_marks_only_in_progress_rows(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

async fn store_then_get_deployment<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let mut want = make_deployment("tf:inst-1:");
    s.store_terraform_deployment(want.clone())
        .await
        .map_err(|e| e.to_string())?;

    want.last_operation_state = OperationState::Succeeded;
    want.last_operation_message = "provision succeeded".to_string();
    s.store_terraform_deployment(want.clone())
        .await
        .map_err(|e| e.to_string())?;

    let got = s
        .get_terraform_deployment("tf:inst-1:")
        .await
        .map_err(|e| e.to_string())?;
    if got != want {
        return Err(format!("expected {want:?}, got {got:?}"));
    }
    Ok(())
}

async fn get_missing_deployment_returns_not_found<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    if s.exists_terraform_deployment("tf:nope:")
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("empty storage reported deployment as existing".to_string());
    }
    match s.get_terraform_deployment("tf:nope:").await {
        Err(StorageError::DeploymentNotFound { id }) if id == "tf:nope:" => Ok(()),
        other => Err(format!("expected DeploymentNotFound, got {other:?}")),
    }
}

async fn delete_deployment_removes_row<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    s.store_terraform_deployment(make_deployment("tf:inst-1:"))
        .await
        .map_err(|e| e.to_string())?;
    s.delete_terraform_deployment("tf:inst-1:")
        .await
        .map_err(|e| e.to_string())?;
    if s.exists_terraform_deployment("tf:inst-1:")
        .await
        .map_err(|e| e.to_string())?
    {
        return Err("deployment still present after delete".to_string());
    }
    Ok(())
}

async fn recover_marks_only_in_progress_rows<S, F, Fut>(factory: &F) -> Result<(), String>
where
    S: BrokerStorage,
    F: Fn() -> Fut,
    Fut: Future<Output = S>,
{
    let s = factory().await;
    let running = make_deployment("tf:running:");
    let mut done = make_deployment("tf:done:");
    done.last_operation_state = OperationState::Succeeded;
    done.last_operation_message = "provision succeeded".to_string();
    s.store_terraform_deployment(running)
        .await
        .map_err(|e| e.to_string())?;
    s.store_terraform_deployment(done.clone())
        .await
        .map_err(|e| e.to_string())?;

    let recovered = s
        .recover_in_progress_operations()
        .await
        .map_err(|e| e.to_string())?;
    if recovered != ["tf:running:"] {
        return Err(format!("unexpected recovered ids {recovered:?}"));
    }

    let got = s
        .get_terraform_deployment("tf:running:")
        .await
        .map_err(|e| e.to_string())?;
    if got.last_operation_state != OperationState::Failed
        || got.last_operation_message != RECOVERED_FAILED_MESSAGE
    {
        return Err(format!("running row not marked failed: {got:?}"));
    }
    let untouched = s
        .get_terraform_deployment("tf:done:")
        .await
        .map_err(|e| e.to_string())?;
    if untouched != done {
        return Err(format!("finished row changed: {untouched:?}"));
    }
    Ok(())
}
