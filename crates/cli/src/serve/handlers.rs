//! OSB route handlers. Each one parses the request, calls the broker and
//! maps [`BrokerError`] onto the OSB error body.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};

use broker_core::paramparser::{BindRequest, ProvisionRequest, UpdateRequest};
use broker_engine::{BrokerError, PlanQuery};

use super::json_error;
use super::middleware::Ctx;
use super::state::AppState;

const CONCURRENCY_DESCRIPTION: &str = "Another operation for this service instance is in progress.";

/// Query parameters shared by the instance and binding routes.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct InstanceQuery {
    service_id: String,
    plan_id: String,
    accepts_incomplete: bool,
}

impl InstanceQuery {
    fn plan_query(&self) -> PlanQuery {
        PlanQuery::new(&self.service_id, &self.plan_id)
    }
}

/// A [`BrokerError`] rendered as an OSB error response.
pub(crate) struct ApiError(BrokerError);

impl From<BrokerError> for ApiError {
    fn from(err: BrokerError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }

        let body = match &self.0 {
            BrokerError::Cleanup { operation, message } => {
                json!({"state": operation.state, "description": message})
            }
            err => {
                let mut body = Map::new();
                if let Some(key) = err.error_key() {
                    body.insert("error".to_string(), json!(key));
                }
                let description = match err {
                    BrokerError::ConcurrencyError => CONCURRENCY_DESCRIPTION.to_string(),
                    other => other.to_string(),
                };
                body.insert("description".to_string(), json!(description));
                Value::Object(body)
            }
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Response, ApiError>;

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, ApiError> {
    serde_json::from_slice(body).map_err(|_| ApiError(BrokerError::InvalidUserInput))
}

fn ok<T: serde::Serialize>(status: StatusCode, body: T) -> ApiResult {
    Ok((status, Json(body)).into_response())
}

fn accepted_or(is_async: bool, sync_status: StatusCode) -> StatusCode {
    if is_async {
        StatusCode::ACCEPTED
    } else {
        sync_status
    }
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found")
}

/// GET /v2/catalog
pub(crate) async fn handle_catalog(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({ "services": state.broker.services() }))
}

/// PUT /v2/service_instances/{instance_id}
pub(crate) async fn handle_provision(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    Ctx(ctx): Ctx,
    body: Bytes,
) -> ApiResult {
    let request: ProvisionRequest = parse_body(&body)?;
    let spec = state
        .broker
        .provision(&ctx, &instance_id, &request, query.accepts_incomplete)
        .await?;
    ok(accepted_or(spec.is_async, StatusCode::CREATED), spec)
}

/// PATCH /v2/service_instances/{instance_id}
pub(crate) async fn handle_update(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    Ctx(ctx): Ctx,
    body: Bytes,
) -> ApiResult {
    let request: UpdateRequest = parse_body(&body)?;
    let spec = state
        .broker
        .update(&ctx, &instance_id, &request, query.accepts_incomplete)
        .await?;
    ok(accepted_or(spec.is_async, StatusCode::OK), spec)
}

/// DELETE /v2/service_instances/{instance_id}
pub(crate) async fn handle_deprovision(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    Ctx(ctx): Ctx,
) -> ApiResult {
    let spec = state
        .broker
        .deprovision(&ctx, &instance_id, &query.plan_query(), query.accepts_incomplete)
        .await?;
    ok(accepted_or(spec.is_async, StatusCode::OK), spec)
}

/// GET /v2/service_instances/{instance_id}
pub(crate) async fn handle_get_instance(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Query(query): Query<InstanceQuery>,
    Ctx(ctx): Ctx,
) -> ApiResult {
    let spec = state
        .broker
        .get_instance(&ctx, &instance_id, &query.plan_query())
        .await?;
    ok(StatusCode::OK, spec)
}

/// GET /v2/service_instances/{instance_id}/last_operation
pub(crate) async fn handle_last_operation(
    State(state): State<Arc<AppState>>,
    Path(instance_id): Path<String>,
    Ctx(ctx): Ctx,
) -> ApiResult {
    let operation = state.broker.last_operation(&ctx, &instance_id).await?;
    ok(StatusCode::OK, operation)
}

/// PUT /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub(crate) async fn handle_bind(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Ctx(ctx): Ctx,
    body: Bytes,
) -> ApiResult {
    let request: BindRequest = parse_body(&body)?;
    let binding = state
        .broker
        .bind(&ctx, &instance_id, &binding_id, &request)
        .await?;
    ok(StatusCode::CREATED, binding)
}

/// DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub(crate) async fn handle_unbind(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    Ctx(ctx): Ctx,
) -> ApiResult {
    state
        .broker
        .unbind(&ctx, &instance_id, &binding_id, &query.plan_query())
        .await?;
    ok(StatusCode::OK, json!({}))
}

/// GET /v2/service_instances/{instance_id}/service_bindings/{binding_id}
pub(crate) async fn handle_get_binding(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Query(query): Query<InstanceQuery>,
    Ctx(ctx): Ctx,
) -> ApiResult {
    let spec = state
        .broker
        .get_binding(&ctx, &instance_id, &binding_id, &query.plan_query())
        .await?;
    ok(StatusCode::OK, spec)
}

/// GET /v2/service_instances/{instance_id}/service_bindings/{binding_id}/last_operation
pub(crate) async fn handle_binding_last_operation(
    State(state): State<Arc<AppState>>,
    Path((instance_id, binding_id)): Path<(String, String)>,
    Ctx(ctx): Ctx,
) -> ApiResult {
    let operation = state
        .broker
        .last_binding_operation(&ctx, &instance_id, &binding_id)
        .await?;
    ok(StatusCode::OK, operation)
}
