//! `osb-broker serve` -- the Open Service Broker HTTP surface.
//!
//! Every route sits behind optional basic auth and a trace layer.
//!
//! Endpoints:
//! - GET    /v2/catalog
//! - PUT    /v2/service_instances/{instance_id}                  - provision
//! - PATCH  /v2/service_instances/{instance_id}                  - update / upgrade
//! - DELETE /v2/service_instances/{instance_id}                  - deprovision
//! - GET    /v2/service_instances/{instance_id}                  - fetch instance
//! - GET    /v2/service_instances/{instance_id}/last_operation
//! - PUT    /v2/service_instances/{instance_id}/service_bindings/{binding_id}
//! - DELETE /v2/service_instances/{instance_id}/service_bindings/{binding_id}
//! - GET    /v2/service_instances/{instance_id}/service_bindings/{binding_id}
//! - GET    /v2/service_instances/{instance_id}/service_bindings/{binding_id}/last_operation
//!
//! All responses use Content-Type: application/json.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware as axum_middleware, Json, Router};
use tower_http::trace::TraceLayer;

use broker_engine::{CredHubStore, DryRunProvider, ServiceBroker};
use broker_storage::{BrokerStorage, InMemoryStorage};

use crate::catalog::load_registry;
use crate::config::BrokerConfig;
use crate::error::CliError;

use self::handlers::{
    handle_bind, handle_binding_last_operation, handle_catalog, handle_deprovision,
    handle_get_binding, handle_get_instance, handle_last_operation, handle_not_found,
    handle_provision, handle_unbind, handle_update,
};
use self::middleware::auth_middleware;
use self::state::{AppState, BasicCredentials};

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct an OSB error body with the given status code and description.
pub(crate) fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, Json(serde_json::json!({"description": message})))
}

pub(crate) fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/v2/catalog", get(handle_catalog))
        .route(
            "/v2/service_instances/{instance_id}",
            get(handle_get_instance)
                .put(handle_provision)
                .patch(handle_update)
                .delete(handle_deprovision),
        )
        .route(
            "/v2/service_instances/{instance_id}/last_operation",
            get(handle_last_operation),
        )
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}",
            get(handle_get_binding).put(handle_bind).delete(handle_unbind),
        )
        .route(
            "/v2/service_instances/{instance_id}/service_bindings/{binding_id}/last_operation",
            get(handle_binding_last_operation),
        )
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Build the broker from `config` and serve until ctrl-c.
///
/// When TLS cert/key paths are configured and the `tls` feature is on,
/// the server listens over HTTPS using `axum-server` with rustls.
pub async fn start_server(config: BrokerConfig) -> Result<(), CliError> {
    let settings = Arc::new(config.settings()?);
    let registry = load_registry(&config.catalog.paths, &settings)?;
    if registry.is_empty() {
        tracing::warn!("no service definitions loaded; the catalog is empty");
    }

    let storage: Arc<dyn BrokerStorage> = Arc::new(InMemoryStorage::new());
    for id in storage.recover_in_progress_operations().await? {
        tracing::warn!(deployment_id = %id, "marked interrupted operation as failed");
    }

    let provider = Arc::new(DryRunProvider::new(storage.clone()));
    let mut broker = ServiceBroker::new(Arc::new(registry), storage, provider, settings);
    if config.credhub.is_configured() {
        tracing::info!(url = %config.credhub.url, "storing binding credentials in CredHub");
        broker = broker.with_credstore(Arc::new(CredHubStore::new(&config.credhub)?));
    }

    let credentials = BasicCredentials::from_config(&config.api.user, &config.api.password);
    if credentials.is_none() {
        tracing::warn!("no api user configured; basic auth is disabled");
    }
    let state = Arc::new(AppState {
        broker,
        credentials,
    });
    let app = router(state.clone());
    let addr = format!("{}:{}", config.api.host, config.api.port);

    #[cfg(feature = "tls")]
    if let (Some(cert_path), Some(key_path)) = (&config.api.tls_cert, &config.api.tls_key) {
        let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert_path, key_path).await?;
        let socket_addr: std::net::SocketAddr = addr
            .parse()
            .map_err(|_| CliError::InvalidAddress(addr.clone()))?;
        tracing::info!(%addr, "service broker listening on https");
        let server = axum_server::bind_rustls(socket_addr, tls).serve(app.into_make_service());
        tokio::select! {
            result = server => result?,
            _ = shutdown_signal() => {}
        }
        state.broker.drain().await;
        return Ok(());
    }

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "service broker listening on http");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let pending = state.broker.pending_upgrades();
    if pending > 0 {
        tracing::info!(pending, "waiting for upgrades to finish");
    }
    state.broker.drain().await;
    tracing::info!("server shut down");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C).
async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("received shutdown signal");
}
