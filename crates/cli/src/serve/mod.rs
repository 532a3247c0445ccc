//! `correlation serve` -- HTTP JSON API over the correlation engine.
//!
//! Every endpoint except /health requires `Authorization: Bearer <token>`,
//! where the token is one of the configured identities.
//!
//! Endpoints:
//! - GET    /health                                           - Server status
//! - POST   /entries                                          - Create a process instance
//! - GET    /correlations                                     - All correlations
//! - GET    /correlations/active                              - Correlations with running instances
//! - GET    /correlations/{id}                                - One correlation
//! - GET    /correlations/{id}/process-instances              - Instances of a correlation
//! - POST   /correlations/{cid}/process-instances/{pid}/finish - Finish an instance
//! - POST   /correlations/{cid}/process-instances/{pid}/error  - Fail an instance
//! - GET    /process-models/{id}/correlations                 - Correlations using a model
//! - GET    /process-models/{id}/process-instances            - Instances of a model
//! - DELETE /process-models/{id}/correlations                 - Purge a model's correlations
//! - GET    /process-instances?state=                         - Instances by state
//! - GET    /process-instances/{id}                           - One instance
//! - GET    /process-instances/{id}/subprocesses              - Direct children
//!
//! List endpoints accept `?offset=&limit=`. Errors are `{"error", "kind"}`.

mod handlers;
mod middleware;
mod state;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{middleware as axum_middleware, Json, Router};
use correlation_core::{ClaimsAuthorizer, CorrelationEngine, InMemoryStore};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use self::handlers::{
    handle_correlation_instances, handle_create_entry, handle_fail, handle_finish,
    handle_get_correlation, handle_get_instance, handle_health, handle_instances_by_state,
    handle_list_active, handle_list_correlations, handle_model_correlations,
    handle_model_instances, handle_not_found, handle_purge_model, handle_subprocesses,
};
use self::middleware::auth_middleware;
use self::state::AppState;
use crate::config::ServerConfig;

/// Maximum request body size: 1 MB.
const MAX_BODY_SIZE: usize = 1024 * 1024;

/// Construct a JSON error response with the given status code and message.
fn json_error(status: StatusCode, message: &str, kind: &str) -> impl IntoResponse {
    (
        status,
        Json(serde_json::json!({"error": message, "kind": kind})),
    )
}

fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/entries", post(handle_create_entry))
        .route("/correlations", get(handle_list_correlations))
        .route("/correlations/active", get(handle_list_active))
        .route("/correlations/{id}", get(handle_get_correlation))
        .route(
            "/correlations/{id}/process-instances",
            get(handle_correlation_instances),
        )
        .route(
            "/correlations/{cid}/process-instances/{pid}/finish",
            post(handle_finish),
        )
        .route(
            "/correlations/{cid}/process-instances/{pid}/error",
            post(handle_fail),
        )
        .route(
            "/process-models/{id}/correlations",
            get(handle_model_correlations).delete(handle_purge_model),
        )
        .route(
            "/process-models/{id}/process-instances",
            get(handle_model_instances),
        )
        .route("/process-instances", get(handle_instances_by_state))
        .route("/process-instances/{id}", get(handle_get_instance))
        .route(
            "/process-instances/{id}/subprocesses",
            get(handle_subprocesses),
        )
        .fallback(handle_not_found)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(cors)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}

/// Start the HTTP server with an in-memory store and the claims-based filter.
pub async fn start_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let engine = CorrelationEngine::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(ClaimsAuthorizer::new(
            config.engine.authorization.clone(),
        )),
        &config.engine,
    );
    let state = Arc::new(AppState {
        engine,
        identities: config.token_table(),
    });
    if state.identities.is_empty() {
        info!("no identities configured; every authenticated route will answer 401");
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        port = config.port,
        identities = state.identities.len(),
        default_limit = config.engine.query.default_limit,
        max_limit = config.engine.query.max_limit,
        "correlation server listening on http://{addr}"
    );
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shut down");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install ctrl+c handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install sigterm handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("received shutdown signal");
}
