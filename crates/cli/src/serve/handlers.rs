//! HTTP route handlers: entries, correlations, process instances, purge.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Extension, Json};
use correlation_core::{
    Correlation, CorrelationError, Identity, InstanceState, NewEntry, ProcessInstanceRecord,
    PurgeSummary, QueryOptions,
};
use serde::Deserialize;
use serde_json::Value;

use super::json_error;
use super::state::AppState;

/// Core error carried out of a handler.
pub(crate) struct ApiError(CorrelationError);

impl From<CorrelationError> for ApiError {
    fn from(err: CorrelationError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CorrelationError::NotFound { .. } => StatusCode::NOT_FOUND,
            CorrelationError::Forbidden { .. } => StatusCode::FORBIDDEN,
            CorrelationError::DuplicateKey { .. } | CorrelationError::InvalidTransition { .. } => {
                StatusCode::CONFLICT
            }
            CorrelationError::InvalidReference { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CorrelationError::InvalidArgument { .. } => StatusCode::BAD_REQUEST,
            CorrelationError::Unavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        json_error(status, &self.0.to_string(), self.0.kind()).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `?offset=&limit=` on every list route. Both default to 0.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct PageParams {
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: usize,
}

impl From<PageParams> for QueryOptions {
    fn from(params: PageParams) -> Self {
        QueryOptions::new(params.offset, params.limit)
    }
}

/// `GET /process-instances` takes the state filter alongside the page.
///
/// `state` stays a string here so that an unknown value is reported as an
/// `invalid_argument` JSON error rather than a query extraction failure.
#[derive(Debug, Deserialize)]
pub(crate) struct StateParams {
    state: Option<String>,
    #[serde(default)]
    offset: usize,
    #[serde(default)]
    limit: usize,
}

/// Fallback handler for unmatched routes.
pub(crate) async fn handle_not_found() -> impl IntoResponse {
    json_error(StatusCode::NOT_FOUND, "not found", "not_found")
}

/// GET /health
pub(crate) async fn handle_health() -> impl IntoResponse {
    let response = serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(response))
}

/// POST /entries
pub(crate) async fn handle_create_entry(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Json(entry): Json<NewEntry>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state.engine.registry.create_entry(&identity, entry).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// GET /correlations
pub(crate) async fn handle_list_correlations(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageParams>,
) -> ApiResult<Value> {
    let correlations = state
        .engine
        .queries
        .get_all(&identity, page.into())
        .await?;
    Ok(Json(serde_json::json!({ "correlations": correlations })))
}

/// GET /correlations/active
pub(crate) async fn handle_list_active(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(page): Query<PageParams>,
) -> ApiResult<Value> {
    let correlations = state
        .engine
        .queries
        .get_active(&identity, page.into())
        .await?;
    Ok(Json(serde_json::json!({ "correlations": correlations })))
}

/// GET /correlations/{id}
pub(crate) async fn handle_get_correlation(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(correlation_id): Path<String>,
) -> ApiResult<Correlation> {
    let correlation = state
        .engine
        .queries
        .get_by_correlation_id(&identity, &correlation_id)
        .await?;
    Ok(Json(correlation))
}

/// GET /correlations/{id}/process-instances
pub(crate) async fn handle_correlation_instances(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(correlation_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Value> {
    let instances = state
        .engine
        .queries
        .get_process_instances_for_correlation(&identity, &correlation_id, page.into())
        .await?;
    Ok(Json(serde_json::json!({ "process_instances": instances })))
}

/// POST /correlations/{cid}/process-instances/{pid}/finish
pub(crate) async fn handle_finish(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((correlation_id, process_instance_id)): Path<(String, String)>,
) -> ApiResult<ProcessInstanceRecord> {
    let record = state
        .engine
        .registry
        .finish_process_instance(&identity, &correlation_id, &process_instance_id)
        .await?;
    Ok(Json(record))
}

/// POST /correlations/{cid}/process-instances/{pid}/error
///
/// The request body is stored verbatim as the error payload.
pub(crate) async fn handle_fail(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path((correlation_id, process_instance_id)): Path<(String, String)>,
    Json(payload): Json<Value>,
) -> ApiResult<ProcessInstanceRecord> {
    let record = state
        .engine
        .registry
        .finish_process_instance_with_error(
            &identity,
            &correlation_id,
            &process_instance_id,
            payload,
        )
        .await?;
    Ok(Json(record))
}

/// GET /process-models/{id}/correlations
pub(crate) async fn handle_model_correlations(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(process_model_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Value> {
    let correlations = state
        .engine
        .queries
        .get_by_process_model_id(&identity, &process_model_id, page.into())
        .await?;
    Ok(Json(serde_json::json!({ "correlations": correlations })))
}

/// GET /process-models/{id}/process-instances
pub(crate) async fn handle_model_instances(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(process_model_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Value> {
    let instances = state
        .engine
        .queries
        .get_process_instances_for_process_model(&identity, &process_model_id, page.into())
        .await?;
    Ok(Json(serde_json::json!({ "process_instances": instances })))
}

/// DELETE /process-models/{id}/correlations
pub(crate) async fn handle_purge_model(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(process_model_id): Path<String>,
) -> ApiResult<PurgeSummary> {
    let summary = state
        .engine
        .registry
        .delete_correlation_by_process_model_id(&identity, &process_model_id)
        .await?;
    Ok(Json(summary))
}

/// GET /process-instances?state=running
pub(crate) async fn handle_instances_by_state(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Query(params): Query<StateParams>,
) -> ApiResult<Value> {
    let instance_state = match params.state.as_deref().map(str::parse::<InstanceState>) {
        Some(Ok(instance_state)) => instance_state,
        Some(Err(reason)) => {
            return Err(CorrelationError::InvalidArgument {
                field: "state".to_string(),
                reason,
            }
            .into())
        }
        None => {
            return Err(CorrelationError::InvalidArgument {
                field: "state".to_string(),
                reason: "required, one of running, finished, error".to_string(),
            }
            .into())
        }
    };
    let instances = state
        .engine
        .queries
        .get_process_instances_by_state(
            &identity,
            instance_state,
            QueryOptions::new(params.offset, params.limit),
        )
        .await?;
    Ok(Json(serde_json::json!({ "process_instances": instances })))
}

/// GET /process-instances/{id}
pub(crate) async fn handle_get_instance(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(process_instance_id): Path<String>,
) -> ApiResult<ProcessInstanceRecord> {
    let record = state
        .engine
        .queries
        .get_by_process_instance_id(&identity, &process_instance_id)
        .await?;
    Ok(Json(record))
}

/// GET /process-instances/{id}/subprocesses
pub(crate) async fn handle_subprocesses(
    State(state): State<Arc<AppState>>,
    Extension(identity): Extension<Identity>,
    Path(process_instance_id): Path<String>,
    Query(page): Query<PageParams>,
) -> ApiResult<Value> {
    let children = state
        .engine
        .queries
        .get_subprocesses_for_process_instance(&identity, &process_instance_id, page.into())
        .await?;
    Ok(Json(serde_json::json!({ "process_instances": children })))
}
