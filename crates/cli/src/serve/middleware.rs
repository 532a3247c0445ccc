//! HTTP middleware: bearer token authentication.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use super::state::AppState;

/// Resolve `Authorization: Bearer <token>` to a configured identity and
/// attach it to the request. /health is exempt; everything else without a
/// known token is rejected with 401.
pub(crate) async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    if request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    let identity = match token.and_then(|t| state.resolve(t)) {
        Some(identity) => identity.clone(),
        None if token.is_some() => {
            return super::json_error(StatusCode::UNAUTHORIZED, "unknown token", "unauthenticated")
                .into_response()
        }
        None => {
            return super::json_error(
                StatusCode::UNAUTHORIZED,
                "authentication required",
                "unauthenticated",
            )
            .into_response()
        }
    };

    request.extensions_mut().insert(identity);
    next.run(request).await
}
