use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use constant_time_eq::constant_time_eq;
use serde_json::json;
use tracing::warn;

use crate::AppState;

/// Does `headers` carry `Authorization: Bearer <expected>`?
pub fn has_operator_key(headers: &HeaderMap, expected: &str) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|t| constant_time_eq(t.as_bytes(), expected.as_bytes()))
}

/// Middleware for the `/admin` routes only.
///
/// Pastes are anonymous; this key gates maintenance such as a manual prune.
/// With no `PASTA_API_KEY` configured the admin routes are open, which suits
/// a server bound to a private interface.
pub async fn require_operator_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    match &state.api_key {
        Some(expected) if !has_operator_key(request.headers(), expected) => {
            warn!(path = %request.uri().path(), "rejected admin request without operator key");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": "operator key required"})),
            )
                .into_response()
        }
        _ => next.run(request).await,
    }
}
