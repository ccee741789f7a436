//! Bearer-token authentication for the `/admin/*` surface, and the
//! request-id tagging middleware applied to every route.
//!
//! Grounded on the teacher's `auth_middleware` (bearer-token check ahead of
//! the handler, health exempted) generalized to use a constant-time
//! comparison, since an admin token is a genuine secret rather than a
//! locally-generated convenience token.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::state::AppState;

/// Rejects any `/admin/*` request whose `Authorization: Bearer <token>`
/// does not match the configured admin token. An empty configured token
/// disables the admin surface entirely (every request is rejected) rather
/// than accepting anything, since an empty `Authorization` header would
/// otherwise compare equal to an empty expected token.
pub async fn admin_auth(State(state): State<Arc<AppState>>, headers: HeaderMap, request: Request, next: Next) -> Response {
    let expected = state.config.server.admin_api_token.as_bytes();
    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("");

    let authorized = !expected.is_empty() && bool::from(provided.as_bytes().ct_eq(expected));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, axum::Json(json!({"error": "unauthorized"}))).into_response();
    }

    next.run(request).await
}

/// Tags every request with a correlation id (reused from an incoming
/// `X-Request-Id` header if present) and logs method/path/status/latency
/// on completion.
pub async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = std::time::Instant::now();

    let mut response = next.run(request).await;
    let elapsed_ms = started.elapsed().as_millis();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms,
        "request handled"
    );

    if let Ok(value) = request_id.parse() {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}
