//! Webhook/admin HTTP server for the operations agent.
//!
//! Exposes health/status liveness probes, provider webhook intake, and the
//! operator admin API (queue control, approval review, dead-letter
//! resolution, analytics) over axum. This is the process operators and
//! upstream providers talk to; the consumer loop that drains the queue and
//! reasons over events lives in the worker binary instead.

pub mod auth;
pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the complete axum router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    let admin = Router::new()
        .route("/status", get(routes::admin::status))
        .route("/queue/pause", post(routes::admin::pause_queue))
        .route("/queue/resume", post(routes::admin::resume_queue))
        .route("/inject-event", post(routes::admin::inject_event))
        .route("/events/{id}", get(routes::admin::get_event))
        .route("/drafts", get(routes::admin::list_drafts))
        .route("/drafts/{id}/approve", post(routes::admin::approve_draft))
        .route(
            "/drafts/{id}/edit-and-approve",
            post(routes::admin::edit_and_approve_draft),
        )
        .route("/drafts/{id}/reject", post(routes::admin::reject_draft))
        .route("/proposals", get(routes::admin::list_proposals))
        .route("/proposals/{id}/approve", post(routes::admin::approve_proposal))
        .route("/proposals/{id}/reject", post(routes::admin::reject_proposal))
        .route("/dlq", get(routes::admin::list_dlq))
        .route("/dlq/{id}/resolve", post(routes::admin::resolve_dlq))
        .route("/dlq/{id}/retry", post(routes::admin::retry_dlq))
        .route(
            "/knowledge",
            get(routes::admin::list_knowledge).post(routes::admin::add_knowledge),
        )
        .route("/incidents", get(routes::admin::list_incidents))
        .route("/actions/{event_id}", get(routes::admin::list_actions))
        .route("/analytics/summary", get(routes::admin::analytics_summary))
        .route("/analytics/approval-rate", get(routes::admin::analytics_approval_rate))
        .route("/analytics/response-time", get(routes::admin::analytics_response_time))
        .route("/analytics/daily-costs", get(routes::admin::analytics_daily_costs))
        .layer(middleware::from_fn_with_state(state.clone(), auth::admin_auth));

    let webhooks = Router::new()
        .route("/chat", post(routes::webhooks::chat))
        .route("/ticketing", post(routes::webhooks::ticketing))
        .route("/mail", post(routes::webhooks::mail));

    let oauth = Router::new()
        .route("/start", get(routes::admin::oauth_start))
        .route("/callback", get(routes::admin::oauth_callback));

    Router::new()
        .route("/health", get(routes::health::health))
        .route("/status", get(routes::health::status))
        .nest("/webhooks", webhooks)
        .nest("/admin", admin)
        .nest("/oauth", oauth)
        .layer(middleware::from_fn(auth::request_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
