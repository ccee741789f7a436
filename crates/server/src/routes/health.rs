//! Liveness and readiness endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::state::AppState;

const AGENT_NAME: &str = "ops-agent";

/// `GET /health` — static liveness check, no store access.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "agent": AGENT_NAME }))
}

/// `GET /status` — liveness plus durable-store and KV connectivity.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let storage_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    let kv_ok = state.kv.exists("health:probe").await.is_ok();

    Json(json!({
        "status": "ok",
        "agent": AGENT_NAME,
        "storage": if storage_ok { "ok" } else { "unreachable" },
        "kv": if kv_ok { "ok" } else { "unreachable" },
        "environment": state.config.observability.environment,
    }))
}
