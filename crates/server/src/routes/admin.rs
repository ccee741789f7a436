//! Operator-facing admin API: queue control, approval review, dead-letter
//! resolution, and read-only analytics. Every route here sits behind the
//! `admin_auth` bearer-token middleware installed in `lib.rs`.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use ops_core::model::Priority;
use ops_core::storage::{action_log, dead_letter, drafts, events, incidents, knowledge, proposals};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

fn parse_priority(value: &str) -> Result<Priority, ApiError> {
    match value {
        "critical" => Ok(Priority::Critical),
        "high" => Ok(Priority::High),
        "medium" | "normal" => Ok(Priority::Medium),
        "low" => Ok(Priority::Low),
        "background" => Ok(Priority::Background),
        other => Err(ApiError::BadRequest(format!("unknown priority '{other}'"))),
    }
}

/// `GET /admin/status` — queue depth, pending work, pause flag, last action.
pub async fn status(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let depth = state.queue.depth().await?;
    let paused = state.queue.is_paused().await?;
    let pending_drafts = drafts::get_pending(&state.db).await?.len();
    let pending_proposals = proposals::get_pending(&state.db).await?.len();
    let dlq_open = dead_letter::get_open(&state.db).await?.len();
    let last_action = action_log::most_recent(&state.db).await?;

    Ok(Json(json!({
        "queue_depth": depth,
        "paused": paused,
        "pending_drafts": pending_drafts,
        "pending_proposals": pending_proposals,
        "dlq_open": dlq_open,
        "last_action": last_action.map(|(tool, at)| json!({"tool": tool, "at": at})),
    })))
}

/// `POST /admin/queue/pause`
pub async fn pause_queue(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.queue.pause().await?;
    Ok(Json(json!({"paused": true})))
}

/// `POST /admin/queue/resume`
pub async fn resume_queue(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    state.queue.resume().await?;
    Ok(Json(json!({"paused": false})))
}

#[derive(Deserialize)]
pub struct InjectEventRequest {
    pub source: String,
    pub event_type: String,
    pub text: Option<String>,
    #[serde(default)]
    pub payload: Option<Value>,
    #[serde(default = "default_priority")]
    pub priority: String,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

fn default_priority() -> String {
    "normal".to_string()
}

/// `POST /admin/inject-event` — publish an operator-constructed event,
/// bypassing pollers/webhooks entirely. `text` is a convenience shorthand
/// for a bare `{"text": ...}` payload; `payload` takes precedence.
pub async fn inject_event(State(state): State<Arc<AppState>>, Json(body): Json<InjectEventRequest>) -> Result<Json<Value>, ApiError> {
    let priority = parse_priority(&body.priority)?;
    let payload = body.payload.unwrap_or_else(|| json!({ "text": body.text.unwrap_or_default() }));

    let event_id = state
        .queue
        .publish(&body.source, &body.event_type, payload, priority, body.idempotency_key)
        .await?;

    Ok(Json(json!({"event_id": event_id})))
}

/// `GET /admin/events/:id`
pub async fn get_event(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let event = events::get(&state.db, &id).await?.ok_or_else(|| ApiError::NotFound(format!("event {id} not found")))?;
    let actions = action_log::for_event(&state.db, &id).await?;
    Ok(Json(json!({"event": event, "actions": actions})))
}

/// `GET /admin/drafts` — pending outbound reply drafts.
pub async fn list_drafts(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!(state.approvals.pending_drafts().await?)))
}

/// `POST /admin/drafts/:id/approve`
pub async fn approve_draft(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.approvals.approve_draft(&id).await?;
    Ok(Json(json!({"id": id, "status": "approved"})))
}

#[derive(Deserialize)]
pub struct EditDraftRequest {
    pub body: String,
}

/// `POST /admin/drafts/:id/edit-and-approve`
pub async fn edit_and_approve_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<EditDraftRequest>,
) -> Result<Json<Value>, ApiError> {
    state.approvals.edit_and_approve_draft(&id, &req.body).await?;
    Ok(Json(json!({"id": id, "status": "approved"})))
}

#[derive(Deserialize, Default)]
pub struct RejectDraftRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// `POST /admin/drafts/:id/reject` — an optional JSON body's `reason`
/// feeds the rejection-learning analysis; omitting the body is fine.
pub async fn reject_draft(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<RejectDraftRequest>>,
) -> Result<Json<Value>, ApiError> {
    let reason = body.and_then(|Json(r)| r.reason);
    state.approvals.reject_draft(&id, reason.as_deref()).await?;
    Ok(Json(json!({"id": id, "status": "rejected"})))
}

/// `GET /admin/proposals` — pending proposed mutating actions.
pub async fn list_proposals(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!(state.approvals.pending_proposals().await?)))
}

/// `POST /admin/proposals/:id/approve` — approves and immediately executes.
pub async fn approve_proposal(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let result = state.approvals.approve_and_execute_proposal(&id).await?;
    Ok(Json(json!({"id": id, "status": "approved", "result": result})))
}

/// `POST /admin/proposals/:id/reject`
pub async fn reject_proposal(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    state.approvals.reject_proposal(&id).await?;
    Ok(Json(json!({"id": id, "status": "rejected"})))
}

/// `GET /admin/dlq` — open dead-letter entries.
pub async fn list_dlq(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!(dead_letter::get_open(&state.db).await?)))
}

/// `POST /admin/dlq/:id/resolve`
#[derive(Deserialize)]
pub struct ResolveDlqRequest {
    pub resolved_by: String,
}

pub async fn resolve_dlq(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ResolveDlqRequest>,
) -> Result<Json<Value>, ApiError> {
    dead_letter::resolve(&state.db, &id, &req.resolved_by).await?;
    Ok(Json(json!({"id": id, "status": "resolved"})))
}

/// `POST /admin/dlq/:id/retry` — republish the original event at normal
/// priority with no idempotency key, so the retry always goes through
/// even though the original publish's dedup entry may still be live.
pub async fn retry_dlq(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let open = dead_letter::get_open(&state.db).await?;
    let entry = open
        .into_iter()
        .find(|e| e.id == id)
        .ok_or_else(|| ApiError::NotFound(format!("dead letter entry {id} not found")))?;

    let payload: Value = serde_json::from_str(&entry.payload).unwrap_or(Value::Null);
    let event_id = state.queue.publish(&entry.source, &entry.event_type, payload, Priority::Medium, None).await?;
    dead_letter::mark_retried(&state.db, &id).await?;

    Ok(Json(json!({"id": id, "status": "retried", "event_id": event_id})))
}

#[derive(Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

/// `GET /admin/knowledge`
pub async fn list_knowledge(State(state): State<Arc<AppState>>, Query(q): Query<PaginationQuery>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!(knowledge::list_active(&state.db, q.limit).await?)))
}

#[derive(Deserialize)]
pub struct AddKnowledgeRequest {
    pub title: String,
    pub content: String,
}

/// `POST /admin/knowledge`
pub async fn add_knowledge(State(state): State<Arc<AppState>>, Json(req): Json<AddKnowledgeRequest>) -> Result<Json<Value>, ApiError> {
    let id = knowledge::insert(&state.db, &req.title, &req.content, None).await?;
    Ok(Json(json!({"id": id})))
}

/// `GET /admin/incidents`
pub async fn list_incidents(State(state): State<Arc<AppState>>, Query(q): Query<PaginationQuery>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!(incidents::list_recent(&state.db, q.limit).await?)))
}

/// `GET /admin/actions/:event_id`
pub async fn list_actions(State(state): State<Arc<AppState>>, Path(event_id): Path<String>) -> Result<Json<Value>, ApiError> {
    Ok(Json(json!(action_log::for_event(&state.db, &event_id).await?)))
}

/// `GET /admin/analytics/summary`
pub async fn analytics_summary(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let (draft_approved, draft_rejected) = drafts::approval_counts(&state.db).await?;
    let (proposal_approved, proposal_rejected) = proposals::approval_counts(&state.db).await?;
    let avg_response_ms = action_log::average_elapsed_ms(&state.db).await?;

    Ok(Json(json!({
        "drafts": {"approved": draft_approved, "rejected": draft_rejected},
        "proposals": {"approved": proposal_approved, "rejected": proposal_rejected},
        "avg_response_time_ms": avg_response_ms,
    })))
}

/// `GET /admin/analytics/approval-rate`
pub async fn analytics_approval_rate(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let (draft_approved, draft_rejected) = drafts::approval_counts(&state.db).await?;
    let (proposal_approved, proposal_rejected) = proposals::approval_counts(&state.db).await?;
    let approved = draft_approved + proposal_approved;
    let total = approved + draft_rejected + proposal_rejected;
    let rate = if total == 0 { 0.0 } else { approved as f64 / total as f64 };
    Ok(Json(json!({"approved": approved, "total": total, "rate": rate})))
}

/// `GET /admin/analytics/response-time`
pub async fn analytics_response_time(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let avg_ms = action_log::average_elapsed_ms(&state.db).await?;
    Ok(Json(json!({"avg_elapsed_ms": avg_ms})))
}

/// `GET /admin/analytics/daily-costs` — event-volume-per-day, used as a
/// proxy for LLM spend since this system doesn't persist per-call token
/// cost (see `events::daily_counts`'s doc comment).
pub async fn analytics_daily_costs(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let counts = events::daily_counts(&state.db, 30).await?;
    Ok(Json(json!(counts.into_iter().map(|(day, count)| json!({"day": day, "event_count": count})).collect::<Vec<_>>())))
}

/// `GET /oauth/start` — placeholder bootstrap entry point; concrete
/// provider OAuth apps are operator-supplied configuration, not something
/// this agent ships a redirect target for.
pub async fn oauth_start() -> Json<Value> {
    Json(json!({"status": "not_configured", "message": "configure an OAuth app and set its authorize URL in config before starting a flow"}))
}

/// `GET /oauth/callback`
#[derive(Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
}

pub async fn oauth_callback(Query(q): Query<OAuthCallbackQuery>) -> Json<Value> {
    Json(json!({"received_code": q.code.is_some(), "state": q.state}))
}
