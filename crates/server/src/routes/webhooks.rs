//! Provider webhook intake: verify authenticity, extract the minimal
//! payload, publish an event with a source-derived idempotency key.
//!
//! Chat pushes carry an HMAC-SHA256 signature over the raw body (verified
//! with a constant-time tag comparison, same shape as a GitHub/Slack
//! webhook signature); ticketing and mail pushes instead carry a shared
//! secret header, compared directly with `subtle` rather than `==` so a
//! timing side-channel can't shorten a brute-force search for it.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use hmac::{Hmac, Mac};
use ops_core::model::Priority;
use serde_json::{json, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::ApiError;
use crate::state::AppState;

type HmacSha256 = Hmac<Sha256>;

fn constant_time_eq(a: &str, b: &str) -> bool {
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

fn verify_chat_signature(secret: &str, body: &[u8], signature_header: &str) -> bool {
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());
    constant_time_eq(&expected, signature_header)
}

/// `POST /webhooks/chat` — signed-token verified chat push.
pub async fn chat(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Result<Json<Value>, ApiError> {
    let secret = &state.config.webhook.chat_signing_secret;
    if secret.is_empty() {
        return Err(ApiError::BadRequest("chat webhook not configured".to_string()));
    }

    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized)?;
    if !verify_chat_signature(secret, &body, signature) {
        return Err(ApiError::Unauthorized);
    }

    let payload: Value = serde_json::from_slice(&body).map_err(|_| ApiError::BadRequest("invalid JSON body".to_string()))?;
    let message_name = payload
        .get("message_name")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::BadRequest("missing message_name".to_string()))?
        .to_string();
    let idempotency_key = format!("chat:{message_name}");

    let event_id = state
        .queue
        .publish("chat", "message_received", payload, Priority::Medium, Some(idempotency_key))
        .await?;

    Ok(Json(json!({ "ok": true, "event_id": event_id })))
}

/// `POST /webhooks/ticketing` — shared-secret verified ticket event.
pub async fn ticketing(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(payload): Json<Value>) -> Result<Json<Value>, ApiError> {
    let secret = &state.config.webhook.ticketing_shared_secret;
    if secret.is_empty() {
        return Err(ApiError::BadRequest("ticketing webhook not configured".to_string()));
    }

    let provided = headers.get("x-shared-secret").and_then(|v| v.to_str().ok()).unwrap_or("");
    if !constant_time_eq(secret, provided) {
        return Err(ApiError::Unauthorized);
    }

    let id = payload.get("id").and_then(|v| v.as_str()).ok_or_else(|| ApiError::BadRequest("missing id".to_string()))?;
    let updated_at = payload
        .get("updated_at")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::BadRequest("missing updated_at".to_string()))?;
    let idempotency_key = format!("ticketing:{id}:{updated_at}");

    let event_id = state
        .queue
        .publish("ticketing", "ticket_updated", payload.clone(), Priority::Medium, Some(idempotency_key))
        .await?;

    Ok(Json(json!({ "status": "received", "event_id": event_id })))
}

/// `POST /webhooks/mail` — shared-secret verified mail history push
/// (modeled on a Gmail pub/sub push notification, which carries only a
/// `historyId` and leaves the caller to fetch the actual delta).
pub async fn mail(State(state): State<Arc<AppState>>, headers: HeaderMap, Json(payload): Json<Value>) -> Result<Json<Value>, ApiError> {
    let secret = &state.config.webhook.mail_shared_secret;
    if secret.is_empty() {
        return Err(ApiError::BadRequest("mail webhook not configured".to_string()));
    }

    let provided = headers.get("x-shared-secret").and_then(|v| v.to_str().ok()).unwrap_or("");
    if !constant_time_eq(secret, provided) {
        return Err(ApiError::Unauthorized);
    }

    let history_id = payload
        .get("history_id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::BadRequest("missing history_id".to_string()))?;
    let idempotency_key = format!("mail:history:{history_id}");

    let event_id = state
        .queue
        .publish("mail", "history_updated", payload.clone(), Priority::Medium, Some(idempotency_key))
        .await?;

    Ok(Json(json!({ "historyId": history_id, "event_id": event_id })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_signature_round_trips() {
        let secret = "shh";
        let body = br#"{"message_name":"abc"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        let signature = hex::encode(mac.finalize().into_bytes());
        assert!(verify_chat_signature(secret, body, &signature));
    }

    #[test]
    fn chat_signature_rejects_tampering() {
        let secret = "shh";
        let body = br#"{"message_name":"abc"}"#;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(b"different body");
        let signature = hex::encode(mac.finalize().into_bytes());
        assert!(!verify_chat_signature(secret, body, &signature));
    }

    #[test]
    fn constant_time_eq_matches_str_eq() {
        assert!(constant_time_eq("abc", "abc"));
        assert!(!constant_time_eq("abc", "abd"));
        assert!(!constant_time_eq("abc", "ab"));
    }
}
