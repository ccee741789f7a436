//! Dead-letter queue: events that exhausted their retry budget.

use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::DbPool;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct DeadLetterEntry {
    pub id: String,
    pub event_id: String,
    pub source: String,
    pub event_type: String,
    pub payload: String,
    pub retry_count: i32,
    pub error_history: String,
    pub status: String,
    pub resolved_by: Option<String>,
}

/// Append an event to the dead-letter queue with its accumulated error
/// history (one entry per failed attempt).
pub async fn insert(
    pool: &DbPool,
    event_id: &str,
    source: &str,
    event_type: &str,
    payload: &Value,
    retry_count: i32,
    error_history: &[String],
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO dead_letter_events (id, event_id, source, event_type, payload, retry_count, error_history, status)
         VALUES (?, ?, ?, ?, ?, ?, ?, 'open')",
    )
    .bind(&id)
    .bind(event_id)
    .bind(source)
    .bind(event_type)
    .bind(payload.to_string())
    .bind(retry_count)
    .bind(serde_json::to_string(error_history).unwrap_or_else(|_| "[]".to_string()))
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

pub async fn get_open(pool: &DbPool) -> Result<Vec<DeadLetterEntry>, StorageError> {
    sqlx::query_as("SELECT * FROM dead_letter_events WHERE status = 'open' ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn resolve(pool: &DbPool, id: &str, resolved_by: &str) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE dead_letter_events SET status = 'resolved', resolved_by = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(resolved_by)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

pub async fn mark_retried(pool: &DbPool, id: &str) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE dead_letter_events SET status = 'retried', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}
