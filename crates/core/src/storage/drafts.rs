//! CRUD for outbound reply drafts awaiting human approval.
//!
//! Lifecycle mirrors the teacher's approval queue
//! (`pending -> approved|rejected`, plus an `expired` terminal state for
//! stale items), generalized from X replies to arbitrary outbound
//! channels (mail, chat).

use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::DbPool;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct Draft {
    pub id: String,
    pub event_id: String,
    pub channel: String,
    pub recipient: String,
    pub subject: Option<String>,
    pub body: String,
    pub status: String,
}

pub async fn enqueue(
    pool: &DbPool,
    event_id: &str,
    channel: &str,
    recipient: &str,
    subject: Option<&str>,
    body: &str,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO drafts (id, event_id, channel, recipient, subject, body, status) VALUES (?, ?, ?, ?, ?, ?, 'pending')",
    )
    .bind(&id)
    .bind(event_id)
    .bind(channel)
    .bind(recipient)
    .bind(subject)
    .bind(body)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

pub async fn get_pending(pool: &DbPool) -> Result<Vec<Draft>, StorageError> {
    sqlx::query_as("SELECT id, event_id, channel, recipient, subject, body, status FROM drafts WHERE status = 'pending' ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<Option<Draft>, StorageError> {
    sqlx::query_as("SELECT id, event_id, channel, recipient, subject, body, status FROM drafts WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn update_status(pool: &DbPool, id: &str, status: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE drafts SET status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

/// Edit-then-approve in one step, as the teacher's
/// `update_content_and_approve` does for reply drafts.
pub async fn update_body_and_approve(pool: &DbPool, id: &str, body: &str) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE drafts SET body = ?, status = 'approved', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(body)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

/// Prior drafts sent to or from a recipient, substring-matched, most
/// recent first — feeds the context engine's sender-history retrieval.
pub async fn history_for_recipient(pool: &DbPool, recipient: &str, limit: i64) -> Result<Vec<Draft>, StorageError> {
    sqlx::query_as(
        "SELECT id, event_id, channel, recipient, subject, body, status FROM drafts
         WHERE recipient LIKE '%' || ? || '%' AND status IN ('approved', 'sent')
         ORDER BY created_at DESC LIMIT ?",
    )
    .bind(recipient)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

/// Counts of approved vs. rejected drafts, for the admin
/// approval-rate analytic.
pub async fn approval_counts(pool: &DbPool) -> Result<(i64, i64), StorageError> {
    let row: (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END), 0)
         FROM drafts",
    )
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(row)
}

pub async fn expire_stale(pool: &DbPool, hours: i64) -> Result<u64, StorageError> {
    let result = sqlx::query(
        "UPDATE drafts SET status = 'expired', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE status = 'pending' AND created_at < datetime('now', printf('-%d hours', ?))",
    )
    .bind(hours)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(result.rows_affected())
}
