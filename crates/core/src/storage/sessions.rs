//! Durable persistence for conversational sessions and their message
//! history. Business rules (idle policy, alternation, compaction) live in
//! `ops_core::sessions`; this module is pure storage.

use chrono::{DateTime, Utc};

use crate::error::StorageError;
use crate::model::{Session, SessionMessage};
use crate::storage::DbPool;

pub async fn get(pool: &DbPool, session_key: &str) -> Result<Option<Session>, StorageError> {
    sqlx::query_as(
        "SELECT session_key, source, summary, message_count, last_activity_at, created_at FROM sessions WHERE session_key = ?",
    )
    .bind(session_key)
    .fetch_optional(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

pub async fn get_or_create(pool: &DbPool, session_key: &str, source: &str) -> Result<Session, StorageError> {
    if let Some(existing) = get(pool, session_key).await? {
        return Ok(existing);
    }
    sqlx::query("INSERT INTO sessions (session_key, source, message_count) VALUES (?, ?, 0)")
        .bind(session_key)
        .bind(source)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    get(pool, session_key)
        .await?
        .ok_or_else(|| StorageError::NotFound {
            what: "session".to_string(),
            id: session_key.to_string(),
        })
}

pub async fn touch(pool: &DbPool, session_key: &str, at: DateTime<Utc>) -> Result<(), StorageError> {
    sqlx::query("UPDATE sessions SET last_activity_at = ? WHERE session_key = ?")
        .bind(at)
        .bind(session_key)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

pub async fn append_message(
    pool: &DbPool,
    session_key: &str,
    role: &str,
    content: &str,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await.map_err(|source| StorageError::Query { source })?;
    sqlx::query("INSERT INTO session_messages (session_key, role, content) VALUES (?, ?, ?)")
        .bind(session_key)
        .bind(role)
        .bind(content)
        .execute(&mut *tx)
        .await
        .map_err(|source| StorageError::Query { source })?;
    sqlx::query(
        "UPDATE sessions SET message_count = message_count + 1, last_activity_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE session_key = ?",
    )
    .bind(session_key)
    .execute(&mut *tx)
    .await
    .map_err(|source| StorageError::Query { source })?;
    tx.commit().await.map_err(|source| StorageError::Query { source })?;
    Ok(())
}

pub async fn get_messages(pool: &DbPool, session_key: &str) -> Result<Vec<SessionMessage>, StorageError> {
    sqlx::query_as(
        "SELECT id, session_key, role, content, created_at FROM session_messages WHERE session_key = ? ORDER BY id ASC",
    )
    .bind(session_key)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

/// Replace the stored summary and drop every message except the most
/// recent `keep_last`, inside one transaction. This is the compaction
/// write path.
pub async fn compact(
    pool: &DbPool,
    session_key: &str,
    new_summary: &str,
    keep_last: i64,
) -> Result<(), StorageError> {
    let mut tx = pool.begin().await.map_err(|source| StorageError::Query { source })?;

    sqlx::query(
        "DELETE FROM session_messages WHERE session_key = ? AND id NOT IN (
            SELECT id FROM session_messages WHERE session_key = ? ORDER BY id DESC LIMIT ?
        )",
    )
    .bind(session_key)
    .bind(session_key)
    .bind(keep_last)
    .execute(&mut *tx)
    .await
    .map_err(|source| StorageError::Query { source })?;

    sqlx::query("UPDATE sessions SET summary = ? WHERE session_key = ?")
        .bind(new_summary)
        .bind(session_key)
        .execute(&mut *tx)
        .await
        .map_err(|source| StorageError::Query { source })?;

    tx.commit().await.map_err(|source| StorageError::Query { source })?;
    Ok(())
}

pub async fn all_idle_candidates(pool: &DbPool) -> Result<Vec<Session>, StorageError> {
    sqlx::query_as("SELECT session_key, source, summary, message_count, last_activity_at, created_at FROM sessions")
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn delete(pool: &DbPool, session_key: &str) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM sessions WHERE session_key = ?")
        .bind(session_key)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(())
}
