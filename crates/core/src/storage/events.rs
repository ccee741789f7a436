//! CRUD for the durable `events` table. This is the system of record the
//! KV sorted-set queue is checked against on dual-write; `publish` inserts
//! here and into KV inside the same logical operation, `ack`/`nack` update
//! status here.

use serde_json::Value;

use crate::error::StorageError;
use crate::model::{Event, EventStatus};
use crate::storage::DbPool;

pub async fn insert(pool: &DbPool, event: &Event) -> Result<(), StorageError> {
    // A non-empty idempotency key must not collide with an existing row;
    // SQLite has no partial unique index with a `!=` predicate, so the
    // check is explicit and happens in the same connection as the insert.
    if !event.idempotency_key.as_deref().unwrap_or("").is_empty() {
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM events WHERE idempotency_key = ? LIMIT 1",
        )
        .bind(event.idempotency_key.as_deref().unwrap_or(""))
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
        if existing.is_some() {
            return Ok(());
        }
    }

    sqlx::query(
        "INSERT INTO events (id, source, event_type, payload, priority, idempotency_key, status, retry_count, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&event.id)
    .bind(&event.source)
    .bind(&event.event_type)
    .bind(event.payload.to_string())
    .bind(event.priority)
    .bind(event.idempotency_key.as_deref().unwrap_or(""))
    .bind(&event.status)
    .bind(event.retry_count)
    .bind(event.created_at)
    .bind(event.updated_at)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    Ok(())
}

pub async fn get(pool: &DbPool, id: &str) -> Result<Option<Event>, StorageError> {
    let row: Option<EventRow> = sqlx::query_as(
        "SELECT id, source, event_type, payload, priority, idempotency_key, status, retry_count, created_at, updated_at
         FROM events WHERE id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    Ok(row.map(Into::into))
}

pub async fn update_status(
    pool: &DbPool,
    id: &str,
    status: EventStatus,
    retry_count: i32,
) -> Result<(), StorageError> {
    sqlx::query(
        "UPDATE events SET status = ?, retry_count = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?",
    )
    .bind(status_str(status))
    .bind(retry_count)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

pub fn status_str(status: EventStatus) -> &'static str {
    match status {
        EventStatus::Pending => "pending",
        EventStatus::Processing => "processing",
        EventStatus::Completed => "completed",
        EventStatus::Failed => "failed",
        EventStatus::DeadLettered => "dead_lettered",
    }
}

/// Count events of `(source, event_type)` created within the trailing
/// `window_seconds`, used by the pattern detector's spike check.
pub async fn count_recent_by_source_and_type(
    pool: &DbPool,
    source: &str,
    event_type: &str,
    window_seconds: i64,
) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM events
         WHERE source = ? AND event_type = ?
           AND created_at >= datetime('now', printf('-%d seconds', ?))",
    )
    .bind(source)
    .bind(event_type)
    .bind(window_seconds)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(row.0)
}

/// Distinct `(source, event_type)` pairs seen within the trailing
/// `window_seconds`, the candidate set the pattern detector sweeps over.
pub async fn distinct_source_event_types(
    pool: &DbPool,
    window_seconds: i64,
) -> Result<Vec<(String, String)>, StorageError> {
    let rows: Vec<(String, String)> = sqlx::query_as(
        "SELECT DISTINCT source, event_type FROM events
         WHERE created_at >= datetime('now', printf('-%d seconds', ?))",
    )
    .bind(window_seconds)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(rows)
}

/// Total and failed event counts for a source within the trailing
/// `window_seconds`, used by the hourly error-rate spike check.
pub async fn failure_counts_recent(
    pool: &DbPool,
    source: &str,
    window_seconds: i64,
) -> Result<(i64, i64), StorageError> {
    let row: (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COALESCE(SUM(CASE WHEN status IN ('failed', 'dead_lettered') THEN 1 ELSE 0 END), 0)
         FROM events
         WHERE source = ? AND created_at >= datetime('now', printf('-%d seconds', ?))",
    )
    .bind(source)
    .bind(window_seconds)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(row)
}

/// Count of `source`-originated events within the trailing `window_seconds`
/// whose payload looks like a negative review/survey response — a
/// `stars`/`rating` field at or below 2, or a `sentiment` field of
/// `"negative"`. Used by the pattern detector's review-spike check; the
/// `events` table has no typed rating column, so this reaches into the
/// opaque JSON payload with SQLite's `json_extract`.
pub async fn count_recent_negative(
    pool: &DbPool,
    source: &str,
    window_seconds: i64,
) -> Result<i64, StorageError> {
    let row: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM events
         WHERE source = ?
           AND created_at >= datetime('now', printf('-%d seconds', ?))
           AND (
             CAST(json_extract(payload, '$.stars') AS REAL) <= 2
             OR CAST(json_extract(payload, '$.rating') AS REAL) <= 2
             OR json_extract(payload, '$.sentiment') = 'negative'
           )",
    )
    .bind(source)
    .bind(window_seconds)
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(row.0)
}

/// Event volume per calendar day over the trailing `lookback_days`,
/// used as a cost-volume proxy by the admin daily-costs analytic (this
/// system doesn't meter per-call token cost, only tool-call latency).
pub async fn daily_counts(pool: &DbPool, lookback_days: i64) -> Result<Vec<(String, i64)>, StorageError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT date(created_at) AS day, COUNT(*) FROM events
         WHERE created_at >= datetime('now', printf('-%d days', ?))
         GROUP BY day ORDER BY day ASC",
    )
    .bind(lookback_days)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(rows)
}

/// Events of the same `(source, event_type)` within a lookback window,
/// excluding the given event id — used by the context engine's
/// "related events" retrieval.
pub async fn related(
    pool: &DbPool,
    source: &str,
    event_type: &str,
    exclude_id: &str,
    lookback_hours: i64,
    limit: i64,
) -> Result<Vec<Event>, StorageError> {
    let rows: Vec<EventRow> = sqlx::query_as(
        "SELECT id, source, event_type, payload, priority, idempotency_key, status, retry_count, created_at, updated_at
         FROM events
         WHERE source = ? AND event_type = ? AND id != ?
           AND created_at >= datetime('now', printf('-%d hours', ?))
         ORDER BY created_at DESC
         LIMIT ?",
    )
    .bind(source)
    .bind(event_type)
    .bind(exclude_id)
    .bind(lookback_hours)
    .bind(limit)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;

    Ok(rows.into_iter().map(Into::into).collect())
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    source: String,
    event_type: String,
    payload: String,
    priority: i32,
    idempotency_key: String,
    status: String,
    retry_count: i32,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Event {
            id: row.id,
            source: row.source,
            event_type: row.event_type,
            payload: serde_json::from_str::<Value>(&row.payload).unwrap_or(Value::Null),
            priority: row.priority,
            idempotency_key: if row.idempotency_key.is_empty() {
                None
            } else {
                Some(row.idempotency_key)
            },
            status: row.status,
            retry_count: row.retry_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}
