//! Adaptive per-`(source, event_type, day_of_week, hour)` baselines used
//! by the pattern detector's spike check.

use crate::error::StorageError;
use crate::model::Baseline;
use crate::storage::DbPool;

pub async fn get(
    pool: &DbPool,
    source: &str,
    event_type: &str,
    day_of_week: i32,
    hour: i32,
) -> Result<Option<Baseline>, StorageError> {
    sqlx::query_as(
        "SELECT source, event_type, day_of_week, hour, mean, stddev, sample_count, updated_at
         FROM baselines WHERE source = ? AND event_type = ? AND day_of_week = ? AND hour = ?",
    )
    .bind(source)
    .bind(event_type)
    .bind(day_of_week)
    .bind(hour)
    .fetch_optional(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

pub async fn upsert(pool: &DbPool, baseline: &Baseline) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO baselines (source, event_type, day_of_week, hour, mean, stddev, sample_count, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
         ON CONFLICT(source, event_type, day_of_week, hour)
         DO UPDATE SET mean = excluded.mean, stddev = excluded.stddev, sample_count = excluded.sample_count,
                        updated_at = excluded.updated_at",
    )
    .bind(&baseline.source)
    .bind(&baseline.event_type)
    .bind(baseline.day_of_week)
    .bind(baseline.hour)
    .bind(baseline.mean)
    .bind(baseline.stddev)
    .bind(baseline.sample_count)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

/// Historical per-day counts for a `(source, event_type, hour)` bucket
/// over the trailing `lookback_days`, used to recompute mean/stddev.
pub async fn historical_daily_counts(
    pool: &DbPool,
    source: &str,
    event_type: &str,
    hour: i32,
    lookback_days: i64,
) -> Result<Vec<i64>, StorageError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT COUNT(*) FROM events
         WHERE source = ? AND event_type = ?
           AND CAST(strftime('%H', created_at) AS INTEGER) = ?
           AND created_at >= datetime('now', printf('-%d days', ?))
         GROUP BY date(created_at)",
    )
    .bind(source)
    .bind(event_type)
    .bind(hour)
    .bind(lookback_days)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(rows.into_iter().map(|(c,)| c).collect())
}
