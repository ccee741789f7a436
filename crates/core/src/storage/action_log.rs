//! Append-only audit trail of tool invocations made while processing an
//! event, keyed by a correlation id shared across every action taken
//! within one `reason_and_act` turn.

use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::DbPool;

#[allow(clippy::too_many_arguments)]
pub async fn record(
    pool: &DbPool,
    event_id: &str,
    tool_name: &str,
    params: &Value,
    result: &Value,
    correlation_id: &str,
    elapsed_ms: i64,
    outcome: &str,
    model_used: &str,
    input_tokens: i64,
    output_tokens: i64,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO action_log (id, event_id, tool_name, params, result, correlation_id, elapsed_ms, outcome, model_used, input_tokens, output_tokens)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(event_id)
    .bind(tool_name)
    .bind(params.to_string())
    .bind(result.to_string())
    .bind(correlation_id)
    .bind(elapsed_ms)
    .bind(outcome)
    .bind(model_used)
    .bind(input_tokens)
    .bind(output_tokens)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

/// Most recent action across all events, for the admin status summary.
pub async fn most_recent(pool: &DbPool) -> Result<Option<(String, String)>, StorageError> {
    let row: Option<(String, String)> = sqlx::query_as(
        "SELECT tool_name, created_at FROM action_log ORDER BY created_at DESC LIMIT 1",
    )
    .fetch_optional(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(row)
}

/// Average elapsed milliseconds across every recorded action, used by the
/// admin response-time analytic.
pub async fn average_elapsed_ms(pool: &DbPool) -> Result<Option<f64>, StorageError> {
    let row: (Option<f64>,) = sqlx::query_as("SELECT AVG(elapsed_ms) FROM action_log")
        .fetch_one(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(row.0)
}

pub async fn for_event(pool: &DbPool, event_id: &str) -> Result<Vec<(String, i64)>, StorageError> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT tool_name, elapsed_ms FROM action_log WHERE event_id = ? ORDER BY created_at ASC",
    )
    .bind(event_id)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn record_and_list_for_event() {
        let pool = init_test_db().await.unwrap();
        record(
            &pool,
            "evt_1",
            "send_reply",
            &serde_json::json!({"to": "a@b.com"}),
            &serde_json::json!({"ok": true}),
            "corr-1",
            42,
            "success",
            "gemini-flash",
            120,
            45,
        )
        .await
        .unwrap();
        let entries = for_event(&pool, "evt_1").await.unwrap();
        assert_eq!(entries, vec![("send_reply".to_string(), 42)]);

        let row: (String, String, i64, i64) = sqlx::query_as(
            "SELECT outcome, model_used, input_tokens, output_tokens FROM action_log WHERE event_id = ?",
        )
        .bind("evt_1")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(row, ("success".to_string(), "gemini-flash".to_string(), 120, 45));
    }
}
