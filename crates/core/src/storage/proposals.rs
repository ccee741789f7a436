//! CRUD for proposed learning artifacts awaiting approval: a rule to
//! adopt, a tool or automation to activate, a guardrail exception, a
//! threshold correction. Approval execution dispatches on
//! `proposal_type` via `ops_core::approvals::ApprovalService::execute_approval`.

use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::DbPool;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, sqlx::FromRow)]
pub struct ProposalRow {
    pub id: String,
    pub event_id: String,
    pub proposal_type: String,
    pub params: String,
    pub reason: String,
    pub status: String,
}

pub async fn enqueue(
    pool: &DbPool,
    event_id: &str,
    proposal_type: &str,
    params: &Value,
    reason: &str,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO proposals (id, event_id, proposal_type, params, reason, status) VALUES (?, ?, ?, ?, ?, 'pending')",
    )
    .bind(&id)
    .bind(event_id)
    .bind(proposal_type)
    .bind(params.to_string())
    .bind(reason)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

pub async fn get_pending(pool: &DbPool) -> Result<Vec<ProposalRow>, StorageError> {
    sqlx::query_as("SELECT id, event_id, proposal_type, params, reason, status FROM proposals WHERE status = 'pending' ORDER BY created_at ASC")
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn get_by_id(pool: &DbPool, id: &str) -> Result<Option<ProposalRow>, StorageError> {
    sqlx::query_as("SELECT id, event_id, proposal_type, params, reason, status FROM proposals WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn update_status(pool: &DbPool, id: &str, status: &str) -> Result<(), StorageError> {
    sqlx::query("UPDATE proposals SET status = ?, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?")
        .bind(status)
        .bind(id)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

/// Counts of approved vs. rejected proposals, for the admin
/// approval-rate analytic.
pub async fn approval_counts(pool: &DbPool) -> Result<(i64, i64), StorageError> {
    let row: (i64, i64) = sqlx::query_as(
        "SELECT COALESCE(SUM(CASE WHEN status = 'approved' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN status = 'rejected' THEN 1 ELSE 0 END), 0)
         FROM proposals",
    )
    .fetch_one(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(row)
}

pub async fn expire_stale(pool: &DbPool, hours: i64) -> Result<u64, StorageError> {
    let result = sqlx::query(
        "UPDATE proposals SET status = 'expired', updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE status = 'pending' AND created_at < datetime('now', printf('-%d hours', ?))",
    )
    .bind(hours)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn enqueue_and_reject_flow() {
        let pool = init_test_db().await.unwrap();
        let id = enqueue(
            &pool,
            "evt_1",
            "tool_creation",
            &serde_json::json!({"name": "weather_lookup", "code": "function run(params) end"}),
            "classified as complex billing dispute",
        )
        .await
        .unwrap();
        assert_eq!(get_pending(&pool).await.unwrap().len(), 1);
        update_status(&pool, &id, "rejected").await.unwrap();
        assert_eq!(get_pending(&pool).await.unwrap().len(), 0);
        assert_eq!(get_by_id(&pool, &id).await.unwrap().unwrap().status, "rejected");
    }
}
