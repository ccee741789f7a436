//! CRUD for incidents (operator-logged or pattern-detector-raised),
//! retrieved by the context engine via the same embedding-similarity
//! mechanism as the knowledge base.

use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::knowledge::{cosine_similarity, decode_embedding, encode_embedding};
use crate::storage::DbPool;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct IncidentRow {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub severity: String,
    pub embedding: Option<Vec<u8>>,
}

pub async fn insert(
    pool: &DbPool,
    title: &str,
    summary: &str,
    severity: &str,
    embedding: Option<&[f32]>,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO incidents (id, title, summary, severity, embedding) VALUES (?, ?, ?, ?, ?)")
        .bind(&id)
        .bind(title)
        .bind(summary)
        .bind(severity)
        .bind(embedding.map(encode_embedding))
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

/// List rows, most recently created first — used by the admin API.
pub async fn list_recent(pool: &DbPool, limit: i64) -> Result<Vec<IncidentRow>, StorageError> {
    sqlx::query_as("SELECT id, title, summary, severity, embedding FROM incidents ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn most_similar(
    pool: &DbPool,
    query_vec: &[f32],
    limit: usize,
) -> Result<Vec<(IncidentRow, f32)>, StorageError> {
    let rows: Vec<IncidentRow> =
        sqlx::query_as("SELECT id, title, summary, severity, embedding FROM incidents")
            .fetch_all(pool)
            .await
            .map_err(|source| StorageError::Query { source })?;

    let mut scored: Vec<(IncidentRow, f32)> = rows
        .into_iter()
        .map(|row| {
            let score = row
                .embedding
                .as_ref()
                .map(|bytes| cosine_similarity(query_vec, &decode_embedding(bytes)))
                .unwrap_or(0.0);
            (row, score)
        })
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    Ok(scored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn insert_and_retrieve_by_similarity() {
        let pool = init_test_db().await.unwrap();
        insert(&pool, "outage", "db down", "critical", Some(&[1.0, 0.0]))
            .await
            .unwrap();
        let results = most_similar(&pool, &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0.title, "outage");
    }
}
