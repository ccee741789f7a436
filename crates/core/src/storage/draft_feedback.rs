//! Records operator edits to drafts as a learning signal, grounded on
//! the reference `feedback/tracker.py`'s `track_edit` and
//! `feedback/analyzer.py`'s `analyze_edit_patterns`.

use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::DbPool;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct EditPattern {
    pub sender_domain: String,
    pub category: String,
    pub edit_count: i64,
    pub avg_edit_ratio: f64,
}

/// `sender_domain`/`category` are empty strings, not NULL, when unknown —
/// the `draft_feedback` columns are `NOT NULL DEFAULT ''`.
pub async fn insert(
    pool: &DbPool,
    draft_id: &str,
    sender_domain: &str,
    category: &str,
    edit_distance: i64,
    edit_ratio: f64,
    original_length: i64,
    edited_length: i64,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO draft_feedback
            (id, draft_id, sender_domain, category, edit_distance, edit_ratio, original_length, edited_length)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&id)
    .bind(draft_id)
    .bind(sender_domain)
    .bind(category)
    .bind(edit_distance)
    .bind(edit_ratio)
    .bind(original_length)
    .bind(edited_length)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

/// Groups edits by `(sender_domain, category)`, surfacing pairs the agent
/// is consistently getting corrected on: at least `min_edits` edits and
/// an average edit ratio above 0.1 (a handful of one-word tweaks isn't a
/// pattern worth a rule).
pub async fn analyze_edit_patterns(pool: &DbPool, min_edits: i64) -> Result<Vec<EditPattern>, StorageError> {
    sqlx::query_as(
        "SELECT sender_domain, category, COUNT(*) as edit_count, AVG(edit_ratio) as avg_edit_ratio
         FROM draft_feedback
         GROUP BY sender_domain, category
         HAVING COUNT(*) >= ? AND AVG(edit_ratio) > 0.1
         ORDER BY avg_edit_ratio DESC",
    )
    .bind(min_edits)
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn insert_persists_one_row() {
        let pool = init_test_db().await.unwrap();
        insert(&pool, "draft_1", "example.com", "mail", 12, 0.3, 40, 45).await.unwrap();
        let rows: Vec<(String,)> = sqlx::query_as("SELECT draft_id FROM draft_feedback").fetch_all(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn analyze_edit_patterns_requires_min_edits_and_ratio() {
        let pool = init_test_db().await.unwrap();
        for _ in 0..4 {
            insert(&pool, "draft_1", "example.com", "mail", 30, 0.3, 100, 100).await.unwrap();
        }
        // Below min_edits threshold of 5.
        assert!(analyze_edit_patterns(&pool, 5).await.unwrap().is_empty());

        insert(&pool, "draft_1", "example.com", "mail", 30, 0.3, 100, 100).await.unwrap();
        let patterns = analyze_edit_patterns(&pool, 5).await.unwrap();
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].sender_domain, "example.com");
        assert_eq!(patterns[0].edit_count, 5);
    }

    #[tokio::test]
    async fn analyze_edit_patterns_excludes_low_ratio_edits() {
        let pool = init_test_db().await.unwrap();
        for _ in 0..6 {
            insert(&pool, "draft_1", "example.com", "mail", 1, 0.02, 100, 100).await.unwrap();
        }
        assert!(analyze_edit_patterns(&pool, 5).await.unwrap().is_empty());
    }
}
