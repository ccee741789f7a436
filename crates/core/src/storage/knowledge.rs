//! CRUD and similarity search over the knowledge base.
//!
//! Per-row embeddings are stored as little-endian `f32` BLOBs rather than
//! via a dedicated vector database (see the "no general-purpose vector
//! database" non-goal): similarity is computed in Rust over the active
//! rows, which is the idiomatic single-binary answer at the scale this
//! agent operates at.

use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::DbPool;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct KnowledgeRow {
    pub id: String,
    pub title: String,
    pub content: String,
    pub embedding: Option<Vec<u8>>,
}

pub fn encode_embedding(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

pub async fn insert(
    pool: &DbPool,
    title: &str,
    content: &str,
    embedding: Option<&[f32]>,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO knowledge (id, title, content, embedding, active) VALUES (?, ?, ?, ?, 1)")
        .bind(&id)
        .bind(title)
        .bind(content)
        .bind(embedding.map(encode_embedding))
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

/// List active rows, most recently created first — used by the admin API
/// rather than the context engine's similarity retrieval.
pub async fn list_active(pool: &DbPool, limit: i64) -> Result<Vec<KnowledgeRow>, StorageError> {
    sqlx::query_as("SELECT id, title, content, embedding FROM knowledge WHERE active = 1 ORDER BY created_at DESC LIMIT ?")
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

/// Fetch the top `limit` active rows by cosine similarity to `query_vec`.
pub async fn most_similar(
    pool: &DbPool,
    query_vec: &[f32],
    limit: usize,
) -> Result<Vec<(KnowledgeRow, f32)>, StorageError> {
    let rows: Vec<KnowledgeRow> =
        sqlx::query_as("SELECT id, title, content, embedding FROM knowledge WHERE active = 1")
            .fetch_all(pool)
            .await
            .map_err(|source| StorageError::Query { source })?;

    let mut scored: Vec<(KnowledgeRow, f32)> = rows
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
