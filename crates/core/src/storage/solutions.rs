//! CRUD for solutions: approved `tool_creation`/`automation` proposals
//! activated into a running capability, grounded on the reference
//! `solutions/factory.py`'s `activate_tool`/`activate_automation`.

use serde_json::Value;
use uuid::Uuid;

use crate::error::StorageError;
use crate::storage::DbPool;

#[derive(Debug, Clone, serde::Serialize, sqlx::FromRow)]
pub struct SolutionRow {
    pub id: String,
    pub name: String,
    pub description: String,
    pub solution_type: String,
    pub code: Option<String>,
    pub config: Option<String>,
    pub status: String,
    pub active: bool,
}

/// Records an approved `tool_creation` proposal as an active solution.
/// The dynamic tool itself is registered separately via
/// `storage::dynamic_tools::upsert`.
pub async fn insert_tool(pool: &DbPool, name: &str, description: &str, code: &str, approved_by: &str) -> Result<String, StorageError> {
    insert(pool, name, description, "tool", Some(code), None, approved_by).await
}

/// Records an approved `automation` proposal, with the trigger
/// configuration folded into the `config` JSON column rather than a
/// separate trigger table.
pub async fn insert_automation(
    pool: &DbPool,
    name: &str,
    description: &str,
    code: Option<&str>,
    config: &Value,
    approved_by: &str,
) -> Result<String, StorageError> {
    insert(pool, name, description, "automation", code, Some(&config.to_string()), approved_by).await
}

async fn insert(
    pool: &DbPool,
    name: &str,
    description: &str,
    solution_type: &str,
    code: Option<&str>,
    config: Option<&str>,
    approved_by: &str,
) -> Result<String, StorageError> {
    let id = Uuid::new_v4().to_string();
    sqlx::query(
        "INSERT INTO solutions (id, name, description, solution_type, code, config, status, active, approved_at, approved_by)
         VALUES (?, ?, ?, ?, ?, ?, 'active', 1, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'), ?)",
    )
    .bind(&id)
    .bind(name)
    .bind(description)
    .bind(solution_type)
    .bind(code)
    .bind(config)
    .bind(approved_by)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(id)
}

pub async fn list_active(pool: &DbPool) -> Result<Vec<SolutionRow>, StorageError> {
    sqlx::query_as(
        "SELECT id, name, description, solution_type, code, config, status, active
         FROM solutions WHERE active = 1 ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}
