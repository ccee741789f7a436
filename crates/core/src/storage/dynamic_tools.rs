//! CRUD for operator-defined dynamic tools: a name, a JSON-schema
//! description, and a sandboxed script body, loaded by the tool registry
//! alongside built-ins and external MCP-server tools.

use serde_json::Value;

use crate::error::StorageError;
use crate::storage::DbPool;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DynamicToolRow {
    pub name: String,
    pub description: String,
    pub parameters_schema: String,
    pub script_body: String,
    pub enabled: bool,
}

pub async fn upsert(
    pool: &DbPool,
    name: &str,
    description: &str,
    parameters_schema: &Value,
    script_body: &str,
) -> Result<(), StorageError> {
    sqlx::query(
        "INSERT INTO dynamic_tools (name, description, parameters_schema, script_body, enabled)
         VALUES (?, ?, ?, ?, 1)
         ON CONFLICT(name) DO UPDATE SET
            description = excluded.description,
            parameters_schema = excluded.parameters_schema,
            script_body = excluded.script_body",
    )
    .bind(name)
    .bind(description)
    .bind(parameters_schema.to_string())
    .bind(script_body)
    .execute(pool)
    .await
    .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

pub async fn get_enabled(pool: &DbPool) -> Result<Vec<DynamicToolRow>, StorageError> {
    sqlx::query_as(
        "SELECT name, description, parameters_schema, script_body, enabled FROM dynamic_tools WHERE enabled = 1",
    )
    .fetch_all(pool)
    .await
    .map_err(|source| StorageError::Query { source })
}

pub async fn get_by_name(pool: &DbPool, name: &str) -> Result<Option<DynamicToolRow>, StorageError> {
    sqlx::query_as("SELECT name, description, parameters_schema, script_body, enabled FROM dynamic_tools WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .map_err(|source| StorageError::Query { source })
}

pub async fn set_enabled(pool: &DbPool, name: &str, enabled: bool) -> Result<(), StorageError> {
    sqlx::query("UPDATE dynamic_tools SET enabled = ? WHERE name = ?")
        .bind(enabled)
        .bind(name)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

pub async fn delete(pool: &DbPool, name: &str) -> Result<(), StorageError> {
    sqlx::query("DELETE FROM dynamic_tools WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await
        .map_err(|source| StorageError::Query { source })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::init_test_db;

    #[tokio::test]
    async fn upsert_and_disable_roundtrip() {
        let pool = init_test_db().await.unwrap();
        upsert(
            &pool,
            "lookup_order",
            "Looks up an order by id",
            &serde_json::json!({"type": "object", "properties": {"order_id": {"type": "string"}}}),
            "function run(params) return { found = false } end",
        )
        .await
        .unwrap();
        assert_eq!(get_enabled(&pool).await.unwrap().len(), 1);

        set_enabled(&pool, "lookup_order", false).await.unwrap();
        assert_eq!(get_enabled(&pool).await.unwrap().len(), 0);
        assert!(get_by_name(&pool, "lookup_order").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn upsert_is_idempotent_on_name() {
        let pool = init_test_db().await.unwrap();
        upsert(&pool, "t1", "v1", &serde_json::json!({}), "function run(p) end").await.unwrap();
        upsert(&pool, "t1", "v2", &serde_json::json!({}), "function run(p) end").await.unwrap();
        let rows = get_enabled(&pool).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].description, "v2");
    }
}
