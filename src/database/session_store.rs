//! Session store (§4.7): the PostgreSQL-backed [`StorageBackend`] every
//! server worker shares, keyed by `planner-<session_id>`,
//! `followup:<session_id>`, and `rl_update:<session_id>`.
//!
//! A flat `key -> JSONB` upsert table: no category axis, only atomic
//! set/get/delete against a single namespace-prefixed key.

use async_trait::async_trait;
use sqlx::postgres::PgPool;

use crate::core::storage::StorageBackend;
use crate::error::Result;

/// Key prefix for a deep-search [`crate::domain::PlannerSession`].
pub fn planner_key(session_id: &str) -> String {
    format!("planner-{session_id}")
}

/// Key prefix for a pending follow-up answer awaited by a suspended DAG walk.
pub fn followup_key(session_id: &str) -> String {
    format!("followup:{session_id}")
}

/// Key prefix for a pending [`crate::domain::RlRecord`] awaiting a human rating.
pub fn rl_update_key(session_id: &str) -> String {
    format!("rl_update:{session_id}")
}

/// Key prefix for a session's materialized [`crate::domain::KnowledgeGraphNode`] list.
pub fn graph_key(session_id: &str) -> String {
    format!("graph:{session_id}")
}

/// PostgreSQL-backed session store. Atomic set/delete only; no
/// transactions or cross-key consistency are offered or needed, since
/// every key family is read and written by exactly one session at a time.
#[derive(Clone)]
pub struct PostgresSessionStore {
    pool: PgPool,
}

impl PostgresSessionStore {
    pub fn new(pool: PgPool) -> Self {
        PostgresSessionStore { pool }
    }
}

#[async_trait]
impl StorageBackend for PostgresSessionStore {
    fn id(&self) -> &str {
        "postgres-session-store"
    }

    async fn set_json(&self, key: &str, value: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO session_store (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_json(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row: Option<(serde_json::Value,)> =
            sqlx::query_as("SELECT value FROM session_store WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(v,)| v))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM session_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let row: Option<(i32,)> = sqlx::query_as("SELECT 1 FROM session_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{prefix}%");
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT key FROM session_store WHERE key LIKE $1")
                .bind(pattern)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(k,)| k).collect())
    }

    async fn health_check(&self) -> Result<bool> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_prefixes_match_the_documented_families() {
        assert_eq!(planner_key("abc"), "planner-abc");
        assert_eq!(followup_key("abc"), "followup:abc");
        assert_eq!(rl_update_key("abc"), "rl_update:abc");
        assert_eq!(graph_key("abc"), "graph:abc");
    }
}
