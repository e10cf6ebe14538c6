// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Semantic Store
//!
//! Durable `SemanticStore` over the `memories` table from
//! `migrations/0002_memories.sql`.
//!
//! Candidate rows are narrowed in SQL by scope and a full-text prefilter;
//! the normalized filter tree and relevance scoring then run in process,
//! exactly as the in-memory store evaluates them.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::domain::backend::{BackendError, SemanticStore};
use crate::domain::filter::{BackendFilter, DEFAULT_SCOPE_KEY};
use crate::domain::search::MemoryHit;
use crate::infrastructure::memory_store::{split_memory, MemoryParts};
use crate::infrastructure::postgres_pattern_repository::to_or_query;
use crate::infrastructure::text_match::overlap_score;

pub struct PostgresSemanticStore {
    pool: PgPool,
    scope_key: String,
}

impl PostgresSemanticStore {
    pub fn new(pool: PgPool) -> Self {
        Self::with_scope_key(pool, DEFAULT_SCOPE_KEY)
    }

    pub fn with_scope_key(pool: PgPool, scope_key: impl Into<String>) -> Self {
        Self { pool, scope_key: scope_key.into() }
    }
}

struct MemoryRow {
    content: String,
    fields: Map<String, Value>,
    metadata: Map<String, Value>,
}

fn memory_from_row(row: &PgRow) -> Result<MemoryRow, BackendError> {
    let fields: Value = row.try_get("fields").map_err(database_failure)?;
    let metadata: Value = row.try_get("metadata").map_err(database_failure)?;
    Ok(MemoryRow {
        content: row.try_get("content").map_err(database_failure)?,
        fields: json_object(fields)?,
        metadata: json_object(metadata)?,
    })
}

fn json_object(value: Value) -> Result<Map<String, Value>, BackendError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(BackendError::InvalidResponse(format!("expected a JSON object, got {other}"))),
    }
}

fn database_failure(err: sqlx::Error) -> BackendError {
    match err {
        sqlx::Error::PoolTimedOut => BackendError::Timeout(0),
        sqlx::Error::Io(_) | sqlx::Error::PoolClosed => BackendError::Network(err.to_string()),
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::ColumnNotFound(_) | sqlx::Error::Decode(_) => {
            BackendError::InvalidResponse(err.to_string())
        }
        other => BackendError::Unavailable(other.to_string()),
    }
}

/// Score and order candidate rows the way the in-memory store does.
fn rank(query: &str, filter: &BackendFilter, rows: Vec<MemoryRow>, limit: usize) -> Vec<MemoryHit> {
    let mut hits: Vec<MemoryHit> = rows
        .into_iter()
        .filter(|r| filter.matches(&r.fields, &r.metadata))
        .filter_map(|r| {
            let score = overlap_score(query, &r.content);
            (score > 0.0).then(|| MemoryHit { content: r.content, score, metadata: r.metadata })
        })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.content.cmp(&b.content)));
    hits.truncate(limit);
    hits
}

#[async_trait]
impl SemanticStore for PostgresSemanticStore {
    async fn search(&self, query: &str, filter: &BackendFilter, limit: usize) -> Result<Vec<MemoryHit>, BackendError> {
        // Nothing scores without at least one searchable term.
        let Some(ts_query) = to_or_query(query) else {
            return Ok(Vec::new());
        };
        let scope = filter.scope_value(&self.scope_key);

        let rows = sqlx::query(
            r#"
            SELECT content, fields, metadata
            FROM memories
            WHERE ($1::text IS NULL OR scope_id = $1)
              AND to_tsvector('english', content) @@ to_tsquery('english', $2)
            ORDER BY created_at DESC
            "#,
        )
        .bind(scope)
        .bind(&ts_query)
        .fetch_all(&self.pool)
        .await
        .map_err(database_failure)?;

        let candidates = rows.iter().map(memory_from_row).collect::<Result<Vec<_>, _>>()?;
        debug!(candidates = candidates.len(), "Semantic store prefilter completed");
        Ok(rank(query, filter, candidates, limit))
    }

    async fn add(&self, text: &str, metadata: Map<String, Value>) -> Result<String, BackendError> {
        let MemoryParts { scope_id, fields, metadata } = split_memory(&self.scope_key, text, metadata)?;
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO memories (id, scope_id, content, fields, metadata, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(&id)
        .bind(&scope_id)
        .bind(text)
        .bind(Value::Object(fields))
        .bind(Value::Object(metadata))
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(database_failure)?;

        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        sqlx::query("DELETE FROM memories WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(database_failure)?;
        Ok(())
    }

    async fn count(&self, scope_id: &str) -> Result<usize, BackendError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM memories WHERE scope_id = $1")
            .bind(scope_id)
            .fetch_one(&self.pool)
            .await
            .map_err(database_failure)?;
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::filter::{FilterExpr, FilterTreeBuilder};
    use serde_json::json;

    fn row(content: &str, fields: Value, metadata: Value) -> MemoryRow {
        MemoryRow {
            content: content.to_string(),
            fields: fields.as_object().cloned().unwrap_or_default(),
            metadata: metadata.as_object().cloned().unwrap_or_default(),
        }
    }

    #[test]
    fn test_rank_applies_filter_tree_to_candidates() {
        let filter = FilterTreeBuilder::default()
            .normalize(Some(&FilterExpr::eq("category", "openings")), "alice")
            .unwrap();
        assert_eq!(filter.scope_value("user_id"), Some("alice"));

        let rows = vec![
            row("Open with a hook", json!({ "user_id": "alice" }), json!({ "category": "openings" })),
            row("A hook for the subject line", json!({ "user_id": "alice" }), json!({ "category": "email" })),
            row("Hook and hook again", json!({ "user_id": "bob" }), json!({ "category": "openings" })),
            row("Unrelated closing note", json!({ "user_id": "alice" }), json!({ "category": "openings" })),
        ];

        let hits = rank("hook", &filter, rows, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Open with a hook");
        assert_eq!(hits[0].metadata.get("category"), Some(&json!("openings")));
    }

    #[test]
    fn test_rank_truncates_to_limit() {
        let filter = FilterTreeBuilder::default().normalize(None, "alice").unwrap();
        let rows = (0..5)
            .map(|i| row(&format!("hook number {i}"), json!({ "user_id": "alice" }), json!({})))
            .collect();
        assert_eq!(rank("hook", &filter, rows, 2).len(), 2);
    }

    #[test]
    fn test_database_failures_map_to_backend_errors() {
        assert_eq!(database_failure(sqlx::Error::PoolTimedOut), BackendError::Timeout(0));
        assert!(database_failure(sqlx::Error::PoolClosed).is_transient());
        assert!(matches!(database_failure(sqlx::Error::RowNotFound), BackendError::Unavailable(_)));
    }

    #[test]
    fn test_non_object_json_is_invalid() {
        assert!(matches!(json_object(json!([1, 2])), Err(BackendError::InvalidResponse(_))));
    }
}
