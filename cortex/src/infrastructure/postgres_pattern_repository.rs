// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # PostgreSQL Pattern Repository
//!
//! Production `PatternRepository`, `AuditLog` and `ReviewHistory` backed by
//! the tables in `migrations/0001_patterns.sql`.
//!
//! Every pattern write runs in one transaction together with its audit rows.
//! Updates are guarded by the `version` column: a save whose version no
//! longer matches the stored row fails with `VersionConflict` and changes
//! nothing.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Postgres, Row, Transaction};

use crate::domain::events::{AuditBatch, ConfidenceTransition, GrowthEvent, GrowthEventType};
use crate::domain::pattern::{Confidence, Pattern, PatternId};
use crate::domain::repository::{AuditLog, PatternRepository, RepositoryError, ReviewHistory};
use crate::domain::review::ReviewHistoryEntry;

const PATTERN_COLUMNS: &str = r#"
    id, name, topic, confidence, pattern_text, evidence, anti_patterns,
    use_count, consecutive_failures, applicable_content_types,
    date_added, date_updated, version
"#;

pub struct PostgresPatternRepository {
    pool: PgPool,
}

impl PostgresPatternRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn append_audit(tx: &mut Transaction<'_, Postgres>, audit: &AuditBatch) -> Result<(), RepositoryError> {
        for t in &audit.transitions {
            sqlx::query(
                r#"
                INSERT INTO confidence_transitions (
                    pattern_id, pattern_name, pattern_topic, from_confidence,
                    to_confidence, use_count, reason, transition_date
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(t.pattern_id.0)
            .bind(&t.pattern_name)
            .bind(&t.pattern_topic)
            .bind(t.from_confidence.as_str())
            .bind(t.to_confidence.as_str())
            .bind(t.use_count as i32)
            .bind(&t.reason)
            .bind(t.transition_date)
            .execute(&mut **tx)
            .await?;
        }
        for e in &audit.events {
            insert_event(&mut **tx, e).await?;
        }
        Ok(())
    }
}

async fn insert_event<'e, E>(executor: E, event: &GrowthEvent) -> Result<(), RepositoryError>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(
        r#"
        INSERT INTO growth_events (event_type, event_date, pattern_name, pattern_topic, details)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event.event_type.as_str())
    .bind(event.event_date)
    .bind(&event.pattern_name)
    .bind(&event.pattern_topic)
    .bind(Value::Object(event.details.clone()))
    .execute(executor)
    .await?;
    Ok(())
}

fn parse_confidence(value: &str) -> Result<Confidence, RepositoryError> {
    value.parse().map_err(RepositoryError::Serialization)
}

fn pattern_from_row(row: &PgRow) -> Result<Pattern, RepositoryError> {
    let confidence: String = row.try_get("confidence")?;
    let evidence: Value = row.try_get("evidence")?;
    let anti_patterns: Value = row.try_get("anti_patterns")?;
    let content_types: Option<Value> = row.try_get("applicable_content_types")?;
    let use_count: i32 = row.try_get("use_count")?;
    let consecutive_failures: i32 = row.try_get("consecutive_failures")?;
    let date_added: NaiveDate = row.try_get("date_added")?;
    let date_updated: NaiveDate = row.try_get("date_updated")?;

    Ok(Pattern {
        id: PatternId(row.try_get("id")?),
        name: row.try_get("name")?,
        topic: row.try_get("topic")?,
        confidence: parse_confidence(&confidence)?,
        pattern_text: row.try_get("pattern_text")?,
        evidence: serde_json::from_value(evidence)?,
        anti_patterns: serde_json::from_value(anti_patterns)?,
        use_count: use_count.max(0) as u32,
        consecutive_failures: consecutive_failures.max(0) as u32,
        applicable_content_types: content_types.map(serde_json::from_value).transpose()?,
        date_added,
        date_updated,
        version: row.try_get("version")?,
    })
}

fn content_types_json(pattern: &Pattern) -> Result<Option<Value>, RepositoryError> {
    Ok(pattern.applicable_content_types.as_ref().map(serde_json::to_value).transpose()?)
}

/// `"hook, lead!"` -> `"hook | lead"`, or `None` when nothing searchable remains.
pub(crate) fn to_or_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(str::to_lowercase)
        .collect();
    (!terms.is_empty()).then(|| terms.join(" | "))
}

#[async_trait]
impl PatternRepository for PostgresPatternRepository {
    async fn insert(&self, pattern: &Pattern, audit: &AuditBatch) -> Result<Pattern, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO patterns (
                id, name, topic, confidence, pattern_text, evidence, anti_patterns,
                use_count, consecutive_failures, applicable_content_types,
                date_added, date_updated, version
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 1)
            RETURNING {PATTERN_COLUMNS}
            "#
        ))
        .bind(pattern.id.0)
        .bind(&pattern.name)
        .bind(&pattern.topic)
        .bind(pattern.confidence.as_str())
        .bind(&pattern.pattern_text)
        .bind(serde_json::to_value(&pattern.evidence)?)
        .bind(serde_json::to_value(&pattern.anti_patterns)?)
        .bind(pattern.use_count as i32)
        .bind(pattern.consecutive_failures as i32)
        .bind(content_types_json(pattern)?)
        .bind(pattern.date_added)
        .bind(pattern.date_updated)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| match RepositoryError::from(e) {
            RepositoryError::Conflict(_) => RepositoryError::Conflict(pattern.name.clone()),
            other => other,
        })?;

        let stored = pattern_from_row(&row)?;
        Self::append_audit(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn find_by_id(&self, id: PatternId) -> Result<Option<Pattern>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pattern_from_row).transpose()
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Pattern>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {PATTERN_COLUMNS} FROM patterns WHERE lower(name) = lower($1)"))
            .bind(name.trim())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(pattern_from_row).transpose()
    }

    async fn save(&self, pattern: &Pattern, audit: &AuditBatch) -> Result<Pattern, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE patterns SET
                name = $3,
                topic = $4,
                confidence = $5,
                pattern_text = $6,
                evidence = $7,
                anti_patterns = $8,
                use_count = $9,
                consecutive_failures = $10,
                applicable_content_types = $11,
                date_updated = $12,
                version = version + 1
            WHERE id = $1 AND version = $2
            RETURNING {PATTERN_COLUMNS}
            "#
        ))
        .bind(pattern.id.0)
        .bind(pattern.version)
        .bind(&pattern.name)
        .bind(&pattern.topic)
        .bind(pattern.confidence.as_str())
        .bind(&pattern.pattern_text)
        .bind(serde_json::to_value(&pattern.evidence)?)
        .bind(serde_json::to_value(&pattern.anti_patterns)?)
        .bind(pattern.use_count as i32)
        .bind(pattern.consecutive_failures as i32)
        .bind(content_types_json(pattern)?)
        .bind(pattern.date_updated)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            // Tell a missing row apart from a stale version.
            let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM patterns WHERE id = $1")
                .bind(pattern.id.0)
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => RepositoryError::VersionConflict { id: pattern.id, expected: pattern.version },
                None => RepositoryError::NotFound(pattern.id.to_string()),
            });
        };

        let stored = pattern_from_row(&row)?;
        Self::append_audit(&mut tx, audit).await?;
        tx.commit().await?;
        Ok(stored)
    }

    async fn list_all(&self) -> Result<Vec<Pattern>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {PATTERN_COLUMNS} FROM patterns ORDER BY date_added, name"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(pattern_from_row).collect()
    }

    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(Pattern, f32)>, RepositoryError> {
        let Some(ts_query) = to_or_query(query) else {
            return Ok(Vec::new());
        };

        let rows = sqlx::query(&format!(
            r#"
            SELECT {PATTERN_COLUMNS},
                   ts_rank(to_tsvector('english', name || ' ' || topic || ' ' || pattern_text),
                           to_tsquery('english', $1)) AS score
            FROM patterns
            WHERE to_tsvector('english', name || ' ' || topic || ' ' || pattern_text) @@ to_tsquery('english', $1)
            ORDER BY score DESC, use_count DESC
            LIMIT $2
            "#
        ))
        .bind(ts_query)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let score: f32 = row.try_get("score")?;
                Ok((pattern_from_row(row)?, score))
            })
            .collect()
    }

    async fn delete(&self, id: PatternId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM patterns WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AuditLog for PostgresPatternRepository {
    async fn append_events(&self, events: &[GrowthEvent]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        for event in events {
            insert_event(&mut *tx, event).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn transitions_for(&self, id: PatternId) -> Result<Vec<ConfidenceTransition>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT pattern_id, pattern_name, pattern_topic, from_confidence, to_confidence,
                   use_count, reason, transition_date
            FROM confidence_transitions
            WHERE pattern_id = $1
            ORDER BY transition_date, id
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let from: String = row.try_get("from_confidence")?;
                let to: String = row.try_get("to_confidence")?;
                let use_count: i32 = row.try_get("use_count")?;
                Ok(ConfidenceTransition {
                    pattern_id: PatternId(row.try_get("pattern_id")?),
                    pattern_name: row.try_get("pattern_name")?,
                    pattern_topic: row.try_get("pattern_topic")?,
                    from_confidence: parse_confidence(&from)?,
                    to_confidence: parse_confidence(&to)?,
                    use_count: use_count.max(0) as u32,
                    reason: row.try_get("reason")?,
                    transition_date: row.try_get("transition_date")?,
                })
            })
            .collect()
    }

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<GrowthEvent>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT event_type, event_date, pattern_name, pattern_topic, details
            FROM growth_events
            WHERE event_date >= $1
            ORDER BY event_date, id
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let event_type: String = row.try_get("event_type")?;
                let details: Value = row.try_get("details")?;
                Ok(GrowthEvent {
                    event_type: GrowthEventType::parse(&event_type)
                        .ok_or_else(|| RepositoryError::Serialization(format!("unknown event type: {event_type}")))?,
                    event_date: row.try_get("event_date")?,
                    pattern_name: row.try_get("pattern_name")?,
                    pattern_topic: row.try_get("pattern_topic")?,
                    details: match details {
                        Value::Object(map) => map,
                        _ => Default::default(),
                    },
                })
            })
            .collect()
    }
}

fn review_from_row(row: &PgRow) -> Result<ReviewHistoryEntry, RepositoryError> {
    let dimension_scores: Value = row.try_get("dimension_scores")?;
    let top_strengths: Value = row.try_get("top_strengths")?;
    let critical_issues: Value = row.try_get("critical_issues")?;
    Ok(ReviewHistoryEntry {
        review_date: row.try_get("review_date")?,
        content_type: row.try_get("content_type")?,
        overall_score: row.try_get("overall_score")?,
        verdict: row.try_get("verdict")?,
        dimension_scores: serde_json::from_value(dimension_scores)?,
        top_strengths: serde_json::from_value(top_strengths)?,
        critical_issues: serde_json::from_value(critical_issues)?,
        content_preview: row.try_get("content_preview")?,
    })
}

const REVIEW_COLUMNS: &str = r#"
    review_date, content_type, overall_score, verdict, dimension_scores,
    top_strengths, critical_issues, content_preview
"#;

#[async_trait]
impl ReviewHistory for PostgresPatternRepository {
    async fn reviews_since(&self, since: DateTime<Utc>) -> Result<Vec<ReviewHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {REVIEW_COLUMNS} FROM review_history WHERE review_date >= $1 ORDER BY review_date, id"
        ))
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(review_from_row).collect()
    }

    async fn all_reviews(&self) -> Result<Vec<ReviewHistoryEntry>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {REVIEW_COLUMNS} FROM review_history ORDER BY review_date, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(review_from_row).collect()
    }
}
