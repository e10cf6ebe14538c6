// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for the relational side of the cortex, following the
//! one-repository-per-aggregate pattern:
//!
//! | Trait | Data | Implementations |
//! |-------|------|-----------------|
//! | [`PatternRepository`] | `Pattern` + audit rows | `InMemoryPatternRepository`, `PostgresPatternRepository` |
//! | [`AuditLog`] | `ConfidenceTransition`, `GrowthEvent` | same as above |
//! | [`ReviewHistory`] | `ReviewHistoryEntry` | `InMemoryReviewHistory`, `PostgresPatternRepository` |
//!
//! Pattern writes carry their audit rows in an [`AuditBatch`] so a pattern
//! change and its audit trail commit together or not at all.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::events::{AuditBatch, ConfidenceTransition, GrowthEvent};
use super::pattern::{Pattern, PatternId};
use super::review::ReviewHistoryEntry;

#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Insert a new pattern. Fails with `Conflict` when the name is already
    /// taken, compared case-insensitively.
    async fn insert(&self, pattern: &Pattern, audit: &AuditBatch) -> Result<Pattern, RepositoryError>;

    async fn find_by_id(&self, id: PatternId) -> Result<Option<Pattern>, RepositoryError>;

    /// Case-insensitive exact match.
    async fn find_by_name(&self, name: &str) -> Result<Option<Pattern>, RepositoryError>;

    /// Persist a modified pattern. `pattern.version` must equal the stored
    /// version, otherwise `VersionConflict`. Returns the stored row with its
    /// bumped version.
    async fn save(&self, pattern: &Pattern, audit: &AuditBatch) -> Result<Pattern, RepositoryError>;

    async fn list_all(&self) -> Result<Vec<Pattern>, RepositoryError>;

    /// Text similarity over name, topic and pattern text, best first.
    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(Pattern, f32)>, RepositoryError>;

    async fn delete(&self, id: PatternId) -> Result<bool, RepositoryError>;
}

#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append events that are not tied to a pattern write.
    async fn append_events(&self, events: &[GrowthEvent]) -> Result<(), RepositoryError>;

    async fn transitions_for(&self, id: PatternId) -> Result<Vec<ConfidenceTransition>, RepositoryError>;

    /// Events with `event_date >= since`, oldest first.
    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<GrowthEvent>, RepositoryError>;
}

#[async_trait]
pub trait ReviewHistory: Send + Sync {
    /// Reviews with `review_date >= since`, oldest first.
    async fn reviews_since(&self, since: DateTime<Utc>) -> Result<Vec<ReviewHistoryEntry>, RepositoryError>;

    async fn all_reviews(&self) -> Result<Vec<ReviewHistoryEntry>, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Entity already exists: {0}")]
    Conflict(String),

    #[error("Stale write for {id}: expected version {expected}")]
    VersionConflict { id: PatternId, expected: i64 },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepositoryError::Conflict(db.message().to_string()),
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
