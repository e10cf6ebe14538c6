// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory pattern, audit and review stores
//!
//! Used by tests and by the CLI when no database is configured. Patterns and
//! their audit rows share one lock so a write and its audit trail land
//! together.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::events::{AuditBatch, ConfidenceTransition, GrowthEvent};
use crate::domain::pattern::{Pattern, PatternId};
use crate::domain::repository::{AuditLog, PatternRepository, RepositoryError, ReviewHistory};
use crate::domain::review::ReviewHistoryEntry;
use crate::infrastructure::text_match::overlap_score;

#[derive(Default)]
struct State {
    patterns: HashMap<PatternId, Pattern>,
    transitions: Vec<ConfidenceTransition>,
    events: Vec<GrowthEvent>,
}

impl State {
    fn append(&mut self, audit: &AuditBatch) {
        self.transitions.extend(audit.transitions.iter().cloned());
        self.events.extend(audit.events.iter().cloned());
    }
}

#[derive(Clone, Default)]
pub struct InMemoryPatternRepository {
    state: Arc<RwLock<State>>,
}

impl InMemoryPatternRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transition recorded so far, oldest first.
    pub async fn all_transitions(&self) -> Vec<ConfidenceTransition> {
        self.state.read().await.transitions.clone()
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn insert(&self, pattern: &Pattern, audit: &AuditBatch) -> Result<Pattern, RepositoryError> {
        let mut state = self.state.write().await;
        let key = pattern.name_key();
        if state.patterns.values().any(|p| p.name_key() == key) {
            return Err(RepositoryError::Conflict(pattern.name.clone()));
        }
        let mut stored = pattern.clone();
        stored.version = 1;
        state.patterns.insert(stored.id, stored.clone());
        state.append(audit);
        Ok(stored)
    }

    async fn find_by_id(&self, id: PatternId) -> Result<Option<Pattern>, RepositoryError> {
        Ok(self.state.read().await.patterns.get(&id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> Result<Option<Pattern>, RepositoryError> {
        let key = crate::domain::pattern::name_key(name);
        let state = self.state.read().await;
        Ok(state.patterns.values().find(|p| p.name_key() == key).cloned())
    }

    async fn save(&self, pattern: &Pattern, audit: &AuditBatch) -> Result<Pattern, RepositoryError> {
        let mut state = self.state.write().await;
        let current = state
            .patterns
            .get(&pattern.id)
            .ok_or_else(|| RepositoryError::NotFound(pattern.id.to_string()))?;
        if current.version != pattern.version {
            return Err(RepositoryError::VersionConflict { id: pattern.id, expected: pattern.version });
        }
        let mut stored = pattern.clone();
        stored.version += 1;
        state.patterns.insert(stored.id, stored.clone());
        state.append(audit);
        Ok(stored)
    }

    async fn list_all(&self) -> Result<Vec<Pattern>, RepositoryError> {
        let state = self.state.read().await;
        let mut patterns: Vec<Pattern> = state.patterns.values().cloned().collect();
        patterns.sort_by(|a, b| a.date_added.cmp(&b.date_added).then_with(|| a.name.cmp(&b.name)));
        Ok(patterns)
    }

    async fn search_text(&self, query: &str, limit: usize) -> Result<Vec<(Pattern, f32)>, RepositoryError> {
        let state = self.state.read().await;
        let mut scored: Vec<(Pattern, f32)> = state
            .patterns
            .values()
            .map(|p| {
                let haystack = format!("{} {} {}", p.name, p.topic, p.pattern_text);
                (p.clone(), overlap_score(query, &haystack))
            })
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| b.0.use_count.cmp(&a.0.use_count)));
        scored.truncate(limit);
        Ok(scored)
    }

    async fn delete(&self, id: PatternId) -> Result<bool, RepositoryError> {
        Ok(self.state.write().await.patterns.remove(&id).is_some())
    }
}

#[async_trait]
impl AuditLog for InMemoryPatternRepository {
    async fn append_events(&self, events: &[GrowthEvent]) -> Result<(), RepositoryError> {
        self.state.write().await.events.extend(events.iter().cloned());
        Ok(())
    }

    async fn transitions_for(&self, id: PatternId) -> Result<Vec<ConfidenceTransition>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.transitions.iter().filter(|t| t.pattern_id == id).cloned().collect())
    }

    async fn events_since(&self, since: DateTime<Utc>) -> Result<Vec<GrowthEvent>, RepositoryError> {
        let state = self.state.read().await;
        let mut events: Vec<GrowthEvent> = state.events.iter().filter(|e| e.event_date >= since).cloned().collect();
        events.sort_by_key(|e| e.event_date);
        Ok(events)
    }
}

/// Review log filled by the external reviewer (or by tests).
#[derive(Clone, Default)]
pub struct InMemoryReviewHistory {
    reviews: Arc<RwLock<Vec<ReviewHistoryEntry>>>,
}

impl InMemoryReviewHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, entry: ReviewHistoryEntry) {
        self.reviews.write().await.push(entry);
    }
}

#[async_trait]
impl ReviewHistory for InMemoryReviewHistory {
    async fn reviews_since(&self, since: DateTime<Utc>) -> Result<Vec<ReviewHistoryEntry>, RepositoryError> {
        let mut reviews: Vec<ReviewHistoryEntry> =
            self.reviews.read().await.iter().filter(|r| r.review_date >= since).cloned().collect();
        reviews.sort_by_key(|r| r.review_date);
        Ok(reviews)
    }

    async fn all_reviews(&self) -> Result<Vec<ReviewHistoryEntry>, RepositoryError> {
        let mut reviews = self.reviews.read().await.clone();
        reviews.sort_by_key(|r| r.review_date);
        Ok(reviews)
    }
}
