// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Adapters that give each store the uniform [`SearchBackend`] view used by
//! the result fuser.
//!
//! | Adapter | Name | Contributes |
//! |---------|------|-------------|
//! | [`SemanticSearchBackend`] | `semantic` | memories |
//! | [`PatternSearchBackend`] | `relational` | memories (patterns as text) |
//! | [`GraphSearchBackend`] | `graph` | relations |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::domain::backend::{BackendError, BackendHits, GraphStore, SearchBackend, SemanticStore};
use crate::domain::filter::{BackendFilter, DEFAULT_SCOPE_KEY};
use crate::domain::repository::{PatternRepository, RepositoryError};
use crate::domain::search::MemoryHit;

pub struct SemanticSearchBackend {
    store: Arc<dyn SemanticStore>,
}

impl SemanticSearchBackend {
    pub fn new(store: Arc<dyn SemanticStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchBackend for SemanticSearchBackend {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn search(&self, query: &str, filter: &BackendFilter, limit: usize) -> Result<BackendHits, BackendError> {
        Ok(BackendHits::memories(self.store.search(query, filter, limit).await?))
    }
}

/// Graph search takes no filter; the graph holds one owner's episodes.
pub struct GraphSearchBackend {
    graph: Arc<dyn GraphStore>,
}

impl GraphSearchBackend {
    pub fn new(graph: Arc<dyn GraphStore>) -> Self {
        Self { graph }
    }
}

#[async_trait]
impl SearchBackend for GraphSearchBackend {
    fn name(&self) -> &str {
        "graph"
    }

    async fn search(&self, query: &str, _filter: &BackendFilter, limit: usize) -> Result<BackendHits, BackendError> {
        Ok(BackendHits::relations(self.graph.search(query, limit).await?))
    }
}

/// Relational similarity path: patterns whose text overlaps the query,
/// rendered as memories. Metadata filters apply to `name`, `topic`,
/// `confidence` and `content_types`.
pub struct PatternSearchBackend {
    repository: Arc<dyn PatternRepository>,
    scope_key: String,
}

impl PatternSearchBackend {
    pub fn new(repository: Arc<dyn PatternRepository>) -> Self {
        Self { repository, scope_key: DEFAULT_SCOPE_KEY.to_string() }
    }

    pub fn with_scope_key(mut self, scope_key: impl Into<String>) -> Self {
        self.scope_key = scope_key.into();
        self
    }
}

#[async_trait]
impl SearchBackend for PatternSearchBackend {
    fn name(&self) -> &str {
        "relational"
    }

    async fn search(&self, query: &str, filter: &BackendFilter, limit: usize) -> Result<BackendHits, BackendError> {
        // Over-fetch so metadata filtering still leaves `limit` candidates.
        let scored = self
            .repository
            .search_text(query, limit.saturating_mul(3))
            .await
            .map_err(repository_failure)?;

        // Patterns belong to the cortex owner, so the scope leaf always holds.
        let mut fields = Map::new();
        if let Some(scope) = filter.scope_value(&self.scope_key) {
            fields.insert(self.scope_key.clone(), Value::String(scope.to_string()));
        }

        let memories: Vec<MemoryHit> = scored
            .into_iter()
            .filter_map(|(pattern, score)| {
                let mut metadata = Map::new();
                metadata.insert("source".into(), json!("pattern"));
                metadata.insert("pattern_id".into(), json!(pattern.id.to_string()));
                metadata.insert("name".into(), json!(pattern.name));
                metadata.insert("topic".into(), json!(pattern.topic));
                metadata.insert("confidence".into(), json!(pattern.confidence.as_str()));
                if let Some(types) = &pattern.applicable_content_types {
                    metadata.insert("content_types".into(), json!(types));
                }
                if !filter.matches(&fields, &metadata) {
                    return None;
                }
                Some(MemoryHit {
                    content: format!("{}: {}", pattern.name, pattern.pattern_text),
                    score,
                    metadata,
                })
            })
            .take(limit)
            .collect();

        debug!(hits = memories.len(), "Relational pattern search completed");
        Ok(BackendHits::memories(memories))
    }
}

fn repository_failure(err: RepositoryError) -> BackendError {
    match err {
        RepositoryError::Database(msg) => BackendError::Network(msg),
        other => BackendError::Unavailable(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::AuditBatch;
    use crate::domain::filter::{FilterExpr, FilterTreeBuilder};
    use crate::domain::pattern::{NewPattern, Pattern};
    use crate::infrastructure::pattern_repository::InMemoryPatternRepository;
    use chrono::Utc;

    #[tokio::test]
    async fn test_pattern_backend_filters_on_topic() {
        let repo = InMemoryPatternRepository::new();
        let today = Utc::now().date_naive();
        repo.insert(&Pattern::new(NewPattern::new("Hook First", "openings", "Lead with the hook"), today), &AuditBatch::new())
            .await
            .unwrap();
        repo.insert(&Pattern::new(NewPattern::new("Hook Recap", "endings", "Close by echoing the hook"), today), &AuditBatch::new())
            .await
            .unwrap();

        let backend = PatternSearchBackend::new(Arc::new(repo));
        let filter = FilterTreeBuilder::default()
            .normalize(Some(&FilterExpr::eq("topic", "endings")), "alice")
            .unwrap();
        let hits = backend.search("hook", &filter, 5).await.unwrap();

        assert_eq!(hits.memories.len(), 1);
        assert_eq!(hits.memories[0].content, "Hook Recap: Close by echoing the hook");
        assert_eq!(hits.memories[0].metadata["confidence"], "LOW");
    }
}
