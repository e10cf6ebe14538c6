// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory knowledge graph
//!
//! Stores `(source, relationship, target)` triples and the raw episodes they
//! came from. Episodes may carry pre-extracted triples under a `relations`
//! metadata key; entity extraction itself belongs to the external graph
//! service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::domain::backend::{BackendError, GraphHealth, GraphStore};
use crate::domain::search::Relation;
use crate::infrastructure::text_match::overlap_score;

#[derive(Debug, Clone)]
struct Episode {
    text: String,
    metadata: Map<String, Value>,
}

#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    relations: Arc<RwLock<Vec<Relation>>>,
    episodes: Arc<RwLock<Vec<Episode>>>,
}

impl InMemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_relation(&self, relation: Relation) {
        self.relations.write().await.push(relation);
    }

    pub async fn episode_count(&self) -> usize {
        self.episodes.read().await.len()
    }

    /// Text of episodes whose `source` metadata equals `source`.
    pub async fn episodes_from(&self, source: &str) -> Vec<String> {
        self.episodes
            .read()
            .await
            .iter()
            .filter(|e| e.metadata.get("source").and_then(Value::as_str) == Some(source))
            .map(|e| e.text.clone())
            .collect()
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Relation>, BackendError> {
        let relations = self.relations.read().await;
        let mut scored: Vec<(f32, usize, &Relation)> = relations
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let text = format!("{} {} {}", r.source, r.relationship, r.target);
                (overlap_score(query, &text), i, r)
            })
            .filter(|(score, _, _)| *score > 0.0)
            .collect();
        // Stable on insertion order for equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
        Ok(scored.into_iter().take(limit).map(|(_, _, r)| r.clone()).collect())
    }

    async fn add_episode(&self, text: &str, metadata: Map<String, Value>) -> Result<(), BackendError> {
        if let Some(value) = metadata.get("relations") {
            let extracted: Vec<Relation> = serde_json::from_value(value.clone())
                .map_err(|e| BackendError::Rejected(format!("invalid relations: {e}")))?;
            self.relations.write().await.extend(extracted);
        }
        self.episodes.write().await.push(Episode { text: text.to_string(), metadata });
        Ok(())
    }

    async fn health_check(&self) -> Result<GraphHealth, BackendError> {
        Ok(GraphHealth { status: "healthy".to_string(), backend: "memory".to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_episode_relations_are_searchable() {
        let graph = InMemoryGraphStore::new();
        let metadata = json!({
            "source": "newsletter #12",
            "relations": [
                { "source": "personal hook", "relationship": "raises", "target": "open rate" },
                { "source": "long intro", "relationship": "lowers", "target": "completion" }
            ]
        });
        graph
            .add_episode("Issue 12 notes", metadata.as_object().cloned().unwrap())
            .await
            .unwrap();

        let hits = graph.search("hook", 10).await.unwrap();
        assert_eq!(hits, vec![Relation::new("personal hook", "raises", "open rate")]);
        assert_eq!(graph.episode_count().await, 1);
        assert_eq!(graph.episodes_from("newsletter #12").await, vec!["Issue 12 notes".to_string()]);
    }

    #[tokio::test]
    async fn test_health() {
        assert!(InMemoryGraphStore::new().health_check().await.unwrap().is_healthy());
    }
}
