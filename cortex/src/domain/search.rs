// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Search result types shared by the fuser and the backend adapters

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub content: String,
    pub score: f32,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl MemoryHit {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self { content: content.into(), score, metadata: Map::new() }
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Stable hash of the normalized text; identical content from different
    /// backends collapses to one key.
    pub fn content_hash(&self) -> String {
        content_hash(&self.content)
    }
}

/// SHA-256 over the lowercased, whitespace-collapsed text.
pub fn content_hash(text: &str) -> String {
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    hex::encode(Sha256::digest(normalized.as_bytes()))
}

/// A `(source, relationship, target)` triple from the knowledge graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    pub source: String,
    pub relationship: String,
    pub target: String,
}

impl Relation {
    pub fn new(source: impl Into<String>, relationship: impl Into<String>, target: impl Into<String>) -> Self {
        Self { source: source.into(), relationship: relationship.into(), target: target.into() }
    }
}

/// How many of the queried backends answered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SearchOutcome {
    Complete,
    PartialFailure { failed_sources: Vec<String> },
    TotalFailure { reason: String, failed_sources: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub memories: Vec<MemoryHit>,
    pub relations: Vec<Relation>,
    /// Echo of the normalized filter that was sent to the backends.
    pub search_filters: Value,
    /// Backends that answered, in invocation order.
    pub search_sources: Vec<String>,
    pub outcome: SearchOutcome,
    /// Whether the memories are in reranker order.
    #[serde(default)]
    pub reranked: bool,
}

impl SearchResult {
    pub fn all_backends_failed(&self) -> bool {
        matches!(self.outcome, SearchOutcome::TotalFailure { .. })
    }

    /// Error marker for callers that only care about a message.
    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            SearchOutcome::TotalFailure { reason, .. } => Some(reason),
            _ => None,
        }
    }

    pub fn failed_sources(&self) -> &[String] {
        match &self.outcome {
            SearchOutcome::Complete => &[],
            SearchOutcome::PartialFailure { failed_sources } | SearchOutcome::TotalFailure { failed_sources, .. } => {
                failed_sources
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty() && self.relations.is_empty()
    }
}
