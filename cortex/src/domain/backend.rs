// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Backend Contracts (Anti-Corruption Layer)
//!
//! Narrow async interfaces for the external stores the cortex reads from.
//! Concrete clients live in `crate::infrastructure`; the domain never sees a
//! vendor type.
//!
//! | Trait | Role | Required |
//! |-------|------|----------|
//! | [`SemanticStore`] | vector memory store | yes |
//! | [`GraphStore`] | knowledge graph | no |
//! | [`Reranker`] | relevance scoring model | no |
//! | [`SearchBackend`] | uniform view used by the fuser | – |

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::filter::BackendFilter;
use super::search::{MemoryHit, Relation};

/// Errors raised by backend adapters
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BackendError {
    #[error("backend call timed out after {0} ms")]
    Timeout(u64),

    #[error("network error: {0}")]
    Network(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("invalid backend response: {0}")]
    InvalidResponse(String),

    #[error("backend rejected request: {0}")]
    Rejected(String),
}

impl BackendError {
    /// Worth another attempt, or worth re-establishing a session for.
    pub fn is_transient(&self) -> bool {
        matches!(self, BackendError::Timeout(_) | BackendError::Network(_))
    }
}

/// Everything one backend contributed to a fused search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendHits {
    pub memories: Vec<MemoryHit>,
    pub relations: Vec<Relation>,
}

impl BackendHits {
    pub fn memories(memories: Vec<MemoryHit>) -> Self {
        Self { memories, relations: Vec::new() }
    }

    pub fn relations(relations: Vec<Relation>) -> Self {
        Self { memories: Vec::new(), relations }
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty() && self.relations.is_empty()
    }
}

/// Uniform search view over any store that takes part in fusion.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Stable label reported in `search_sources` and metrics.
    fn name(&self) -> &str;

    async fn search(&self, query: &str, filter: &BackendFilter, limit: usize) -> Result<BackendHits, BackendError>;
}

#[async_trait]
pub trait SemanticStore: Send + Sync {
    async fn search(&self, query: &str, filter: &BackendFilter, limit: usize) -> Result<Vec<MemoryHit>, BackendError>;

    /// Store `text` and return the new memory id.
    async fn add(&self, text: &str, metadata: Map<String, Value>) -> Result<String, BackendError>;

    async fn delete(&self, id: &str) -> Result<(), BackendError>;

    /// Number of memories owned by `scope_id`.
    async fn count(&self, scope_id: &str) -> Result<usize, BackendError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphHealth {
    pub status: String,
    pub backend: String,
}

impl GraphHealth {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Relation>, BackendError>;

    async fn add_episode(&self, text: &str, metadata: Map<String, Value>) -> Result<(), BackendError>;

    async fn health_check(&self) -> Result<GraphHealth, BackendError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RerankScore {
    /// Position in the submitted document list
    pub index: usize,
    pub relevance_score: f32,
}

#[async_trait]
pub trait Reranker: Send + Sync {
    async fn rerank(&self, query: &str, documents: &[String], top_k: usize) -> Result<Vec<RerankScore>, BackendError>;
}
