// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Result Fusion
//!
//! Fans one query out to every configured [`SearchBackend`], then merges the
//! answers into a single [`SearchResult`]:
//!
//! 1. optional synonym expansion of the query
//! 2. concurrent backend calls, each bounded by a timeout; a failure or
//!    timeout contributes nothing and is recorded in the outcome envelope
//! 3. relations concatenated in backend order
//! 4. memories deduplicated by content hash, first occurrence wins
//! 5. best-effort rerank against the original query, truncated to `limit`
//!
//! Reads never raise for backend trouble. When every backend fails the
//! result carries [`SearchOutcome::TotalFailure`] so callers can tell "no
//! match" apart from "nobody answered".

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::application::query_expansion::expand_query;
use crate::domain::backend::{BackendError, BackendHits, Reranker, SearchBackend};
use crate::domain::cortex_config::SearchConfig;
use crate::domain::error::CortexResult;
use crate::domain::filter::{FilterExpr, FilterTreeBuilder};
use crate::domain::search::{MemoryHit, SearchOutcome, SearchResult};

#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub backend_timeout: Duration,
    pub expand_queries: bool,
    pub max_synonyms_per_token: usize,
    pub default_limit: usize,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self::from(&SearchConfig::default())
    }
}

impl From<&SearchConfig> for FusionConfig {
    fn from(config: &SearchConfig) -> Self {
        Self {
            backend_timeout: config.backend_timeout,
            expand_queries: config.expand_queries,
            max_synonyms_per_token: config.max_synonyms_per_token,
            default_limit: config.default_limit,
        }
    }
}

/// One fused search.
#[derive(Debug, Clone, Default)]
pub struct SearchRequest {
    pub query: String,
    pub filter: Option<FilterExpr>,
    pub limit: Option<usize>,
    /// Extra guidance for the reranker, e.g. "prefer concrete examples".
    pub rerank_instruction: Option<String>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Default::default() }
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_rerank_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.rerank_instruction = Some(instruction.into());
        self
    }
}

pub struct ResultFuser {
    backends: Vec<Arc<dyn SearchBackend>>,
    reranker: Option<Arc<dyn Reranker>>,
    filter_builder: FilterTreeBuilder,
    config: FusionConfig,
}

impl ResultFuser {
    pub fn new(filter_builder: FilterTreeBuilder, config: FusionConfig) -> Self {
        Self { backends: Vec::new(), reranker: None, filter_builder, config }
    }

    /// Backends are invoked, and their relations merged, in registration order.
    pub fn with_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn backend_names(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.name().to_string()).collect()
    }

    pub fn has_reranker(&self) -> bool {
        self.reranker.is_some()
    }

    /// Run one fused search scoped to `scope_id`.
    ///
    /// Only an invalid filter is an error; backend and reranker failures are
    /// folded into the result.
    pub async fn fuse(&self, request: &SearchRequest, scope_id: &str) -> CortexResult<SearchResult> {
        let filter = self.filter_builder.normalize(request.filter.as_ref(), scope_id)?;
        let limit = request.limit.unwrap_or(self.config.default_limit).max(1);
        let search_filters = filter.to_json();

        metrics::counter!("inkwell_search_requests_total").increment(1);

        let query = if self.config.expand_queries {
            expand_query(&request.query, self.config.max_synonyms_per_token)
        } else {
            request.query.clone()
        };
        debug!(original = %request.query, expanded = %query, limit, "Fusing search");

        let timeout = self.config.backend_timeout;
        let calls = self.backends.iter().map(|backend| {
            let query = query.as_str();
            let filter = &filter;
            async move {
                let started = Instant::now();
                let outcome = match tokio::time::timeout(timeout, backend.search(query, filter, limit)).await {
                    Ok(result) => result,
                    Err(_) => Err(BackendError::Timeout(timeout.as_millis() as u64)),
                };
                metrics::histogram!("inkwell_search_backend_duration_seconds", "backend" => backend.name().to_string())
                    .record(started.elapsed().as_secs_f64());
                (backend.name().to_string(), outcome)
            }
        });
        // join_all yields in invocation order regardless of completion order.
        let answers = join_all(calls).await;

        let mut sources = Vec::new();
        let mut failed = Vec::new();
        let mut merged = BackendHits::default();
        for (name, outcome) in answers {
            match outcome {
                Ok(hits) => {
                    debug!(backend = %name, memories = hits.memories.len(), relations = hits.relations.len(), "Backend answered");
                    merged.memories.extend(hits.memories);
                    merged.relations.extend(hits.relations);
                    sources.push(name);
                }
                Err(e) => {
                    warn!(backend = %name, error = %e, "Search backend failed, continuing without it");
                    metrics::counter!("inkwell_search_backend_failures_total", "backend" => name.clone()).increment(1);
                    failed.push(name);
                }
            }
        }

        if sources.is_empty() {
            let reason = if self.backends.is_empty() {
                "no search backends configured".to_string()
            } else {
                "all search backends failed".to_string()
            };
            warn!(failed = ?failed, "{}", reason);
            return Ok(SearchResult {
                memories: Vec::new(),
                relations: Vec::new(),
                search_filters,
                search_sources: sources,
                outcome: SearchOutcome::TotalFailure { reason, failed_sources: failed },
                reranked: false,
            });
        }

        let memories = dedup_memories(merged.memories);
        let (memories, reranked) = self.rerank(request, memories, limit).await;

        let outcome = if failed.is_empty() {
            SearchOutcome::Complete
        } else {
            SearchOutcome::PartialFailure { failed_sources: failed }
        };

        info!(
            memories = memories.len(),
            relations = merged.relations.len(),
            sources = ?sources,
            reranked,
            "Fused search completed"
        );

        Ok(SearchResult {
            memories,
            relations: merged.relations,
            search_filters,
            search_sources: sources,
            outcome,
            reranked,
        })
    }

    /// Reorder by reranker relevance. Any failure keeps the fused order.
    async fn rerank(&self, request: &SearchRequest, mut memories: Vec<MemoryHit>, limit: usize) -> (Vec<MemoryHit>, bool) {
        let Some(reranker) = &self.reranker else {
            memories.truncate(limit);
            return (memories, false);
        };
        if memories.len() < 2 {
            memories.truncate(limit);
            return (memories, false);
        }

        let rerank_query = match &request.rerank_instruction {
            Some(instruction) => format!("{instruction}\n\n{}", request.query),
            None => request.query.clone(),
        };
        let documents: Vec<String> = memories.iter().map(|m| m.content.clone()).collect();
        let top_k = limit.min(documents.len());

        let scores = match tokio::time::timeout(self.config.backend_timeout, reranker.rerank(&rerank_query, &documents, top_k)).await {
            Ok(Ok(scores)) => scores,
            Ok(Err(e)) => {
                warn!(error = %e, "Rerank failed, keeping fused order");
                return fallback(memories, limit);
            }
            Err(_) => {
                warn!(timeout_ms = self.config.backend_timeout.as_millis() as u64, "Rerank timed out, keeping fused order");
                return fallback(memories, limit);
            }
        };

        let mut seen = HashSet::new();
        if scores.is_empty() || scores.iter().any(|s| s.index >= memories.len() || !seen.insert(s.index)) {
            warn!(returned = scores.len(), documents = memories.len(), "Reranker returned unusable indices, keeping fused order");
            return fallback(memories, limit);
        }

        let mut scores = scores;
        scores.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        let mut slots: Vec<Option<MemoryHit>> = memories.into_iter().map(Some).collect();
        let reordered = scores
            .into_iter()
            .take(limit)
            .filter_map(|s| {
                slots[s.index].take().map(|mut hit| {
                    hit.score = s.relevance_score;
                    hit
                })
            })
            .collect();
        (reordered, true)
    }
}

fn fallback(mut memories: Vec<MemoryHit>, limit: usize) -> (Vec<MemoryHit>, bool) {
    metrics::counter!("inkwell_search_rerank_fallbacks_total").increment(1);
    memories.truncate(limit);
    (memories, false)
}

/// Drop later memories whose normalized text was already seen.
pub fn dedup_memories(memories: Vec<MemoryHit>) -> Vec<MemoryHit> {
    let mut seen = HashSet::new();
    memories.into_iter().filter(|m| seen.insert(m.content_hash())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::backend::RerankScore;
    use crate::domain::filter::BackendFilter;
    use crate::domain::search::Relation;
    use async_trait::async_trait;

    struct FixedBackend {
        name: &'static str,
        hits: BackendHits,
    }

    #[async_trait]
    impl SearchBackend for FixedBackend {
        fn name(&self) -> &str {
            self.name
        }

        async fn search(&self, _query: &str, _filter: &BackendFilter, _limit: usize) -> Result<BackendHits, BackendError> {
            Ok(self.hits.clone())
        }
    }

    struct ReverseReranker;

    #[async_trait]
    impl Reranker for ReverseReranker {
        async fn rerank(&self, _query: &str, documents: &[String], top_k: usize) -> Result<Vec<RerankScore>, BackendError> {
            Ok((0..documents.len())
                .map(|index| RerankScore { index, relevance_score: index as f32 })
                .take(top_k)
                .collect())
        }
    }

    fn fuser() -> ResultFuser {
        ResultFuser::new(FilterTreeBuilder::default(), FusionConfig::default())
    }

    #[test]
    fn test_dedup_keeps_first_occurrence() {
        let memories = vec![
            MemoryHit::new("Lead with the hook", 0.9),
            MemoryHit::new("End with a question", 0.8),
            MemoryHit::new("lead with  the HOOK", 0.7),
        ];
        let deduped = dedup_memories(memories);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].score, 0.9);
        assert_eq!(deduped[1].content, "End with a question");
    }

    #[tokio::test]
    async fn test_relations_concatenate_in_backend_order() {
        let fuser = fuser()
            .with_backend(Arc::new(FixedBackend {
                name: "graph-a",
                hits: BackendHits::relations(vec![Relation::new("hook", "improves", "open rate")]),
            }))
            .with_backend(Arc::new(FixedBackend {
                name: "graph-b",
                hits: BackendHits::relations(vec![Relation::new("hook", "improves", "open rate")]),
            }));

        let result = fuser.fuse(&SearchRequest::new("hooks"), "alice").await.unwrap();
        assert_eq!(result.relations.len(), 2);
        assert_eq!(result.search_sources, vec!["graph-a", "graph-b"]);
        assert_eq!(result.outcome, SearchOutcome::Complete);
        assert_eq!(result.search_filters, serde_json::json!({ "AND": [{ "user_id": "alice" }] }));
    }

    #[tokio::test]
    async fn test_rerank_orders_by_relevance_and_truncates() {
        let fuser = fuser()
            .with_backend(Arc::new(FixedBackend {
                name: "semantic",
                hits: BackendHits::memories(vec![
                    MemoryHit::new("first", 0.9),
                    MemoryHit::new("second", 0.8),
                    MemoryHit::new("third", 0.7),
                ]),
            }))
            .with_reranker(Arc::new(ReverseReranker));

        let result = fuser.fuse(&SearchRequest::new("q").with_limit(2), "alice").await.unwrap();
        assert!(result.reranked);
        let contents: Vec<_> = result.memories.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn test_invalid_filter_is_rejected() {
        let fuser = fuser();
        let request = SearchRequest::new("q").with_filter(FilterExpr::and(vec![]));
        assert!(fuser.fuse(&request, "alice").await.is_err());
    }

    #[tokio::test]
    async fn test_no_backends_is_total_failure() {
        let result = fuser().fuse(&SearchRequest::new("q"), "alice").await.unwrap();
        assert!(result.all_backends_failed());
        assert_eq!(result.error(), Some("no search backends configured"));
    }
}
