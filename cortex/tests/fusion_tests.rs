// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Fused search across healthy, failing and slow backends.
//!
//! Covers the outcome envelope (complete / partial / total failure), the
//! per-backend timeout, deduplication and reranker fallback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use inkwell_cortex::application::{dedup_memories, FusionConfig, ResultFuser, SearchRequest};
use inkwell_cortex::domain::{
    BackendError, BackendFilter, BackendHits, FilterExpr, FilterTreeBuilder, MemoryHit, RerankScore, Reranker,
    SearchBackend, SearchOutcome, SemanticStore,
};
use inkwell_cortex::infrastructure::{InMemorySemanticStore, SemanticSearchBackend};
use serde_json::{json, Map, Value};

struct StaticBackend {
    name: &'static str,
    memories: Vec<&'static str>,
}

#[async_trait]
impl SearchBackend for StaticBackend {
    fn name(&self) -> &str {
        self.name
    }

    async fn search(&self, _query: &str, _filter: &BackendFilter, _limit: usize) -> Result<BackendHits, BackendError> {
        Ok(BackendHits::memories(
            self.memories.iter().enumerate().map(|(i, m)| MemoryHit::new(*m, 1.0 - i as f32 * 0.1)).collect(),
        ))
    }
}

struct FailingBackend(&'static str);

#[async_trait]
impl SearchBackend for FailingBackend {
    fn name(&self) -> &str {
        self.0
    }

    async fn search(&self, _query: &str, _filter: &BackendFilter, _limit: usize) -> Result<BackendHits, BackendError> {
        Err(BackendError::Network("connection reset".to_string()))
    }
}

struct SlowBackend;

#[async_trait]
impl SearchBackend for SlowBackend {
    fn name(&self) -> &str {
        "slow"
    }

    async fn search(&self, _query: &str, _filter: &BackendFilter, _limit: usize) -> Result<BackendHits, BackendError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(BackendHits::memories(vec![MemoryHit::new("too late", 1.0)]))
    }
}

struct FailingReranker {
    calls: AtomicUsize,
}

#[async_trait]
impl Reranker for FailingReranker {
    async fn rerank(&self, _query: &str, _documents: &[String], _top_k: usize) -> Result<Vec<RerankScore>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(BackendError::Unavailable("reranker down".to_string()))
    }
}

struct OutOfRangeReranker;

#[async_trait]
impl Reranker for OutOfRangeReranker {
    async fn rerank(&self, _query: &str, _documents: &[String], _top_k: usize) -> Result<Vec<RerankScore>, BackendError> {
        Ok(vec![RerankScore { index: 42, relevance_score: 0.9 }])
    }
}

fn config(timeout: Duration) -> FusionConfig {
    FusionConfig {
        backend_timeout: timeout,
        expand_queries: false,
        max_synonyms_per_token: 0,
        default_limit: 10,
    }
}

fn fuser() -> ResultFuser {
    ResultFuser::new(FilterTreeBuilder::default(), config(Duration::from_secs(2)))
}

fn contents(memories: &[MemoryHit]) -> Vec<&str> {
    memories.iter().map(|m| m.content.as_str()).collect()
}

#[tokio::test]
async fn test_partial_failure_keeps_data_without_error() {
    let fuser = fuser()
        .with_backend(Arc::new(FailingBackend("semantic")))
        .with_backend(Arc::new(StaticBackend { name: "relational", memories: vec!["Hook first"] }));

    let result = fuser.fuse(&SearchRequest::new("hook"), "alice").await.unwrap();
    assert_eq!(contents(&result.memories), vec!["Hook first"]);
    assert_eq!(result.search_sources, vec!["relational"]);
    assert_eq!(result.failed_sources(), &["semantic".to_string()]);
    assert!(!result.all_backends_failed());
    assert!(result.error().is_none());
}

#[tokio::test]
async fn test_total_failure_is_marked() {
    let fuser = fuser()
        .with_backend(Arc::new(FailingBackend("semantic")))
        .with_backend(Arc::new(FailingBackend("graph")));

    let result = fuser.fuse(&SearchRequest::new("hook"), "alice").await.unwrap();
    assert!(result.all_backends_failed());
    assert!(result.memories.is_empty());
    assert!(result.search_sources.is_empty());
    assert_eq!(result.error(), Some("all search backends failed"));
    assert!(matches!(result.outcome, SearchOutcome::TotalFailure { ref failed_sources, .. } if failed_sources.len() == 2));
}

#[tokio::test]
async fn test_nothing_matched_is_not_a_failure() {
    let fuser = fuser().with_backend(Arc::new(StaticBackend { name: "semantic", memories: vec![] }));
    let result = fuser.fuse(&SearchRequest::new("hook"), "alice").await.unwrap();
    assert!(result.is_empty());
    assert_eq!(result.outcome, SearchOutcome::Complete);
}

#[tokio::test]
async fn test_slow_backend_times_out_as_failure() {
    let fuser = ResultFuser::new(FilterTreeBuilder::default(), config(Duration::from_millis(50)))
        .with_backend(Arc::new(SlowBackend))
        .with_backend(Arc::new(StaticBackend { name: "semantic", memories: vec!["fast answer"] }));

    let started = std::time::Instant::now();
    let result = fuser.fuse(&SearchRequest::new("hook"), "alice").await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(contents(&result.memories), vec!["fast answer"]);
    assert_eq!(result.failed_sources(), &["slow".to_string()]);
}

#[tokio::test]
async fn test_duplicates_across_backends_collapse_in_order() {
    let fuser = fuser()
        .with_backend(Arc::new(StaticBackend { name: "semantic", memories: vec!["Open with a story", "Short paragraphs"] }))
        .with_backend(Arc::new(StaticBackend { name: "relational", memories: vec!["open with a STORY", "Cut adverbs"] }));

    let result = fuser.fuse(&SearchRequest::new("story"), "alice").await.unwrap();
    assert_eq!(contents(&result.memories), vec!["Open with a story", "Short paragraphs", "Cut adverbs"]);
}

#[test]
fn test_dedup_is_idempotent() {
    let memories = vec![
        MemoryHit::new("A", 0.9),
        MemoryHit::new("b", 0.8),
        MemoryHit::new(" a ", 0.7),
        MemoryHit::new("B", 0.6),
    ];
    let once = dedup_memories(memories);
    let twice = dedup_memories(once.clone());
    assert_eq!(once, twice);
    assert_eq!(once.len(), 2);
}

#[tokio::test]
async fn test_rerank_failure_keeps_fused_order() {
    let reranker = Arc::new(FailingReranker { calls: AtomicUsize::new(0) });
    let fuser = fuser()
        .with_backend(Arc::new(StaticBackend { name: "semantic", memories: vec!["one", "two", "three"] }))
        .with_reranker(reranker.clone());

    let result = fuser.fuse(&SearchRequest::new("q").with_limit(2), "alice").await.unwrap();
    assert_eq!(reranker.calls.load(Ordering::SeqCst), 1);
    assert!(!result.reranked);
    assert_eq!(contents(&result.memories), vec!["one", "two"]);
    assert_eq!(result.outcome, SearchOutcome::Complete);
}

#[tokio::test]
async fn test_rerank_with_bad_indices_falls_back() {
    let fuser = fuser()
        .with_backend(Arc::new(StaticBackend { name: "semantic", memories: vec!["one", "two"] }))
        .with_reranker(Arc::new(OutOfRangeReranker));

    let result = fuser.fuse(&SearchRequest::new("q"), "alice").await.unwrap();
    assert!(!result.reranked);
    assert_eq!(contents(&result.memories), vec!["one", "two"]);
}

fn meta(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

#[tokio::test]
async fn test_custom_metadata_filter_reaches_store() {
    let store = Arc::new(InMemorySemanticStore::new());
    store
        .add("Hook with a bold claim", meta(json!({ "user_id": "alice", "category": "openings" })))
        .await
        .unwrap();
    store
        .add("Hook the subject line", meta(json!({ "user_id": "alice", "category": "email" })))
        .await
        .unwrap();
    store
        .add("Hook with a question", meta(json!({ "user_id": "bob", "category": "openings" })))
        .await
        .unwrap();

    let fuser = fuser().with_backend(Arc::new(SemanticSearchBackend::new(store)));
    let request = SearchRequest::new("hook").with_filter(FilterExpr::eq("category", "openings"));
    let result = fuser.fuse(&request, "alice").await.unwrap();

    assert_eq!(contents(&result.memories), vec!["Hook with a bold claim"]);
    assert_eq!(
        result.search_filters,
        json!({ "AND": [{ "user_id": "alice" }, { "metadata": { "category": "openings" } }] })
    );
}

#[tokio::test]
async fn test_missing_scope_is_rejected() {
    let fuser = fuser().with_backend(Arc::new(StaticBackend { name: "semantic", memories: vec!["x"] }));
    assert!(fuser.fuse(&SearchRequest::new("q"), "  ").await.is_err());
}
