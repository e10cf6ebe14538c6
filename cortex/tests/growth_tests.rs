// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Growth summaries built through the `Cortex` facade over in-memory stores,
//! including degraded snapshots when a store misbehaves.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use inkwell_cortex::application::{Cortex, TrendDirection};
use inkwell_cortex::domain::{
    BackendError, BackendFilter, GraphHealth, GraphStore, MemoryHit, NewPattern, Relation, ReviewHistoryEntry,
    SemanticStore,
};
use inkwell_cortex::infrastructure::{InMemoryGraphStore, InMemoryPatternRepository, InMemoryReviewHistory, InMemorySemanticStore};
use serde_json::{Map, Value};

struct BrokenSemanticStore;

#[async_trait]
impl SemanticStore for BrokenSemanticStore {
    async fn search(&self, _query: &str, _filter: &BackendFilter, _limit: usize) -> Result<Vec<MemoryHit>, BackendError> {
        Err(BackendError::Network("down".to_string()))
    }

    async fn add(&self, _text: &str, _metadata: Map<String, Value>) -> Result<String, BackendError> {
        Err(BackendError::Network("down".to_string()))
    }

    async fn delete(&self, _id: &str) -> Result<(), BackendError> {
        Ok(())
    }

    async fn count(&self, _scope_id: &str) -> Result<usize, BackendError> {
        Err(BackendError::Network("down".to_string()))
    }
}

struct HangingGraph;

#[async_trait]
impl GraphStore for HangingGraph {
    async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Relation>, BackendError> {
        Ok(Vec::new())
    }

    async fn add_episode(&self, _text: &str, _metadata: Map<String, Value>) -> Result<(), BackendError> {
        Ok(())
    }

    async fn health_check(&self) -> Result<GraphHealth, BackendError> {
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        Ok(GraphHealth { status: "healthy".to_string(), backend: "slow".to_string() })
    }
}

fn cortex_with_reviews(reviews: InMemoryReviewHistory) -> Cortex {
    let repo = Arc::new(InMemoryPatternRepository::new());
    Cortex::builder("writer")
        .semantic_store(Arc::new(InMemorySemanticStore::new()))
        .graph_store(Arc::new(InMemoryGraphStore::new()))
        .pattern_store(repo.clone(), repo)
        .review_history(Arc::new(reviews))
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_snapshot_counts() {
    let cortex = cortex_with_reviews(InMemoryReviewHistory::new());
    let hook = cortex.create_pattern(NewPattern::new("Hook", "openings", "x")).await.unwrap();
    cortex.create_pattern(NewPattern::new("Story", "openings", "x")).await.unwrap();
    cortex.create_pattern(NewPattern::new("Sign-off", "endings", "x")).await.unwrap();
    cortex.reinforce_pattern(hook.id, None).await.unwrap();
    cortex.add_memory("Readers loved the story opening", Map::new()).await.unwrap();

    let snapshot = cortex.get_health_snapshot().await;
    assert!(snapshot.errors.is_empty(), "{:?}", snapshot.errors);
    assert_eq!(snapshot.total_patterns, Some(3));
    let confidence = snapshot.confidence_counts.unwrap();
    assert_eq!(confidence["LOW"], 2);
    assert_eq!(confidence["MEDIUM"], 1);
    assert_eq!(confidence["HIGH"], 0);
    let topics = snapshot.topic_histogram.unwrap();
    assert_eq!(topics["openings"], 2);
    assert_eq!(topics["endings"], 1);
    assert_eq!(snapshot.memory_count, Some(1));
    assert_eq!(snapshot.graph_status, "healthy");
}

#[tokio::test]
async fn test_snapshot_degrades_per_sub_read() {
    let repo = Arc::new(InMemoryPatternRepository::new());
    let cortex = Cortex::builder("writer")
        .fusion_config(inkwell_cortex::application::FusionConfig {
            backend_timeout: std::time::Duration::from_millis(50),
            ..Default::default()
        })
        .semantic_store(Arc::new(BrokenSemanticStore))
        .graph_store(Arc::new(HangingGraph))
        .pattern_store(repo.clone(), repo)
        .build()
        .unwrap();
    cortex.create_pattern(NewPattern::new("Hook", "openings", "x")).await.unwrap();

    let snapshot = cortex.get_health_snapshot().await;
    assert_eq!(snapshot.total_patterns, Some(1));
    assert_eq!(snapshot.memory_count, None);
    assert!(snapshot.errors.contains_key("memory_count"));
    assert!(snapshot.errors["graph_status"].contains("timed out"));
    assert_eq!(snapshot.graph_status, "unreachable");
}

#[tokio::test]
async fn test_growth_window_counts_and_trend() {
    let reviews = InMemoryReviewHistory::new();
    let now = Utc::now();
    reviews.record(ReviewHistoryEntry::new("newsletter", 5.0, "revise").at(now - Duration::days(6))).await;
    reviews.record(ReviewHistoryEntry::new("newsletter", 5.5, "revise").at(now - Duration::days(5))).await;
    reviews.record(ReviewHistoryEntry::new("thread", 7.0, "ship").at(now - Duration::days(2))).await;
    reviews.record(ReviewHistoryEntry::new("thread", 7.5, "ship").at(now - Duration::days(1))).await;
    // outside the window
    reviews.record(ReviewHistoryEntry::new("thread", 1.0, "reject").at(now - Duration::days(40))).await;

    let cortex = cortex_with_reviews(reviews);
    let hook = cortex.create_pattern(NewPattern::new("Hook", "openings", "x")).await.unwrap();
    cortex.reinforce_pattern(hook.id, None).await.unwrap();
    cortex.record_experience("interviews", "Spoke with readers", Map::new()).await.unwrap();

    let window = cortex.get_growth_window(7).await;
    assert!(window.errors.is_empty());
    let counts = window.event_counts.unwrap();
    assert_eq!(counts.len(), 5);
    assert_eq!(counts["pattern_created"], 1);
    assert_eq!(counts["pattern_reinforced"], 1);
    assert_eq!(counts["confidence_upgraded"], 1);
    assert_eq!(counts["confidence_downgraded"], 0);
    assert_eq!(counts["experience_recorded"], 1);

    let trend = window.review_trend.unwrap();
    assert_eq!(trend.review_count, 4);
    assert_eq!(trend.direction, TrendDirection::Improving);
    assert_eq!(window.stale_patterns, Some(Vec::new()));
}

#[tokio::test]
async fn test_growth_window_accepts_huge_day_counts() {
    let reviews = InMemoryReviewHistory::new();
    reviews.record(ReviewHistoryEntry::new("thread", 7.0, "ship").at(Utc::now() - Duration::days(400))).await;
    let cortex = cortex_with_reviews(reviews);
    cortex.create_pattern(NewPattern::new("Hook", "openings", "x")).await.unwrap();

    for days in [1_000_000_000, i64::MAX] {
        let window = cortex.get_growth_window(days).await;
        assert!(window.errors.is_empty(), "{:?}", window.errors);
        assert_eq!(window.event_counts.unwrap()["pattern_created"], 1);
        assert_eq!(window.review_trend.unwrap().review_count, 1);
    }
}

#[tokio::test]
async fn test_milestones_progress() {
    let reviews = InMemoryReviewHistory::new();
    reviews.record(ReviewHistoryEntry::new("newsletter", 8.0, "ship")).await;
    let cortex = cortex_with_reviews(reviews);

    let progress = cortex.get_milestones().await;
    assert_eq!(progress.level, "Novice");

    let mut ids = Vec::new();
    for name in ["Hook", "Story", "Sign-off", "Subject line", "Rule of three"] {
        ids.push(cortex.create_pattern(NewPattern::new(name, "craft", "x")).await.unwrap().id);
    }
    for id in &ids[..2] {
        cortex.reinforce_pattern(*id, None).await.unwrap();
    }
    for i in 0..3 {
        cortex.record_experience("practice", &format!("session {i}"), Map::new()).await.unwrap();
    }

    let progress = cortex.get_milestones().await;
    assert_eq!(progress.level, "Practitioner");
    assert_eq!(progress.stats.patterns, 5);
    assert_eq!(progress.stats.medium_or_higher, 2);
    assert_eq!(progress.stats.experiences, 3);
    assert_eq!(progress.stats.average_review_score, Some(8.0));
    let next = progress.next.unwrap();
    assert_eq!(next.name, "Craftsman");
    assert!(next.missing.iter().any(|m| m.starts_with("patterns 5/10")));
}
