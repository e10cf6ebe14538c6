// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Cortex — application facade
//!
//! Single entry point for callers (CLI, content-generation agents). It wires
//! the result fuser, the pattern lifecycle manager and the growth aggregator
//! over one set of injected stores:
//!
//! | Operation | Delegates to |
//! |-----------|--------------|
//! | `search` | [`ResultFuser`] over semantic, relational and graph backends |
//! | `create_pattern`, `reinforce_pattern`, `record_pattern_outcome` | [`PatternLifecycleService`] |
//! | `get_health_snapshot`, `get_growth_window`, `get_milestones` | [`GrowthAggregator`] |
//!
//! Stores are trait objects; see `infrastructure::wiring` for the
//! configuration-driven assembly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::content_types::ContentTypeRegistry;
use crate::application::fusion::{FusionConfig, ResultFuser, SearchRequest};
use crate::application::growth::{GrowthAggregator, GrowthWindow, HealthSnapshot, MilestoneProgress};
use crate::application::health_monitor::{HealthMonitor, HealthMonitorConfig};
use crate::application::pattern_lifecycle::{PatternLifecycleService, StandardPatternLifecycle};
use crate::application::retry::{validation, RetryPolicy};
use crate::domain::backend::{GraphStore, Reranker, SearchBackend, SemanticStore};
use crate::domain::cortex_config::{CortexConfigSpec, LifecycleConfig};
use crate::domain::error::{CortexError, CortexResult};
use crate::domain::events::GrowthEvent;
use crate::domain::filter::FilterTreeBuilder;
use crate::domain::pattern::{NewPattern, Pattern, PatternId};
use crate::domain::repository::{AuditLog, PatternRepository, ReviewHistory};
use crate::domain::search::SearchResult;
use crate::infrastructure::event_bus::{EventBus, EventReceiver};
use crate::infrastructure::pattern_repository::InMemoryReviewHistory;
use crate::infrastructure::search_backends::{GraphSearchBackend, PatternSearchBackend, SemanticSearchBackend};

pub struct Cortex {
    scope_id: String,
    scope_key: String,
    fuser: ResultFuser,
    lifecycle: Arc<dyn PatternLifecycleService>,
    aggregator: Arc<GrowthAggregator>,
    semantic: Arc<dyn SemanticStore>,
    graph: Option<Arc<dyn GraphStore>>,
    event_bus: EventBus,
    monitor_config: HealthMonitorConfig,
}

impl Cortex {
    pub fn builder(scope_id: impl Into<String>) -> CortexBuilder {
        CortexBuilder::new(scope_id)
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn search_sources(&self) -> Vec<String> {
        self.fuser.backend_names()
    }

    pub async fn search(&self, request: SearchRequest) -> CortexResult<SearchResult> {
        if request.query.trim().is_empty() {
            return Err(validation("search query must not be empty"));
        }
        self.fuser.fuse(&request, &self.scope_id).await
    }

    /// Store a memory for this scope in the semantic store, and as an episode
    /// in the graph store when one is configured. The graph write is best
    /// effort.
    pub async fn add_memory(&self, text: &str, mut metadata: Map<String, Value>) -> CortexResult<String> {
        if text.trim().is_empty() {
            return Err(validation("memory text must not be empty"));
        }
        metadata.insert(self.scope_key.clone(), Value::String(self.scope_id.clone()));
        let id = self.semantic.add(text, metadata.clone()).await?;

        if let Some(graph) = &self.graph {
            if let Err(e) = graph.add_episode(text, metadata).await {
                warn!(error = %e, memory_id = %id, "Graph episode write failed");
            }
        }
        info!(memory_id = %id, "Memory stored");
        Ok(id)
    }

    pub async fn create_pattern(&self, draft: NewPattern) -> CortexResult<Pattern> {
        self.lifecycle.create(draft).await
    }

    pub async fn get_pattern(&self, id: PatternId) -> CortexResult<Pattern> {
        self.lifecycle.get(id).await
    }

    pub async fn reinforce_pattern(&self, id: PatternId, evidence: Option<Vec<String>>) -> CortexResult<Pattern> {
        self.lifecycle.reinforce(id, evidence.unwrap_or_default()).await
    }

    pub async fn record_pattern_outcome(&self, id: PatternId, success: bool) -> CortexResult<Pattern> {
        self.lifecycle.record_outcome(id, success).await
    }

    pub async fn record_experience(&self, topic: &str, summary: &str, details: Map<String, Value>) -> CortexResult<GrowthEvent> {
        self.lifecycle.record_experience(topic, summary, details).await
    }

    pub async fn get_health_snapshot(&self) -> HealthSnapshot {
        self.aggregator.snapshot().await
    }

    pub async fn get_growth_window(&self, days: i64) -> GrowthWindow {
        self.aggregator.growth_window(days).await
    }

    pub async fn get_milestones(&self) -> MilestoneProgress {
        self.aggregator.milestones().await
    }

    /// Logged growth events since `since`, including those written by other
    /// processes sharing the same relational store.
    pub async fn events_since(&self, since: DateTime<Utc>) -> CortexResult<Vec<GrowthEvent>> {
        self.aggregator.events_since(since).await
    }

    pub fn lifecycle(&self) -> &Arc<dyn PatternLifecycleService> {
        &self.lifecycle
    }

    pub fn aggregator(&self) -> &Arc<GrowthAggregator> {
        &self.aggregator
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.event_bus.subscribe()
    }

    /// Start the periodic health monitor. Cancel it through
    /// [`HealthMonitor::shutdown_token`].
    pub fn spawn_health_monitor(&self) -> (Arc<HealthMonitor>, JoinHandle<()>) {
        let monitor = Arc::new(HealthMonitor::new(self.aggregator.clone(), self.monitor_config.clone()));
        let handle = monitor.clone().start();
        (monitor, handle)
    }
}

/// Assembles a [`Cortex`] from injected stores.
///
/// A semantic store and a pattern store are required; graph store,
/// reranker and content-type registry are optional.
pub struct CortexBuilder {
    scope_id: String,
    scope_key: String,
    fusion: FusionConfig,
    lifecycle_config: LifecycleConfig,
    retry: RetryPolicy,
    semantic: Option<Arc<dyn SemanticStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    patterns: Option<(Arc<dyn PatternRepository>, Arc<dyn AuditLog>)>,
    reviews: Option<Arc<dyn ReviewHistory>>,
    reranker: Option<Arc<dyn Reranker>>,
    content_types: Option<Arc<ContentTypeRegistry>>,
    extra_backends: Vec<Arc<dyn SearchBackend>>,
    event_bus: Option<EventBus>,
}

impl CortexBuilder {
    pub fn new(scope_id: impl Into<String>) -> Self {
        Self {
            scope_id: scope_id.into(),
            scope_key: crate::domain::filter::DEFAULT_SCOPE_KEY.to_string(),
            fusion: FusionConfig::default(),
            lifecycle_config: LifecycleConfig::default(),
            retry: RetryPolicy::default(),
            semantic: None,
            graph: None,
            patterns: None,
            reviews: None,
            reranker: None,
            content_types: None,
            extra_backends: Vec::new(),
            event_bus: None,
        }
    }

    /// Scope, search, lifecycle and retry settings from a config spec.
    pub fn from_spec(spec: &CortexConfigSpec) -> Self {
        let mut builder = Self::new(spec.scope_id.clone());
        builder.scope_key = spec.search.scope_key.clone();
        builder.fusion = FusionConfig::from(&spec.search);
        builder.lifecycle_config = spec.lifecycle.clone();
        builder.retry = RetryPolicy::from(&spec.retry);
        builder
    }

    pub fn fusion_config(mut self, config: FusionConfig) -> Self {
        self.fusion = config;
        self
    }

    pub fn lifecycle_config(mut self, config: LifecycleConfig) -> Self {
        self.lifecycle_config = config;
        self
    }

    pub fn retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn semantic_store(mut self, store: Arc<dyn SemanticStore>) -> Self {
        self.semantic = Some(store);
        self
    }

    pub fn graph_store(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    /// The relational store: pattern rows and their audit log.
    pub fn pattern_store(mut self, repository: Arc<dyn PatternRepository>, audit: Arc<dyn AuditLog>) -> Self {
        self.patterns = Some((repository, audit));
        self
    }

    pub fn review_history(mut self, reviews: Arc<dyn ReviewHistory>) -> Self {
        self.reviews = Some(reviews);
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn content_types(mut self, registry: Arc<ContentTypeRegistry>) -> Self {
        self.content_types = Some(registry);
        self
    }

    /// Additional backend queried after the built-in ones.
    pub fn search_backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        self.extra_backends.push(backend);
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn build(self) -> CortexResult<Cortex> {
        if self.scope_id.trim().is_empty() {
            return Err(CortexError::Validation("scope_id must not be empty".to_string()));
        }
        let semantic = self
            .semantic
            .ok_or_else(|| CortexError::BackendUnavailable("semantic store not configured".to_string()))?;
        let (repository, audit) = self
            .patterns
            .ok_or_else(|| CortexError::BackendUnavailable("pattern store not configured".to_string()))?;
        let reviews = self.reviews.unwrap_or_else(|| Arc::new(InMemoryReviewHistory::new()));
        let event_bus = self.event_bus.unwrap_or_default();

        let mut lifecycle = StandardPatternLifecycle::new(repository.clone(), audit.clone(), event_bus.clone())
            .with_lifecycle_config(&self.lifecycle_config)
            .with_retry_policy(self.retry);
        if let Some(registry) = self.content_types {
            lifecycle = lifecycle.with_content_types(registry);
        }
        let lifecycle: Arc<dyn PatternLifecycleService> = Arc::new(lifecycle);

        let mut fuser = ResultFuser::new(FilterTreeBuilder::new(self.scope_key.clone()), self.fusion.clone())
            .with_backend(Arc::new(SemanticSearchBackend::new(semantic.clone())))
            .with_backend(Arc::new(PatternSearchBackend::new(repository).with_scope_key(self.scope_key.clone())));
        if let Some(graph) = &self.graph {
            fuser = fuser.with_backend(Arc::new(GraphSearchBackend::new(graph.clone())));
        }
        for backend in self.extra_backends {
            fuser = fuser.with_backend(backend);
        }
        if let Some(reranker) = self.reranker {
            fuser = fuser.with_reranker(reranker);
        }

        let mut aggregator = GrowthAggregator::new(lifecycle.clone(), audit, reviews, self.scope_id.clone())
            .with_semantic_store(semantic.clone())
            .with_read_timeout(self.fusion.backend_timeout)
            .with_stale_days(self.lifecycle_config.stale_days);
        if let Some(graph) = &self.graph {
            aggregator = aggregator.with_graph_store(graph.clone());
        }

        info!(
            scope_id = %self.scope_id,
            backends = ?fuser.backend_names(),
            reranker = fuser.has_reranker(),
            "Cortex assembled"
        );

        Ok(Cortex {
            scope_id: self.scope_id,
            scope_key: self.scope_key,
            fuser,
            lifecycle,
            aggregator: Arc::new(aggregator),
            semantic,
            graph: self.graph,
            event_bus,
            monitor_config: HealthMonitorConfig {
                interval: self.lifecycle_config.monitor_interval,
                enabled: true,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::GrowthEventType;
    use crate::infrastructure::graph_store::InMemoryGraphStore;
    use crate::infrastructure::memory_store::InMemorySemanticStore;
    use crate::infrastructure::pattern_repository::InMemoryPatternRepository;

    fn cortex() -> Cortex {
        let repo = Arc::new(InMemoryPatternRepository::new());
        Cortex::builder("writer")
            .semantic_store(Arc::new(InMemorySemanticStore::new()))
            .graph_store(Arc::new(InMemoryGraphStore::new()))
            .pattern_store(repo.clone(), repo)
            .build()
            .unwrap()
    }

    #[test]
    fn test_build_requires_stores() {
        let err = Cortex::builder("writer").build().err().unwrap();
        assert!(matches!(err, CortexError::BackendUnavailable(_)));

        let err = Cortex::builder("writer")
            .semantic_store(Arc::new(InMemorySemanticStore::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, CortexError::BackendUnavailable(msg) if msg.contains("pattern")));
    }

    #[test]
    fn test_backend_order() {
        assert_eq!(cortex().search_sources(), vec!["semantic", "relational", "graph"]);
    }

    #[tokio::test]
    async fn test_memory_and_pattern_are_both_searchable() {
        let cortex = cortex();
        cortex.add_memory("Open with a question hook", Map::new()).await.unwrap();
        cortex
            .create_pattern(NewPattern::new("Question Hook", "openings", "Open with a question"))
            .await
            .unwrap();

        let result = cortex.search(SearchRequest::new("question hook")).await.unwrap();
        assert!(!result.all_backends_failed());
        assert!(result.search_sources.contains(&"semantic".to_string()));
        assert!(result.search_sources.contains(&"relational".to_string()));
        assert_eq!(result.memories.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let err = cortex().search(SearchRequest::new("   ")).await.unwrap_err();
        assert!(matches!(err, CortexError::Validation(_)));
    }

    #[tokio::test]
    async fn test_reinforce_without_evidence() {
        let cortex = cortex();
        let pattern = cortex.create_pattern(NewPattern::new("Hook", "openings", "x")).await.unwrap();
        let reinforced = cortex.reinforce_pattern(pattern.id, None).await.unwrap();
        assert_eq!(reinforced.use_count, 2);
        assert!(reinforced.evidence.is_empty());
    }

    #[tokio::test]
    async fn test_events_written_elsewhere_are_visible() {
        let repo = Arc::new(InMemoryPatternRepository::new());
        let open = || {
            Cortex::builder("writer")
                .semantic_store(Arc::new(InMemorySemanticStore::new()))
                .pattern_store(repo.clone(), repo.clone())
                .build()
                .unwrap()
        };
        let (watcher, writer) = (open(), open());
        let since = Utc::now();

        let pattern = writer.create_pattern(NewPattern::new("Hook", "openings", "x")).await.unwrap();
        writer.reinforce_pattern(pattern.id, None).await.unwrap();

        let types: Vec<_> = watcher
            .events_since(since)
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            types,
            vec![
                GrowthEventType::PatternCreated,
                GrowthEventType::PatternReinforced,
                GrowthEventType::ConfidenceUpgraded,
            ]
        );
    }
}
