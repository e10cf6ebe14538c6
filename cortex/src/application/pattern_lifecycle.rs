// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Lifecycle Manager
//!
//! Owns every mutation of a [`Pattern`]: creation, reinforcement, failure
//! tracking, downgrade and staleness evaluation. Each mutation persists the
//! pattern and its audit rows in one repository call, then publishes the
//! new growth events on the [`EventBus`].
//!
//! ## Concurrency
//!
//! Read-modify-write cycles on one pattern id run under a per-id async
//! lock, and every save carries the version it read. Reinforcement and
//! downgrade share the lock, so whichever runs second re-reads the state the
//! first one committed. A version conflict (a writer outside this process)
//! is transient and retried from a fresh read.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::application::content_types::ContentTypeRegistry;
use crate::application::retry::{retry_transient, validation, RetryPolicy};
use crate::domain::cortex_config::LifecycleConfig;
use crate::domain::error::{CortexError, CortexResult};
use crate::domain::events::{AuditBatch, ConfidenceTransition, GrowthEvent, GrowthEventType};
use crate::domain::pattern::{NewPattern, Pattern, PatternId};
use crate::domain::repository::{AuditLog, PatternRepository};
use crate::infrastructure::event_bus::EventBus;

#[async_trait]
pub trait PatternLifecycleService: Send + Sync {
    /// Fails with `Conflict` when the name is taken, ignoring case.
    async fn create(&self, draft: NewPattern) -> CortexResult<Pattern>;

    async fn get(&self, id: PatternId) -> CortexResult<Pattern>;

    /// Case-insensitive exact match.
    async fn find_by_name(&self, name: &str) -> CortexResult<Option<Pattern>>;

    async fn reinforce(&self, id: PatternId, new_evidence: Vec<String>) -> CortexResult<Pattern>;

    async fn reinforce_by_name(&self, name: &str, new_evidence: Vec<String>) -> CortexResult<Pattern>;

    async fn record_failure(&self, id: PatternId) -> CortexResult<Pattern>;

    async fn record_success(&self, id: PatternId) -> CortexResult<Pattern>;

    /// Step confidence down once when `consecutive_failures >= threshold`.
    /// Returns the pattern unchanged otherwise.
    async fn downgrade_if_needed(&self, id: PatternId, threshold: u32) -> CortexResult<Pattern>;

    /// Success or failure signal followed by the downgrade check, as one
    /// write.
    async fn record_outcome(&self, id: PatternId, success: bool) -> CortexResult<Pattern>;

    /// Names of stale patterns, oldest first, capped for display.
    async fn stale_patterns(&self, cutoff_days: i64) -> CortexResult<Vec<String>>;

    async fn record_experience(&self, topic: &str, summary: &str, details: Map<String, Value>) -> CortexResult<GrowthEvent>;

    /// Universal patterns plus those tagged for `content_type`, strongest
    /// first.
    async fn patterns_for_content_type(&self, content_type: &str) -> CortexResult<Vec<Pattern>>;

    async fn list(&self) -> CortexResult<Vec<Pattern>>;
}

pub struct StandardPatternLifecycle {
    repository: Arc<dyn PatternRepository>,
    audit: Arc<dyn AuditLog>,
    event_bus: EventBus,
    content_types: Option<Arc<ContentTypeRegistry>>,
    locks: DashMap<PatternId, Arc<Mutex<()>>>,
    retry: RetryPolicy,
    downgrade_threshold: u32,
    stale_display_limit: usize,
}

impl StandardPatternLifecycle {
    pub fn new(repository: Arc<dyn PatternRepository>, audit: Arc<dyn AuditLog>, event_bus: EventBus) -> Self {
        let defaults = LifecycleConfig::default();
        Self {
            repository,
            audit,
            event_bus,
            content_types: None,
            locks: DashMap::new(),
            retry: RetryPolicy::default(),
            downgrade_threshold: defaults.downgrade_threshold,
            stale_display_limit: defaults.stale_display_limit,
        }
    }

    pub fn with_lifecycle_config(mut self, config: &LifecycleConfig) -> Self {
        self.downgrade_threshold = config.downgrade_threshold.max(1);
        self.stale_display_limit = config.stale_display_limit;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_content_types(mut self, registry: Arc<ContentTypeRegistry>) -> Self {
        self.content_types = Some(registry);
        self
    }

    pub fn downgrade_threshold(&self) -> u32 {
        self.downgrade_threshold
    }

    fn today() -> NaiveDate {
        Utc::now().date_naive()
    }

    async fn lock(&self, id: PatternId) -> PatternLock<'_> {
        let lock = self.locks.entry(id).or_default().clone();
        PatternLock { locks: &self.locks, id, guard: Some(lock.lock_owned().await) }
    }

    async fn load(&self, id: PatternId) -> CortexResult<Pattern> {
        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| CortexError::NotFound(id.to_string()))
    }

    fn publish(&self, audit: &AuditBatch) {
        self.event_bus.publish_all(&audit.events);
    }

    async fn persist(&self, pattern: &Pattern, audit: AuditBatch) -> CortexResult<Pattern> {
        let stored = self.repository.save(pattern, &audit).await?;
        self.publish(&audit);
        Ok(stored)
    }

    async fn reinforce_once(&self, id: PatternId, new_evidence: Vec<String>) -> CortexResult<Pattern> {
        let mut pattern = self.load(id).await?;
        let added = new_evidence.len();
        let change = pattern.reinforce(new_evidence, Self::today());

        let mut audit = AuditBatch::new().event(
            GrowthEvent::for_pattern(GrowthEventType::PatternReinforced, &pattern)
                .with_detail("use_count", pattern.use_count)
                .with_detail("evidence_added", added),
        );
        if let Some(change) = change {
            audit = audit
                .transition(ConfidenceTransition::record(
                    &pattern,
                    change,
                    format!("reinforced to use_count {}", pattern.use_count),
                ))
                .event(
                    GrowthEvent::for_pattern(GrowthEventType::ConfidenceUpgraded, &pattern)
                        .with_detail("from", change.from.as_str())
                        .with_detail("to", change.to.as_str()),
                );
        }

        let stored = self.persist(&pattern, audit).await?;
        metrics::counter!("inkwell_pattern_reinforcements_total").increment(1);
        match change {
            Some(change) => info!(
                pattern = %stored.name,
                use_count = stored.use_count,
                from = %change.from,
                to = %change.to,
                "Pattern reinforced, confidence upgraded"
            ),
            None => info!(pattern = %stored.name, use_count = stored.use_count, "Pattern reinforced"),
        }
        Ok(stored)
    }

    /// Apply the downgrade rule to an already loaded pattern and append the
    /// matching audit rows.
    fn apply_downgrade(pattern: &mut Pattern, threshold: u32, audit: AuditBatch) -> (AuditBatch, bool) {
        let failures = pattern.consecutive_failures;
        let Some(change) = pattern.downgrade(threshold) else {
            return (audit, false);
        };
        let reason = format!("{failures} consecutive failures (threshold {threshold})");
        let audit = audit
            .transition(ConfidenceTransition::record(pattern, change, reason))
            .event(
                GrowthEvent::for_pattern(GrowthEventType::ConfidenceDowngraded, pattern)
                    .with_detail("from", change.from.as_str())
                    .with_detail("to", change.to.as_str())
                    .with_detail("consecutive_failures", failures),
            );
        (audit, true)
    }

    async fn downgrade_once(&self, id: PatternId, threshold: u32) -> CortexResult<Pattern> {
        let mut pattern = self.load(id).await?;
        let (audit, downgraded) = Self::apply_downgrade(&mut pattern, threshold, AuditBatch::new());
        if !downgraded {
            debug!(pattern = %pattern.name, failures = pattern.consecutive_failures, "No downgrade needed");
            return Ok(pattern);
        }

        let stored = self.persist(&pattern, audit).await?;
        metrics::counter!("inkwell_pattern_downgrades_total").increment(1);
        warn!(pattern = %stored.name, confidence = %stored.confidence, "Pattern downgraded after repeated failures");
        Ok(stored)
    }

    async fn outcome_once(&self, id: PatternId, success: bool) -> CortexResult<Pattern> {
        let mut pattern = self.load(id).await?;
        if success {
            pattern.record_success();
            return self.persist(&pattern, AuditBatch::new()).await;
        }

        pattern.record_failure();
        let (audit, downgraded) = Self::apply_downgrade(&mut pattern, self.downgrade_threshold, AuditBatch::new());
        let stored = self.persist(&pattern, audit).await?;
        if downgraded {
            metrics::counter!("inkwell_pattern_downgrades_total").increment(1);
            warn!(pattern = %stored.name, confidence = %stored.confidence, "Pattern downgraded after repeated failures");
        } else {
            debug!(pattern = %stored.name, failures = stored.consecutive_failures, "Failure recorded");
        }
        Ok(stored)
    }

    async fn set_failures_once(&self, id: PatternId, failed: bool) -> CortexResult<Pattern> {
        let mut pattern = self.load(id).await?;
        if failed {
            pattern.record_failure();
        } else {
            pattern.record_success();
        }
        self.persist(&pattern, AuditBatch::new()).await
    }

    async fn validate_draft(&self, draft: &NewPattern) -> CortexResult<()> {
        if draft.name.trim().is_empty() {
            return Err(validation("pattern name must not be empty"));
        }
        if draft.topic.trim().is_empty() {
            return Err(validation("pattern topic must not be empty"));
        }
        if draft.pattern_text.trim().is_empty() {
            return Err(validation("pattern text must not be empty"));
        }
        if let (Some(types), Some(registry)) = (&draft.applicable_content_types, &self.content_types) {
            if types.is_empty() {
                return Err(validation("applicable_content_types must be omitted rather than empty"));
            }
            registry.validate(types).await?;
        }
        Ok(())
    }
}

/// Holds the per-id lock. The map entry goes away with the last holder, so
/// ids that were only looked up once do not accumulate.
struct PatternLock<'a> {
    locks: &'a DashMap<PatternId, Arc<Mutex<()>>>,
    id: PatternId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for PatternLock<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the map is left.
        self.locks.remove_if(&self.id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[async_trait]
impl PatternLifecycleService for StandardPatternLifecycle {
    async fn create(&self, draft: NewPattern) -> CortexResult<Pattern> {
        self.validate_draft(&draft).await?;

        let pattern = Pattern::new(draft, Self::today());
        let audit = AuditBatch::new().event(
            GrowthEvent::for_pattern(GrowthEventType::PatternCreated, &pattern)
                .with_detail("confidence", pattern.confidence.as_str())
                .with_detail("use_count", pattern.use_count),
        );

        let stored = retry_transient(self.retry, "create_pattern", || async {
            Ok(self.repository.insert(&pattern, &audit).await?)
        })
        .await
        .map_err(|e| match e {
            CortexError::Conflict(_) => CortexError::Conflict(pattern.name.clone()),
            other => other,
        })?;
        self.publish(&audit);
        info!(pattern = %stored.name, topic = %stored.topic, id = %stored.id, "Pattern created");
        Ok(stored)
    }

    async fn get(&self, id: PatternId) -> CortexResult<Pattern> {
        self.load(id).await
    }

    async fn find_by_name(&self, name: &str) -> CortexResult<Option<Pattern>> {
        Ok(self.repository.find_by_name(name).await?)
    }

    async fn reinforce(&self, id: PatternId, new_evidence: Vec<String>) -> CortexResult<Pattern> {
        let _guard = self.lock(id).await;
        retry_transient(self.retry, "reinforce_pattern", || self.reinforce_once(id, new_evidence.clone())).await
    }

    async fn reinforce_by_name(&self, name: &str, new_evidence: Vec<String>) -> CortexResult<Pattern> {
        let pattern = self
            .find_by_name(name)
            .await?
            .ok_or_else(|| CortexError::NotFound(name.to_string()))?;
        self.reinforce(pattern.id, new_evidence).await
    }

    async fn record_failure(&self, id: PatternId) -> CortexResult<Pattern> {
        let _guard = self.lock(id).await;
        retry_transient(self.retry, "record_failure", || self.set_failures_once(id, true)).await
    }

    async fn record_success(&self, id: PatternId) -> CortexResult<Pattern> {
        let _guard = self.lock(id).await;
        retry_transient(self.retry, "record_success", || self.set_failures_once(id, false)).await
    }

    async fn downgrade_if_needed(&self, id: PatternId, threshold: u32) -> CortexResult<Pattern> {
        if threshold == 0 {
            return Err(validation("downgrade threshold must be at least 1"));
        }
        let _guard = self.lock(id).await;
        retry_transient(self.retry, "downgrade_pattern", || self.downgrade_once(id, threshold)).await
    }

    async fn record_outcome(&self, id: PatternId, success: bool) -> CortexResult<Pattern> {
        let _guard = self.lock(id).await;
        retry_transient(self.retry, "record_outcome", || self.outcome_once(id, success)).await
    }

    async fn stale_patterns(&self, cutoff_days: i64) -> CortexResult<Vec<String>> {
        if cutoff_days < 0 {
            return Err(validation("stale cutoff must not be negative"));
        }
        let today = Self::today();
        let mut stale: Vec<Pattern> = self
            .repository
            .list_all()
            .await?
            .into_iter()
            .filter(|p| p.is_stale(today, cutoff_days))
            .collect();
        stale.sort_by(|a, b| a.date_updated.cmp(&b.date_updated).then_with(|| a.name.cmp(&b.name)));
        Ok(stale.into_iter().take(self.stale_display_limit).map(|p| p.name).collect())
    }

    async fn record_experience(&self, topic: &str, summary: &str, details: Map<String, Value>) -> CortexResult<GrowthEvent> {
        if topic.trim().is_empty() {
            return Err(validation("experience topic must not be empty"));
        }
        let event = GrowthEvent::experience(topic.trim(), details).with_detail("summary", summary);
        let events = [event.clone()];
        retry_transient(self.retry, "record_experience", || async {
            Ok(self.audit.append_events(&events).await?)
        })
        .await?;
        self.event_bus.publish(event.clone());
        info!(topic = %topic.trim(), "Experience recorded");
        Ok(event)
    }

    async fn patterns_for_content_type(&self, content_type: &str) -> CortexResult<Vec<Pattern>> {
        if let Some(registry) = &self.content_types {
            match registry.contains(content_type).await {
                Ok(false) => debug!(content_type, "Content type not in registry"),
                Ok(true) => {}
                Err(e) => warn!(error = %e, "Content-type registry unavailable"),
            }
        }

        let mut patterns: Vec<Pattern> = self
            .repository
            .list_all()
            .await?
            .into_iter()
            .filter(|p| p.applies_to(content_type))
            .collect();
        patterns.sort_by(|a, b| {
            b.confidence
                .cmp(&a.confidence)
                .then_with(|| b.use_count.cmp(&a.use_count))
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(patterns)
    }

    async fn list(&self) -> CortexResult<Vec<Pattern>> {
        Ok(self.repository.list_all().await?)
    }
}
