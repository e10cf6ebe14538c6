// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Growth & Health Aggregation
//!
//! Read-only summaries derived from pattern state, the growth event log and
//! the review history:
//!
//! - [`GrowthAggregator::snapshot`]: counts by confidence, topic histogram,
//!   memory count, graph status
//! - [`GrowthAggregator::growth_window`]: event counts, review score trend,
//!   stale pattern names
//! - [`GrowthAggregator::milestones`]: progress through fixed tiers
//!
//! Every sub-read is bounded by a timeout. A failed sub-read is recorded in
//! the summary's `errors` map and its field omitted; the summary itself is
//! always returned.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::pattern_lifecycle::PatternLifecycleService;
use crate::domain::backend::{GraphStore, SemanticStore};
use crate::domain::error::CortexResult;
use crate::domain::events::{GrowthEvent, GrowthEventType};
use crate::domain::pattern::{Confidence, Pattern};
use crate::domain::repository::{AuditLog, ReviewHistory};
use crate::domain::review::ReviewHistoryEntry;

/// Score difference between window halves beyond which a trend is reported.
pub const TREND_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub taken_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_patterns: Option<usize>,
    /// Keyed by `LOW` / `MEDIUM` / `HIGH`; every level present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence_counts: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic_histogram: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_count: Option<usize>,
    pub graph_status: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewTrend {
    pub direction: TrendDirection,
    pub review_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_half_average: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub second_half_average: Option<f64>,
}

impl ReviewTrend {
    /// Split reviews (oldest first) into two halves by count and compare
    /// average scores. The odd middle review belongs to the second half.
    pub fn from_reviews(reviews: &[ReviewHistoryEntry]) -> Self {
        if reviews.len() < 2 {
            return Self {
                direction: TrendDirection::InsufficientData,
                review_count: reviews.len(),
                first_half_average: None,
                second_half_average: None,
            };
        }

        let (first, second) = reviews.split_at(reviews.len() / 2);
        let first_avg = average_score(first).unwrap_or_default();
        let second_avg = average_score(second).unwrap_or_default();
        let delta = second_avg - first_avg;
        let direction = if delta > TREND_THRESHOLD {
            TrendDirection::Improving
        } else if delta < -TREND_THRESHOLD {
            TrendDirection::Declining
        } else {
            TrendDirection::Stable
        };

        Self {
            direction,
            review_count: reviews.len(),
            first_half_average: Some(first_avg),
            second_half_average: Some(second_avg),
        }
    }
}

/// Start of a look-back window of `days` ending at `now`. Negative windows
/// are empty; windows reaching before 1970 start at the epoch.
fn window_start(now: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    if days <= 0 {
        return now;
    }
    chrono::Duration::try_days(days)
        .and_then(|span| now.checked_sub_signed(span))
        .map_or(DateTime::<Utc>::UNIX_EPOCH, |start| start.max(DateTime::<Utc>::UNIX_EPOCH))
}

fn average_score(reviews: &[ReviewHistoryEntry]) -> Option<f64> {
    if reviews.is_empty() {
        return None;
    }
    Some(reviews.iter().map(|r| r.overall_score).sum::<f64>() / reviews.len() as f64)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthWindow {
    pub days: i64,
    pub since: DateTime<Utc>,
    /// Every event type is present, zero when nothing happened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_counts: Option<BTreeMap<String, usize>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_trend: Option<ReviewTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stale_patterns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MilestoneTier {
    pub name: &'static str,
    pub min_patterns: usize,
    /// Patterns at MEDIUM or above.
    pub min_medium: usize,
    pub min_high: usize,
    pub min_experiences: usize,
    /// Zero means no review requirement.
    pub min_average_score: f64,
}

/// Ordered least to most demanding.
pub const MILESTONE_TIERS: [MilestoneTier; 5] = [
    MilestoneTier { name: "Apprentice", min_patterns: 1, min_medium: 0, min_high: 0, min_experiences: 0, min_average_score: 0.0 },
    MilestoneTier { name: "Practitioner", min_patterns: 5, min_medium: 2, min_high: 0, min_experiences: 3, min_average_score: 0.0 },
    MilestoneTier { name: "Craftsman", min_patterns: 10, min_medium: 4, min_high: 1, min_experiences: 10, min_average_score: 6.0 },
    MilestoneTier { name: "Expert", min_patterns: 20, min_medium: 8, min_high: 3, min_experiences: 25, min_average_score: 7.0 },
    MilestoneTier { name: "Master", min_patterns: 40, min_medium: 15, min_high: 8, min_experiences: 50, min_average_score: 8.0 },
];

/// Level reported before the first tier is reached.
pub const BASE_LEVEL: &str = "Novice";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MilestoneStats {
    pub patterns: usize,
    pub medium_or_higher: usize,
    pub high: usize,
    pub experiences: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_review_score: Option<f64>,
}

impl MilestoneStats {
    pub fn from_patterns(patterns: &[Pattern]) -> Self {
        Self {
            patterns: patterns.len(),
            medium_or_higher: patterns.iter().filter(|p| p.confidence >= Confidence::Medium).count(),
            high: patterns.iter().filter(|p| p.confidence == Confidence::High).count(),
            ..Default::default()
        }
    }

    /// Requirements of `tier` not yet met, as human-readable gaps.
    pub fn missing_for(&self, tier: &MilestoneTier) -> Vec<String> {
        let mut missing = Vec::new();
        if self.patterns < tier.min_patterns {
            missing.push(format!("patterns {}/{}", self.patterns, tier.min_patterns));
        }
        if self.medium_or_higher < tier.min_medium {
            missing.push(format!("medium+ patterns {}/{}", self.medium_or_higher, tier.min_medium));
        }
        if self.high < tier.min_high {
            missing.push(format!("high patterns {}/{}", self.high, tier.min_high));
        }
        if self.experiences < tier.min_experiences {
            missing.push(format!("experiences {}/{}", self.experiences, tier.min_experiences));
        }
        if tier.min_average_score > 0.0 {
            match self.average_review_score {
                Some(avg) if avg >= tier.min_average_score => {}
                Some(avg) => missing.push(format!("average review score {avg:.1}/{:.1}", tier.min_average_score)),
                None => missing.push(format!("average review score -/{:.1}", tier.min_average_score)),
            }
        }
        missing
    }

    pub fn meets(&self, tier: &MilestoneTier) -> bool {
        self.missing_for(tier).is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextMilestone {
    pub name: String,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MilestoneProgress {
    pub level: String,
    pub completed: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<NextMilestone>,
    pub stats: MilestoneStats,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<String, String>,
}

impl MilestoneProgress {
    pub fn evaluate(stats: MilestoneStats) -> Self {
        let reached = MILESTONE_TIERS.iter().rposition(|tier| stats.meets(tier));
        let level = reached.map(|i| MILESTONE_TIERS[i].name).unwrap_or(BASE_LEVEL).to_string();
        let completed = MILESTONE_TIERS
            .iter()
            .filter(|tier| stats.meets(tier))
            .map(|tier| tier.name.to_string())
            .collect();
        let next_index = reached.map_or(0, |i| i + 1);
        let next = MILESTONE_TIERS.get(next_index).map(|tier| NextMilestone {
            name: tier.name.to_string(),
            missing: stats.missing_for(tier),
        });

        Self { level, completed, next, stats, errors: BTreeMap::new() }
    }
}

pub struct GrowthAggregator {
    lifecycle: Arc<dyn PatternLifecycleService>,
    audit: Arc<dyn AuditLog>,
    reviews: Arc<dyn ReviewHistory>,
    semantic: Option<Arc<dyn SemanticStore>>,
    graph: Option<Arc<dyn GraphStore>>,
    scope_id: String,
    read_timeout: Duration,
    stale_days: i64,
}

impl GrowthAggregator {
    pub fn new(
        lifecycle: Arc<dyn PatternLifecycleService>,
        audit: Arc<dyn AuditLog>,
        reviews: Arc<dyn ReviewHistory>,
        scope_id: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle,
            audit,
            reviews,
            semantic: None,
            graph: None,
            scope_id: scope_id.into(),
            read_timeout: Duration::from_secs(10),
            stale_days: 30,
        }
    }

    pub fn with_semantic_store(mut self, store: Arc<dyn SemanticStore>) -> Self {
        self.semantic = Some(store);
        self
    }

    pub fn with_graph_store(mut self, graph: Arc<dyn GraphStore>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_stale_days(mut self, days: i64) -> Self {
        self.stale_days = days;
        self
    }

    /// Run one sub-read under the read timeout, recording any failure under
    /// `key`.
    async fn bounded<T, E, F>(&self, key: &str, errors: &mut BTreeMap<String, String>, read: F) -> Option<T>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.read_timeout, read).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                warn!(read = key, error = %e, "Summary sub-read failed");
                errors.insert(key.to_string(), e.to_string());
                None
            }
            Err(_) => {
                warn!(read = key, timeout_ms = self.read_timeout.as_millis() as u64, "Summary sub-read timed out");
                errors.insert(key.to_string(), format!("timed out after {}ms", self.read_timeout.as_millis()));
                None
            }
        }
    }

    pub async fn snapshot(&self) -> HealthSnapshot {
        let mut errors = BTreeMap::new();

        let patterns = self.bounded("patterns", &mut errors, self.lifecycle.list()).await;
        let (total_patterns, confidence_counts, topic_histogram) = match patterns {
            Some(patterns) => {
                let mut by_confidence: BTreeMap<String, usize> =
                    [Confidence::Low, Confidence::Medium, Confidence::High].iter().map(|c| (c.as_str().to_string(), 0)).collect();
                let mut topics = BTreeMap::new();
                for pattern in &patterns {
                    *by_confidence.entry(pattern.confidence.as_str().to_string()).or_default() += 1;
                    *topics.entry(pattern.topic.clone()).or_default() += 1;
                }
                (Some(patterns.len()), Some(by_confidence), Some(topics))
            }
            None => (None, None, None),
        };

        let memory_count = match &self.semantic {
            Some(store) => self.bounded("memory_count", &mut errors, store.count(&self.scope_id)).await,
            None => {
                errors.insert("memory_count".to_string(), "semantic store not configured".to_string());
                None
            }
        };

        let graph_status = match &self.graph {
            Some(graph) => match self.bounded("graph_status", &mut errors, graph.health_check()).await {
                Some(health) => health.status,
                None => "unreachable".to_string(),
            },
            None => "not_configured".to_string(),
        };

        debug!(errors = errors.len(), "Health snapshot computed");
        HealthSnapshot {
            taken_at: Utc::now(),
            total_patterns,
            confidence_counts,
            topic_histogram,
            memory_count,
            graph_status,
            errors,
        }
    }

    pub async fn growth_window(&self, days: i64) -> GrowthWindow {
        let since = window_start(Utc::now(), days);
        let mut errors = BTreeMap::new();

        let event_counts = self
            .bounded("events", &mut errors, self.audit.events_since(since))
            .await
            .map(|events| {
                let mut counts: BTreeMap<String, usize> =
                    GrowthEventType::ALL.iter().map(|t| (t.as_str().to_string(), 0)).collect();
                for event in &events {
                    *counts.entry(event.event_type.as_str().to_string()).or_default() += 1;
                }
                counts
            });

        let review_trend = self
            .bounded("reviews", &mut errors, self.reviews.reviews_since(since))
            .await
            .map(|reviews| ReviewTrend::from_reviews(&reviews));

        let stale_patterns = self
            .bounded("stale_patterns", &mut errors, self.lifecycle.stale_patterns(self.stale_days))
            .await;

        GrowthWindow { days, since, event_counts, review_trend, stale_patterns, errors }
    }

    pub async fn milestones(&self) -> MilestoneProgress {
        let mut errors = BTreeMap::new();

        let mut stats = self
            .bounded("patterns", &mut errors, self.lifecycle.list())
            .await
            .map(|patterns| MilestoneStats::from_patterns(&patterns))
            .unwrap_or_default();

        if let Some(events) = self.bounded("events", &mut errors, self.audit.events_since(DateTime::<Utc>::UNIX_EPOCH)).await {
            stats.experiences = events
                .iter()
                .filter(|e| e.event_type == GrowthEventType::ExperienceRecorded)
                .count();
        }

        if let Some(reviews) = self.bounded("reviews", &mut errors, self.reviews.all_reviews()).await {
            stats.average_review_score = average_score(&reviews);
        }

        let mut progress = MilestoneProgress::evaluate(stats);
        progress.errors = errors;
        progress
    }

    /// Growth events logged at or after `since`, oldest first. Reads the
    /// durable audit log, so events written by other processes are included.
    pub async fn events_since(&self, since: DateTime<Utc>) -> CortexResult<Vec<GrowthEvent>> {
        Ok(self.audit.events_since(since).await?)
    }

    pub async fn stale_names(&self) -> Vec<String> {
        match self.lifecycle.stale_patterns(self.stale_days).await {
            Ok(names) => names,
            Err(e) => {
                warn!(error = %e, "Stale pattern scan failed");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reviews(scores: &[f64]) -> Vec<ReviewHistoryEntry> {
        scores.iter().map(|s| ReviewHistoryEntry::new("newsletter", *s, "ok")).collect()
    }

    #[test]
    fn test_trend_needs_two_reviews() {
        let trend = ReviewTrend::from_reviews(&reviews(&[7.0]));
        assert_eq!(trend.direction, TrendDirection::InsufficientData);
        assert_eq!(trend.first_half_average, None);
    }

    #[test]
    fn test_trend_directions() {
        assert_eq!(ReviewTrend::from_reviews(&reviews(&[5.0, 5.0, 7.0, 7.0])).direction, TrendDirection::Improving);
        assert_eq!(ReviewTrend::from_reviews(&reviews(&[8.0, 6.0])).direction, TrendDirection::Declining);
        // exactly half a point is still stable
        assert_eq!(ReviewTrend::from_reviews(&reviews(&[6.0, 6.5])).direction, TrendDirection::Stable);
    }

    #[test]
    fn test_odd_middle_review_goes_to_second_half() {
        let trend = ReviewTrend::from_reviews(&reviews(&[4.0, 8.0, 8.0]));
        assert_eq!(trend.first_half_average, Some(4.0));
        assert_eq!(trend.second_half_average, Some(8.0));
    }

    #[test]
    fn test_window_start_clamps_large_windows() {
        let now = Utc::now();
        assert_eq!(window_start(now, 0), now);
        assert_eq!(window_start(now, -3), now);
        assert_eq!(window_start(now, 7), now - chrono::Duration::days(7));
        assert_eq!(window_start(now, 1_000_000_000), DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(window_start(now, i64::MAX), DateTime::<Utc>::UNIX_EPOCH);
    }

    #[test]
    fn test_novice_before_first_tier() {
        let progress = MilestoneProgress::evaluate(MilestoneStats::default());
        assert_eq!(progress.level, BASE_LEVEL);
        assert!(progress.completed.is_empty());
        let next = progress.next.unwrap();
        assert_eq!(next.name, "Apprentice");
        assert_eq!(next.missing, vec!["patterns 0/1".to_string()]);
    }

    #[test]
    fn test_level_is_most_restrictive_met_tier() {
        let stats = MilestoneStats {
            patterns: 12,
            medium_or_higher: 5,
            high: 1,
            experiences: 10,
            average_review_score: Some(6.5),
        };
        let progress = MilestoneProgress::evaluate(stats);
        assert_eq!(progress.level, "Craftsman");
        assert_eq!(progress.completed, vec!["Apprentice", "Practitioner", "Craftsman"]);
        assert_eq!(progress.next.unwrap().name, "Expert");
    }

    #[test]
    fn test_score_requirement_without_reviews() {
        let stats = MilestoneStats {
            patterns: 10,
            medium_or_higher: 4,
            high: 1,
            experiences: 10,
            average_review_score: None,
        };
        let progress = MilestoneProgress::evaluate(stats);
        assert_eq!(progress.level, "Practitioner");
        let next = progress.next.unwrap();
        assert_eq!(next.missing, vec!["average review score -/6.0".to_string()]);
    }

    #[test]
    fn test_master_has_no_next() {
        let stats = MilestoneStats {
            patterns: 40,
            medium_or_higher: 15,
            high: 8,
            experiences: 50,
            average_review_score: Some(9.0),
        };
        let progress = MilestoneProgress::evaluate(stats);
        assert_eq!(progress.level, "Master");
        assert!(progress.next.is_none());
    }
}
