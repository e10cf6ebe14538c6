// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Health Monitor - background task that periodically recomputes the health
//! snapshot and reports stale patterns.
//!
//! The latest snapshot is kept in memory so callers can read it without
//! waiting for a fresh scan.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::growth::{GrowthAggregator, HealthSnapshot};

#[derive(Debug, Clone)]
pub struct HealthMonitorConfig {
    /// How often a cycle runs
    pub interval: Duration,

    pub enabled: bool,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
            enabled: true,
        }
    }
}

pub struct HealthMonitor {
    aggregator: Arc<GrowthAggregator>,
    config: HealthMonitorConfig,
    shutdown_token: CancellationToken,
    last_snapshot: Mutex<Option<HealthSnapshot>>,
}

impl HealthMonitor {
    pub fn new(aggregator: Arc<GrowthAggregator>, config: HealthMonitorConfig) -> Self {
        Self {
            aggregator,
            config,
            shutdown_token: CancellationToken::new(),
            last_snapshot: Mutex::new(None),
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn last_snapshot(&self) -> Option<HealthSnapshot> {
        self.last_snapshot.lock().clone()
    }

    /// Start the monitor background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Health monitor is disabled");
            return;
        }
        if self.config.interval.is_zero() {
            warn!("Health monitor interval is zero, not starting");
            return;
        }

        info!(interval_secs = self.config.interval.as_secs(), "Starting health monitor background task");

        let mut tick = interval(self.config.interval);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running health monitor cycle");
                    self.run_cycle().await;
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping health monitor");
                    break;
                }
            }
        }

        info!("Health monitor background task stopped");
    }

    /// Execute a single monitoring cycle and return the fresh snapshot.
    pub async fn run_cycle(&self) -> HealthSnapshot {
        let snapshot = self.aggregator.snapshot().await;
        let stale = self.aggregator.stale_names().await;

        if !stale.is_empty() {
            warn!(count = stale.len(), patterns = ?stale, "Stale patterns need reinforcement or review");
        }
        if !snapshot.errors.is_empty() {
            warn!(errors = ?snapshot.errors, "Health snapshot is incomplete");
        }
        info!(
            total_patterns = snapshot.total_patterns,
            memory_count = snapshot.memory_count,
            graph_status = %snapshot.graph_status,
            "Health monitor cycle completed"
        );

        *self.last_snapshot.lock() = Some(snapshot.clone());
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::pattern_lifecycle::{PatternLifecycleService, StandardPatternLifecycle};
    use crate::domain::pattern::NewPattern;
    use crate::infrastructure::event_bus::EventBus;
    use crate::infrastructure::pattern_repository::{InMemoryPatternRepository, InMemoryReviewHistory};

    async fn monitor(interval: Duration) -> Arc<HealthMonitor> {
        let repo = InMemoryPatternRepository::new();
        let lifecycle = Arc::new(StandardPatternLifecycle::new(
            Arc::new(repo.clone()),
            Arc::new(repo.clone()),
            EventBus::new(16),
        ));
        lifecycle.create(NewPattern::new("Hook First", "openings", "x")).await.unwrap();
        let aggregator = GrowthAggregator::new(lifecycle, Arc::new(repo), Arc::new(InMemoryReviewHistory::new()), "writer");
        Arc::new(HealthMonitor::new(
            Arc::new(aggregator),
            HealthMonitorConfig { interval, enabled: true },
        ))
    }

    #[tokio::test]
    async fn test_cycle_stores_snapshot() {
        let monitor = monitor(Duration::from_secs(60)).await;
        assert!(monitor.last_snapshot().is_none());

        let snapshot = monitor.run_cycle().await;
        assert_eq!(snapshot.total_patterns, Some(1));
        assert_eq!(snapshot.graph_status, "not_configured");
        assert!(snapshot.errors.contains_key("memory_count"));
        assert_eq!(monitor.last_snapshot(), Some(snapshot));
    }

    #[tokio::test]
    async fn test_shutdown_stops_task() {
        let monitor = monitor(Duration::from_millis(10)).await;
        let token = monitor.shutdown_token();
        let handle = monitor.clone().start();

        tokio::time::sleep(Duration::from_millis(30)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(monitor.last_snapshot().is_some());
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_start() {
        let monitor = monitor(Duration::ZERO).await;
        let handle = monitor.clone().start();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(monitor.last_snapshot().is_none());
    }
}
