// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Application layer: use cases orchestrating the domain over injected stores

pub mod content_types;
pub mod cortex_service;
pub mod fusion;
pub mod growth;
pub mod health_monitor;
pub mod pattern_lifecycle;
pub mod query_expansion;
pub mod retry;

pub use content_types::{ContentTypeRegistry, ContentTypeSource, StaticContentTypes};
pub use cortex_service::{Cortex, CortexBuilder};
pub use fusion::{dedup_memories, FusionConfig, ResultFuser, SearchRequest};
pub use growth::{
    GrowthAggregator, GrowthWindow, HealthSnapshot, MilestoneProgress, MilestoneStats, ReviewTrend, TrendDirection,
    MILESTONE_TIERS,
};
pub use health_monitor::{HealthMonitor, HealthMonitorConfig};
pub use pattern_lifecycle::{PatternLifecycleService, StandardPatternLifecycle};
pub use query_expansion::expand_query;
pub use retry::{retry_transient, RetryPolicy};
