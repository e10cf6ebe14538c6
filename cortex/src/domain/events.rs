// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Audit records for the pattern lifecycle
//! Both record types are append-only and never mutated once written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::pattern::{Confidence, ConfidenceChange, Pattern, PatternId};

/// Kind of a [`GrowthEvent`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthEventType {
    PatternCreated,
    PatternReinforced,
    ConfidenceUpgraded,
    ConfidenceDowngraded,
    ExperienceRecorded,
}

impl GrowthEventType {
    pub const ALL: [GrowthEventType; 5] = [
        GrowthEventType::PatternCreated,
        GrowthEventType::PatternReinforced,
        GrowthEventType::ConfidenceUpgraded,
        GrowthEventType::ConfidenceDowngraded,
        GrowthEventType::ExperienceRecorded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrowthEventType::PatternCreated => "pattern_created",
            GrowthEventType::PatternReinforced => "pattern_reinforced",
            GrowthEventType::ConfidenceUpgraded => "confidence_upgraded",
            GrowthEventType::ConfidenceDowngraded => "confidence_downgraded",
            GrowthEventType::ExperienceRecorded => "experience_recorded",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == value)
    }
}

impl fmt::Display for GrowthEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthEvent {
    pub event_type: GrowthEventType,
    pub event_date: DateTime<Utc>,
    /// Absent for events not tied to a single pattern (experiences).
    pub pattern_name: Option<String>,
    pub pattern_topic: Option<String>,
    #[serde(default)]
    pub details: Map<String, Value>,
}

impl GrowthEvent {
    pub fn for_pattern(event_type: GrowthEventType, pattern: &Pattern) -> Self {
        Self {
            event_type,
            event_date: Utc::now(),
            pattern_name: Some(pattern.name.clone()),
            pattern_topic: Some(pattern.topic.clone()),
            details: Map::new(),
        }
    }

    pub fn experience(topic: impl Into<String>, details: Map<String, Value>) -> Self {
        Self {
            event_type: GrowthEventType::ExperienceRecorded,
            event_date: Utc::now(),
            pattern_name: None,
            pattern_topic: Some(topic.into()),
            details,
        }
    }

    pub fn with_detail(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.details.insert(key.to_string(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceTransition {
    pub pattern_id: PatternId,
    pub pattern_name: String,
    pub pattern_topic: String,
    pub from_confidence: Confidence,
    pub to_confidence: Confidence,
    /// `use_count` at the moment of the change
    pub use_count: u32,
    pub reason: String,
    pub transition_date: DateTime<Utc>,
}

impl ConfidenceTransition {
    pub fn record(pattern: &Pattern, change: ConfidenceChange, reason: impl Into<String>) -> Self {
        Self {
            pattern_id: pattern.id,
            pattern_name: pattern.name.clone(),
            pattern_topic: pattern.topic.clone(),
            from_confidence: change.from,
            to_confidence: change.to,
            use_count: pattern.use_count,
            reason: reason.into(),
            transition_date: Utc::now(),
        }
    }

    pub fn is_downgrade(&self) -> bool {
        self.to_confidence < self.from_confidence
    }
}

/// Audit rows committed together with one pattern write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditBatch {
    pub transitions: Vec<ConfidenceTransition>,
    pub events: Vec<GrowthEvent>,
}

impl AuditBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn event(mut self, event: GrowthEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn transition(mut self, transition: ConfidenceTransition) -> Self {
        self.transitions.push(transition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty() && self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pattern::NewPattern;

    #[test]
    fn test_event_serialization() {
        let pattern = Pattern::new(NewPattern::new("Hook First", "openings", "x"), Utc::now().date_naive());
        let event = GrowthEvent::for_pattern(GrowthEventType::PatternCreated, &pattern)
            .with_detail("use_count", 1);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "pattern_created");
        assert_eq!(json["details"]["use_count"], 1);

        let back: GrowthEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_type_parse() {
        for event_type in GrowthEventType::ALL {
            assert_eq!(GrowthEventType::parse(event_type.as_str()), Some(event_type));
        }
        assert_eq!(GrowthEventType::parse("pattern_pruned"), None);
    }

    #[test]
    fn test_transition_direction() {
        let pattern = Pattern::new(NewPattern::new("n", "t", "x"), Utc::now().date_naive());
        let down = ConfidenceTransition::record(
            &pattern,
            ConfidenceChange { from: Confidence::High, to: Confidence::Medium },
            "2 consecutive failures",
        );
        assert!(down.is_downgrade());
        assert_eq!(down.use_count, 1);
    }
}
