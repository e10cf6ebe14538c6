// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Pattern Aggregate
//!
//! A [`Pattern`] is a named, reusable writing insight whose [`Confidence`]
//! grows with reinforcement and shrinks one step at a time after repeated
//! consecutive failures.
//!
//! ## Confidence table
//!
//! | `use_count` | Confidence |
//! |-------------|------------|
//! | 1           | `Low`      |
//! | 2–4         | `Medium`   |
//! | ≥ 5         | `High`     |
//!
//! The table is applied on creation and on every reinforcement. Downgrade is
//! the only path that can leave a pattern below its table value.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PatternId(pub Uuid);

impl PatternId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PatternId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PatternId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PatternId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// How proven a pattern is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub const ALL: [Confidence; 3] = [Confidence::Low, Confidence::Medium, Confidence::High];

    pub fn from_use_count(use_count: u32) -> Self {
        match use_count {
            0 | 1 => Confidence::Low,
            2..=4 => Confidence::Medium,
            _ => Confidence::High,
        }
    }

    /// One level down, or `None` at the floor.
    pub fn step_down(self) -> Option<Self> {
        match self {
            Confidence::High => Some(Confidence::Medium),
            Confidence::Medium => Some(Confidence::Low),
            Confidence::Low => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Low => "LOW",
            Confidence::Medium => "MEDIUM",
            Confidence::High => "HIGH",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LOW" => Ok(Confidence::Low),
            "MEDIUM" => Ok(Confidence::Medium),
            "HIGH" => Ok(Confidence::High),
            other => Err(format!("unknown confidence level: {other}")),
        }
    }
}

/// A confidence change produced by a mutation on [`Pattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfidenceChange {
    pub from: Confidence,
    pub to: Confidence,
}

/// Caller-supplied fields for a new pattern.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPattern {
    pub name: String,
    pub topic: String,
    pub pattern_text: String,
    #[serde(default)]
    pub evidence: Vec<String>,
    #[serde(default)]
    pub anti_patterns: Vec<String>,
    #[serde(default)]
    pub applicable_content_types: Option<BTreeSet<String>>,
}

impl NewPattern {
    pub fn new(name: impl Into<String>, topic: impl Into<String>, pattern_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            pattern_text: pattern_text.into(),
            ..Default::default()
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence.push(evidence.into());
        self
    }

    pub fn with_anti_pattern(mut self, anti_pattern: impl Into<String>) -> Self {
        self.anti_patterns.push(anti_pattern.into());
        self
    }

    pub fn for_content_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.applicable_content_types = Some(types.into_iter().map(Into::into).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: PatternId,
    pub name: String,
    pub topic: String,
    pub confidence: Confidence,
    pub pattern_text: String,
    pub evidence: Vec<String>,
    pub anti_patterns: Vec<String>,
    pub use_count: u32,
    pub consecutive_failures: u32,
    /// `None` means the pattern applies to every content type.
    pub applicable_content_types: Option<BTreeSet<String>>,
    pub date_added: NaiveDate,
    pub date_updated: NaiveDate,
    /// Optimistic concurrency token, bumped by the repository on every save.
    #[serde(default)]
    pub version: i64,
}

impl Pattern {
    pub fn new(draft: NewPattern, today: NaiveDate) -> Self {
        let use_count = 1;
        Self {
            id: PatternId::new(),
            name: draft.name.trim().to_string(),
            topic: draft.topic.trim().to_string(),
            confidence: Confidence::from_use_count(use_count),
            pattern_text: draft.pattern_text,
            evidence: draft.evidence,
            anti_patterns: draft.anti_patterns,
            use_count,
            consecutive_failures: 0,
            applicable_content_types: draft.applicable_content_types,
            date_added: today,
            date_updated: today,
            version: 0,
        }
    }

    /// Lookup key used for case-insensitive name uniqueness.
    pub fn name_key(&self) -> String {
        name_key(&self.name)
    }

    /// Apply one reinforcement: bump the use count, recompute confidence from
    /// the table and append the new evidence verbatim.
    pub fn reinforce(&mut self, new_evidence: Vec<String>, today: NaiveDate) -> Option<ConfidenceChange> {
        self.use_count = self.use_count.saturating_add(1);
        self.evidence.extend(new_evidence);
        self.date_updated = today;

        let from = self.confidence;
        let to = Confidence::from_use_count(self.use_count);
        self.confidence = to;
        (from != to).then_some(ConfidenceChange { from, to })
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    pub fn needs_downgrade(&self, threshold: u32) -> bool {
        self.consecutive_failures >= threshold && self.confidence != Confidence::Low
    }

    /// Step confidence down one level when the failure threshold is met.
    /// Resets the failure counter on a downgrade; no-op at `Low`.
    ///
    /// `date_updated` is left alone: it tracks reinforcement, and the
    /// transition row records when the downgrade happened.
    pub fn downgrade(&mut self, threshold: u32) -> Option<ConfidenceChange> {
        if !self.needs_downgrade(threshold) {
            return None;
        }
        let from = self.confidence;
        let to = from.step_down()?;
        self.confidence = to;
        self.consecutive_failures = 0;
        Some(ConfidenceChange { from, to })
    }

    /// Not reinforced in more than `cutoff_days` and not yet proven.
    ///
    /// A negative window, or one reaching past the earliest representable
    /// date, marks nothing stale.
    pub fn is_stale(&self, today: NaiveDate, cutoff_days: i64) -> bool {
        if self.confidence == Confidence::High {
            return false;
        }
        let cutoff = u64::try_from(cutoff_days)
            .ok()
            .and_then(|days| today.checked_sub_days(Days::new(days)));
        matches!(cutoff, Some(cutoff) if self.date_updated < cutoff)
    }

    pub fn applies_to(&self, content_type: &str) -> bool {
        match &self.applicable_content_types {
            None => true,
            Some(types) => types.iter().any(|t| t.eq_ignore_ascii_case(content_type)),
        }
    }
}

pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
