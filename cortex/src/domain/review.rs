// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One review of a finished piece of content, written by the external
/// reviewer. Read-only to the cortex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewHistoryEntry {
    pub review_date: DateTime<Utc>,
    pub content_type: String,
    /// 1 to 10
    pub overall_score: f64,
    pub verdict: String,
    #[serde(default)]
    pub dimension_scores: BTreeMap<String, f64>,
    #[serde(default)]
    pub top_strengths: Vec<String>,
    #[serde(default)]
    pub critical_issues: Vec<String>,
    #[serde(default)]
    pub content_preview: String,
}

impl ReviewHistoryEntry {
    pub fn new(content_type: impl Into<String>, overall_score: f64, verdict: impl Into<String>) -> Self {
        Self {
            review_date: Utc::now(),
            content_type: content_type.into(),
            overall_score: overall_score.clamp(1.0, 10.0),
            verdict: verdict.into(),
            dimension_scores: BTreeMap::new(),
            top_strengths: Vec::new(),
            critical_issues: Vec::new(),
            content_preview: String::new(),
        }
    }

    pub fn at(mut self, review_date: DateTime<Utc>) -> Self {
        self.review_date = review_date;
        self
    }
}
