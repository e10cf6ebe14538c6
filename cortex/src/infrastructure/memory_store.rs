// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-memory semantic store
//!
//! Keeps memories in process and evaluates normalized filter trees directly.
//! Relevance is token overlap rather than embedding distance, which is enough
//! for tests and offline use of the CLI.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::backend::{BackendError, SemanticStore};
use crate::domain::filter::{BackendFilter, BUILTIN_KEYS, DEFAULT_SCOPE_KEY};
use crate::domain::search::MemoryHit;
use crate::infrastructure::text_match::overlap_score;

#[derive(Debug, Clone)]
struct MemoryRecord {
    text: String,
    /// Built-in keys (owner, agent, run, timestamps)
    fields: Map<String, Value>,
    /// Everything else the caller attached
    metadata: Map<String, Value>,
}

/// A memory split into the columns every semantic store keeps.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct MemoryParts {
    pub scope_id: String,
    /// Scope key, built-in keys, `memory` and `created_at`
    pub fields: Map<String, Value>,
    /// Everything else the caller attached
    pub metadata: Map<String, Value>,
}

/// Separate caller metadata into built-in fields and free metadata. The
/// scope key is mandatory.
pub(crate) fn split_memory(
    scope_key: &str,
    text: &str,
    metadata: Map<String, Value>,
) -> Result<MemoryParts, BackendError> {
    if text.trim().is_empty() {
        return Err(BackendError::Rejected("memory text must not be empty".to_string()));
    }

    let (mut fields, metadata): (Map<String, Value>, Map<String, Value>) = metadata
        .into_iter()
        .partition(|(k, _)| k == scope_key || BUILTIN_KEYS.contains(&k.as_str()));
    let scope_id = match fields.get(scope_key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => {
            return Err(BackendError::Rejected(format!("memory must carry '{scope_key}'")));
        }
        Some(other) => other.to_string(),
    };
    fields.insert("memory".to_string(), Value::String(text.to_string()));
    fields
        .entry("created_at".to_string())
        .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

    Ok(MemoryParts { scope_id, fields, metadata })
}

#[derive(Clone)]
pub struct InMemorySemanticStore {
    scope_key: String,
    records: Arc<RwLock<HashMap<String, MemoryRecord>>>,
}

impl InMemorySemanticStore {
    pub fn new() -> Self {
        Self::with_scope_key(DEFAULT_SCOPE_KEY)
    }

    pub fn with_scope_key(scope_key: impl Into<String>) -> Self {
        Self { scope_key: scope_key.into(), records: Arc::new(RwLock::new(HashMap::new())) }
    }
}

impl Default for InMemorySemanticStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SemanticStore for InMemorySemanticStore {
    async fn search(&self, query: &str, filter: &BackendFilter, limit: usize) -> Result<Vec<MemoryHit>, BackendError> {
        let records = self.records.read().await;
        let mut hits: Vec<MemoryHit> = records
            .values()
            .filter(|r| filter.matches(&r.fields, &r.metadata))
            .filter_map(|r| {
                let score = overlap_score(query, &r.text);
                (score > 0.0).then(|| MemoryHit { content: r.text.clone(), score, metadata: r.metadata.clone() })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.content.cmp(&b.content)));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn add(&self, text: &str, metadata: Map<String, Value>) -> Result<String, BackendError> {
        let MemoryParts { fields, metadata, .. } = split_memory(&self.scope_key, text, metadata)?;

        let id = Uuid::new_v4().to_string();
        self.records
            .write()
            .await
            .insert(id.clone(), MemoryRecord { text: text.to_string(), fields, metadata });
        Ok(id)
    }

    async fn delete(&self, id: &str) -> Result<(), BackendError> {
        self.records.write().await.remove(id);
        Ok(())
    }

    async fn count(&self, scope_id: &str) -> Result<usize, BackendError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.fields.get(&self.scope_key).and_then(Value::as_str) == Some(scope_id))
            .count())
    }
}
