// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Content-type registry
//!
//! Known content-type tags (newsletter, thread, ...) loaded from a
//! [`ContentTypeSource`] and cached for a fixed TTL. The registry owns its
//! cache; there is no process-wide instance.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::domain::backend::BackendError;
use crate::domain::error::{CortexError, CortexResult};

#[async_trait]
pub trait ContentTypeSource: Send + Sync {
    async fn load(&self) -> Result<Vec<String>, BackendError>;
}

/// Fixed list, typically from `spec.backends.content_types`.
pub struct StaticContentTypes {
    tags: Vec<String>,
}

impl StaticContentTypes {
    pub fn new<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { tags: tags.into_iter().map(Into::into).collect() }
    }
}

#[async_trait]
impl ContentTypeSource for StaticContentTypes {
    async fn load(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.tags.clone())
    }
}

struct Cached {
    tags: Arc<BTreeSet<String>>,
    refreshed_at: Instant,
}

pub struct ContentTypeRegistry {
    source: Arc<dyn ContentTypeSource>,
    ttl: Duration,
    cache: RwLock<Option<Cached>>,
}

fn normalize(tag: &str) -> String {
    tag.trim().to_lowercase()
}

impl ContentTypeRegistry {
    pub fn new(source: Arc<dyn ContentTypeSource>, ttl: Duration) -> Self {
        Self { source, ttl, cache: RwLock::new(None) }
    }

    /// Known tags, lowercased. Refreshes when the cache is older than the
    /// TTL; a failed refresh falls back to the stale cache when there is one.
    pub async fn known(&self) -> Result<Arc<BTreeSet<String>>, BackendError> {
        let stale = {
            let cache = self.cache.read();
            match cache.as_ref() {
                Some(c) if c.refreshed_at.elapsed() < self.ttl => return Ok(c.tags.clone()),
                Some(c) => Some(c.tags.clone()),
                None => None,
            }
        };

        match self.source.load().await {
            Ok(tags) => {
                let tags: Arc<BTreeSet<String>> = Arc::new(tags.iter().map(|t| normalize(t)).filter(|t| !t.is_empty()).collect());
                debug!(count = tags.len(), "Content-type registry refreshed");
                *self.cache.write() = Some(Cached { tags: tags.clone(), refreshed_at: Instant::now() });
                Ok(tags)
            }
            Err(e) => match stale {
                Some(tags) => {
                    warn!(error = %e, "Content-type refresh failed, serving stale cache");
                    Ok(tags)
                }
                None => Err(e),
            },
        }
    }

    pub async fn contains(&self, tag: &str) -> Result<bool, BackendError> {
        Ok(self.known().await?.contains(&normalize(tag)))
    }

    /// Fail with `Validation` naming every unknown tag.
    pub async fn validate<'a, I>(&self, tags: I) -> CortexResult<()>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let known = self.known().await?;
        let unknown: Vec<&str> = tags
            .into_iter()
            .filter(|t| !known.contains(&normalize(t)))
            .map(String::as_str)
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(CortexError::Validation(format!("unknown content type(s): {}", unknown.join(", "))))
        }
    }

    /// Force the next read to reload from the source.
    pub fn invalidate(&self) {
        *self.cache.write() = None;
    }

    pub fn last_refresh(&self) -> Option<Instant> {
        self.cache.read().as_ref().map(|c| c.refreshed_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicBool, Ordering};

    struct CountingSource {
        loads: AtomicU32,
        failing: AtomicBool,
    }

    #[async_trait]
    impl ContentTypeSource for CountingSource {
        async fn load(&self) -> Result<Vec<String>, BackendError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.failing.load(Ordering::SeqCst) {
                return Err(BackendError::Network("source down".into()));
            }
            Ok(vec!["Newsletter".into(), "thread".into()])
        }
    }

    fn source() -> Arc<CountingSource> {
        Arc::new(CountingSource { loads: AtomicU32::new(0), failing: AtomicBool::new(false) })
    }

    #[tokio::test]
    async fn test_cache_within_ttl() {
        let src = source();
        let registry = ContentTypeRegistry::new(src.clone(), Duration::from_secs(60));
        assert!(registry.contains("newsletter").await.unwrap());
        assert!(registry.contains("THREAD").await.unwrap());
        assert_eq!(src.loads.load(Ordering::SeqCst), 1);
        assert!(registry.last_refresh().is_some());
    }

    #[tokio::test]
    async fn test_invalidate_forces_reload() {
        let src = source();
        let registry = ContentTypeRegistry::new(src.clone(), Duration::from_secs(60));
        registry.known().await.unwrap();
        registry.invalidate();
        registry.known().await.unwrap();
        assert_eq!(src.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stale_cache_survives_failed_refresh() {
        let src = source();
        let registry = ContentTypeRegistry::new(src.clone(), Duration::ZERO);
        registry.known().await.unwrap();
        src.failing.store(true, Ordering::SeqCst);
        assert!(registry.contains("thread").await.unwrap());

        registry.invalidate();
        assert!(registry.known().await.is_err());
    }

    #[tokio::test]
    async fn test_validate_names_unknown_tags() {
        let registry = ContentTypeRegistry::new(Arc::new(StaticContentTypes::new(["newsletter"])), Duration::from_secs(60));
        let tags = vec!["Newsletter".to_string(), "podcast".to_string()];
        let err = registry.validate(&tags).await.unwrap_err();
        assert!(matches!(err, CortexError::Validation(msg) if msg.contains("podcast") && !msg.contains("Newsletter")));
    }
}
