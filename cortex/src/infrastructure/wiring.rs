// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Configuration-driven assembly of a [`Cortex`].
//!
//! - relational and semantic: PostgreSQL when `spec.backends.relational` is
//!   set (schema migrated on startup), in-memory otherwise
//! - graph / reranker: HTTP adapters when configured, absent otherwise
//!
//! A configured backend whose secret cannot be resolved fails here, before
//! any request is served.

use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use crate::application::content_types::{ContentTypeRegistry, StaticContentTypes};
use crate::application::cortex_service::{Cortex, CortexBuilder};
use crate::domain::cortex_config::CortexConfig;
use crate::infrastructure::db::Database;
use crate::infrastructure::http_graph_store::HttpGraphStore;
use crate::infrastructure::http_reranker::HttpReranker;
use crate::infrastructure::memory_store::InMemorySemanticStore;
use crate::infrastructure::pattern_repository::{InMemoryPatternRepository, InMemoryReviewHistory};
use crate::infrastructure::postgres_memory_store::PostgresSemanticStore;
use crate::infrastructure::postgres_pattern_repository::PostgresPatternRepository;

pub async fn build_cortex(config: &CortexConfig) -> Result<Cortex> {
    let spec = &config.spec;
    let scope_key = spec.search.scope_key.clone();
    let mut builder = CortexBuilder::from_spec(spec);

    builder = match &spec.backends.relational {
        Some(relational) => {
            let db = Database::from_config(relational).await?;
            db.migrate().await?;
            let pool = db.get_pool().clone();
            let repo = Arc::new(PostgresPatternRepository::new(pool.clone()));
            info!(max_connections = relational.max_connections, "Using PostgreSQL pattern and memory stores");
            builder
                .semantic_store(Arc::new(PostgresSemanticStore::with_scope_key(pool, scope_key)))
                .pattern_store(repo.clone(), repo.clone())
                .review_history(repo)
        }
        None => {
            info!("No relational backend configured, using in-memory stores");
            let repo = Arc::new(InMemoryPatternRepository::new());
            builder
                .semantic_store(Arc::new(InMemorySemanticStore::with_scope_key(scope_key)))
                .pattern_store(repo.clone(), repo)
                .review_history(Arc::new(InMemoryReviewHistory::new()))
        }
    };

    if let Some(graph) = &spec.backends.graph {
        let store = HttpGraphStore::from_config(graph).context("graph backend")?;
        info!(endpoint = %graph.endpoint, "Graph store enabled");
        builder = builder.graph_store(Arc::new(store));
    }

    if let Some(reranker) = &spec.backends.reranker {
        let client = HttpReranker::from_config(reranker).context("reranker backend")?;
        info!(endpoint = %reranker.endpoint, "Reranker enabled");
        builder = builder.reranker(Arc::new(client));
    }

    let registry = ContentTypeRegistry::new(
        Arc::new(StaticContentTypes::new(spec.backends.content_types.clone())),
        spec.lifecycle.content_type_ttl,
    );
    builder = builder.content_types(Arc::new(registry));

    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cortex_config::HttpBackendConfig;
    use crate::domain::error::CortexError;
    use crate::domain::pattern::NewPattern;

    #[tokio::test]
    async fn test_defaults_build_in_memory_cortex() {
        let cortex = build_cortex(&CortexConfig::default()).await.unwrap();
        assert_eq!(cortex.search_sources(), vec!["semantic", "relational"]);

        let err = cortex
            .create_pattern(NewPattern::new("Hook", "openings", "x").for_content_types(["podcast"]))
            .await
            .unwrap_err();
        assert!(matches!(err, CortexError::Validation(_)));
    }

    #[tokio::test]
    async fn test_missing_reranker_secret_fails_fast() {
        let mut config = CortexConfig::default();
        config.spec.backends.reranker = Some(HttpBackendConfig {
            endpoint: "http://localhost:9".to_string(),
            api_key: Some("env:INKWELL_TEST_MISSING_RERANK_KEY".to_string()),
            model: None,
            idle_timeout: std::time::Duration::from_secs(300),
        });
        assert!(build_cortex(&config).await.is_err());
    }
}
