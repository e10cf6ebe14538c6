// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Infrastructure layer: concrete stores, HTTP adapters and wiring

pub mod db;
pub mod event_bus;
pub mod graph_store;
pub mod http_graph_store;
pub mod http_reranker;
pub mod idle_reconnect;
pub mod memory_store;
pub mod pattern_repository;
pub mod postgres_memory_store;
pub mod postgres_pattern_repository;
pub mod search_backends;
pub mod text_match;
pub mod wiring;

pub use db::Database;
pub use event_bus::{EventBus, EventBusError, EventReceiver};
pub use graph_store::InMemoryGraphStore;
pub use http_graph_store::HttpGraphStore;
pub use http_reranker::HttpReranker;
pub use idle_reconnect::{Connector, IdleReconnect};
pub use memory_store::InMemorySemanticStore;
pub use pattern_repository::{InMemoryPatternRepository, InMemoryReviewHistory};
pub use postgres_memory_store::PostgresSemanticStore;
pub use postgres_pattern_repository::PostgresPatternRepository;
pub use search_backends::{GraphSearchBackend, PatternSearchBackend, SemanticSearchBackend};
pub use wiring::build_cortex;
