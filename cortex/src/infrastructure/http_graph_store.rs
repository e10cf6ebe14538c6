// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Graph Store Adapter
//
// Anti-Corruption Layer for a session-based knowledge graph service. The
// service expires sessions after a period of inactivity, so the session is
// held in an IdleReconnect and renewed transparently.
//
// Endpoints:
//   POST /sessions              -> {"session_id": "..."}
//   POST /search    (session)   {query, limit} -> {"relations": [...]}
//   POST /episodes  (session)   {text, metadata}
//   GET  /health                -> {"status": "...", "backend": "..."}

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::backend::{BackendError, GraphHealth, GraphStore};
use crate::domain::cortex_config::{resolve_secret, HttpBackendConfig};
use crate::domain::search::Relation;
use crate::infrastructure::http_reranker::{check_status, map_request_error};
use crate::infrastructure::idle_reconnect::{Connector, IdleReconnect};

const SESSION_HEADER: &str = "x-session-id";

#[derive(Clone)]
struct GraphEndpoint {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GraphEndpoint {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let builder = self.client.post(self.url(path));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GraphSession {
    pub id: String,
}

struct SessionConnector {
    endpoint: GraphEndpoint,
}

#[derive(Deserialize)]
struct SessionResponse {
    session_id: String,
}

#[async_trait]
impl Connector for SessionConnector {
    type Client = GraphSession;

    async fn connect(&self) -> Result<GraphSession, BackendError> {
        let response = self.endpoint.post("sessions").send().await.map_err(map_request_error)?;
        let response = check_status(response).await?;
        let body: SessionResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse session response: {e}")))?;
        Ok(GraphSession { id: body.session_id })
    }
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    relations: Vec<Relation>,
}

#[derive(Serialize)]
struct EpisodeRequest<'a> {
    text: &'a str,
    metadata: &'a Map<String, Value>,
}

pub struct HttpGraphStore {
    endpoint: GraphEndpoint,
    session: Arc<IdleReconnect<SessionConnector>>,
}

impl HttpGraphStore {
    pub fn new(base_url: String, api_key: Option<String>, idle_timeout: Duration) -> Self {
        let endpoint = GraphEndpoint { client: reqwest::Client::new(), base_url, api_key };
        let session = Arc::new(IdleReconnect::new(SessionConnector { endpoint: endpoint.clone() }, idle_timeout));
        Self { endpoint, session }
    }

    pub fn from_config(config: &HttpBackendConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(resolve_secret)
            .transpose()
            .map_err(|e| BackendError::Unavailable(format!("graph: {e}")))?;
        Ok(Self::new(config.endpoint.clone(), api_key, config.idle_timeout))
    }

    /// Sessions opened so far, including renewals.
    pub fn session_count(&self) -> u64 {
        self.session.connect_count()
    }
}

/// A session the server no longer knows is a connection-level failure, so
/// the caller renews it and retries.
async fn check_session_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    match response.status().as_u16() {
        404 | 410 | 440 => Err(BackendError::Network(format!("graph session expired (HTTP {})", response.status()))),
        _ => check_status(response).await,
    }
}

#[async_trait]
impl GraphStore for HttpGraphStore {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Relation>, BackendError> {
        let endpoint = &self.endpoint;
        self.session
            .call(|session| async move {
                let response = endpoint
                    .post("search")
                    .header(SESSION_HEADER, session.id.as_str())
                    .json(&SearchRequest { query, limit })
                    .send()
                    .await
                    .map_err(map_request_error)?;
                let response = check_session_status(response).await?;
                let body: SearchResponse = response
                    .json()
                    .await
                    .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse graph search response: {e}")))?;
                Ok(body.relations)
            })
            .await
    }

    async fn add_episode(&self, text: &str, metadata: Map<String, Value>) -> Result<(), BackendError> {
        let endpoint = &self.endpoint;
        let metadata = &metadata;
        self.session
            .call(|session| async move {
                let response = endpoint
                    .post("episodes")
                    .header(SESSION_HEADER, session.id.as_str())
                    .json(&EpisodeRequest { text, metadata })
                    .send()
                    .await
                    .map_err(map_request_error)?;
                check_session_status(response).await?;
                Ok(())
            })
            .await
    }

    async fn health_check(&self) -> Result<GraphHealth, BackendError> {
        let response = self
            .endpoint
            .client
            .get(self.endpoint.url("health"))
            .send()
            .await
            .map_err(map_request_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse health response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_search_opens_session_once() {
        let mut server = mockito::Server::new_async().await;
        let sessions = server
            .mock("POST", "/sessions")
            .with_status(200)
            .with_body(r#"{"session_id":"s-1"}"#)
            .expect(1)
            .create_async()
            .await;
        let search = server
            .mock("POST", "/search")
            .match_header(SESSION_HEADER, "s-1")
            .match_body(Matcher::PartialJson(serde_json::json!({ "query": "hook" })))
            .with_status(200)
            .with_body(r#"{"relations":[{"source":"hook","relationship":"raises","target":"open rate"}]}"#)
            .expect(2)
            .create_async()
            .await;

        let graph = HttpGraphStore::new(server.url(), None, Duration::from_secs(300));
        let first = graph.search("hook", 5).await.unwrap();
        let second = graph.search("hook", 5).await.unwrap();

        assert_eq!(first, vec![Relation::new("hook", "raises", "open rate")]);
        assert_eq!(first, second);
        assert_eq!(graph.session_count(), 1);
        sessions.assert_async().await;
        search.assert_async().await;
    }

    #[tokio::test]
    async fn test_expired_session_is_renewed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/sessions")
            .with_status(200)
            .with_body(r#"{"session_id":"s-1"}"#)
            .expect(2)
            .create_async()
            .await;
        // The first search call sees an expired session, the retry succeeds.
        server
            .mock("POST", "/search")
            .with_status(410)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("POST", "/search")
            .with_status(200)
            .with_body(r#"{"relations":[]}"#)
            .create_async()
            .await;

        let graph = HttpGraphStore::new(server.url(), None, Duration::from_secs(300));
        let relations = graph.search("hook", 5).await.unwrap();
        assert!(relations.is_empty());
        assert_eq!(graph.session_count(), 2);
    }

    #[tokio::test]
    async fn test_health_check() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/health")
            .with_status(200)
            .with_body(r#"{"status":"healthy","backend":"neo4j"}"#)
            .create_async()
            .await;

        let graph = HttpGraphStore::new(server.url(), None, Duration::from_secs(300));
        let health = graph.health_check().await.unwrap();
        assert!(health.is_healthy());
        assert_eq!(health.backend, "neo4j");
    }
}
