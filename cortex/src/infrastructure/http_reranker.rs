// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// HTTP Reranker Adapter
//
// Anti-Corruption Layer for hosted cross-encoder rerank endpoints that speak
// the common `POST /rerank {query, documents, top_n}` shape.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::backend::{BackendError, RerankScore, Reranker};
use crate::domain::cortex_config::{resolve_secret, HttpBackendConfig};

pub struct HttpReranker {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: Option<String>,
}

#[derive(Serialize)]
struct RerankRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    query: &'a str,
    documents: &'a [String],
    top_n: usize,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankScore>,
}

impl HttpReranker {
    pub fn new(endpoint: String, api_key: Option<String>, model: Option<String>) -> Self {
        Self { client: reqwest::Client::new(), endpoint, api_key, model }
    }

    /// Build from config, resolving `env:` secrets. A configured key that
    /// cannot be resolved is a construction failure.
    pub fn from_config(config: &HttpBackendConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(resolve_secret)
            .transpose()
            .map_err(|e| BackendError::Unavailable(format!("reranker: {e}")))?;
        Ok(Self::new(config.endpoint.clone(), api_key, config.model.clone()))
    }
}

#[async_trait]
impl Reranker for HttpReranker {
    async fn rerank(&self, query: &str, documents: &[String], top_k: usize) -> Result<Vec<RerankScore>, BackendError> {
        let url = format!("{}/rerank", self.endpoint.trim_end_matches('/'));
        let request = RerankRequest { model: self.model.as_deref(), query, documents, top_n: top_k };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(map_request_error)?;
        let response = check_status(response).await?;

        let body: RerankResponse = response
            .json()
            .await
            .map_err(|e| BackendError::InvalidResponse(format!("Failed to parse rerank response: {e}")))?;
        Ok(body.results)
    }
}

pub(crate) fn map_request_error(err: reqwest::Error) -> BackendError {
    if err.is_timeout() {
        BackendError::Timeout(0)
    } else {
        BackendError::Network(err.to_string())
    }
}

/// Map non-success statuses: throttling and server errors are transient,
/// auth failures mean the backend is unusable, anything else is a rejection.
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let error_text = response.text().await.unwrap_or_default();
    let message = format!("HTTP {}: {}", status, error_text);
    Err(match status.as_u16() {
        429 | 500..=599 => BackendError::Network(message),
        401 | 403 => BackendError::Unavailable(message),
        _ => BackendError::Rejected(message),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rerank_parses_scores() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/rerank")
            .match_header("authorization", "Bearer secret")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results":[{"index":1,"relevance_score":0.92},{"index":0,"relevance_score":0.15}]}"#)
            .create_async()
            .await;

        let reranker = HttpReranker::new(server.url(), Some("secret".into()), None);
        let docs = vec!["a".to_string(), "b".to_string()];
        let scores = reranker.rerank("hooks", &docs, 2).await.unwrap();

        mock.assert_async().await;
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].index, 1);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/rerank").with_status(503).create_async().await;

        let reranker = HttpReranker::new(server.url(), None, None);
        let err = reranker.rerank("q", &["a".to_string()], 1).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_garbage_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/rerank").with_status(200).with_body("not json").create_async().await;

        let reranker = HttpReranker::new(server.url(), None, None);
        let err = reranker.rerank("q", &["a".to_string()], 1).await.unwrap_err();
        assert!(matches!(err, BackendError::InvalidResponse(_)));
    }

    #[test]
    fn test_missing_secret_fails_construction() {
        let config = HttpBackendConfig {
            endpoint: "http://localhost:1".into(),
            api_key: Some("env:INKWELL_TEST_UNSET_RERANK_KEY".into()),
            model: None,
            idle_timeout: std::time::Duration::from_secs(60),
        };
        assert!(matches!(HttpReranker::from_config(&config), Err(BackendError::Unavailable(_))));
    }
}
