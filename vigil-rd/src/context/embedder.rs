//! HTTP embedding client
//!
//! POSTs `{"text": "..."}` to the configured embedding service and expects
//! `{"embedding": [f32, ...]}` back.

use super::{ContextError, Embedder};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const USER_AGENT: &str = concat!("vigil-rd/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: Vec<f32>,
}

/// Embedding service client
pub struct HttpEmbedder {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpEmbedder {
    /// `timeout` bounds a single request; the retriever applies its own overall timeout
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ContextError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ContextError::Embedding(format!("client init failed: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ContextError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&EmbedRequest { text })
            .send()
            .await
            .map_err(|e| ContextError::Embedding(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ContextError::Embedding(format!(
                "embedding service returned {}",
                status
            )));
        }

        let body: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ContextError::Embedding(format!("invalid response: {}", e)))?;

        if body.embedding.is_empty() {
            return Err(ContextError::Embedding("empty embedding".to_string()));
        }
        Ok(body.embedding)
    }
}
