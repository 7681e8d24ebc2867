//! Context Retriever
//!
//! Looks up knowledge-base entries semantically close to the utterance text.
//! Context only enriches explanations: retrieval runs under a hard timeout and
//! any failure degrades to "no context" instead of failing the assessment.
//!
//! # Collaborators
//! - [`Embedder`]: text → embedding (external model service)
//! - [`VectorIndex`]: read-only top-k cosine search + entry lookup

mod embedder;
mod index;

pub use embedder::HttpEmbedder;
pub use index::{cosine_similarity, InMemoryVectorIndex};

use crate::types::{ScoredContext, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Context retrieval errors (never surfaced past the retriever)
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Retrieval timeout after {0:?}")]
    RetrievalTimeout(Duration),

    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension {actual} does not match index dimension {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Knowledge-base item with its embedding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub entry_id: String,
    pub category: String,
    #[serde(default)]
    pub cultural_significance: Option<String>,
    pub severity: Severity,
    pub guidance: String,
    pub embedding: Vec<f32>,
}

/// Text embedding collaborator
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ContextError>;
}

/// Read-only vector index collaborator
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Nearest entries by cosine similarity, highest first
    async fn top_k(&self, embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>, ContextError>;

    /// Entry lookup by id
    async fn entry(&self, entry_id: &str) -> Result<Option<ContextEntry>, ContextError>;
}

/// Retrieval result; `degraded` carries the reason when context was skipped
#[derive(Debug, Clone, Default)]
pub struct ContextOutcome {
    pub entries: Vec<ScoredContext>,
    pub degraded: Option<String>,
}

impl ContextOutcome {
    fn degraded(reason: impl Into<String>) -> Self {
        Self {
            entries: Vec::new(),
            degraded: Some(reason.into()),
        }
    }
}

/// Top-k retrieval with a relevance floor and a timeout
#[derive(Clone)]
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    top_k: usize,
    relevance_floor: f64,
    timeout: Duration,
}

impl ContextRetriever {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        top_k: usize,
        relevance_floor: f64,
        timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            index,
            top_k: top_k.max(1),
            relevance_floor: relevance_floor.clamp(0.0, 1.0),
            timeout,
        }
    }

    /// Retrieve context for `text`
    ///
    /// Empty text skips retrieval. Never fails: timeouts and collaborator
    /// errors yield an empty, degraded outcome.
    pub async fn retrieve(&self, text: &str) -> ContextOutcome {
        if text.trim().is_empty() {
            return ContextOutcome::default();
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, self.lookup(text)).await {
            Ok(result) => result,
            Err(_) => Err(ContextError::RetrievalTimeout(self.timeout)),
        };

        match result {
            Ok(entries) => {
                debug!(
                    entries = entries.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Context retrieved"
                );
                ContextOutcome {
                    entries,
                    degraded: None,
                }
            }
            Err(e) => {
                warn!(
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Context retrieval degraded to empty context"
                );
                ContextOutcome::degraded(e.to_string())
            }
        }
    }

    async fn lookup(&self, text: &str) -> Result<Vec<ScoredContext>, ContextError> {
        let embedding = self.embedder.embed(text).await?;
        let neighbours = self.index.top_k(&embedding, self.top_k).await?;

        let mut scored = Vec::with_capacity(neighbours.len());
        for (entry_id, similarity) in neighbours {
            let similarity = f64::from(similarity).clamp(0.0, 1.0);
            if similarity < self.relevance_floor {
                continue;
            }
            // Entries deleted between search and lookup are skipped
            if let Some(entry) = self.index.entry(&entry_id).await? {
                scored.push(ScoredContext {
                    entry_id: entry.entry_id,
                    category: entry.category,
                    cultural_significance: entry.cultural_significance,
                    severity: entry.severity,
                    guidance: entry.guidance,
                    similarity,
                });
            }
        }

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(self.top_k);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Embeds by keyword: "family" → x axis, "money" → y axis
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ContextError> {
            let lower = text.to_lowercase();
            let x = if lower.contains("family") { 1.0 } else { 0.0 };
            let y = if lower.contains("money") { 1.0 } else { 0.0 };
            Ok(vec![x, y, 0.1])
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl Embedder for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, ContextError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0, 0.0, 0.0])
        }
    }

    fn entry(id: &str, embedding: Vec<f32>) -> ContextEntry {
        ContextEntry {
            entry_id: id.to_string(),
            category: "family_pressure".to_string(),
            cultural_significance: Some("collectivist framing".to_string()),
            severity: Severity::Medium,
            guidance: "Acknowledge obligations before probing feelings".to_string(),
            embedding,
        }
    }

    fn index() -> Arc<InMemoryVectorIndex> {
        Arc::new(
            InMemoryVectorIndex::new(vec![
                entry("family", vec![1.0, 0.0, 0.0]),
                entry("money", vec![0.0, 1.0, 0.0]),
                entry("opposite", vec![-1.0, 0.0, 0.0]),
            ])
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_ranked_and_floored() {
        let retriever = ContextRetriever::new(
            Arc::new(KeywordEmbedder),
            index(),
            3,
            0.3,
            Duration::from_millis(200),
        );
        let outcome = retriever.retrieve("my family keeps asking").await;
        assert!(outcome.degraded.is_none());
        // "money" is orthogonal and "opposite" negative: both below the floor
        assert_eq!(outcome.entries.len(), 1);
        assert_eq!(outcome.entries[0].entry_id, "family");
        assert!(outcome.entries[0].similarity > 0.9);
    }

    #[tokio::test]
    async fn test_empty_text_skips_retrieval() {
        let retriever = ContextRetriever::new(
            Arc::new(SlowEmbedder),
            index(),
            3,
            0.3,
            Duration::from_millis(200),
        );
        let outcome = retriever.retrieve("   ").await;
        assert!(outcome.entries.is_empty());
        assert!(outcome.degraded.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_degrades_to_empty_context() {
        let retriever = ContextRetriever::new(
            Arc::new(SlowEmbedder),
            index(),
            3,
            0.3,
            Duration::from_millis(200),
        );
        let outcome = retriever.retrieve("family").await;
        assert!(outcome.entries.is_empty());
        assert!(outcome
            .degraded
            .as_deref()
            .is_some_and(|reason| reason.contains("timeout")));
    }
}
