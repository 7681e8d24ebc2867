//! In-memory brute-force vector index

use super::{ContextEntry, ContextError, VectorIndex};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Cosine similarity of two equal-length vectors
///
/// Returns `None` for mismatched lengths, empty input or a zero-norm vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0_f32, 0.0_f32, 0.0_f32);
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a.sqrt() * norm_b.sqrt()))
}

#[derive(Debug, Deserialize)]
struct IndexFile {
    entries: Vec<ContextEntry>,
}

/// Knowledge base held in memory, searched exhaustively
#[derive(Debug, Clone)]
pub struct InMemoryVectorIndex {
    entries: Vec<ContextEntry>,
    by_id: HashMap<String, usize>,
    dimension: usize,
}

impl InMemoryVectorIndex {
    /// Build an index; all embeddings must share one non-zero dimension
    pub fn new(entries: Vec<ContextEntry>) -> Result<Self, ContextError> {
        let dimension = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        let mut by_id = HashMap::with_capacity(entries.len());

        for (position, entry) in entries.iter().enumerate() {
            if entry.embedding.len() != dimension || dimension == 0 {
                return Err(ContextError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.embedding.len(),
                });
            }
            if by_id.insert(entry.entry_id.clone(), position).is_some() {
                return Err(ContextError::IndexUnavailable(format!(
                    "duplicate entry_id {}",
                    entry.entry_id
                )));
            }
        }

        Ok(Self {
            entries,
            by_id,
            dimension,
        })
    }

    /// Load `{ "entries": [...] }` from a JSON file
    pub fn load(path: &Path) -> Result<Self, ContextError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ContextError::IndexUnavailable(format!("read {} failed: {}", path.display(), e))
        })?;
        let file: IndexFile = serde_json::from_str(&content).map_err(|e| {
            ContextError::IndexUnavailable(format!("parse {} failed: {}", path.display(), e))
        })?;
        Self::new(file.entries)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn top_k(&self, embedding: &[f32], k: usize) -> Result<Vec<(String, f32)>, ContextError> {
        if self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if embedding.len() != self.dimension {
            return Err(ContextError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }

        let mut scored: Vec<(String, f32)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                cosine_similarity(embedding, &entry.embedding)
                    .map(|similarity| (entry.entry_id.clone(), similarity))
            })
            .collect();

        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn entry(&self, entry_id: &str) -> Result<Option<ContextEntry>, ContextError> {
        Ok(self
            .by_id
            .get(entry_id)
            .and_then(|&position| self.entries.get(position))
            .cloned())
    }
}
