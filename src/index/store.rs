// file: src/index/store.rs
// description: in-memory vector index with atomic snapshot swapping
// reference: brute-force cosine similarity search

use crate::error::{PipelineError, Result};
use crate::index::similarity::{cosine_with_norms, norm};
use crate::models::{Chunk, ScoredChunk};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Arc<Chunk>,
    pub embedding: Vec<f32>,
    norm: f32,
}

impl IndexEntry {
    pub fn new(chunk: Arc<Chunk>, embedding: Vec<f32>) -> Self {
        let norm = norm(&embedding);
        Self {
            chunk,
            embedding,
            norm,
        }
    }
}

/// Immutable set of (chunk, embedding) pairs in ingestion order.
///
/// An index is never mutated after it is built: a rebuild produces a new
/// `VectorIndex` that replaces the old one through [`IndexHandle::swap`].
#[derive(Debug, Clone)]
pub struct VectorIndex {
    entries: Vec<IndexEntry>,
    dims: usize,
    embedding_model: String,
    source: PathBuf,
    documents: usize,
    built_at: DateTime<Utc>,
}

impl VectorIndex {
    pub fn empty(embedding_model: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            dims: 0,
            embedding_model: embedding_model.into(),
            source: source.into(),
            documents: 0,
            built_at: Utc::now(),
        }
    }

    /// Every embedding must share the dimension of the first one.
    pub fn from_entries(
        embedding_model: impl Into<String>,
        source: impl Into<PathBuf>,
        documents: usize,
        entries: Vec<IndexEntry>,
    ) -> Result<Self> {
        let dims = entries.first().map(|e| e.embedding.len()).unwrap_or(0);
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dims) {
            return Err(PipelineError::DimensionMismatch {
                expected: dims,
                actual: bad.embedding.len(),
            });
        }

        Ok(Self {
            entries,
            dims,
            embedding_model: embedding_model.into(),
            source: source.into(),
            documents,
            built_at: Utc::now(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    /// Top `top_k` entries scoring at or above `threshold`, best first.
    /// Equal scores keep ingestion order.
    pub fn search(&self, query: &[f32], top_k: usize, threshold: f32) -> Result<Vec<ScoredChunk>> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        if query.len() != self.dims {
            return Err(PipelineError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }

        let query_norm = norm(query);
        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|entry| ScoredChunk {
                chunk: Arc::clone(&entry.chunk),
                score: cosine_with_norms(query, query_norm, &entry.embedding, entry.norm),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        // sort_by is stable, so ties stay in ingestion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(top_k);
        Ok(scored)
    }
}

/// Shared handle to the current index. Readers take cheap `Arc` snapshots;
/// a rebuild swaps the whole index at once so no reader sees a partial one.
#[derive(Debug)]
pub struct IndexHandle {
    current: RwLock<Arc<VectorIndex>>,
}

impl IndexHandle {
    pub fn new(index: VectorIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    pub fn snapshot(&self) -> Arc<VectorIndex> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Installs `index` and returns the one it replaced.
    pub fn swap(&self, index: VectorIndex) -> Arc<VectorIndex> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        info!(
            "Swapping index: {} -> {} chunks from {}",
            guard.len(),
            index.len(),
            index.source().display()
        );
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, DocumentFormat};

    fn chunk(file: &str, index: usize) -> Arc<Chunk> {
        let doc = Document::new(
            PathBuf::from(file),
            file.to_string(),
            format!("text {}", index),
            DocumentFormat::PlainText,
            0,
        );
        Arc::new(Chunk::new(
            Arc::new(doc.metadata),
            index,
            format!("text {}", index),
            0,
            0,
        ))
    }

    fn index(vectors: Vec<Vec<f32>>) -> VectorIndex {
        let entries = vectors
            .into_iter()
            .enumerate()
            .map(|(i, v)| IndexEntry::new(chunk("note.md", i), v))
            .collect();
        VectorIndex::from_entries("test", "notes", 1, entries).unwrap()
    }

    #[test]
    fn test_search_orders_and_limits() {
        let idx = index(vec![vec![0.0, 1.0], vec![1.0, 0.0], vec![1.0, 1.0]]);
        let hits = idx.search(&[1.0, 0.0], 2, -1.0).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.index, 1);
        assert_eq!(hits[1].chunk.index, 2);
        assert!(hits[0].score >= hits[1].score);
    }

    #[test]
    fn test_search_threshold_filters() {
        let idx = index(vec![vec![0.0, 1.0], vec![1.0, 1.0]]);
        let hits = idx.search(&[1.0, 0.0], 10, 0.9).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_ties_keep_ingestion_order() {
        let idx = index(vec![vec![1.0, 0.0], vec![2.0, 0.0], vec![3.0, 0.0]]);
        let hits = idx.search(&[1.0, 0.0], 3, 0.0).unwrap();
        let order: Vec<usize> = hits.iter().map(|h| h.chunk.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_dimension_checks() {
        let entries = vec![
            IndexEntry::new(chunk("a.md", 0), vec![1.0, 0.0]),
            IndexEntry::new(chunk("a.md", 1), vec![1.0]),
        ];
        assert!(matches!(
            VectorIndex::from_entries("test", "notes", 1, entries),
            Err(PipelineError::DimensionMismatch { .. })
        ));

        let idx = index(vec![vec![1.0, 0.0]]);
        assert!(idx.search(&[1.0, 0.0, 0.0], 1, 0.0).is_err());
    }

    #[test]
    fn test_handle_swap_keeps_old_snapshots() {
        let handle = IndexHandle::new(VectorIndex::empty("test", "old"));
        let before = handle.snapshot();

        let previous = handle.swap(index(vec![vec![1.0]]));

        assert!(before.is_empty());
        assert!(previous.is_empty());
        assert_eq!(handle.snapshot().len(), 1);
        assert_eq!(handle.snapshot().source(), Path::new("notes"));
    }
}
