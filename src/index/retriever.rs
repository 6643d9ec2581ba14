// file: src/index/retriever.rs
// description: query embedding and ranked top-k retrieval over a vector index
// reference: brute-force cosine similarity search

use crate::config::RetrievalConfig;
use crate::error::{PipelineError, Result};
use crate::index::store::VectorIndex;
use crate::models::RetrievalResult;
use crate::providers::EmbeddingProvider;
use crate::utils::Validator;
use std::sync::Arc;
use tracing::debug;

#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    top_k: usize,
    threshold: f32,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: &RetrievalConfig) -> Self {
        Self {
            embedder,
            top_k: config.top_k,
            threshold: config.similarity_threshold,
        }
    }

    pub fn with_limits(mut self, top_k: usize, threshold: f32) -> Self {
        self.top_k = top_k;
        self.threshold = threshold;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Ranked entries for `query`. An empty index, or nothing above the
    /// threshold, gives an empty result rather than an error.
    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<RetrievalResult> {
        Validator::validate_query(query)?;

        if index.is_empty() {
            debug!("Index is empty, skipping query embedding");
            return Ok(RetrievalResult::empty(query));
        }

        if index.embedding_model() != self.embedder.model_name() {
            return Err(PipelineError::InvalidConfig(format!(
                "index was built with embedding model '{}' but queries use '{}'; rebuild the index",
                index.embedding_model(),
                self.embedder.model_name()
            )));
        }

        let query_vector = self.embedder.embed_query(query).await?;
        let entries = index.search(&query_vector, self.top_k, self.threshold)?;

        debug!(
            "Retrieved {} of {} chunks (top_k={}, threshold={})",
            entries.len(),
            index.len(),
            self.top_k,
            self.threshold
        );

        Ok(RetrievalResult {
            query: query.to_string(),
            entries,
        })
    }
}
