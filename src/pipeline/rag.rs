// file: src/pipeline/rag.rs
// description: coordinates index builds, retrieval and answer synthesis for front ends
// reference: orchestrates the asynchronous question answering workflow

use crate::chat::{AnswerStream, ConversationMemory, Synthesizer};
use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::index::{CancelToken, IndexBuilder, IndexHandle, Retriever, VectorIndex};
use crate::models::RetrievalResult;
use crate::pipeline::progress::{BuildStats, ProgressTracker};
use crate::providers::{self, EmbeddingProvider, GenerationProvider};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Optional progress reporting and cancellation for one build.
#[derive(Default)]
pub struct BuildOptions {
    pub progress: Option<ProgressTracker>,
    pub cancel: Option<CancelToken>,
}

pub struct RagPipeline {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    retriever: Retriever,
    synthesizer: Option<Synthesizer>,
}

impl RagPipeline {
    /// Providers come from configuration. Without an API key the pipeline
    /// can still index and search with local embeddings but cannot answer.
    pub fn new(config: Config) -> Result<Self> {
        let embedder = providers::embedding_provider(&config.provider)?;
        let generator = match config.provider.api_key {
            Some(_) => Some(providers::generation_provider(
                &config.provider,
                config.synthesis.temperature,
            )?),
            None => None,
        };
        Self::with_providers(config, embedder, generator)
    }

    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Option<Arc<dyn GenerationProvider>>,
    ) -> Result<Self> {
        config.validate()?;
        let retriever = Retriever::new(Arc::clone(&embedder), &config.retrieval);
        let synthesizer = generator
            .map(|generator| Synthesizer::new(retriever.clone(), generator, &config.synthesis));

        Ok(Self {
            config,
            embedder,
            retriever,
            synthesizer,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn can_answer(&self) -> bool {
        self.synthesizer.is_some()
    }

    pub fn new_memory(budget: usize) -> Result<ConversationMemory> {
        ConversationMemory::new(budget)
    }

    /// Memory sized from the configured budget.
    pub fn memory(&self) -> Result<ConversationMemory> {
        ConversationMemory::new(self.config.memory.token_budget)
    }

    pub async fn build_index(&self, path: &Path) -> Result<VectorIndex> {
        let (index, _) = self.build_index_with(path, BuildOptions::default()).await?;
        Ok(index)
    }

    pub async fn build_index_with(
        &self,
        path: &Path,
        options: BuildOptions,
    ) -> Result<(VectorIndex, BuildStats)> {
        let mut builder = IndexBuilder::new(&self.config, Arc::clone(&self.embedder))?;
        if let Some(progress) = options.progress {
            builder = builder.with_progress(progress);
        }
        if let Some(cancel) = options.cancel {
            builder = builder.with_cancel(cancel);
        }
        builder.build(path).await
    }

    pub async fn retrieve(&self, index: &VectorIndex, query: &str) -> Result<RetrievalResult> {
        self.retriever.retrieve(index, query).await
    }

    /// Retrieval with per-call limits instead of the configured ones.
    pub async fn retrieve_with(
        &self,
        index: &VectorIndex,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<RetrievalResult> {
        self.retriever
            .clone()
            .with_limits(top_k, threshold)
            .retrieve(index, query)
            .await
    }

    pub async fn ask<'a>(
        &self,
        index: &VectorIndex,
        query: &str,
        memory: &'a mut ConversationMemory,
    ) -> Result<AnswerStream<'a>> {
        let synthesizer = self.synthesizer.as_ref().ok_or_else(|| {
            PipelineError::InvalidConfig(
                "answering needs a generation provider; set OPENAI_API_KEY or provider.api_key"
                    .to_string(),
            )
        })?;
        Ok(synthesizer.ask(index, query, memory).await)
    }

    /// Rebuilds and swaps only when `path` differs from the indexed source.
    pub async fn rebuild_if_changed(&self, handle: &IndexHandle, path: &Path) -> Result<bool> {
        if handle.snapshot().source() == path {
            return Ok(false);
        }
        info!("Data path changed to {}, rebuilding index", path.display());
        let index = self.build_index(path).await?;
        handle.swap(index);
        Ok(true)
    }

    /// Unconditional rebuild of `path`, swapped in only on success.
    pub async fn reload(
        &self,
        handle: &IndexHandle,
        path: &Path,
        options: BuildOptions,
    ) -> Result<BuildStats> {
        let (index, stats) = self.build_index_with(path, options).await?;
        handle.swap(index);
        Ok(stats)
    }
}
