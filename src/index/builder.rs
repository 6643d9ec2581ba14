// file: src/index/builder.rs
// description: full index builds with batched parallel embedding and cancellation
// reference: https://docs.rs/futures

use crate::config::{Config, DataConfig};
use crate::error::{PipelineError, Result};
use crate::index::chunker::Chunker;
use crate::index::store::{IndexEntry, VectorIndex};
use crate::loader::DocumentLoader;
use crate::models::Chunk;
use crate::pipeline::progress::{BuildStats, ProgressTracker};
use crate::providers::EmbeddingProvider;
use crate::utils::OperationTimer;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

/// Cancellation flag shared between a build and its caller. Pending waiters
/// on [`CancelToken::cancelled`] wake as soon as it is set.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        loop {
            // register before reading the flag so a concurrent cancel is not missed
            let notified = self.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct IndexBuilder {
    data: DataConfig,
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    parallel_workers: usize,
    cancel: CancelToken,
    progress: Option<ProgressTracker>,
}

impl IndexBuilder {
    pub fn new(config: &Config, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        Ok(Self {
            data: config.data.clone(),
            chunker: Chunker::from_config(&config.chunking)?,
            embedder,
            batch_size: config.provider.embedding_batch_size.max(1),
            parallel_workers: config.provider.parallel_workers.max(1),
            cancel: CancelToken::new(),
            progress: None,
        })
    }

    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, progress: ProgressTracker) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn progress(&self) -> Option<&ProgressTracker> {
        self.progress.as_ref()
    }

    /// Loads, chunks and embeds everything under `root`. Either the whole
    /// index is returned or an error; there is no partial result.
    pub async fn build(&self, root: &Path) -> Result<(VectorIndex, BuildStats)> {
        let result = self.run(root).await;
        if let Some(progress) = &self.progress {
            match &result {
                Ok(_) => progress.finish(),
                Err(err) => {
                    warn!("Index build stopped: {}", err);
                    progress.abandon();
                }
            }
        }
        result
    }

    async fn run(&self, root: &Path) -> Result<(VectorIndex, BuildStats)> {
        let timer = OperationTimer::new("index build");
        self.cancel.check()?;

        let loader = DocumentLoader::new(self.data.clone());
        let load_root = root.to_path_buf();
        let loaded = tokio::task::spawn_blocking(move || loader.load(&load_root))
            .await
            .map_err(|e| PipelineError::Pipeline(format!("document loading task failed: {}", e)))??;

        timer.checkpoint(&format!("loaded {} documents", loaded.documents.len()));
        self.cancel.check()?;

        let chunks: Vec<Arc<Chunk>> = loaded
            .documents
            .iter()
            .flat_map(|doc| self.chunker.split(doc))
            .map(Arc::new)
            .collect();

        let mut stats = BuildStats {
            documents: loaded.documents.len(),
            chunks: chunks.len(),
            skipped_files: loaded.skipped,
            ..BuildStats::default()
        };

        if chunks.is_empty() {
            info!("No content under {}, building an empty index", root.display());
            stats.duration = timer.elapsed();
            return Ok((
                VectorIndex::empty(self.embedder.model_name(), root),
                stats,
            ));
        }

        let embeddings = self.embed_all(&chunks).await?;
        stats.batches = chunks.len().div_ceil(self.batch_size);

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexEntry::new(chunk, embedding))
            .collect();

        let index = VectorIndex::from_entries(
            self.embedder.model_name(),
            root,
            stats.documents,
            entries,
        )?;

        stats.duration = timer.elapsed();
        timer.warn_if_slow(Duration::from_secs(120), "index build is slow");
        let metrics = timer.finish_with_count(stats.chunks);
        info!("Index built: {} ({})", stats.summary(), metrics.format());

        Ok((index, stats))
    }

    /// Embeds chunks in batches with bounded parallelism, then restores
    /// ingestion order. The first failing batch aborts the rest.
    async fn embed_all(&self, chunks: &[Arc<Chunk>]) -> Result<Vec<Vec<f32>>> {
        let batches: Vec<(usize, Vec<String>)> = chunks
            .chunks(self.batch_size)
            .map(|batch| batch.iter().map(|chunk| chunk.text.clone()).collect())
            .enumerate()
            .collect();

        if let Some(progress) = &self.progress {
            progress.start(batches.len(), chunks.len());
        }
        info!(
            "Embedding {} chunks in {} batches with {} using {} workers",
            chunks.len(),
            batches.len(),
            self.embedder.model_name(),
            self.parallel_workers
        );

        let mut results: Vec<(usize, Vec<Vec<f32>>)> = stream::iter(batches)
            .map(|(batch_index, texts)| async move {
                self.cancel.check()?;
                let vectors = tokio::select! {
                    vectors = self.embedder.embed(&texts) => vectors?,
                    _ = self.cancel.cancelled() => return Err(PipelineError::Cancelled),
                };
                if vectors.len() != texts.len() {
                    return Err(PipelineError::provider(
                        self.embedder.model_name(),
                        format!(
                            "batch {}: expected {} embeddings, got {}",
                            batch_index,
                            texts.len(),
                            vectors.len()
                        ),
                    ));
                }
                debug!("Embedded batch {} ({} chunks)", batch_index, texts.len());
                if let Some(progress) = &self.progress {
                    progress.inc_batch(texts.len());
                }
                Ok((batch_index, vectors))
            })
            .buffer_unordered(self.parallel_workers)
            .try_collect()
            .await?;

        results.sort_by_key(|(batch_index, _)| *batch_index);
        Ok(results.into_iter().flat_map(|(_, vectors)| vectors).collect())
    }
}
