// file: src/providers/mod.rs
// description: embedding and generative model collaborator traits and implementations
// reference: https://docs.rs/async-trait

pub mod embeddings;
pub mod generation;
pub mod retry;

use crate::config::ProviderConfig;
use crate::error::{PipelineError, Result};
use crate::models::Role;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

pub use embeddings::{HashEmbedder, OpenAiEmbeddingClient};
pub use generation::OpenAiChatClient;
pub use retry::RetryPolicy;

/// Lazy, finite, non-restartable sequence of generated text fragments.
pub type FragmentStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identifies the embedding space; indexes only answer queries embedded by the same model.
    fn model_name(&self) -> &str;

    /// One vector per input text, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::provider(self.model_name(), "empty embedding response"))
    }
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    async fn generate(&self, messages: &[ChatMessage]) -> Result<FragmentStream>;
}

/// Remote embeddings when an API key is configured, the local hashing embedder otherwise.
pub fn embedding_provider(config: &ProviderConfig) -> Result<Arc<dyn EmbeddingProvider>> {
    match &config.api_key {
        Some(key) => Ok(Arc::new(OpenAiEmbeddingClient::new(config, key.clone())?)),
        None => {
            warn!("No API key configured, using local hashing embeddings");
            Ok(Arc::new(HashEmbedder::default()))
        }
    }
}

pub fn generation_provider(
    config: &ProviderConfig,
    temperature: Option<f32>,
) -> Result<Arc<dyn GenerationProvider>> {
    let key = config.api_key.clone().ok_or_else(|| {
        PipelineError::InvalidConfig(
            "an API key is required for chat (set OPENAI_API_KEY or provider.api_key)".to_string(),
        )
    })?;
    Ok(Arc::new(
        OpenAiChatClient::new(config, key)?.with_temperature(temperature),
    ))
}
