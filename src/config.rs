// file: src/config.rs
// description: application configuration management with toml and environment support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the subconscious of the person who wrote these notes. \
Use the excerpts from their notes to help them learn, improve and remember their own life. \
Do not use generic responses: everything needs to be specific to what they wrote, and you often \
need to read between the lines. Each file name represents a day they wrote something down or a \
specific idea they wrote about; cite the file names you rely on in square brackets, e.g. [2024-07-07.md]. \
If the notes contain nothing relevant, say so plainly instead of inventing details. \
Keep your responses casual, not formal.";

pub const DEFAULT_CONTEXT_TEMPLATE: &str = "[{filename}]\n{text}";

pub const DEFAULT_EMPTY_CONTEXT_NOTICE: &str =
    "No relevant notes were found for this question.";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default)]
    pub synthesis: SynthesisConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: PathBuf,
    pub skip_patterns: Vec<String>,
    pub max_file_size_mb: usize,
    pub normalize_markdown: bool,
    pub preview_chars: usize,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./notes"),
            skip_patterns: vec![".git/".to_string(), ".obsidian/".to_string()],
            max_file_size_mb: 10,
            normalize_markdown: true,
            preview_chars: 200,
        }
    }
}

/// Sizes are in characters; 2048/400 is roughly 512/100 tokens.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 2048,
            chunk_overlap: 400,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 4,
            similarity_threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub token_budget: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self { token_budget: 3000 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SynthesisConfig {
    pub system_prompt: String,
    pub context_window_tokens: usize,
    pub response_reserve_tokens: usize,
    pub context_template: String,
    pub empty_context_notice: String,
    pub condense_question: bool,
    pub temperature: Option<f32>,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            context_window_tokens: 8192,
            response_reserve_tokens: 1024,
            context_template: DEFAULT_CONTEXT_TEMPLATE.to_string(),
            empty_context_notice: DEFAULT_EMPTY_CONTEXT_NOTICE.to_string(),
            condense_question: true,
            temperature: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub api_base: String,
    pub api_key: Option<String>,
    pub embedding_model: String,
    pub generation_model: String,
    pub request_timeout_secs: u64,
    pub max_retries: u32,
    pub embedding_batch_size: usize,
    pub parallel_workers: usize,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: None,
            embedding_model: "text-embedding-3-small".to_string(),
            generation_model: "gpt-4".to_string(),
            request_timeout_secs: 60,
            max_retries: 3,
            embedding_batch_size: 32,
            parallel_workers: 4,
        }
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        } else {
            builder = builder.add_source(
                config::File::from(Path::new("config/default.toml")).required(false),
            );
        }

        builder = builder.add_source(
            config::Environment::with_prefix("SUBCONSCIOUS")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let mut config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        config.apply_env_api_key();
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::InvalidConfig(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self::default()
    }

    fn apply_env_api_key(&mut self) {
        if self.provider.api_key.as_deref().is_none_or(str::is_empty) {
            self.provider.api_key = std::env::var("OPENAI_API_KEY")
                .ok()
                .filter(|key| !key.trim().is_empty());
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunking.chunk_overlap, self.chunking.chunk_size
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(PipelineError::InvalidConfig(
                "top_k must be greater than 0".to_string(),
            ));
        }

        if !(-1.0..=1.0).contains(&self.retrieval.similarity_threshold) {
            return Err(PipelineError::InvalidConfig(format!(
                "similarity_threshold must be within [-1, 1], got {}",
                self.retrieval.similarity_threshold
            )));
        }

        if self.memory.token_budget == 0 {
            return Err(PipelineError::InvalidConfig(
                "memory token_budget must be greater than 0".to_string(),
            ));
        }

        if self.synthesis.response_reserve_tokens >= self.synthesis.context_window_tokens {
            return Err(PipelineError::InvalidConfig(
                "response_reserve_tokens must be smaller than context_window_tokens".to_string(),
            ));
        }

        if self.provider.parallel_workers == 0 {
            return Err(PipelineError::InvalidConfig(
                "parallel_workers must be greater than 0".to_string(),
            ));
        }

        if self.provider.embedding_batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "embedding_batch_size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
