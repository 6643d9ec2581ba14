// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod chat;
pub mod config;
pub mod error;
pub mod index;
pub mod loader;
pub mod models;
pub mod parser;
pub mod pipeline;
pub mod providers;
pub mod utils;

pub use chat::{AnswerStream, ConversationMemory, Reply, TurnState};
pub use config::Config;
pub use error::{PipelineError, Result};
pub use index::{CancelToken, IndexHandle, VectorIndex};
pub use models::{Chunk, ConversationTurn, Document, RetrievalResult, Role, ScoredChunk};
pub use pipeline::{BuildOptions, BuildStats, ProgressTracker, RagPipeline};
pub use providers::{ChatMessage, EmbeddingProvider, FragmentStream, GenerationProvider};
