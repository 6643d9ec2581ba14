// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod chunk;
pub mod conversation;
pub mod document;
pub mod search_result;

pub use chunk::Chunk;
pub use conversation::{ConversationTurn, Role};
pub use document::{Document, DocumentFormat, DocumentMetadata};
pub use search_result::{RetrievalResult, ScoredChunk};
