// file: src/index/mod.rs
// description: chunking, embedding index construction and retrieval
// reference: internal module structure

pub mod builder;
pub mod chunker;
pub mod retriever;
pub mod similarity;
pub mod store;

pub use builder::{CancelToken, IndexBuilder};
pub use chunker::Chunker;
pub use retriever::Retriever;
pub use store::{IndexEntry, IndexHandle, VectorIndex};
