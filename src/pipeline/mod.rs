// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

pub mod progress;
mod rag;

pub use progress::{BuildStats, ProgressTracker};
pub use rag::{BuildOptions, RagPipeline};
