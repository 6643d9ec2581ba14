// file: src/utils/mod.rs
// description: utility functions module exports
// reference: internal module structure

pub mod logging;
pub mod telemetry;
pub mod text;
pub mod validation;

pub use telemetry::{OperationTimer, PerformanceMetrics};
pub use text::{CHARS_PER_TOKEN, estimate_tokens, preview, truncate_to_tokens};
pub use validation::Validator;
