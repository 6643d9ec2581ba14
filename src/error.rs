// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Data path not found: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider error ({provider}): {message}")]
    Provider {
        provider: String,
        message: String,
        retryable: bool,
    },

    #[error("Provider {provider} timed out after {}s", .after.as_secs_f64())]
    Timeout { provider: String, after: Duration },

    #[error("Input of ~{tokens} tokens exceeds the available budget of {budget} tokens")]
    TurnTooLarge { tokens: usize, budget: usize },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("File operation failed for {path}: {source}")]
    FileOperation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Markdown parsing error in {file}: {message}")]
    MarkdownParse { file: String, message: String },

    #[error("Text extraction failed for {file}: {message}")]
    Extraction { file: String, message: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),
}

impl PipelineError {
    pub fn provider(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }

    pub fn transient(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Whether retrying the same call may succeed (rate limits, 5xx, dropped connections).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Provider { retryable: true, .. })
    }

    /// Errors the user can fix by changing input or configuration.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            Self::PathNotFound(_) | Self::InvalidConfig(_) | Self::TurnTooLarge { .. }
        )
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::transient("openai", "429").is_retryable());
        assert!(!PipelineError::provider("openai", "401").is_retryable());
        assert!(!PipelineError::Cancelled.is_retryable());
    }

    #[test]
    fn test_user_correctable() {
        assert!(PipelineError::PathNotFound(PathBuf::from("notes")).is_user_correctable());
        assert!(
            PipelineError::TurnTooLarge {
                tokens: 10,
                budget: 5
            }
            .is_user_correctable()
        );
        assert!(!PipelineError::transient("openai", "503").is_user_correctable());
    }

    #[test]
    fn test_display_messages() {
        let err = PipelineError::PathNotFound(PathBuf::from("data_7_7_24"));
        assert_eq!(err.to_string(), "Data path not found: data_7_7_24");

        let err = PipelineError::Timeout {
            provider: "openai".to_string(),
            after: Duration::from_secs(30),
        };
        assert!(err.to_string().contains("30s"));
    }
}
