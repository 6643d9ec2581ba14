// file: src/providers/retry.rs
// description: exponential backoff for transient provider failures and HTTP error classification
// reference: https://docs.rs/reqwest

use crate::error::{PipelineError, Result};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: Duration::from_millis(500),
        }
    }

    /// Delay before retry number `attempt` (0-based), doubling up to 2^5.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay * 2u32.pow(attempt.min(5))
    }

    /// Runs `operation`, retrying only errors that report themselves retryable.
    pub async fn run<T, F, Fut>(&self, label: &str, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} failed (attempt {}/{}): {}; retrying in {:.1}s",
                        label,
                        attempt + 1,
                        self.max_retries + 1,
                        err,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3)
    }
}

/// 429 and 5xx are transient; every other failure status is final.
pub fn status_error(provider: &str, status: reqwest::StatusCode, body: &str) -> PipelineError {
    let message = format!("request failed with status {}: {}", status, body.trim());
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        PipelineError::transient(provider, message)
    } else {
        PipelineError::provider(provider, message)
    }
}

pub fn transport_error(provider: &str, err: reqwest::Error, timeout: Duration) -> PipelineError {
    if err.is_timeout() {
        PipelineError::Timeout {
            provider: provider.to_string(),
            after: timeout,
        }
    } else if err.is_connect() || err.is_request() || err.is_body() {
        PipelineError::transient(provider, err.to_string())
    } else {
        PipelineError::provider(provider, err.to_string())
    }
}
