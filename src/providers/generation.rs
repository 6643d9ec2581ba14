// file: src/providers/generation.rs
// description: streaming chat completions over an OpenAI-compatible server-sent events API
// reference: https://platform.openai.com/docs/api-reference/chat/streaming

use crate::config::ProviderConfig;
use crate::error::{PipelineError, Result};
use crate::providers::retry::{RetryPolicy, status_error, transport_error};
use crate::providers::{ChatMessage, FragmentStream, GenerationProvider};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ChunkDelta {
    content: Option<String>,
}

/// One decoded `data:` line of the event stream.
#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Fragment(String),
    Finished,
    Ignored,
}

pub(crate) fn parse_sse_line(line: &str) -> Result<SseEvent> {
    let line = line.trim_end_matches('\r');
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(SseEvent::Ignored);
    };
    let data = data.trim();

    if data.is_empty() {
        return Ok(SseEvent::Ignored);
    }
    if data == "[DONE]" {
        return Ok(SseEvent::Finished);
    }

    let chunk: ChatChunk = serde_json::from_str(data)?;
    let Some(choice) = chunk.choices.into_iter().next() else {
        return Ok(SseEvent::Ignored);
    };

    match choice.delta.content {
        Some(content) if !content.is_empty() => Ok(SseEvent::Fragment(content)),
        _ if choice.finish_reason.is_some() => Ok(SseEvent::Finished),
        _ => Ok(SseEvent::Ignored),
    }
}

pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
    timeout: Duration,
    temperature: Option<f32>,
    retry: RetryPolicy,
}

impl OpenAiChatClient {
    pub fn new(config: &ProviderConfig, api_key: String) -> Result<Self> {
        let timeout = config.request_timeout();
        // no overall timeout: replies stream for as long as fragments keep arriving
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| PipelineError::InvalidConfig(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.api_base.trim_end_matches('/')),
            api_key,
            model: config.generation_model.clone(),
            timeout,
            temperature: None,
            retry: RetryPolicy::new(config.max_retries),
        })
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    async fn open(&self, messages: &[ChatMessage]) -> Result<reqwest::Response> {
        let request = ChatRequest {
            model: &self.model,
            messages,
            stream: true,
            temperature: self.temperature,
        };

        let send = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send();

        let response = tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| PipelineError::Timeout {
                provider: self.model.clone(),
                after: self.timeout,
            })?
            .map_err(|e| transport_error(&self.model, e, self.timeout))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(status_error(&self.model, status, &body));
        }

        Ok(response)
    }
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buffer: Vec<u8>,
    pending: VecDeque<Result<String>>,
    finished: bool,
    provider: String,
    idle_timeout: Duration,
}

impl SseState {
    /// Drains every complete line in the buffer into `pending`.
    fn drain_lines(&mut self) {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]).into_owned();

            match parse_sse_line(&line) {
                Ok(SseEvent::Fragment(text)) => self.pending.push_back(Ok(text)),
                Ok(SseEvent::Finished) => {
                    self.finished = true;
                    self.buffer.clear();
                    return;
                }
                Ok(SseEvent::Ignored) => {}
                Err(err) => {
                    warn!("Malformed stream chunk from {}: {}", self.provider, err);
                    self.pending.push_back(Err(PipelineError::provider(
                        &self.provider,
                        format!("malformed stream chunk: {}", err),
                    )));
                    self.finished = true;
                    return;
                }
            }
        }
    }

    async fn next_item(mut self) -> Option<(Result<String>, Self)> {
        loop {
            if let Some(item) = self.pending.pop_front() {
                return Some((item, self));
            }
            if self.finished {
                return None;
            }

            match tokio::time::timeout(self.idle_timeout, self.body.next()).await {
                Err(_) => {
                    self.finished = true;
                    let err = PipelineError::Timeout {
                        provider: self.provider.clone(),
                        after: self.idle_timeout,
                    };
                    return Some((Err(err), self));
                }
                Ok(None) => {
                    // a trailing line without newline still counts
                    if !self.buffer.is_empty() {
                        self.buffer.push(b'\n');
                        self.drain_lines();
                    }
                    self.finished = true;
                }
                Ok(Some(Err(e))) => {
                    self.finished = true;
                    let err = transport_error(&self.provider, e, self.idle_timeout);
                    return Some((Err(err), self));
                }
                Ok(Some(Ok(bytes))) => {
                    self.buffer.extend_from_slice(&bytes);
                    self.drain_lines();
                }
            }
        }
    }
}

#[async_trait]
impl GenerationProvider for OpenAiChatClient {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
        debug!(
            "Opening completion stream on {} with {} messages",
            self.model,
            messages.len()
        );

        let response = self
            .retry
            .run("chat completion", || self.open(messages))
            .await?;

        let state = SseState {
            body: response
                .bytes_stream()
                .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
                .boxed(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
            provider: self.model.clone(),
            idle_timeout: self.timeout,
        };

        Ok(stream::unfold(state, SseState::next_item).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn state_from(chunks: Vec<&'static str>) -> SseState {
        SseState {
            body: stream::iter(chunks.into_iter().map(|c| Ok(c.as_bytes().to_vec()))).boxed(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
            finished: false,
            provider: "test-model".to_string(),
            idle_timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn test_parse_content_line() {
        let line = r#"data: {"choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}"#;
        assert_eq!(
            parse_sse_line(line).unwrap(),
            SseEvent::Fragment("Hel".to_string())
        );
    }

    #[test]
    fn test_parse_done_and_finish_reason() {
        assert_eq!(parse_sse_line("data: [DONE]").unwrap(), SseEvent::Finished);
        let line = r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseEvent::Finished);
    }

    #[test]
    fn test_parse_ignores_comments_and_role_deltas() {
        assert_eq!(parse_sse_line(": keep-alive").unwrap(), SseEvent::Ignored);
        assert_eq!(parse_sse_line("").unwrap(), SseEvent::Ignored);
        let line = r#"data: {"choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#;
        assert_eq!(parse_sse_line(line).unwrap(), SseEvent::Ignored);
    }

    #[test]
    fn test_parse_malformed_json() {
        assert!(parse_sse_line("data: {not json").is_err());
    }

    #[tokio::test]
    async fn test_stream_reassembles_split_lines() {
        let state = state_from(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: {\"choi",
            "ces\":[{\"delta\":{\"content\":\" there\"}}]}\r\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n",
        ]);

        let fragments: Vec<String> = stream::unfold(state, SseState::next_item)
            .map(|item| item.unwrap())
            .collect()
            .await;

        assert_eq!(fragments, vec!["Hi".to_string(), " there".to_string()]);
    }

    #[tokio::test]
    async fn test_stream_ends_after_malformed_chunk() {
        let state = state_from(vec![
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n",
            "data: garbage\n",
        ]);

        let items: Vec<Result<String>> = stream::unfold(state, SseState::next_item)
            .collect()
            .await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(PipelineError::Provider { .. })));
    }
}
