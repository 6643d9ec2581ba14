// file: src/chat/synthesizer.rs
// description: per-turn answer synthesis with a streaming, cancellable fragment sequence
// reference: https://docs.rs/futures

use crate::chat::condense::QuestionCondenser;
use crate::chat::memory::{AppendOutcome, ConversationMemory};
use crate::chat::prompt::{Prompt, PromptBuilder};
use crate::config::SynthesisConfig;
use crate::error::{PipelineError, Result};
use crate::index::{Retriever, VectorIndex};
use crate::models::RetrievalResult;
use crate::providers::{FragmentStream, GenerationProvider};
use futures::stream::{self, Stream, StreamExt};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Retrieving,
    Synthesizing,
    Streaming,
    Complete,
    Failed,
    Cancelled,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Retrieving => "retrieving",
            Self::Synthesizing => "synthesizing",
            Self::Streaming => "streaming",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

pub struct Synthesizer {
    retriever: Retriever,
    generator: Arc<dyn GenerationProvider>,
    prompt_builder: PromptBuilder,
    condenser: Option<QuestionCondenser>,
}

impl Synthesizer {
    pub fn new(
        retriever: Retriever,
        generator: Arc<dyn GenerationProvider>,
        config: &SynthesisConfig,
    ) -> Self {
        let condenser = config
            .condense_question
            .then(|| QuestionCondenser::new(Arc::clone(&generator)));
        Self {
            retriever,
            generator,
            prompt_builder: PromptBuilder::new(config),
            condenser,
        }
    }

    pub fn prompt_builder(&self) -> &PromptBuilder {
        &self.prompt_builder
    }

    /// Runs retrieval and prompt assembly, then hands back the answer stream.
    /// Failures before streaming surface as the stream's single terminal error.
    pub async fn ask<'a>(
        &self,
        index: &VectorIndex,
        query: &str,
        memory: &'a mut ConversationMemory,
    ) -> AnswerStream<'a> {
        let turn_id = Uuid::new_v4();
        let mut state = TurnState::Idle;
        info!("Turn {} started in session {}", turn_id, memory.session_id());

        match self.prepare(index, query, memory, &mut state, turn_id).await {
            Ok((retrieval, fragments)) => {
                transition(turn_id, &mut state, TurnState::Streaming);
                AnswerStream {
                    turn_id,
                    memory,
                    query: query.to_string(),
                    retrieval,
                    fragments,
                    answer: String::new(),
                    state,
                    pending_error: None,
                }
            }
            Err(err) => {
                warn!("Turn {} failed while {}: {}", turn_id, state, err);
                transition(turn_id, &mut state, TurnState::Failed);
                AnswerStream {
                    turn_id,
                    memory,
                    query: query.to_string(),
                    retrieval: RetrievalResult::empty(query),
                    fragments: stream::empty().boxed(),
                    answer: String::new(),
                    state,
                    pending_error: Some(err),
                }
            }
        }
    }

    async fn prepare(
        &self,
        index: &VectorIndex,
        query: &str,
        memory: &ConversationMemory,
        state: &mut TurnState,
        turn_id: Uuid,
    ) -> Result<(RetrievalResult, FragmentStream)> {
        transition(turn_id, state, TurnState::Retrieving);

        let search_query = match &self.condenser {
            Some(condenser) if !memory.is_empty() => condenser.condense(memory.turns(), query).await?,
            _ => query.to_string(),
        };
        let retrieval = self.retriever.retrieve(index, &search_query).await?;
        debug!(
            "Turn {} retrieved {} entries from {:?}",
            turn_id,
            retrieval.len(),
            retrieval.sources()
        );

        transition(turn_id, state, TurnState::Synthesizing);
        let prompt: Prompt = self.prompt_builder.build(query, &retrieval, memory.turns())?;
        debug!(
            "Turn {} prompt: ~{} tokens, {} context entries, {} memory turns",
            turn_id,
            prompt.tokens(),
            prompt.context_entries(),
            prompt.memory_turns()
        );

        let fragments = self.generator.generate(prompt.messages()).await?;
        Ok((retrieval, fragments))
    }
}

fn transition(turn_id: Uuid, state: &mut TurnState, next: TurnState) {
    debug!("Turn {}: {} -> {}", turn_id, state, next);
    *state = next;
}

/// Lazy, finite, non-restartable stream of answer fragments for one turn.
///
/// The stream holds the conversation's memory exclusively until it is
/// dropped, so two answers can never interleave in one conversation. The
/// exchange is committed to memory only when the generator finishes cleanly;
/// a failure yields one terminal error and a cancellation or early drop
/// commits nothing.
pub struct AnswerStream<'a> {
    turn_id: Uuid,
    memory: &'a mut ConversationMemory,
    query: String,
    retrieval: RetrievalResult,
    fragments: FragmentStream,
    answer: String,
    state: TurnState,
    pending_error: Option<PipelineError>,
}

impl AnswerStream<'_> {
    pub fn turn_id(&self) -> Uuid {
        self.turn_id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn retrieval(&self) -> &RetrievalResult {
        &self.retrieval
    }

    /// Text received so far.
    pub fn partial_text(&self) -> &str {
        &self.answer
    }

    /// Stops consumption. Not an error; nothing reaches memory.
    pub fn cancel(&mut self) {
        if !self.state.is_terminal() {
            transition(self.turn_id, &mut self.state, TurnState::Cancelled);
            self.fragments = stream::empty().boxed();
            info!("Turn {} cancelled", self.turn_id);
        }
    }

    /// Drains the stream into a [`Reply`], keeping partial text on failure.
    pub async fn collect_reply(mut self) -> Reply {
        let mut error = None;
        while let Some(item) = self.next().await {
            if let Err(err) = item {
                error = Some(err);
            }
        }
        Reply {
            text: std::mem::take(&mut self.answer),
            state: self.state,
            sources: self
                .retrieval
                .sources()
                .into_iter()
                .map(String::from)
                .collect(),
            error,
        }
    }

    fn complete(&mut self) -> AppendOutcome {
        transition(self.turn_id, &mut self.state, TurnState::Complete);
        let outcome = self.memory.record_exchange(&self.query, &self.answer);
        info!(
            "Turn {} complete: {} chars, memory at {}/{} tokens",
            self.turn_id,
            self.answer.len(),
            self.memory.used_tokens(),
            self.memory.budget()
        );
        outcome
    }
}

impl Stream for AnswerStream<'_> {
    type Item = Result<String>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        if let Some(err) = this.pending_error.take() {
            return Poll::Ready(Some(Err(err)));
        }
        if this.state.is_terminal() {
            return Poll::Ready(None);
        }

        match this.fragments.poll_next_unpin(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Some(Ok(fragment))) => {
                this.answer.push_str(&fragment);
                Poll::Ready(Some(Ok(fragment)))
            }
            Poll::Ready(Some(Err(err))) => {
                warn!(
                    "Turn {} failed mid-stream after {} chars: {}",
                    this.turn_id,
                    this.answer.len(),
                    err
                );
                transition(this.turn_id, &mut this.state, TurnState::Failed);
                this.fragments = stream::empty().boxed();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.complete();
                Poll::Ready(None)
            }
        }
    }
}

impl Drop for AnswerStream<'_> {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            debug!("Turn {} dropped while {}", self.turn_id, self.state);
        }
    }
}

/// A finished turn as seen by a caller that does not render incrementally.
#[derive(Debug)]
pub struct Reply {
    pub text: String,
    pub state: TurnState,
    pub sources: Vec<String>,
    pub error: Option<PipelineError>,
}

impl Reply {
    pub fn is_complete(&self) -> bool {
        self.state == TurnState::Complete
    }

    /// The text, with an explicit annotation when it was cut short by an error.
    pub fn render(&self) -> String {
        match &self.error {
            Some(err) if self.text.is_empty() => format!("[no response: {}]", err),
            Some(err) => format!("{}\n\n[response interrupted: {}]", self.text, err),
            None => self.text.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetrievalConfig;
    use crate::index::IndexEntry;
    use crate::models::{Chunk, Document, DocumentFormat, Role};
    use crate::providers::{ChatMessage, EmbeddingProvider, HashEmbedder};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Emits `fragments`, optionally failing after `fail_after` of them, and
    /// records the prompts it was given.
    struct ScriptedGenerator {
        fragments: Vec<String>,
        fail_after: Option<usize>,
        prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedGenerator {
        fn new(fragments: &[&str], fail_after: Option<usize>) -> Arc<Self> {
            Arc::new(Self {
                fragments: fragments.iter().map(|f| f.to_string()).collect(),
                fail_after,
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl GenerationProvider for ScriptedGenerator {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, messages: &[ChatMessage]) -> Result<FragmentStream> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            let mut items: Vec<Result<String>> = Vec::new();
            for (i, fragment) in self.fragments.iter().enumerate() {
                if self.fail_after == Some(i) {
                    items.push(Err(PipelineError::transient("scripted", "connection reset")));
                    break;
                }
                items.push(Ok(fragment.clone()));
            }
            Ok(stream::iter(items).boxed())
        }
    }

    fn index(embedder: &HashEmbedder) -> VectorIndex {
        let text = "Went hiking in the mountains with Sam.";
        let doc = Document::new(
            PathBuf::from("2024-07-01.md"),
            "2024-07-01.md".to_string(),
            text.to_string(),
            DocumentFormat::Markdown,
            0,
        );
        let chunk = Chunk::new(Arc::new(doc.metadata), 0, text.to_string(), 0, 0);
        VectorIndex::from_entries(
            embedder.model_name(),
            "notes",
            1,
            vec![IndexEntry::new(Arc::new(chunk), embedder.embed_text(text))],
        )
        .unwrap()
    }

    fn synthesizer(generator: Arc<ScriptedGenerator>, condense: bool) -> Synthesizer {
        let config = SynthesisConfig {
            condense_question: condense,
            ..SynthesisConfig::default()
        };
        Synthesizer::new(
            Retriever::new(Arc::new(HashEmbedder::default()), &RetrievalConfig::default()),
            generator,
            &config,
        )
    }

    #[tokio::test]
    async fn test_complete_turn_commits_memory() {
        let generator = ScriptedGenerator::new(&["You went ", "hiking ", "[2024-07-01.md]."], None);
        let synth = synthesizer(generator.clone(), false);
        let index = index(&HashEmbedder::default());
        let mut memory = ConversationMemory::new(1000).unwrap();

        let stream = synth.ask(&index, "where did I go hiking?", &mut memory).await;
        assert_eq!(stream.state(), TurnState::Streaming);
        let fragments: Vec<String> = stream.map(|f| f.unwrap()).collect().await;

        assert_eq!(fragments.concat(), "You went hiking [2024-07-01.md].");
        let turns: Vec<_> = memory.turns().collect();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].text, "where did I go hiking?");
        assert_eq!(turns[1].role, Role::Assistant);

        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0][0].content.contains("[2024-07-01.md]"));
    }

    #[tokio::test]
    async fn test_mid_stream_failure_keeps_memory_unchanged() {
        let fragments = ["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"];
        let generator = ScriptedGenerator::new(&fragments, Some(3));
        let synth = synthesizer(generator, false);
        let index = index(&HashEmbedder::default());
        let mut memory = ConversationMemory::new(1000).unwrap();

        let items: Vec<Result<String>> = synth
            .ask(&index, "question", &mut memory)
            .await
            .collect()
            .await;

        assert_eq!(items.len(), 4);
        assert!(items[..3].iter().all(|item| item.is_ok()));
        assert!(matches!(items[3], Err(PipelineError::Provider { .. })));
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_reply_renders_partial_output_with_annotation() {
        let generator = ScriptedGenerator::new(&["partial ", "answer", "lost"], Some(2));
        let synth = synthesizer(generator, false);
        let index = index(&HashEmbedder::default());
        let mut memory = ConversationMemory::new(1000).unwrap();

        let reply = synth
            .ask(&index, "hiking with Sam?", &mut memory)
            .await
            .collect_reply()
            .await;

        assert_eq!(reply.state, TurnState::Failed);
        assert_eq!(reply.text, "partial answer");
        assert!(reply.render().starts_with("partial answer\n\n[response interrupted:"));
        assert_eq!(reply.sources, vec!["2024-07-01.md".to_string()]);
    }

    #[tokio::test]
    async fn test_cancel_commits_nothing() {
        let generator = ScriptedGenerator::new(&["one", "two", "three"], None);
        let synth = synthesizer(generator, false);
        let index = index(&HashEmbedder::default());
        let mut memory = ConversationMemory::new(1000).unwrap();

        let mut stream = synth.ask(&index, "question", &mut memory).await;
        assert_eq!(stream.next().await.unwrap().unwrap(), "one");
        stream.cancel();
        assert_eq!(stream.state(), TurnState::Cancelled);
        assert!(stream.next().await.is_none());
        drop(stream);

        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_failure_before_streaming_is_single_terminal_error() {
        let generator = ScriptedGenerator::new(&["unused"], None);
        let synth = synthesizer(generator.clone(), false);
        let mut memory = ConversationMemory::new(1000).unwrap();
        let huge = "word ".repeat(40_000);

        let mut stream = synth
            .ask(&index(&HashEmbedder::default()), &huge, &mut memory)
            .await;
        assert_eq!(stream.state(), TurnState::Failed);
        assert!(matches!(
            stream.next().await,
            Some(Err(PipelineError::TurnTooLarge { .. }))
        ));
        assert!(stream.next().await.is_none());
        drop(stream);

        assert!(generator.prompts.lock().unwrap().is_empty());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn test_follow_up_is_condensed_for_retrieval_only() {
        let generator = ScriptedGenerator::new(&["Who did I hike with?"], None);
        let synth = synthesizer(generator.clone(), true);
        let index = index(&HashEmbedder::default());
        let mut memory = ConversationMemory::new(1000).unwrap();
        memory.record_exchange("where did I hike?", "In the mountains.");

        let reply = synth
            .ask(&index, "with whom?", &mut memory)
            .await
            .collect_reply()
            .await;
        assert!(reply.is_complete());

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0][1].content.contains("Latest message: with whom?"));
        assert_eq!(prompts[1].last().unwrap().content, "with whom?");
    }
}
