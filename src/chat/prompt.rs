// file: src/chat/prompt.rs
// description: context-window aware prompt assembly from retrieval results and memory
// reference: OpenAI chat message roles

use crate::config::SynthesisConfig;
use crate::error::{PipelineError, Result};
use crate::models::{ConversationTurn, RetrievalResult, Role, ScoredChunk};
use crate::providers::ChatMessage;
use crate::utils::text::estimate_tokens;
use std::collections::VecDeque;
use tracing::debug;

/// Rough per-message framing cost charged by chat APIs.
const MESSAGE_OVERHEAD_TOKENS: usize = 4;

const CONTEXT_HEADER: &str = "Here are the relevant excerpts from the notes:";

#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    messages: Vec<ChatMessage>,
    tokens: usize,
    context_entries: usize,
    memory_turns: usize,
    dropped_context: usize,
    dropped_turns: usize,
}

impl Prompt {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn into_messages(self) -> Vec<ChatMessage> {
        self.messages
    }

    /// Upper-bound estimate of the prompt size.
    pub fn tokens(&self) -> usize {
        self.tokens
    }

    pub fn context_entries(&self) -> usize {
        self.context_entries
    }

    pub fn memory_turns(&self) -> usize {
        self.memory_turns
    }

    pub fn dropped_context(&self) -> usize {
        self.dropped_context
    }

    pub fn dropped_turns(&self) -> usize {
        self.dropped_turns
    }
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: String,
    context_template: String,
    empty_context_notice: String,
    budget: usize,
}

impl PromptBuilder {
    pub fn new(config: &SynthesisConfig) -> Self {
        Self {
            system_prompt: config.system_prompt.clone(),
            context_template: config.context_template.clone(),
            empty_context_notice: config.empty_context_notice.clone(),
            budget: config
                .context_window_tokens
                .saturating_sub(config.response_reserve_tokens),
        }
    }

    /// Tokens available to the prompt once the response reserve is set aside.
    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn render_entry(&self, entry: &ScoredChunk) -> String {
        let chunk = &entry.chunk;
        self.context_template
            .replace("{filename}", chunk.filename())
            .replace("{id}", &chunk.document.id)
            .replace("{title}", chunk.document.title.as_deref().unwrap_or(""))
            .replace("{score}", &format!("{:.3}", entry.score))
            .replace("{text}", chunk.text.trim())
    }

    /// Assembles system instruction, retrieved context, memory and the live
    /// query. Over budget, the lowest-scored context goes first, then the
    /// oldest memory turns. The instruction, the empty-context notice and the
    /// query are never cut.
    pub fn build<'t>(
        &self,
        query: &str,
        retrieval: &RetrievalResult,
        memory: impl IntoIterator<Item = &'t ConversationTurn>,
    ) -> Result<Prompt> {
        let header_cost = estimate_tokens(CONTEXT_HEADER) + 1;
        let notice = if retrieval.is_empty() {
            Some(self.costed(self.empty_context_notice.clone()))
        } else {
            None
        };

        let fixed = estimate_tokens(&self.system_prompt)
            + estimate_tokens(query)
            + 2 * MESSAGE_OVERHEAD_TOKENS
            + notice.as_ref().map_or(0, |(_, cost)| header_cost + cost);
        if fixed > self.budget {
            return Err(PipelineError::TurnTooLarge {
                tokens: fixed,
                budget: self.budget,
            });
        }

        // rank order, best first
        let mut context: Vec<(String, usize)> = retrieval
            .iter()
            .map(|entry| self.costed(self.render_entry(entry)))
            .collect();

        let mut history: VecDeque<(ChatMessage, usize)> = memory
            .into_iter()
            .map(|turn| {
                let cost = turn.tokens() + MESSAGE_OVERHEAD_TOKENS;
                (ChatMessage::new(turn.role, turn.text.clone()), cost)
            })
            .collect();

        let context_cost = |context: &[(String, usize)]| -> usize {
            if context.is_empty() {
                0
            } else {
                header_cost + context.iter().map(|(_, cost)| cost).sum::<usize>()
            }
        };
        let mut total = fixed
            + context_cost(&context)
            + history.iter().map(|(_, cost)| cost).sum::<usize>();

        let mut dropped_context = 0;
        let mut dropped_turns = 0;

        while total > self.budget {
            if !context.is_empty() {
                let before = context_cost(&context);
                context.pop();
                total -= before - context_cost(&context);
                dropped_context += 1;
            } else if let Some((_, cost)) = history.pop_front() {
                total -= cost;
                dropped_turns += 1;
            } else {
                break;
            }
        }

        if dropped_context > 0 || dropped_turns > 0 {
            debug!(
                "Prompt over budget: dropped {} context entries and {} memory turns",
                dropped_context, dropped_turns
            );
        }

        let context_entries = context.len();
        if let Some(notice) = notice {
            context.push(notice);
        }

        let mut system = self.system_prompt.clone();
        if !context.is_empty() {
            system.push_str("\n\n");
            system.push_str(CONTEXT_HEADER);
            for (text, _) in &context {
                system.push_str("\n\n");
                system.push_str(text);
            }
        }

        let memory_turns = history.len();
        let mut messages = Vec::with_capacity(memory_turns + 2);
        messages.push(ChatMessage::new(Role::System, system));
        messages.extend(history.into_iter().map(|(message, _)| message));
        messages.push(ChatMessage::new(Role::User, query));

        Ok(Prompt {
            messages,
            tokens: total,
            context_entries,
            memory_turns,
            dropped_context,
            dropped_turns,
        })
    }

    fn costed(&self, text: String) -> (String, usize) {
        let cost = estimate_tokens(&text) + 1;
        (text, cost)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, Document, DocumentFormat};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;
    use std::sync::Arc;

    fn config(window: usize, reserve: usize) -> SynthesisConfig {
        SynthesisConfig {
            system_prompt: "You are helpful.".to_string(),
            context_window_tokens: window,
            response_reserve_tokens: reserve,
            ..SynthesisConfig::default()
        }
    }

    fn entry(file: &str, text: &str, score: f32) -> ScoredChunk {
        let doc = Document::new(
            PathBuf::from(file),
            file.to_string(),
            text.to_string(),
            DocumentFormat::Markdown,
            0,
        );
        ScoredChunk {
            chunk: Arc::new(Chunk::new(Arc::new(doc.metadata), 0, text.to_string(), 0, 0)),
            score,
        }
    }

    fn no_turns() -> Vec<ConversationTurn> {
        Vec::new()
    }

    fn retrieval(entries: Vec<ScoredChunk>) -> RetrievalResult {
        RetrievalResult {
            query: "q".to_string(),
            entries,
        }
    }

    #[test]
    fn test_layout_with_context_and_memory() {
        let builder = PromptBuilder::new(&config(8192, 1024));
        let memory = vec![
            ConversationTurn::user("earlier question"),
            ConversationTurn::assistant("earlier answer"),
        ];
        let prompt = builder
            .build(
                "what did I do on monday?",
                &retrieval(vec![entry("2024-07-01.md", "Went hiking.", 0.8)]),
                &memory,
            )
            .unwrap();

        let roles: Vec<Role> = prompt.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::User, Role::Assistant, Role::User]
        );
        assert!(prompt.messages()[0].content.contains("[2024-07-01.md]\nWent hiking."));
        assert_eq!(prompt.messages()[3].content, "what did I do on monday?");
        assert_eq!(prompt.context_entries(), 1);
        assert!(prompt.tokens() <= builder.budget());
    }

    #[test]
    fn test_empty_retrieval_inserts_notice() {
        let builder = PromptBuilder::new(&config(8192, 1024));
        let prompt = builder
            .build("anything?", &RetrievalResult::empty("anything?"), &no_turns())
            .unwrap();

        assert!(
            prompt.messages()[0]
                .content
                .contains(crate::config::DEFAULT_EMPTY_CONTEXT_NOTICE)
        );
        assert_eq!(prompt.context_entries(), 0);
    }

    #[test]
    fn test_notice_outlives_memory_when_nothing_retrieved() {
        let builder = PromptBuilder::new(&config(60, 10));
        let memory = vec![
            ConversationTurn::user("u".repeat(100)),
            ConversationTurn::assistant("a".repeat(20)),
        ];
        let prompt = builder
            .build("q", &RetrievalResult::empty("q"), &memory)
            .unwrap();

        assert!(
            prompt.messages()[0]
                .content
                .contains(crate::config::DEFAULT_EMPTY_CONTEXT_NOTICE)
        );
        assert_eq!(prompt.context_entries(), 0);
        assert_eq!(prompt.dropped_context(), 0);
        assert_eq!(prompt.dropped_turns(), 1);
        assert_eq!(prompt.messages()[1].content, "a".repeat(20));
        assert!(prompt.tokens() <= builder.budget());
    }

    #[test]
    fn test_drops_lowest_scored_context_first() {
        // 70 prompt tokens: room for the header and a single entry
        let builder = PromptBuilder::new(&config(80, 10));
        let body = "x".repeat(80);
        let prompt = builder
            .build(
                "q",
                &retrieval(vec![
                    entry("best.md", &body, 0.9),
                    entry("middle.md", &body, 0.5),
                    entry("worst.md", &body, 0.1),
                ]),
                &no_turns(),
            )
            .unwrap();

        let system = &prompt.messages()[0].content;
        assert!(system.contains("[best.md]"));
        assert!(!system.contains("[worst.md]"));
        assert!(prompt.dropped_context() >= 1);
        assert!(prompt.tokens() <= builder.budget());
    }

    #[test]
    fn test_drops_oldest_memory_after_context() {
        let builder = PromptBuilder::new(&config(60, 10));
        let memory = vec![
            ConversationTurn::user("o".repeat(80)),
            ConversationTurn::assistant("n".repeat(40)),
        ];
        let prompt = builder
            .build(
                "q",
                &retrieval(vec![entry("a.md", &"c".repeat(40), 0.9)]),
                &memory,
            )
            .unwrap();

        assert_eq!(prompt.context_entries(), 0);
        assert_eq!(prompt.dropped_turns(), 1);
        assert_eq!(prompt.memory_turns(), 1);
        assert_eq!(prompt.messages()[1].content, "n".repeat(40));
        assert!(prompt.tokens() <= builder.budget());
    }

    #[test]
    fn test_turn_too_large() {
        let builder = PromptBuilder::new(&config(40, 10));
        let err = builder
            .build(&"z".repeat(400), &RetrievalResult::empty("z"), &no_turns())
            .unwrap_err();
        assert!(matches!(err, PipelineError::TurnTooLarge { budget: 30, .. }));
    }
}
