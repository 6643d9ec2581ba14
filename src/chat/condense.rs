// file: src/chat/condense.rs
// description: rewrites follow-up questions into standalone retrieval queries
// reference: condense-question chat mode

use crate::error::Result;
use crate::models::{ConversationTurn, Role};
use crate::providers::{ChatMessage, GenerationProvider};
use futures::TryStreamExt;
use std::sync::Arc;
use tracing::debug;

const CONDENSE_INSTRUCTION: &str = "Rewrite the user's latest message as a single standalone \
question that can be understood without the conversation. Keep names, dates and places from \
the conversation that the question depends on. Reply with the question only.";

pub struct QuestionCondenser {
    generator: Arc<dyn GenerationProvider>,
}

impl QuestionCondenser {
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }

    pub fn messages(history: &[&ConversationTurn], question: &str) -> Vec<ChatMessage> {
        let transcript = history
            .iter()
            .map(|turn| format!("{}: {}", turn.role, turn.text.trim()))
            .collect::<Vec<_>>()
            .join("\n");

        vec![
            ChatMessage::new(Role::System, CONDENSE_INSTRUCTION),
            ChatMessage::new(
                Role::User,
                format!(
                    "Conversation:\n{}\n\nLatest message: {}\n\nStandalone question:",
                    transcript, question
                ),
            ),
        ]
    }

    /// Returns `question` unchanged when there is no history or the model
    /// comes back empty.
    pub async fn condense<'t>(
        &self,
        history: impl IntoIterator<Item = &'t ConversationTurn>,
        question: &str,
    ) -> Result<String> {
        let history: Vec<&ConversationTurn> = history.into_iter().collect();
        if history.is_empty() {
            return Ok(question.to_string());
        }
        let messages = Self::messages(&history, question);

        let rewritten: String = self
            .generator
            .generate(&messages)
            .await?
            .try_collect::<Vec<String>>()
            .await?
            .concat();

        let rewritten = rewritten.trim();
        if rewritten.is_empty() {
            return Ok(question.to_string());
        }
        debug!("Condensed question: {:?} -> {:?}", question, rewritten);
        Ok(rewritten.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::providers::FragmentStream;
    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};

    struct Scripted(Vec<&'static str>);

    #[async_trait]
    impl GenerationProvider for Scripted {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn generate(&self, _messages: &[ChatMessage]) -> Result<FragmentStream> {
            if self.0.is_empty() {
                return Err(PipelineError::provider("scripted", "should not be called"));
            }
            let fragments: Vec<Result<String>> =
                self.0.iter().map(|f| Ok(f.to_string())).collect();
            Ok(stream::iter(fragments).boxed())
        }
    }

    #[tokio::test]
    async fn test_no_history_skips_model() {
        let condenser = QuestionCondenser::new(Arc::new(Scripted(vec![])));
        let history: Vec<ConversationTurn> = Vec::new();
        let question = condenser.condense(&history, "what about sam?").await.unwrap();
        assert_eq!(question, "what about sam?");
    }

    #[tokio::test]
    async fn test_condenses_with_history() {
        let condenser = QuestionCondenser::new(Arc::new(Scripted(vec![
            "What did I do ",
            "with Sam in July?",
        ])));
        let history = vec![
            ConversationTurn::user("What did I do in July?"),
            ConversationTurn::assistant("You went hiking with Sam [2024-07-01.md]."),
        ];

        let question = condenser.condense(&history, "and with sam?").await.unwrap();
        assert_eq!(question, "What did I do with Sam in July?");
    }

    #[test]
    fn test_messages_include_transcript() {
        let first = ConversationTurn::user("first");
        let messages = QuestionCondenser::messages(&[&first], "second");
        assert_eq!(messages.len(), 2);
        assert!(messages[1].content.contains("user: first"));
        assert!(messages[1].content.contains("Latest message: second"));
    }
}
