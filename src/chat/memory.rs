// file: src/chat/memory.rs
// description: token-bounded conversation memory with oldest-first eviction
// reference: 4 characters per token heuristic

use crate::error::{PipelineError, Result};
use crate::models::{ConversationTurn, Role};
use crate::utils::text::truncate_to_tokens;
use std::collections::VecDeque;
use tracing::{debug, warn};
use uuid::Uuid;

/// What happened to the memory on one append.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppendOutcome {
    pub evicted: usize,
    pub truncated: bool,
}

impl AppendOutcome {
    fn merge(self, other: AppendOutcome) -> Self {
        Self {
            evicted: self.evicted + other.evicted,
            truncated: self.truncated || other.truncated,
        }
    }
}

/// Per-session FIFO of turns. Total estimated tokens never exceed the budget
/// after an append, and the newest turn is always kept.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    session_id: Uuid,
    turns: VecDeque<ConversationTurn>,
    budget: usize,
    used: usize,
}

impl ConversationMemory {
    pub fn new(budget: usize) -> Result<Self> {
        if budget == 0 {
            return Err(PipelineError::InvalidConfig(
                "memory token budget must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            session_id: Uuid::new_v4(),
            turns: VecDeque::new(),
            budget,
            used: 0,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn budget(&self) -> usize {
        self.budget
    }

    pub fn used_tokens(&self) -> usize {
        self.used
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Oldest first.
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn append(&mut self, mut turn: ConversationTurn) -> AppendOutcome {
        let mut outcome = AppendOutcome::default();

        if turn.tokens() > self.budget {
            let original = turn.tokens();
            turn.text = truncate_to_tokens(&turn.text, self.budget).to_string();
            outcome.truncated = true;
            warn!(
                "Truncated {} turn from ~{} to ~{} tokens to fit memory budget",
                turn.role,
                original,
                turn.tokens()
            );
        }

        self.used += turn.tokens();
        self.turns.push_back(turn);

        while self.used > self.budget && self.turns.len() > 1 {
            if let Some(oldest) = self.turns.pop_front() {
                self.used -= oldest.tokens();
                outcome.evicted += 1;
            }
        }

        if outcome.evicted > 0 {
            debug!(
                "Evicted {} turns, memory at {}/{} tokens",
                outcome.evicted, self.used, self.budget
            );
        }
        outcome
    }

    /// Commits a completed user/assistant exchange.
    pub fn record_exchange(&mut self, question: &str, answer: &str) -> AppendOutcome {
        let first = self.append(ConversationTurn::new(Role::User, question));
        let second = self.append(ConversationTurn::new(Role::Assistant, answer));
        first.merge(second)
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.used = 0;
        debug!("Conversation memory cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(tokens: usize) -> String {
        "abcd".repeat(tokens)
    }

    #[test]
    fn test_zero_budget_rejected() {
        assert!(matches!(
            ConversationMemory::new(0),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_evicts_oldest_until_under_budget() {
        let mut memory = ConversationMemory::new(10).unwrap();
        memory.append(ConversationTurn::user(text(4)));
        memory.append(ConversationTurn::assistant(text(4)));
        let outcome = memory.append(ConversationTurn::user(text(4)));

        assert_eq!(outcome.evicted, 1);
        assert_eq!(memory.len(), 2);
        assert_eq!(memory.used_tokens(), 8);
        assert_eq!(memory.turns().next().unwrap().role, Role::Assistant);
    }

    #[test]
    fn test_oversized_turn_truncated_and_kept() {
        let mut memory = ConversationMemory::new(5).unwrap();
        memory.append(ConversationTurn::user("hi"));
        let outcome = memory.append(ConversationTurn::assistant(text(20)));

        assert!(outcome.truncated);
        assert_eq!(outcome.evicted, 1);
        assert_eq!(memory.len(), 1);
        assert_eq!(memory.used_tokens(), 5);
        let newest = memory.turns().last().unwrap();
        assert_eq!(newest.text, text(5));
    }

    #[test]
    fn test_budget_invariant_holds_across_appends() {
        let mut memory = ConversationMemory::new(37).unwrap();
        for i in 0..50 {
            memory.record_exchange(&"q".repeat(i * 3), &"a".repeat(i * 7 % 90));
            assert!(memory.used_tokens() <= memory.budget());
            let sum: usize = memory.turns().map(|t| t.tokens()).sum();
            assert_eq!(sum, memory.used_tokens());
            assert_eq!(memory.turns().last().unwrap().role, Role::Assistant);
        }
    }

    #[test]
    fn test_clear() {
        let mut memory = ConversationMemory::new(100).unwrap();
        memory.record_exchange("question", "answer");
        assert_eq!(memory.len(), 2);

        let session = memory.session_id();
        memory.clear();
        assert!(memory.is_empty());
        assert_eq!(memory.used_tokens(), 0);
        assert_eq!(memory.session_id(), session);
    }
}
