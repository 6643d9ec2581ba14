// file: src/chat/mod.rs
// description: conversation memory, prompt assembly and streamed answer synthesis
// reference: internal module structure

pub mod condense;
pub mod memory;
pub mod prompt;
pub mod synthesizer;

pub use condense::QuestionCondenser;
pub use memory::{AppendOutcome, ConversationMemory};
pub use prompt::{Prompt, PromptBuilder};
pub use synthesizer::{AnswerStream, Reply, Synthesizer, TurnState};
