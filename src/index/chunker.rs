// file: src/index/chunker.rs
// description: overlapping fixed-size chunking with paragraph and sentence aware boundaries
// reference: https://docs.rs/regex

use crate::config::ChunkingConfig;
use crate::error::{PipelineError, Result};
use crate::models::{Chunk, Document, DocumentMetadata};
use lazy_static::lazy_static;
use regex::Regex;
use std::sync::Arc;

lazy_static! {
    static ref PARAGRAPH_BREAK: Regex =
        Regex::new(r"\n[ \t]*\n\s*").expect("PARAGRAPH_BREAK regex is valid");

    static ref SENTENCE_END: Regex =
        Regex::new(r#"[.!?…]["'’”)\]]*\s+"#).expect("SENTENCE_END regex is valid");

    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("WHITESPACE regex is valid");
}

/// Splits documents into windows of at most `chunk_size` characters where each
/// window repeats up to `chunk_overlap` characters of its predecessor.
#[derive(Debug, Clone)]
pub struct Chunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl Chunker {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "chunk_size must be greater than 0".to_string(),
            ));
        }
        if chunk_overlap >= chunk_size {
            return Err(PipelineError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    pub fn from_config(config: &ChunkingConfig) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn split(&self, document: &Document) -> Vec<Chunk> {
        let metadata = Arc::new(document.metadata.clone());
        self.split_text(&metadata, &document.text)
    }

    pub fn split_text(&self, document: &Arc<DocumentMetadata>, text: &str) -> Vec<Chunk> {
        // bounds[i] is the byte offset of char i; the last entry is text.len().
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut prev_end = 0;

        while start < total {
            let hard_end = (start + self.chunk_size).min(total);
            let end = if hard_end == total {
                total
            } else {
                let min_end = (start + self.chunk_size / 2).max(prev_end + 1).min(hard_end);
                self.snap_end(text, &bounds, min_end, hard_end)
            };

            let overlap = bounds[prev_end] - bounds[start];
            chunks.push(Chunk::new(
                Arc::clone(document),
                chunks.len(),
                text[bounds[start]..bounds[end]].to_string(),
                bounds[start],
                overlap,
            ));

            if end == total {
                break;
            }

            prev_end = end;
            start = end.saturating_sub(self.chunk_overlap).max(start + 1);
        }

        chunks
    }

    /// Picks a chunk end in `[min_end, hard_end]` (char indices), preferring a
    /// paragraph break, then a sentence end, then whitespace.
    fn snap_end(&self, text: &str, bounds: &[usize], min_end: usize, hard_end: usize) -> usize {
        let window_start = bounds[min_end];
        let window = &text[window_start..bounds[hard_end]];

        for pattern in [&*PARAGRAPH_BREAK, &*SENTENCE_END, &*WHITESPACE] {
            if let Some(found) = pattern.find_iter(window).last() {
                let byte = window_start + found.end();
                if let Ok(char_idx) = bounds.binary_search(&byte) {
                    return char_idx.clamp(min_end, hard_end);
                }
            }
        }

        hard_end
    }
}

/// Concatenates the non-overlapping part of each chunk.
pub fn reassemble(chunks: &[Chunk]) -> String {
    chunks.iter().map(Chunk::fresh_text).collect()
}
