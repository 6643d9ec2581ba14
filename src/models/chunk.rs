// file: src/models/chunk.rs
// description: bounded text segment of a document with its overlap boundary
// reference: internal data structures

use crate::models::document::DocumentMetadata;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// `<document id>#<index>`, unique within an index.
    pub id: String,
    pub document: Arc<DocumentMetadata>,
    pub index: usize,
    pub text: String,
    /// Byte span of `text` in the parent document.
    pub start: usize,
    pub end: usize,
    /// Leading bytes of `text` already covered by the previous chunk.
    pub overlap: usize,
}

impl Chunk {
    pub fn new(
        document: Arc<DocumentMetadata>,
        index: usize,
        text: String,
        start: usize,
        overlap: usize,
    ) -> Self {
        let end = start + text.len();
        Self {
            id: format!("{}#{}", document.id, index),
            document,
            index,
            text,
            start,
            end,
            overlap,
        }
    }

    /// The part of the chunk not shared with its predecessor.
    pub fn fresh_text(&self) -> &str {
        &self.text[self.overlap..]
    }

    pub fn filename(&self) -> &str {
        &self.document.filename
    }
}
