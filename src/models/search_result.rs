// file: src/models/search_result.rs
// description: scored index entries and ranked retrieval results
// reference: Used for vector similarity search results

use crate::models::chunk::Chunk;
use crate::utils::text::preview;
use std::sync::Arc;

/// An index entry with the similarity score computed for one query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,

    /// Cosine similarity, higher is more similar.
    pub score: f32,
}

impl ScoredChunk {
    pub fn format_summary(&self, max_content_len: usize) -> String {
        format!(
            "Score: {:.4} | {} (chunk {})\n{}\n",
            self.score,
            self.chunk.document.id,
            self.chunk.index,
            preview(&self.chunk.text, max_content_len)
        )
    }
}

/// Entries ranked by descending score, at most top-K, all above the threshold.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub query: String,
    pub entries: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn empty(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            entries: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoredChunk> {
        self.entries.iter()
    }

    pub fn best_score(&self) -> Option<f32> {
        self.entries.first().map(|entry| entry.score)
    }

    /// Distinct source filenames in rank order.
    pub fn sources(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            let name = entry.chunk.filename();
            if !seen.contains(&name) {
                seen.push(name);
            }
        }
        seen
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::document::{Document, DocumentFormat};
    use std::path::PathBuf;

    fn scored(file: &str, index: usize, text: &str, score: f32) -> ScoredChunk {
        let doc = Document::new(
            PathBuf::from(file),
            file.to_string(),
            text.to_string(),
            DocumentFormat::PlainText,
            0,
        );
        let chunk = Chunk::new(Arc::new(doc.metadata), index, text.to_string(), 0, 0);
        ScoredChunk {
            chunk: Arc::new(chunk),
            score,
        }
    }

    #[test]
    fn test_format_summary() {
        let entry = scored(
            "journal/2024-07-07.txt",
            2,
            "This is a very long content that will be truncated",
            0.87,
        );
        let summary = entry.format_summary(20);
        assert!(summary.contains("0.8700"));
        assert!(summary.contains("journal/2024-07-07.txt"));
        assert!(summary.contains("chunk 2"));
        assert!(summary.contains("..."));
    }

    #[test]
    fn test_sources_are_distinct_in_rank_order() {
        let result = RetrievalResult {
            query: "q".to_string(),
            entries: vec![
                scored("b.md", 0, "x", 0.9),
                scored("a.md", 0, "y", 0.8),
                scored("b.md", 1, "z", 0.7),
            ],
        };
        assert_eq!(result.sources(), vec!["b.md", "a.md"]);
        assert_eq!(result.best_score(), Some(0.9));
        assert!(RetrievalResult::empty("q").is_empty());
    }
}
