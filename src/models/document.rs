// file: src/models/document.rs
// description: loaded note document and the metadata its chunks cite
// reference: internal data structures

use crate::utils::text::preview;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const DEFAULT_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Markdown,
    PlainText,
    Pdf,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "md" | "markdown" => Some(Self::Markdown),
            "txt" | "text" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Path relative to the data directory.
    pub id: String,
    pub filename: String,
    pub preview: String,
    pub title: Option<String>,
    pub format: DocumentFormat,
    pub content_hash: String,
    pub last_modified: u64,
    /// Scalar frontmatter fields of markdown notes.
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    pub text: String,
    pub metadata: DocumentMetadata,
}

impl Document {
    pub fn new(
        path: PathBuf,
        id: String,
        text: String,
        format: DocumentFormat,
        last_modified: u64,
    ) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| id.clone());

        let metadata = DocumentMetadata {
            id,
            filename,
            preview: preview(&text, DEFAULT_PREVIEW_CHARS),
            title: None,
            format,
            content_hash: Self::compute_hash(&text),
            last_modified,
            extra: BTreeMap::new(),
        };

        Self {
            path,
            text,
            metadata,
        }
    }

    pub fn with_preview(mut self, source: &str, max_chars: usize) -> Self {
        self.metadata.preview = preview(source, max_chars);
        self
    }

    pub fn with_title(mut self, title: Option<String>) -> Self {
        self.metadata.title = title;
        self
    }

    pub fn with_extra(mut self, extra: BTreeMap<String, String>) -> Self {
        self.metadata.extra = extra;
        self
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub(crate) fn compute_hash(content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
