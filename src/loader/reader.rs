// file: src/loader/reader.rs
// description: reads scanned note files into normalized documents with citation metadata
// reference: https://docs.rs/pdf-extract

use crate::config::DataConfig;
use crate::error::{PipelineError, Result};
use crate::loader::scanner::{FileScanner, ScannedFile};
use crate::models::{Document, DocumentFormat};
use crate::parser::{FrontmatterParser, MarkdownNormalizer, MarkdownParser};
use crate::utils::{Validator, preview};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

pub struct DocumentLoader {
    config: DataConfig,
    scanner: FileScanner,
    markdown_parser: MarkdownParser,
    frontmatter_parser: FrontmatterParser,
    normalizer: MarkdownNormalizer,
}

#[derive(Debug, Default)]
pub struct LoadedDocuments {
    pub documents: Vec<Document>,
    pub skipped: usize,
}

impl DocumentLoader {
    pub fn new(config: DataConfig) -> Self {
        Self {
            scanner: FileScanner::new(config.clone()),
            config,
            markdown_parser: MarkdownParser::new(),
            frontmatter_parser: FrontmatterParser::new(),
            normalizer: MarkdownNormalizer::new(),
        }
    }

    /// Loads every supported note under `root`. Files that cannot be read
    /// faithfully are skipped with a warning rather than loaded lossily.
    pub fn load(&self, root: &Path) -> Result<LoadedDocuments> {
        let scan = self.scanner.scan_directory(root)?;
        let mut loaded = LoadedDocuments {
            documents: Vec::with_capacity(scan.files.len()),
            skipped: scan.skipped,
        };

        for file in &scan.files {
            match self.load_file(file) {
                Ok(Some(document)) => loaded.documents.push(document),
                Ok(None) => {
                    debug!("Skipping empty note: {}", file.relative_path);
                }
                Err(err) => {
                    warn!("Skipping {}: {}", file.relative_path, err);
                    loaded.skipped += 1;
                }
            }
        }

        info!(
            "Loaded {} documents from {} ({} skipped)",
            loaded.documents.len(),
            root.display(),
            loaded.skipped
        );
        Ok(loaded)
    }

    pub fn load_file(&self, file: &ScannedFile) -> Result<Option<Document>> {
        let document = match file.format {
            DocumentFormat::PlainText => self.plain_document(file, read_utf8(file)?),
            DocumentFormat::Markdown => self.load_markdown(file, read_utf8(file)?),
            DocumentFormat::Pdf => {
                let text = pdf_extract::extract_text(&file.path).map_err(|e| {
                    PipelineError::Extraction {
                        file: file.relative_path.clone(),
                        message: e.to_string(),
                    }
                })?;
                self.plain_document(file, text)
            }
        };

        if Validator::validate_content_not_empty(&document.text).is_err() {
            return Ok(None);
        }

        Ok(Some(document))
    }

    fn plain_document(&self, file: &ScannedFile, text: String) -> Document {
        let mut document = Document::new(
            file.path.clone(),
            file.relative_path.clone(),
            text,
            file.format,
            file.modified,
        );
        document.metadata.preview = preview(&document.text, self.config.preview_chars);
        document
    }

    fn load_markdown(&self, file: &ScannedFile, content: String) -> Document {
        let (fields, body) = match self.frontmatter_parser.extract(&file.relative_path, &content) {
            Ok(Some((frontmatter, body))) => (frontmatter.fields, body.to_string()),
            Ok(None) => (Default::default(), content),
            Err(err) => {
                warn!("Keeping frontmatter of {} as text: {}", file.relative_path, err);
                (Default::default(), content)
            }
        };

        let text = if self.config.normalize_markdown {
            self.normalizer.normalize(&body)
        } else {
            body
        };

        let parsed = self.markdown_parser.parse(&text);
        let title = fields.get("title").cloned().or_else(|| parsed.title());

        Document::new(
            file.path.clone(),
            file.relative_path.clone(),
            text,
            file.format,
            file.modified,
        )
        .with_preview(&parsed.plain_text, self.config.preview_chars)
        .with_title(title)
        .with_extra(fields)
    }
}

fn read_utf8(file: &ScannedFile) -> Result<String> {
    let bytes = fs::read(&file.path).map_err(|source| PipelineError::FileOperation {
        path: file.path.clone(),
        source,
    })?;

    String::from_utf8(bytes).map_err(|e| PipelineError::Extraction {
        file: file.relative_path.clone(),
        message: format!("not valid UTF-8: {}", e.utf8_error()),
    })
}
