// file: src/utils/validation.rs
// description: input validation for data paths and document content
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use std::path::Path;

pub struct Validator;

impl Validator {
    pub fn validate_directory(path: &Path) -> Result<()> {
        if !path.exists() {
            return Err(PipelineError::PathNotFound(path.to_path_buf()));
        }

        if !path.is_dir() {
            return Err(PipelineError::InvalidConfig(format!(
                "Data path is not a directory: {}",
                path.display()
            )));
        }

        Ok(())
    }

    pub fn validate_content_not_empty(content: &str) -> Result<()> {
        if content.trim().is_empty() {
            return Err(PipelineError::Extraction {
                file: String::new(),
                message: "Content is empty".to_string(),
            });
        }
        Ok(())
    }

    pub fn validate_query(query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(PipelineError::InvalidConfig(
                "Query must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_validate_directory() {
        let temp = TempDir::new().unwrap();
        assert!(Validator::validate_directory(temp.path()).is_ok());

        let missing = temp.path().join("missing");
        assert!(matches!(
            Validator::validate_directory(&missing),
            Err(PipelineError::PathNotFound(p)) if p == missing
        ));
    }

    #[test]
    fn test_file_is_not_a_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("note.md");
        fs::write(&file, "# Note").unwrap();

        assert!(matches!(
            Validator::validate_directory(&file),
            Err(PipelineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_content_not_empty() {
        assert!(Validator::validate_content_not_empty("content").is_ok());
        assert!(Validator::validate_content_not_empty("").is_err());
        assert!(Validator::validate_content_not_empty("  \n ").is_err());
    }

    #[test]
    fn test_validate_query() {
        assert!(Validator::validate_query("what did I do in July?").is_ok());
        assert!(Validator::validate_query("   ").is_err());
    }
}
