// file: src/loader/scanner.rs
// description: Directory walking and note file discovery with filtering
// reference: https://docs.rs/walkdir

use crate::config::DataConfig;
use crate::error::Result;
use crate::models::DocumentFormat;
use crate::utils::Validator;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub struct FileScanner {
    config: DataConfig,
}

#[derive(Debug, Clone)]
pub struct ScannedFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub format: DocumentFormat,
    pub size: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub files: Vec<ScannedFile>,
    pub skipped: usize,
}

impl FileScanner {
    pub fn new(config: DataConfig) -> Self {
        Self { config }
    }

    /// Files come back in file-name order so ingestion order is stable.
    pub fn scan_directory(&self, root: &Path) -> Result<ScanResult> {
        Validator::validate_directory(root)?;
        info!("Scanning directory: {}", root.display());

        let mut result = ScanResult::default();
        let max_size = (self.config.max_file_size_mb * 1024 * 1024) as u64;

        for entry in WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Skipping unreadable entry: {}", err);
                    result.skipped += 1;
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative_path = path
                .strip_prefix(root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");

            if self.should_skip(&relative_path) {
                debug!("Skipping file: {}", path.display());
                continue;
            }

            let Some(format) = DocumentFormat::from_path(path) else {
                warn!("Skipping unsupported file format: {}", relative_path);
                result.skipped += 1;
                continue;
            };

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(err) => {
                    warn!("Skipping {}: {}", relative_path, err);
                    result.skipped += 1;
                    continue;
                }
            };

            let size = metadata.len();
            if size > max_size {
                warn!(
                    "Skipping large file ({} MB): {}",
                    size / 1024 / 1024,
                    relative_path
                );
                result.skipped += 1;
                continue;
            }

            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);

            result.files.push(ScannedFile {
                path: path.to_path_buf(),
                relative_path,
                format,
                size,
                modified,
            });
        }

        info!(
            "Found {} note files ({} skipped)",
            result.files.len(),
            result.skipped
        );
        Ok(result)
    }

    fn should_skip(&self, relative_path: &str) -> bool {
        if relative_path
            .split('/')
            .any(|component| component.starts_with('.'))
        {
            return true;
        }

        self.config.skip_patterns.iter().any(|pattern| {
            if let Some(suffix) = pattern.strip_prefix('*') {
                relative_path.ends_with(suffix)
            } else {
                relative_path.contains(pattern.as_str())
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(skip_patterns: Vec<&str>) -> DataConfig {
        DataConfig {
            skip_patterns: skip_patterns.into_iter().map(String::from).collect(),
            ..DataConfig::default()
        }
    }

    #[test]
    fn test_scan_directory_sorted_and_filtered() {
        let temp = TempDir::new().unwrap();
        fs::create_dir_all(temp.path().join("2024")).unwrap();
        fs::write(temp.path().join("b.md"), "# B").unwrap();
        fs::write(temp.path().join("a.txt"), "A").unwrap();
        fs::write(temp.path().join("2024/c.markdown"), "C").unwrap();
        fs::write(temp.path().join("photo.jpg"), [0u8, 1, 2]).unwrap();
        fs::write(temp.path().join(".hidden.md"), "H").unwrap();

        let scanner = FileScanner::new(config(vec![]));
        let result = scanner.scan_directory(temp.path()).unwrap();

        let names: Vec<&str> = result
            .files
            .iter()
            .map(|f| f.relative_path.as_str())
            .collect();
        assert_eq!(names, vec!["2024/c.markdown", "a.txt", "b.md"]);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.files[1].format, DocumentFormat::PlainText);
    }

    #[test]
    fn test_skip_patterns() {
        let scanner = FileScanner::new(config(vec!["*.draft.md", "archive/"]));

        assert!(scanner.should_skip("ideas.draft.md"));
        assert!(scanner.should_skip("archive/2019.md"));
        assert!(scanner.should_skip(".git/config"));
        assert!(!scanner.should_skip("2024/07-07.md"));
    }

    #[test]
    fn test_missing_directory() {
        let scanner = FileScanner::new(config(vec![]));
        let err = scanner
            .scan_directory(Path::new("/definitely/not/here"))
            .unwrap_err();
        assert!(matches!(err, crate::error::PipelineError::PathNotFound(_)));
    }
}
