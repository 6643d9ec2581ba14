// file: src/loader/mod.rs
// description: note directory loading module exports
// reference: internal module structure

pub mod reader;
pub mod scanner;

pub use reader::{DocumentLoader, LoadedDocuments};
pub use scanner::{FileScanner, ScanResult, ScannedFile};
