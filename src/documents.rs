//! Blob-store boundary.
//!
//! The pipeline holds only a weak `file_key` reference to the uploaded
//! document; resolving it to content is this trait's job. The pipeline
//! reads and never writes.

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Read-only source of document content, keyed by `file_key`.
pub trait DocumentSource: Send + Sync {
    fn read(&self, file_key: &str) -> Result<String>;
}

/// Filesystem-backed store: `file_key` resolves to a file under `root`.
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl DocumentSource for FsDocumentStore {
    fn read(&self, file_key: &str) -> Result<String> {
        let path = self.root.join(file_key);
        std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read document {}", path.display()))
    }
}
