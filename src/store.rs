//! Document text storage.
//!
//! The pipelines only read extracted text by key. [`InMemoryDocumentStore`] serves tests and
//! embedders that extract text themselves; [`DirectoryDocumentStore`] resolves keys to files in
//! an upload directory, extracts PDF text on first access, and caches the result for later
//! requests.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use walkdir::WalkDir;

/// Text substituted for PDFs that contain no extractable text layer.
pub const NO_EXTRACTABLE_TEXT: &str = "No extractable text found in the PDF.";

const SUPPORTED_EXTENSIONS: [&str; 3] = ["pdf", "txt", "md"];

/// Errors raised while resolving document text.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No document is stored under the key.
    #[error("document '{0}' not found")]
    NotFound(String),
    /// The key names a file type the store cannot extract.
    #[error("document '{0}' has an unsupported file type")]
    Unsupported(String),
    /// Reading the underlying file failed.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        /// File that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// PDF text extraction failed.
    #[error("failed to extract text from '{key}': {message}")]
    Extraction {
        /// Document key.
        key: String,
        /// Diagnostic from the extractor.
        message: String,
    },
}

/// Read access to extracted document text.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Extracted plain text of the document stored under `key`.
    async fn get_text(&self, key: &str) -> Result<Arc<str>, StoreError>;
}

/// Documents held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Arc<str>>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `text` under `key`, replacing any earlier document with that key.
    pub fn insert(&self, key: impl Into<String>, text: impl Into<Arc<str>>) {
        let mut documents = match self.documents.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        documents.insert(key.into(), text.into());
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_text(&self, key: &str) -> Result<Arc<str>, StoreError> {
        let documents = match self.documents.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        documents
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }
}

/// Documents stored as files in one directory, keyed by file name.
#[derive(Debug)]
pub struct DirectoryDocumentStore {
    root: PathBuf,
    cache: InMemoryDocumentStore,
}

impl DirectoryDocumentStore {
    /// Store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: InMemoryDocumentStore::new(),
        }
    }

    /// Directory the store reads from.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File names of supported documents directly inside the root, sorted.
    pub fn list_documents(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|error| StoreError::Io {
                path: self.root.clone(),
                source: error.into(),
            })?;
            if !entry.file_type().is_file() || !is_supported(entry.path()) {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn resolve(&self, key: &str) -> Result<PathBuf, StoreError> {
        let file_name = Path::new(key)
            .file_name()
            .filter(|name| name.to_str() == Some(key))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        let path = self.root.join(file_name);
        if !path.is_file() {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if !is_supported(&path) {
            return Err(StoreError::Unsupported(key.to_string()));
        }
        Ok(path)
    }
}

#[async_trait]
impl DocumentStore for DirectoryDocumentStore {
    async fn get_text(&self, key: &str) -> Result<Arc<str>, StoreError> {
        if let Ok(text) = self.cache.get_text(key).await {
            return Ok(text);
        }

        let path = self.resolve(key)?;
        let owned_key = key.to_string();
        let text = tokio::task::spawn_blocking(move || extract_text(&owned_key, &path))
            .await
            .map_err(|error| StoreError::Extraction {
                key: key.to_string(),
                message: format!("extraction task failed: {error}"),
            })??;

        tracing::info!(key, chars = text.len(), "Extracted document text");
        let text: Arc<str> = text.into();
        self.cache.insert(key, Arc::clone(&text));
        Ok(text)
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| {
            let lower = extension.to_ascii_lowercase();
            SUPPORTED_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

fn extract_text(key: &str, path: &Path) -> Result<String, StoreError> {
    let is_pdf = path
        .extension()
        .and_then(|extension| extension.to_str())
        .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"));

    if !is_pdf {
        return std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    let text = pdf_extract::extract_text(path).map_err(|error| StoreError::Extraction {
        key: key.to_string(),
        message: error.to_string(),
    })?;
    if text.trim().is_empty() {
        tracing::warn!(key, "PDF has no extractable text");
        return Ok(NO_EXTRACTABLE_TEXT.to_string());
    }
    Ok(text)
}
