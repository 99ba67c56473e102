//! Corpus documents and their identifiers.
//!
//! A document is the unit being benchmarked: one SGW reduced to text. Its
//! identity is an opaque [`DocId`]; the harness never looks inside it beyond
//! equality and a stable ordering used for tie-breaking.

use crate::error::{BenchError, Result};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Default file extension for corpus documents.
pub const DEFAULT_EXTENSION: &str = "sgws";

/// Stable document identifier (e.g. a workflow id).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Encode, Decode,
)]
#[serde(transparent)]
pub struct DocId(String);

impl DocId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DocId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Tenant identifier, opaque like [`DocId`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(String);

impl TenantId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

/// Optional bookkeeping carried alongside a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tenant: Option<TenantId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<PathBuf>,
}

/// A corpus document. Immutable once admitted to a benchmark version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub doc_id: DocId,
    pub text: String,
    #[serde(default)]
    pub metadata: DocumentMetadata,
}

impl Document {
    /// Create a document from an id and its text.
    pub fn new(doc_id: impl Into<DocId>, text: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            text: text.into(),
            metadata: DocumentMetadata::default(),
        }
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Load a file as a document; the file stem becomes the `doc_id`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;

        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        Ok(Self {
            doc_id: DocId::new(stem.clone()),
            text,
            metadata: DocumentMetadata {
                name: Some(stem),
                tenant: None,
                source_path: Some(path.to_path_buf()),
            },
        })
    }

    /// Length of the text in characters.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

impl From<String> for DocId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Load every file with the given extension under `root`, sorted by `doc_id`.
///
/// Duplicate stems are rejected since they would collapse two documents into
/// one label entry.
pub fn load_corpus(root: &Path, extension: &str) -> Result<Vec<Document>> {
    if !root.is_dir() {
        return Err(BenchError::InvalidCorpusPath(root.to_path_buf()));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            BenchError::io(path, std::io::Error::other(e.to_string()))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(extension) {
            continue;
        }
        debug!(path = %path.display(), "loading document");
        documents.push(Document::from_file(path)?);
    }

    if documents.is_empty() {
        return Err(BenchError::EmptyCorpus(root.to_path_buf()));
    }

    documents.sort_by(|a, b| a.doc_id.cmp(&b.doc_id));
    ensure_unique_ids(&documents)?;

    info!(count = documents.len(), root = %root.display(), "loaded corpus");
    Ok(documents)
}

/// Reject corpora where two documents share a `doc_id`.
pub fn ensure_unique_ids(documents: &[Document]) -> Result<()> {
    let mut seen = HashSet::new();
    for doc in documents {
        if !seen.insert(&doc.doc_id) {
            return Err(BenchError::InvalidConfig(format!(
                "duplicate doc_id '{}' in corpus",
                doc.doc_id
            )));
        }
    }
    Ok(())
}
