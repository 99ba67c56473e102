//! Error types for the benchmark harness.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, BenchError>;

/// Errors that can occur while building labels or scoring candidates.
#[derive(Error, Debug)]
pub enum BenchError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Bad chunking, pooling or build parameters. Fatal.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Nothing to pool or embed.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// The embedder failed after all retries.
    #[error("Embedding failed: {0}")]
    EmbeddingFailure(#[from] EmbedError),

    /// A query document has no gold labels entry.
    #[error("No gold labels entry for document '{0}'")]
    MissingGoldEntry(String),

    /// Candidate results and labels were produced for different corpus versions.
    #[error("Version mismatch: candidates are for '{candidates}', labels are '{labels}'")]
    VersionMismatch { candidates: String, labels: String },

    /// A labels version is already published.
    #[error("Labels version '{0}' already exists")]
    VersionExists(String),

    /// No labels were published under this version.
    #[error("Labels version '{0}' not found")]
    LabelsNotFound(String),

    /// The corpus directory does not exist or is not a directory.
    #[error("Corpus path '{0}' does not exist or is not a directory")]
    InvalidCorpusPath(PathBuf),

    /// No documents found in the corpus.
    #[error("No documents found in corpus at '{0}'")]
    EmptyCorpus(PathBuf),

    /// The run was aborted between documents.
    #[error("Run cancelled")]
    Cancelled,

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BenchError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<serde_json::Error> for BenchError {
    fn from(err: serde_json::Error) -> Self {
        BenchError::Serialization(err.to_string())
    }
}

/// Failures reported by an [`Embedder`](crate::embedder::Embedder).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbedError {
    /// The service asked us to slow down.
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    /// The text exceeds the model's input limit; the caller must chunk smaller.
    #[error("input too large ({chars} chars)")]
    InputTooLarge { chars: usize },

    /// Network or connection failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service rejected the request or returned something unusable.
    #[error("embedding API error: {0}")]
    Api(String),
}

impl EmbedError {
    /// Whether another attempt could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Transport(_))
    }
}

impl From<reqwest::Error> for EmbedError {
    fn from(err: reqwest::Error) -> Self {
        EmbedError::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EmbedError::RateLimited { retry_after: None }.is_retryable());
        assert!(EmbedError::Transport("reset".into()).is_retryable());
        assert!(!EmbedError::InputTooLarge { chars: 10 }.is_retryable());
        assert!(!EmbedError::Api("bad".into()).is_retryable());
    }

    #[test]
    fn test_version_mismatch_message() {
        let err = BenchError::VersionMismatch {
            candidates: "v1".into(),
            labels: "v2".into(),
        };
        assert_eq!(
            err.to_string(),
            "Version mismatch: candidates are for 'v1', labels are 'v2'"
        );
    }
}
