//! Gold-standard label builder.
//!
//! chunk → embed → pool for every document, then exact all-pairs cosine top-k
//! with self excluded. Identical inputs and a deterministic embedder produce
//! byte-identical labels: vectors are reassembled in chunk order, pooling is
//! order independent and rankings use a total order.

use crate::chunker::{ChunkConfig, Chunker};
use crate::document::{Document, ensure_unique_ids};
use crate::embedder::Embedder;
use crate::error::{BenchError, Result};
use crate::labels::Labels;
use crate::neighbors::all_pairs_top_k;
use crate::pipeline::{CancelHandle, EmbedRun, FailedDocument, RunSummary, embed_corpus};
use crate::pooling::{MeanPooler, Pooler};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Configuration for a gold-standard build.
#[derive(Debug, Clone)]
pub struct GoldConfig {
    /// Version tag for the produced labels.
    pub version: String,
    /// Embedding model identifier.
    pub model_id: String,
    /// Neighbors per document.
    pub top_k: usize,
    /// Chunking applied before embedding.
    pub chunking: ChunkConfig,
    /// Maximum concurrent embedder calls.
    pub max_in_flight: usize,
    /// Embed one chunk twice and flag differing results.
    pub determinism_probe: bool,
}

impl GoldConfig {
    pub fn new(version: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            model_id: model_id.into(),
            top_k: 3,
            chunking: ChunkConfig::default(),
            max_in_flight: 4,
            determinism_probe: true,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.top_k == 0 {
            return Err(BenchError::InvalidConfig("top_k must be positive".to_string()));
        }
        if self.max_in_flight == 0 {
            return Err(BenchError::InvalidConfig(
                "max_in_flight must be positive".to_string(),
            ));
        }
        if self.version.trim().is_empty() {
            return Err(BenchError::InvalidConfig("version must not be empty".to_string()));
        }
        if self.model_id.trim().is_empty() {
            return Err(BenchError::InvalidConfig("model_id must not be empty".to_string()));
        }
        Ok(())
    }
}

/// Counts and per-document outcomes of a gold build.
pub type BuildSummary = RunSummary;

/// Labels plus what happened while building them.
#[derive(Debug, Clone)]
pub struct GoldOutcome {
    pub labels: Labels,
    pub summary: BuildSummary,
}

/// Builds [`Labels`] for a corpus.
pub struct GoldStandardBuilder {
    embedder: Arc<dyn Embedder>,
    pooler: Arc<dyn Pooler>,
    config: GoldConfig,
    cancel: CancelHandle,
}

impl GoldStandardBuilder {
    /// Create a builder with mean pooling.
    pub fn new(embedder: Arc<dyn Embedder>, config: GoldConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            embedder,
            pooler: Arc::new(MeanPooler),
            config,
            cancel: CancelHandle::new(),
        })
    }

    /// Swap the pooling strategy.
    pub fn with_pooler(mut self, pooler: Arc<dyn Pooler>) -> Self {
        self.pooler = pooler;
        self
    }

    /// Handle that aborts the build between documents.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &GoldConfig {
        &self.config
    }

    /// Build labels for `documents`.
    pub async fn build(&self, documents: &[Document]) -> Result<GoldOutcome> {
        ensure_unique_ids(documents)?;
        let start = Instant::now();

        info!(
            version = %self.config.version,
            model = %self.config.model_id,
            documents = documents.len(),
            k = self.config.top_k,
            pooler = self.pooler.name(),
            "building gold standard"
        );

        let run = EmbedRun {
            chunker: Chunker::new(self.config.chunking)?,
            model_id: self.config.model_id.clone(),
            max_in_flight: self.config.max_in_flight,
            determinism_probe: self.config.determinism_probe,
        };
        let embedded = embed_corpus(documents, Arc::clone(&self.embedder), &run, &self.cancel).await?;
        let mut summary = embedded.summary;

        let mut vectors = BTreeMap::new();
        for (doc_id, doc) in embedded.documents {
            match self.pooler.pool_chunks(&doc.chunks, &doc.vectors) {
                Ok(v) => {
                    vectors.insert(doc_id, v);
                }
                Err(e) => {
                    warn!(doc_id = %doc_id, error = %e, "pooling failed, excluding document");
                    summary.embedded_documents -= 1;
                    summary.embedded_chunks -= doc.chunks.len();
                    summary.failed.push(FailedDocument {
                        doc_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        if self.cancel.is_cancelled() {
            return Err(BenchError::Cancelled);
        }

        if vectors.len() <= self.config.top_k {
            warn!(
                documents = vectors.len(),
                k = self.config.top_k,
                "corpus smaller than k + 1, neighbor lists will be truncated"
            );
        }

        let neighbors = all_pairs_top_k(&vectors, self.config.top_k);
        let labels = Labels::new(
            self.config.version.clone(),
            self.config.model_id.clone(),
            self.config.top_k,
            self.config.chunking,
            neighbors,
        );

        summary.elapsed_secs = start.elapsed().as_secs_f64();
        info!(labelled = labels.len(), "gold standard built");

        Ok(GoldOutcome { labels, summary })
    }
}
