//! Chunk and embed a corpus with bounded concurrency.
//!
//! Each chunk becomes one embedder call. Calls run in a [`JoinSet`] gated by a
//! [`Semaphore`] of `max_in_flight` permits, and results are keyed by
//! `(document, chunk index)` so completion order never leaks into the output.
//! Both the gold builder and the live candidate runner sit on top of this.

use crate::chunker::{Chunk, Chunker};
use crate::document::{DocId, Document};
use crate::embedder::Embedder;
use crate::error::{BenchError, EmbedError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Shared flag used to abort a run between documents.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Why a document was left out without an embedding error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub doc_id: DocId,
    pub reason: String,
}

/// A document excluded because embedding or pooling failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedDocument {
    pub doc_id: DocId,
    pub error: String,
}

/// Outcome counts for one embedding run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_documents: usize,
    pub embedded_documents: usize,
    pub embedded_chunks: usize,
    pub skipped: Vec<SkippedDocument>,
    pub failed: Vec<FailedDocument>,
    /// Set when the embedder returned different vectors for the same input.
    pub embedder_nondeterministic: bool,
    pub elapsed_secs: f64,
}

impl RunSummary {
    /// Print summary to stdout.
    pub fn print_summary(&self, title: &str) {
        println!("\n========== {} ==========", title);
        println!("Documents:        {}", self.total_documents);
        println!("Embedded:         {}", self.embedded_documents);
        println!("Chunks embedded:  {}", self.embedded_chunks);
        println!("Skipped:          {}", self.skipped.len());
        for s in &self.skipped {
            println!("  - {}: {}", s.doc_id, s.reason);
        }
        println!("Failed:           {}", self.failed.len());
        for f in &self.failed {
            println!("  - {}: {}", f.doc_id, f.error);
        }
        if self.embedder_nondeterministic {
            println!("WARNING: embedder returned different vectors for identical input");
        }
        println!("Elapsed:          {:.1}s", self.elapsed_secs);
        println!("========================================\n");
    }
}

/// A document whose chunks were all embedded, vectors in chunk order.
#[derive(Debug, Clone)]
pub struct EmbeddedDocument {
    pub doc_id: DocId,
    pub chunks: Vec<Chunk>,
    pub vectors: Vec<Vec<f32>>,
}

/// Embedded documents keyed by id, plus the run summary.
#[derive(Debug, Clone)]
pub struct EmbeddedCorpus {
    pub documents: BTreeMap<DocId, EmbeddedDocument>,
    pub summary: RunSummary,
}

enum ChunkOutcome {
    Done(Vec<f32>),
    Failed(EmbedError),
    Cancelled,
}

/// Settings for [`embed_corpus`].
#[derive(Debug, Clone)]
pub struct EmbedRun {
    pub chunker: Chunker,
    pub model_id: String,
    pub max_in_flight: usize,
    pub determinism_probe: bool,
}

/// Chunk every document and embed every chunk.
///
/// Documents with no text are skipped; documents with any failed chunk are
/// reported as failed and left out. Returns `Cancelled` if `cancel` fires.
pub async fn embed_corpus(
    documents: &[Document],
    embedder: Arc<dyn Embedder>,
    run: &EmbedRun,
    cancel: &CancelHandle,
) -> Result<EmbeddedCorpus> {
    if run.max_in_flight == 0 {
        return Err(BenchError::InvalidConfig(
            "max_in_flight must be positive".to_string(),
        ));
    }

    let start = Instant::now();
    let mut summary = RunSummary {
        total_documents: documents.len(),
        ..Default::default()
    };

    let mut chunked: Vec<(DocId, Vec<Chunk>)> = Vec::with_capacity(documents.len());
    for doc in documents {
        let chunks = run.chunker.chunk_document(doc);
        if chunks.is_empty() {
            warn!(doc_id = %doc.doc_id, "document has no text, skipping");
            summary.skipped.push(SkippedDocument {
                doc_id: doc.doc_id.clone(),
                reason: "empty text".to_string(),
            });
            continue;
        }
        chunked.push((doc.doc_id.clone(), chunks));
    }
    // Lowest DocId fixes the corpus dimension and hosts the determinism check.
    chunked.sort_by(|a, b| a.0.cmp(&b.0));

    if run.determinism_probe {
        if let Some((_, chunks)) = chunked.first() {
            summary.embedder_nondeterministic =
                !probe_determinism(embedder.as_ref(), &chunks[0].text, &run.model_id).await;
        }
    }

    let semaphore = Arc::new(Semaphore::new(run.max_in_flight));
    let mut tasks = JoinSet::new();

    for (doc_idx, (_, chunks)) in chunked.iter().enumerate() {
        for chunk in chunks {
            let embedder = Arc::clone(&embedder);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let model_id = run.model_id.clone();
            let text = chunk.text.clone();
            let chunk_idx = chunk.index;

            tasks.spawn(async move {
                let outcome = match semaphore.acquire_owned().await {
                    Ok(_permit) if cancel.is_cancelled() => ChunkOutcome::Cancelled,
                    Ok(_permit) => match embedder.embed(&text, &model_id).await {
                        Ok(v) => ChunkOutcome::Done(v),
                        Err(e) => ChunkOutcome::Failed(e),
                    },
                    Err(_) => ChunkOutcome::Cancelled,
                };
                (doc_idx, chunk_idx, outcome)
            });
        }
    }

    let mut results: BTreeMap<(usize, usize), ChunkOutcome> = BTreeMap::new();
    while let Some(joined) = tasks.join_next().await {
        let (doc_idx, chunk_idx, outcome) = joined.map_err(|e| {
            BenchError::EmbeddingFailure(EmbedError::Api(format!("embedding task failed: {}", e)))
        })?;
        results.insert((doc_idx, chunk_idx), outcome);
    }

    let mut embedded = BTreeMap::new();
    let mut expected_dim: Option<usize> = None;

    for (doc_idx, (doc_id, chunks)) in chunked.into_iter().enumerate() {
        if cancel.is_cancelled() {
            info!(doc_id = %doc_id, "run cancelled");
            return Err(BenchError::Cancelled);
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        let mut failure = None;
        for chunk in &chunks {
            match results.remove(&(doc_idx, chunk.index)) {
                Some(ChunkOutcome::Done(v)) => vectors.push(v),
                Some(ChunkOutcome::Failed(e)) => {
                    failure = Some(format!("chunk {}: {}", chunk.index, e));
                    break;
                }
                Some(ChunkOutcome::Cancelled) | None => return Err(BenchError::Cancelled),
            }
        }

        if failure.is_none() {
            let dim = vectors[0].len();
            let expected = *expected_dim.get_or_insert(dim);
            if vectors.iter().any(|v| v.len() != expected) {
                failure = Some(format!(
                    "embedding dimension {} does not match corpus dimension {}",
                    dim, expected
                ));
            }
        }

        if let Some(error) = failure {
            warn!(doc_id = %doc_id, error = %error, "excluding document");
            summary.failed.push(FailedDocument { doc_id, error });
            continue;
        }

        debug!(doc_id = %doc_id, chunks = chunks.len(), "document embedded");
        summary.embedded_chunks += chunks.len();
        summary.embedded_documents += 1;
        embedded.insert(
            doc_id.clone(),
            EmbeddedDocument {
                doc_id,
                chunks,
                vectors,
            },
        );
    }

    summary.elapsed_secs = start.elapsed().as_secs_f64();
    info!(
        embedded = summary.embedded_documents,
        skipped = summary.skipped.len(),
        failed = summary.failed.len(),
        "corpus embedded"
    );

    Ok(EmbeddedCorpus {
        documents: embedded,
        summary,
    })
}

/// Embed `text` twice; `false` if the vectors differ.
async fn probe_determinism(embedder: &dyn Embedder, text: &str, model_id: &str) -> bool {
    let first = embedder.embed(text, model_id).await;
    let second = embedder.embed(text, model_id).await;
    match (first, second) {
        (Ok(a), Ok(b)) if a != b => {
            warn!(
                embedder = embedder.name(),
                model = model_id,
                "embedder is nondeterministic for identical input"
            );
            false
        }
        (Ok(_), Ok(_)) => true,
        (Err(e), _) | (_, Err(e)) => {
            debug!(error = %e, "determinism probe failed, not flagging");
            true
        }
    }
}
