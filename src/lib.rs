//! SGW Bench - a gold-standard similarity benchmark for document retrieval.
//!
//! Builds a stable, versioned reference ranking of nearest neighbors for a
//! corpus of SGW documents, then scores arbitrary retrieval pipelines against
//! it with rank metrics (Top-1, Top-3, MRR).
//!
//! # Quick Start
//!
//! ```no_run
//! use sgw_bench::{
//!     candidate::CandidateSet,
//!     document::load_corpus,
//!     embedder::HashEmbedder,
//!     eval::EvaluationRunner,
//!     gold::{GoldConfig, GoldStandardBuilder},
//!     persistence::LabelStore,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Build and publish labels for a corpus
//!     let documents = load_corpus(Path::new("corpus"), "sgws")?;
//!     let builder = GoldStandardBuilder::new(
//!         Arc::new(HashEmbedder::default()),
//!         GoldConfig::new("2024-06", "hash-256"),
//!     )?;
//!     let outcome = builder.build(&documents).await?;
//!
//!     let store = LabelStore::new("labels");
//!     store.publish(&outcome.labels)?;
//!
//!     // Score a candidate pipeline against them
//!     let candidates = CandidateSet::load(Path::new("candidates.json"))?;
//!     let labels = store.load(&candidates.corpus_version)?;
//!     let report = EvaluationRunner::default().evaluate(&candidates, &labels)?;
//!     report.print_summary();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Chunker**: overlapping, character-bounded chunks
//! - **Embedder**: text to vector, fake or live, with retries
//! - **Pooler**: chunk vectors to one document vector
//! - **GoldStandardBuilder**: all-pairs top-k neighbors as frozen `Labels`
//! - **LabelStore / LabelArena**: versioned labels on disk and in memory
//! - **Aggregator**: chunk hits to document rankings
//! - **EvaluationRunner**: candidate rankings scored against labels

pub mod aggregate;
pub mod candidate;
pub mod chunker;
pub mod config;
pub mod document;
pub mod embedder;
pub mod error;
pub mod eval;
pub mod gold;
pub mod labels;
pub mod neighbors;
pub mod persistence;
pub mod pipeline;
pub mod pooling;

// Re-export commonly used types
pub use aggregate::{AggregationMode, aggregate};
pub use candidate::{CandidateHit, CandidateSet};
pub use chunker::{Chunk, ChunkConfig, Chunker};
pub use config::Config;
pub use document::{DocId, Document};
pub use embedder::Embedder;
pub use error::{BenchError, EmbedError, Result};
pub use eval::{EvaluationRunner, MetricReport};
pub use gold::{GoldConfig, GoldStandardBuilder};
pub use labels::{LabelArena, Labels};
pub use neighbors::{Neighbor, NeighborIndex, NeighborList};
pub use persistence::LabelStore;
pub use pooling::{MeanPooler, Pooler};
