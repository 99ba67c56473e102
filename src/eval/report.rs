//! Metric report produced by an evaluation run.

use crate::aggregate::AggregationMode;
use crate::document::DocId;
use crate::error::{BenchError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Why a candidate query was not scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipReason {
    /// The labels have no entry for the query document.
    MissingGoldEntry,
    /// The labels entry exists but lists no neighbors.
    EmptyGoldList,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingGoldEntry => f.write_str("missing gold entry"),
            Self::EmptyGoldList => f.write_str("empty gold list"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedQuery {
    pub doc_id: DocId,
    pub reason: SkipReason,
    /// Human-readable cause.
    pub detail: String,
}

/// Per-query detail row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryDetail {
    pub doc_id: DocId,
    /// Gold top-1 neighbor.
    pub gold_top1: DocId,
    /// First few aggregated candidate documents.
    pub retrieved: Vec<DocId>,
    /// 1-based rank of the gold top-1, if retrieved.
    pub rank: Option<usize>,
    pub top1: f64,
    pub top3: f64,
    pub reciprocal_rank: f64,
}

/// Aggregated evaluation results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricReport {
    pub generated_at: DateTime<Utc>,
    pub corpus_version: String,
    pub model_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    pub mode: AggregationMode,
    pub top1: f64,
    pub top3: f64,
    pub mrr: f64,
    pub n_evaluated: usize,
    /// Number of candidate queries.
    pub n_total: usize,
    /// `n_evaluated / n_total`, 0.0 when there are no queries.
    pub coverage: f64,
    pub details: Vec<QueryDetail>,
    pub skipped: Vec<SkippedQuery>,
    /// Gold entries no candidate query asked about.
    pub uncovered: Vec<DocId>,
}

impl MetricReport {
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| BenchError::io(path, e))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Print summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Similarity Benchmark ==========");
        println!("Corpus version: {}", self.corpus_version);
        println!("Model:          {}", self.model_id);
        if let Some(ref pipeline) = self.pipeline {
            println!("Pipeline:       {}", pipeline);
        }
        println!("Aggregation:    {}", self.mode);
        println!("------------------------------------------");
        println!("Top-1: {:.3}", self.top1);
        println!("Top-3: {:.3}", self.top3);
        println!("MRR:   {:.3}", self.mrr);
        println!("------------------------------------------");
        println!(
            "Evaluated: {}/{} ({:.1}% coverage)",
            self.n_evaluated,
            self.n_total,
            self.coverage * 100.0
        );
        if !self.skipped.is_empty() {
            println!("Skipped:   {}", self.skipped.len());
            for skip in &self.skipped {
                println!("  - {} ({}): {}", skip.doc_id, skip.reason, skip.detail);
            }
        }
        if !self.uncovered.is_empty() {
            println!("Uncovered gold entries: {}", self.uncovered.len());
        }
        println!("==========================================\n");
    }
}
