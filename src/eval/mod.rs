//! Evaluation of candidate pipelines against gold-standard labels.
//!
//! - Per-query rank metrics (Top-1, Top-3, reciprocal rank)
//! - A runner that aggregates candidate hits and averages the metrics
//! - A JSON-serializable report with skips and coverage

pub mod metrics;
pub mod report;
pub mod runner;

pub use metrics::{QueryScore, score_query};
pub use report::{MetricReport, QueryDetail, SkipReason, SkippedQuery};
pub use runner::EvaluationRunner;
