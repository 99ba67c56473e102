//! Scores a candidate set against versioned labels.

use super::metrics::{mean, score_query};
use super::report::{MetricReport, QueryDetail, SkipReason, SkippedQuery};
use crate::aggregate::{AggregationMode, aggregate_for_query};
use crate::candidate::CandidateSet;
use crate::error::{BenchError, Result};
use crate::labels::Labels;
use chrono::Utc;
use tracing::{info, warn};

/// Candidate documents kept in each detail row.
const DETAIL_DEPTH: usize = 5;

/// Evaluation settings.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationRunner {
    pub mode: AggregationMode,
    /// Drop the query document from its own candidates.
    pub exclude_self: bool,
    /// Only consider the first `depth` aggregated documents.
    pub depth: Option<usize>,
}

impl Default for EvaluationRunner {
    fn default() -> Self {
        Self {
            mode: AggregationMode::Max,
            exclude_self: true,
            depth: None,
        }
    }
}

impl EvaluationRunner {
    pub fn new(mode: AggregationMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Score every candidate query that has a gold entry.
    pub fn evaluate(&self, candidates: &CandidateSet, labels: &Labels) -> Result<MetricReport> {
        if candidates.corpus_version != labels.version {
            return Err(BenchError::VersionMismatch {
                candidates: candidates.corpus_version.clone(),
                labels: labels.version.clone(),
            });
        }

        let mut details = Vec::new();
        let mut skipped = Vec::new();

        for (query, hits) in &candidates.queries {
            let gold_top1 = match labels.top1(query) {
                None => {
                    let err = BenchError::MissingGoldEntry(query.to_string());
                    warn!(doc_id = %query, error = %err, "skipping query");
                    skipped.push(SkippedQuery {
                        doc_id: query.clone(),
                        reason: SkipReason::MissingGoldEntry,
                        detail: err.to_string(),
                    });
                    continue;
                }
                Some(None) => {
                    warn!(doc_id = %query, "empty gold list, skipping query");
                    skipped.push(SkippedQuery {
                        doc_id: query.clone(),
                        reason: SkipReason::EmptyGoldList,
                        detail: format!("gold list for '{}' is empty", query),
                    });
                    continue;
                }
                Some(Some(top)) => &top.doc_id,
            };

            let ranked = aggregate_for_query(query, hits, self.mode, self.exclude_self, self.depth);
            let score = score_query(gold_top1, &ranked);
            details.push(QueryDetail {
                doc_id: query.clone(),
                gold_top1: gold_top1.clone(),
                retrieved: ranked.iter().take(DETAIL_DEPTH).map(|n| n.doc_id.clone()).collect(),
                rank: score.rank,
                top1: score.top1,
                top3: score.top3,
                reciprocal_rank: score.reciprocal_rank,
            });
        }

        let uncovered = labels
            .doc_ids()
            .filter(|id| !candidates.queries.contains_key(*id))
            .cloned()
            .collect();

        let n_total = candidates.len();
        let n_evaluated = details.len();
        let coverage = if n_total == 0 {
            0.0
        } else {
            n_evaluated as f64 / n_total as f64
        };

        let report = MetricReport {
            generated_at: Utc::now(),
            corpus_version: labels.version.clone(),
            model_id: labels.model_id.clone(),
            pipeline: candidates.pipeline.clone(),
            mode: self.mode,
            top1: mean(details.iter().map(|d| d.top1)),
            top3: mean(details.iter().map(|d| d.top3)),
            mrr: mean(details.iter().map(|d| d.reciprocal_rank)),
            n_evaluated,
            n_total,
            coverage,
            details,
            skipped,
            uncovered,
        };

        info!(
            evaluated = report.n_evaluated,
            skipped = report.skipped.len(),
            coverage = report.coverage,
            "evaluation finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::CandidateHit;
    use crate::chunker::ChunkConfig;
    use crate::document::DocId;
    use crate::neighbors::Neighbor;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn labels(version: &str) -> Labels {
        let mut map = BTreeMap::new();
        map.insert(DocId::new("A"), vec![Neighbor::new("B", 0.9), Neighbor::new("C", 0.5)]);
        map.insert(DocId::new("B"), vec![Neighbor::new("A", 0.9), Neighbor::new("C", 0.4)]);
        map.insert(DocId::new("C"), vec![Neighbor::new("A", 0.5), Neighbor::new("B", 0.4)]);
        map.insert(DocId::new("E"), vec![]);
        Labels::new(version, "hash-test", 2, ChunkConfig::default(), map)
    }

    #[test]
    fn test_gold_at_rank_two() {
        let mut set = CandidateSet::new("v1");
        set.insert("A", vec![CandidateHit::doc("C", 0.8), CandidateHit::doc("B", 0.7)]);

        let report = EvaluationRunner::default().evaluate(&set, &labels("v1")).unwrap();
        assert_eq!(report.n_evaluated, 1);
        assert_eq!(report.top1, 0.0);
        assert_eq!(report.top3, 1.0);
        assert_eq!(report.mrr, 0.5);
        assert_eq!(report.details[0].rank, Some(2));
    }

    #[test]
    fn test_perfect_candidates() {
        let mut set = CandidateSet::new("v1");
        set.insert("A", vec![CandidateHit::doc("B", 0.9), CandidateHit::doc("C", 0.5)]);
        set.insert("B", vec![CandidateHit::doc("A", 0.9)]);
        set.insert("C", vec![CandidateHit::doc("A", 0.5)]);

        let report = EvaluationRunner::default().evaluate(&set, &labels("v1")).unwrap();
        assert_eq!((report.top1, report.top3, report.mrr), (1.0, 1.0, 1.0));
        assert_eq!(report.coverage, 1.0);
        assert_eq!(report.uncovered, vec![DocId::new("E")]);
    }

    #[test]
    fn test_absent_gold_scores_zero() {
        let mut set = CandidateSet::new("v1");
        set.insert("A", vec![CandidateHit::doc("C", 0.9), CandidateHit::doc("D", 0.8)]);

        let report = EvaluationRunner::default().evaluate(&set, &labels("v1")).unwrap();
        assert_eq!(report.mrr, 0.0);
        assert_eq!(report.details[0].rank, None);
    }

    #[test]
    fn test_skips_and_coverage() {
        let mut set = CandidateSet::new("v1");
        set.insert("A", vec![CandidateHit::doc("B", 0.9)]);
        set.insert("Z", vec![CandidateHit::doc("A", 0.9)]);
        set.insert("E", vec![CandidateHit::doc("A", 0.9)]);

        let report = EvaluationRunner::default().evaluate(&set, &labels("v1")).unwrap();
        assert_eq!(report.n_total, 3);
        assert_eq!(report.n_evaluated, 1);
        assert!((report.coverage - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(report.top1, 1.0);

        let reasons: Vec<_> = report.skipped.iter().map(|s| (s.doc_id.as_str(), s.reason)).collect();
        assert_eq!(
            reasons,
            vec![("E", SkipReason::EmptyGoldList), ("Z", SkipReason::MissingGoldEntry)]
        );
        assert_eq!(report.skipped[1].detail, "No gold labels entry for document 'Z'");
    }

    #[test]
    fn test_version_mismatch_is_fatal() {
        let set = CandidateSet::new("v2");
        let result = EvaluationRunner::default().evaluate(&set, &labels("v1"));
        assert!(matches!(result, Err(BenchError::VersionMismatch { .. })));
    }

    #[test]
    fn test_self_hits_and_chunk_aggregation() {
        let mut set = CandidateSet::new("v1");
        set.insert(
            "A",
            vec![
                CandidateHit::chunk("A#0", "A", 1.0),
                CandidateHit::chunk("C#0", "C", 0.6),
                CandidateHit::chunk("B#1", "B", 0.8),
                CandidateHit::chunk("B#0", "B", 0.3),
            ],
        );

        let max = EvaluationRunner::default().evaluate(&set, &labels("v1")).unwrap();
        assert_eq!(max.top1, 1.0);

        let mean = EvaluationRunner::new(AggregationMode::Mean)
            .evaluate(&set, &labels("v1"))
            .unwrap();
        assert_eq!(mean.details[0].rank, Some(2));

        let with_self = EvaluationRunner {
            exclude_self: false,
            ..EvaluationRunner::default()
        }
        .evaluate(&set, &labels("v1"))
        .unwrap();
        assert_eq!(with_self.details[0].rank, Some(2));
    }

    #[test]
    fn test_empty_candidates() {
        let report = EvaluationRunner::default()
            .evaluate(&CandidateSet::new("v1"), &labels("v1"))
            .unwrap();
        assert_eq!(report.coverage, 0.0);
        assert_eq!(report.mrr, 0.0);
        assert_eq!(report.uncovered.len(), 4);
    }

    #[test]
    fn test_report_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("report.json");
        let mut set = CandidateSet::new("v1").with_pipeline("baseline");
        set.insert("A", vec![CandidateHit::doc("B", 0.9)]);

        let report = EvaluationRunner::default().evaluate(&set, &labels("v1")).unwrap();
        report.save(&path).unwrap();
        let loaded = MetricReport::load(&path).unwrap();
        assert_eq!(loaded.pipeline.as_deref(), Some("baseline"));
        assert_eq!(loaded.details, report.details);
    }
}
