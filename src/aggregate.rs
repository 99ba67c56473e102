//! Collapse chunk-level hits to document-level rankings.

use crate::candidate::CandidateHit;
use crate::document::DocId;
use crate::error::BenchError;
use crate::neighbors::{Neighbor, NeighborList, rank_and_truncate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// How scores of hits sharing a parent are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Best chunk wins.
    #[default]
    Max,
    /// Average over the parent's chunks.
    Mean,
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Max => f.write_str("max"),
            Self::Mean => f.write_str("mean"),
        }
    }
}

impl FromStr for AggregationMode {
    type Err = BenchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(Self::Max),
            "mean" => Ok(Self::Mean),
            other => Err(BenchError::InvalidConfig(format!(
                "unknown aggregation mode '{}' (expected max or mean)",
                other
            ))),
        }
    }
}

/// Aggregate hits by parent document, ranked with ties by `doc_id`.
pub fn aggregate(hits: &[CandidateHit], mode: AggregationMode) -> NeighborList {
    let mut grouped: BTreeMap<&DocId, Vec<f32>> = BTreeMap::new();
    for hit in hits {
        grouped.entry(hit.parent()).or_default().push(hit.score);
    }

    let docs = grouped
        .into_iter()
        .map(|(parent, mut scores)| {
            let score = match mode {
                AggregationMode::Max => scores.iter().copied().fold(f32::NEG_INFINITY, f32::max),
                AggregationMode::Mean => {
                    // Fixed summation order keeps the mean independent of hit order.
                    scores.sort_by(f32::total_cmp);
                    let sum: f64 = scores.iter().map(|s| *s as f64).sum();
                    (sum / scores.len() as f64) as f32
                }
            };
            Neighbor::new(parent.clone(), score)
        })
        .collect();

    rank_and_truncate(docs, usize::MAX)
}

/// Aggregate the hits retrieved for `query`, optionally dropping the query
/// document itself and keeping only the first `depth` documents.
pub fn aggregate_for_query(
    query: &DocId,
    hits: &[CandidateHit],
    mode: AggregationMode,
    exclude_self: bool,
    depth: Option<usize>,
) -> NeighborList {
    let mut ranked = aggregate(hits, mode);
    if exclude_self {
        ranked.retain(|n| &n.doc_id != query);
    }
    if let Some(depth) = depth {
        ranked.truncate(depth);
    }
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_hit(parent: &str, score: f32) -> CandidateHit {
        CandidateHit::chunk(format!("{parent}#0"), parent, score)
    }

    fn ids(list: &NeighborList) -> Vec<&str> {
        list.iter().map(|n| n.doc_id.as_str()).collect()
    }

    #[test]
    fn test_max_mode() {
        let hits = vec![chunk_hit("X", 0.7), chunk_hit("X", 0.9), chunk_hit("Y", 0.8)];
        let ranked = aggregate(&hits, AggregationMode::Max);
        assert_eq!(ids(&ranked), vec!["X", "Y"]);
        assert_eq!(ranked[0].score, 0.9);
        assert_eq!(ranked[1].score, 0.8);
    }

    #[test]
    fn test_mean_mode() {
        let hits = vec![chunk_hit("X", 0.7), chunk_hit("X", 0.9), chunk_hit("Y", 0.85)];
        let ranked = aggregate(&hits, AggregationMode::Mean);
        assert_eq!(ids(&ranked), vec!["Y", "X"]);
        assert!((ranked[1].score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_ties_break_by_doc_id() {
        let hits = vec![chunk_hit("b", 0.5), chunk_hit("a", 0.5), chunk_hit("c", 0.5)];
        assert_eq!(ids(&aggregate(&hits, AggregationMode::Max)), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_doc_level_hits_pass_through() {
        let hits = vec![CandidateHit::doc("B", 0.3), CandidateHit::doc("C", 0.6)];
        assert_eq!(ids(&aggregate(&hits, AggregationMode::Max)), vec!["C", "B"]);
    }

    #[test]
    fn test_aggregate_for_query_drops_self_and_truncates() {
        let hits = vec![
            chunk_hit("Q", 1.0),
            chunk_hit("A", 0.9),
            chunk_hit("B", 0.8),
            chunk_hit("C", 0.7),
        ];
        let ranked = aggregate_for_query(&DocId::new("Q"), &hits, AggregationMode::Max, true, Some(2));
        assert_eq!(ids(&ranked), vec!["A", "B"]);

        let kept = aggregate_for_query(&DocId::new("Q"), &hits, AggregationMode::Max, false, None);
        assert_eq!(ids(&kept), vec!["Q", "A", "B", "C"]);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("MAX".parse::<AggregationMode>().unwrap(), AggregationMode::Max);
        assert_eq!("mean".parse::<AggregationMode>().unwrap(), AggregationMode::Mean);
        assert!("median".parse::<AggregationMode>().is_err());
        assert_eq!(AggregationMode::Mean.to_string(), "mean");
    }
}
