//! Rank metrics for a single query.

use crate::document::DocId;
use crate::neighbors::Neighbor;
use serde::{Deserialize, Serialize};

/// Scores of one query against its gold top-1 neighbor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryScore {
    /// 1-based rank of the gold top-1 neighbor, if retrieved.
    pub rank: Option<usize>,
    pub top1: f64,
    pub top3: f64,
    pub reciprocal_rank: f64,
}

/// 1-based position of the first occurrence of `target`.
pub fn rank_of(target: &DocId, ranked: &[Neighbor]) -> Option<usize> {
    ranked.iter().position(|n| &n.doc_id == target).map(|i| i + 1)
}

/// Score a ranked candidate list against the gold top-1 document.
pub fn score_query(gold_top1: &DocId, ranked: &[Neighbor]) -> QueryScore {
    let rank = rank_of(gold_top1, ranked);
    let hit_within = |depth: usize| match rank {
        Some(r) if r <= depth => 1.0,
        _ => 0.0,
    };
    QueryScore {
        rank,
        top1: hit_within(1),
        top3: hit_within(3),
        reciprocal_rank: rank.map_or(0.0, |r| 1.0 / r as f64),
    }
}

/// Arithmetic mean; 0.0 for an empty input.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 { 0.0 } else { sum / count as f64 }
}
