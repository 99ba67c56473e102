//! Cosine similarity, ranked neighbor lists and the neighbor-index seam.
//!
//! Every ranking in the harness uses the same total order: score descending,
//! then `doc_id` ascending. Gold labels and candidate rankings therefore agree
//! on what a tie means.

use crate::document::{DocId, DocumentMetadata};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// One ranked neighbor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Neighbor {
    pub doc_id: DocId,
    pub score: f32,
}

impl Neighbor {
    pub fn new(doc_id: impl Into<DocId>, score: f32) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
        }
    }
}

/// Ordered neighbors of one document, best first.
pub type NeighborList = Vec<Neighbor>;

/// Score descending, ties by `doc_id` ascending.
pub fn rank_order(a: &Neighbor, b: &Neighbor) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.doc_id.cmp(&b.doc_id))
}

/// Sort into rank order and keep at most `k` entries.
pub fn rank_and_truncate(mut neighbors: Vec<Neighbor>, k: usize) -> NeighborList {
    neighbors.sort_by(rank_order);
    neighbors.truncate(k);
    neighbors
}

/// Compute cosine similarity between two vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Exact top-`k` neighbors for every document, self excluded.
///
/// With fewer than `k + 1` documents each list holds the `n - 1` others.
pub fn all_pairs_top_k(vectors: &BTreeMap<DocId, Vec<f32>>, k: usize) -> BTreeMap<DocId, NeighborList> {
    let ids: Vec<&DocId> = vectors.keys().collect();
    let rows: Vec<&Vec<f32>> = vectors.values().collect();
    let n = ids.len();

    let mut sims = vec![0.0f32; n * n];
    for i in 0..n {
        for j in (i + 1)..n {
            let s = cosine_similarity(rows[i], rows[j]);
            sims[i * n + j] = s;
            sims[j * n + i] = s;
        }
    }

    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let candidates = (0..n)
                .filter(|&j| j != i)
                .map(|j| Neighbor::new(ids[j].clone(), sims[i * n + j]))
                .collect();
            ((*id).clone(), rank_and_truncate(candidates, k))
        })
        .collect()
}

/// A vector index supporting top-k cosine queries.
#[async_trait]
pub trait NeighborIndex: Send + Sync {
    /// Insert or replace a document vector.
    async fn upsert(&mut self, doc_id: DocId, vector: Vec<f32>, metadata: DocumentMetadata) -> Result<()>;

    /// Top-`k` documents for `vector`, in rank order.
    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>>;

    /// Number of indexed documents.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exact brute-force index held in memory.
#[derive(Debug, Default)]
pub struct InMemoryIndex {
    entries: BTreeMap<DocId, (Vec<f32>, DocumentMetadata)>,
    dimension: Option<usize>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Metadata stored for a document.
    pub fn metadata(&self, doc_id: &DocId) -> Option<&DocumentMetadata> {
        self.entries.get(doc_id).map(|(_, m)| m)
    }
}

#[async_trait]
impl NeighborIndex for InMemoryIndex {
    async fn upsert(&mut self, doc_id: DocId, vector: Vec<f32>, metadata: DocumentMetadata) -> Result<()> {
        match self.dimension {
            Some(dim) if dim != vector.len() => {
                return Err(BenchError::InvalidConfig(format!(
                    "vector for '{}' has dimension {}, index expects {}",
                    doc_id,
                    vector.len(),
                    dim
                )));
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }
        self.entries.insert(doc_id, (vector, metadata));
        Ok(())
    }

    async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let scored = self
            .entries
            .iter()
            .map(|(id, (v, _))| Neighbor::new(id.clone(), cosine_similarity(vector, v)))
            .collect();
        Ok(rank_and_truncate(scored, k))
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}
