//! Pooling chunk vectors into one document vector.
//!
//! Mean pooling is lossy on long documents, so the strategy sits behind the
//! [`Pooler`] trait. [`MeanPooler`] is the baseline: a weighted elementwise
//! mean followed by L2 normalization.

use crate::chunker::Chunk;
use crate::error::{BenchError, Result};
use std::cmp::Ordering;

/// Combines chunk-level vectors into a single document-level vector.
pub trait Pooler: Send + Sync {
    /// Short name recorded in logs.
    fn name(&self) -> &'static str;

    /// Pool `vectors`, weighting each by the matching entry of `weights`
    /// (equal weights when `None`).
    fn pool(&self, vectors: &[Vec<f32>], weights: Option<&[f32]>) -> Result<Vec<f32>>;

    /// Pool the vectors of `chunks`, weighting each chunk by its character length.
    fn pool_chunks(&self, chunks: &[Chunk], vectors: &[Vec<f32>]) -> Result<Vec<f32>> {
        let weights: Vec<f32> = chunks.iter().map(|c| c.char_len() as f32).collect();
        self.pool(vectors, Some(&weights))
    }
}

/// Weighted mean, then L2 normalize.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeanPooler;

impl Pooler for MeanPooler {
    fn name(&self) -> &'static str {
        "mean"
    }

    fn pool(&self, vectors: &[Vec<f32>], weights: Option<&[f32]>) -> Result<Vec<f32>> {
        if vectors.is_empty() {
            return Err(BenchError::EmptyInput("no vectors to pool".to_string()));
        }

        let dim = vectors[0].len();
        if dim == 0 {
            return Err(BenchError::EmptyInput("zero-dimensional vectors".to_string()));
        }
        if let Some(bad) = vectors.iter().position(|v| v.len() != dim) {
            return Err(BenchError::InvalidConfig(format!(
                "vector {} has dimension {}, expected {}",
                bad,
                vectors[bad].len(),
                dim
            )));
        }

        if let Some(bad) = vectors.iter().position(|v| v.iter().any(|x| !x.is_finite())) {
            return Err(BenchError::InvalidConfig(format!(
                "vector {} has a non-finite component",
                bad
            )));
        }

        let weights: Vec<f32> = match weights {
            Some(w) if w.len() != vectors.len() => {
                return Err(BenchError::InvalidConfig(format!(
                    "{} weights for {} vectors",
                    w.len(),
                    vectors.len()
                )));
            }
            Some(w) => w.to_vec(),
            None => vec![1.0; vectors.len()],
        };
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(BenchError::InvalidConfig(
                "weights must be finite and non-negative".to_string(),
            ));
        }

        // Accumulate in a canonical order so the result is identical for any
        // permutation of the inputs.
        let mut order: Vec<usize> = (0..vectors.len()).collect();
        order.sort_by(|&a, &b| {
            weights[a]
                .total_cmp(&weights[b])
                .then_with(|| compare_vectors(&vectors[a], &vectors[b]))
        });

        let mut total_weight = 0.0f64;
        let mut acc = vec![0.0f64; dim];
        for idx in order {
            let w = weights[idx] as f64;
            total_weight += w;
            for (slot, x) in acc.iter_mut().zip(&vectors[idx]) {
                *slot += w * (*x as f64);
            }
        }

        if total_weight <= 0.0 {
            return Err(BenchError::InvalidConfig(
                "total pooling weight must be positive".to_string(),
            ));
        }

        for slot in acc.iter_mut() {
            *slot /= total_weight;
        }

        Ok(l2_normalize_f64(&acc))
    }
}

fn compare_vectors(a: &[f32], b: &[f32]) -> Ordering {
    a.iter()
        .zip(b)
        .map(|(x, y)| x.total_cmp(y))
        .find(|o| o.is_ne())
        .unwrap_or(Ordering::Equal)
}

fn l2_normalize_f64(v: &[f64]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm == 0.0 {
        return v.iter().map(|x| *x as f32).collect();
    }
    v.iter().map(|x| (x / norm) as f32).collect()
}

/// L2-normalize a vector; zero vectors are returned unchanged.
pub fn l2_normalize(v: &[f32]) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v.to_vec();
    }
    v.iter().map(|x| x / norm).collect()
}
