//! Deterministic in-memory embedder.
//!
//! Feature-hashes lowercase word tokens into a fixed number of buckets with a
//! sign bit, then normalizes. Texts that share words get similar vectors, the
//! same text always gets the same vector, and the model id salts the hash so
//! two "models" disagree.

use super::Embedder;
use crate::error::EmbedError;
use crate::pooling::l2_normalize;
use async_trait::async_trait;

/// Default vector dimension.
pub const DEFAULT_DIMENSIONS: usize = 256;

/// Hash-based embedder for tests and dry runs. Never calls out.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimensions: usize,
    max_input_chars: Option<usize>,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            max_input_chars: None,
        }
    }

    /// Reject inputs longer than `limit` characters, like a real service would.
    pub fn with_max_input_chars(mut self, limit: usize) -> Self {
        self.max_input_chars = Some(limit);
        self
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn bucket(&self, model_id: &str, token: &str) -> (usize, f32) {
        let h = token_hash(model_id, token);
        let idx = (h % self.dimensions as u64) as usize;
        let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
        (idx, sign)
    }

    /// Synchronous core, shared with tests.
    pub fn embed_sync(&self, text: &str, model_id: &str) -> Result<Vec<f32>, EmbedError> {
        if let Some(limit) = self.max_input_chars {
            let chars = text.chars().count();
            if chars > limit {
                return Err(EmbedError::InputTooLarge { chars });
            }
        }

        let mut v = vec![0.0f32; self.dimensions];
        for token in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let (idx, sign) = self.bucket(model_id, &token.to_lowercase());
            v[idx] += sign;
        }
        Ok(l2_normalize(&v))
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a. Fixed algorithm, so vectors stay identical across toolchains.
fn fnv1a(mut hash: u64, bytes: &[u8]) -> u64 {
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// FNV-1a over `model_id`, a separator and `token`, then a murmur3 finalizer
/// so the high (sign) bit is as well mixed as the low (bucket) bits.
fn token_hash(model_id: &str, token: &str) -> u64 {
    let mut h = fnv1a(FNV_OFFSET, model_id.as_bytes());
    h = fnv1a(h, &[0xff]);
    h = fnv1a(h, token.as_bytes());

    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str, model_id: &str) -> Result<Vec<f32>, EmbedError> {
        self.embed_sync(text, model_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::neighbors::cosine_similarity;

    #[test]
    fn test_same_text_same_vector() {
        let e = HashEmbedder::default();
        let a = e.embed_sync("alpha beta gamma", "m").unwrap();
        let b = e.embed_sync("alpha beta gamma", "m").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);
    }

    #[test]
    fn test_shared_words_are_closer() {
        let e = HashEmbedder::default();
        let base = e.embed_sync("permit application zoning review", "m").unwrap();
        let near = e.embed_sync("permit application zoning approval", "m").unwrap();
        let far = e.embed_sync("payroll invoice vendor ledger", "m").unwrap();
        assert!(cosine_similarity(&base, &near) > cosine_similarity(&base, &far));
    }

    #[test]
    fn test_model_id_salts_vectors() {
        let e = HashEmbedder::default();
        let a = e.embed_sync("alpha beta gamma delta", "model-a").unwrap();
        let b = e.embed_sync("alpha beta gamma delta", "model-b").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_fnv1a_reference_values() {
        assert_eq!(fnv1a(FNV_OFFSET, b""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(fnv1a(FNV_OFFSET, b"a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(fnv1a(FNV_OFFSET, b"foobar"), 0x8594_4171_f739_67e8);
    }

    #[test]
    fn test_token_hash_is_pinned() {
        // Published fake labels depend on these exact values.
        assert_eq!(token_hash("hash-8", "permit"), 0x7bbe_c2bf_edd5_98d8);
        let e = HashEmbedder::new(8);
        assert_eq!(e.bucket("hash-8", "permit"), (0, 1.0));
        assert_ne!(token_hash("ab", "c"), token_hash("a", "bc"));
    }

    #[test]
    fn test_input_limit() {
        let e = HashEmbedder::new(8).with_max_input_chars(3);
        assert_eq!(
            e.embed_sync("abcd", "m"),
            Err(EmbedError::InputTooLarge { chars: 4 })
        );
    }

    #[test]
    fn test_async_embed_matches_sync() {
        let e = HashEmbedder::new(16);
        let sync = e.embed_sync("one two", "m").unwrap();
        let from_async = tokio_test::block_on(e.embed("one two", "m")).unwrap();
        assert_eq!(sync, from_async);
    }
}
