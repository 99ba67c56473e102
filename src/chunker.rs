//! Fixed-size, overlapping text chunking.
//!
//! Chunks are bounded by a character budget. Chunk `i + 1` starts
//! `overlap_chars` before the end of chunk `i`, so consecutive chunks always
//! share exactly `overlap_chars` characters and together cover the whole text.

use crate::document::{DocId, Document};
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};

/// Default maximum characters per chunk.
pub const DEFAULT_MAX_CHARS: usize = 4000;

/// Default overlap between consecutive chunks.
pub const DEFAULT_OVERLAP_CHARS: usize = 500;

/// Configuration for text chunking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct ChunkConfig {
    /// Maximum characters per chunk.
    pub max_chars: usize,
    /// Overlap between consecutive chunks.
    pub overlap_chars: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_chars: DEFAULT_MAX_CHARS,
            overlap_chars: DEFAULT_OVERLAP_CHARS,
        }
    }
}

impl ChunkConfig {
    pub fn new(max_chars: usize, overlap_chars: usize) -> Self {
        Self {
            max_chars,
            overlap_chars,
        }
    }

    /// Both values must be positive and the overlap strictly smaller than the chunk.
    pub fn validate(&self) -> Result<()> {
        if self.max_chars == 0 || self.overlap_chars == 0 {
            return Err(BenchError::InvalidConfig(format!(
                "max_chars ({}) and overlap_chars ({}) must both be positive",
                self.max_chars, self.overlap_chars
            )));
        }
        if self.overlap_chars >= self.max_chars {
            return Err(BenchError::InvalidConfig(format!(
                "overlap_chars ({}) must be smaller than max_chars ({})",
                self.overlap_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// A chunk of a document's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Owning document.
    pub doc_id: DocId,
    /// Position in the document's chunk sequence.
    pub index: usize,
    /// Start character offset (inclusive).
    pub start_offset: usize,
    /// End character offset (exclusive).
    pub end_offset: usize,
    /// Chunk text.
    pub text: String,
}

impl Chunk {
    /// Number of characters in the chunk.
    pub fn char_len(&self) -> usize {
        self.end_offset - self.start_offset
    }
}

/// Splits text into overlapping chunks.
#[derive(Debug, Clone, Copy)]
pub struct Chunker {
    config: ChunkConfig,
}

impl Chunker {
    /// Create a chunker, rejecting invalid parameters.
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    /// Lazily chunk `text`. The iterator is cheap to clone, which restarts it.
    pub fn chunks<'a>(&self, doc_id: &'a DocId, text: &'a str) -> Chunks<'a> {
        let mut boundaries: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
        boundaries.push(text.len());
        Chunks {
            doc_id,
            text,
            boundaries,
            max_chars: self.config.max_chars,
            overlap_chars: self.config.overlap_chars,
            start: 0,
            index: 0,
            done: text.is_empty(),
        }
    }

    /// Chunk a whole document eagerly.
    pub fn chunk_document(&self, document: &Document) -> Vec<Chunk> {
        self.chunks(&document.doc_id, &document.text).collect()
    }
}

/// Iterator over the chunks of one text.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    doc_id: &'a DocId,
    text: &'a str,
    /// Byte offset of every char, plus the text length.
    boundaries: Vec<usize>,
    max_chars: usize,
    overlap_chars: usize,
    start: usize,
    index: usize,
    done: bool,
}

impl Chunks<'_> {
    fn char_len(&self) -> usize {
        self.boundaries.len() - 1
    }
}

impl Iterator for Chunks<'_> {
    type Item = Chunk;

    fn next(&mut self) -> Option<Chunk> {
        if self.done {
            return None;
        }

        let len = self.char_len();
        let start = self.start;
        let end = (start + self.max_chars).min(len);

        let chunk = Chunk {
            doc_id: self.doc_id.clone(),
            index: self.index,
            start_offset: start,
            end_offset: end,
            text: self.text[self.boundaries[start]..self.boundaries[end]].to_string(),
        };

        if end >= len {
            self.done = true;
        } else {
            // overlap < max_chars, so this always moves forward
            self.start = end - self.overlap_chars;
        }
        self.index += 1;

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn chunker(max: usize, overlap: usize) -> Chunker {
        Chunker::new(ChunkConfig::new(max, overlap)).unwrap()
    }

    #[test]
    fn test_chunk_config_default() {
        let config = ChunkConfig::default();
        assert_eq!(config.max_chars, 4000);
        assert_eq!(config.overlap_chars, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs_rejected() {
        for (max, overlap) in [(10, 10), (10, 11), (0, 0), (10, 0), (0, 5)] {
            let result = Chunker::new(ChunkConfig::new(max, overlap));
            assert!(
                matches!(result, Err(BenchError::InvalidConfig(_))),
                "({max}, {overlap}) should be rejected"
            );
        }
    }

    #[test]
    fn test_short_text_is_single_chunk() {
        let id = DocId::new("a");
        let chunks: Vec<_> = chunker(20, 5).chunks(&id, "short text").collect();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "short text");
        assert_eq!((chunks[0].start_offset, chunks[0].end_offset), (0, 10));
    }

    #[test]
    fn test_exact_length_is_single_chunk() {
        let id = DocId::new("a");
        let chunks: Vec<_> = chunker(4, 1).chunks(&id, "abcd").collect();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_empty_text_has_no_chunks() {
        let id = DocId::new("a");
        assert_eq!(chunker(4, 1).chunks(&id, "").count(), 0);
    }

    #[test]
    fn test_overlapping_offsets() {
        let id = DocId::new("a");
        let chunks: Vec<_> = chunker(4, 1).chunks(&id, "abcdefghij").collect();
        let spans: Vec<_> = chunks.iter().map(|c| (c.start_offset, c.end_offset)).collect();
        assert_eq!(spans, vec![(0, 4), (3, 7), (6, 10)]);
        assert_eq!(chunks[1].text, "defg");
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn test_last_chunk_may_be_short() {
        let id = DocId::new("a");
        let chunks: Vec<_> = chunker(5, 2).chunks(&id, "abcdefgh").collect();
        let spans: Vec<_> = chunks.iter().map(|c| (c.start_offset, c.end_offset)).collect();
        assert_eq!(spans, vec![(0, 5), (3, 8)]);
    }

    #[test]
    fn test_multibyte_text_is_split_on_chars() {
        let id = DocId::new("a");
        let chunks: Vec<_> = chunker(3, 1).chunks(&id, "ééééé").collect();
        assert_eq!(chunks[0].text, "ééé");
        assert_eq!(chunks[1].text, "ééé");
        assert_eq!(chunks[1].start_offset, 2);
    }

    #[test]
    fn test_iterator_restarts_on_clone() {
        let id = DocId::new("a");
        let iter = chunker(4, 1).chunks(&id, "abcdefghij");
        let first: Vec<_> = iter.clone().collect();
        let second: Vec<_> = iter.collect();
        assert_eq!(first, second);
    }

    proptest! {
        #[test]
        fn prop_chunks_cover_text_with_exact_overlap(
            text in "[a-zé ]{0,300}",
            max in 2usize..64,
            overlap_seed in 1usize..64,
        ) {
            let overlap = 1 + overlap_seed % (max - 1);
            let id = DocId::new("p");
            let chunks: Vec<_> = chunker(max, overlap).chunks(&id, &text).collect();
            let len = text.chars().count();

            if len == 0 {
                prop_assert!(chunks.is_empty());
            } else {
                prop_assert_eq!(chunks[0].start_offset, 0);
                prop_assert_eq!(chunks.last().unwrap().end_offset, len);
                for chunk in &chunks {
                    prop_assert!(chunk.char_len() <= max);
                    prop_assert!(chunk.char_len() > 0);
                    let expected: String = text
                        .chars()
                        .skip(chunk.start_offset)
                        .take(chunk.char_len())
                        .collect();
                    prop_assert_eq!(&chunk.text, &expected);
                }
                for pair in chunks.windows(2) {
                    prop_assert_eq!(pair[1].start_offset, pair[0].end_offset - overlap);
                }
            }
        }
    }
}
