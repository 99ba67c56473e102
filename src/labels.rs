//! Gold-standard labels: frozen, versioned neighbor rankings.
//!
//! A [`Labels`] value is never edited after it is built. A new embedding model
//! or corpus revision produces a new version, and the [`LabelArena`] keeps
//! every version side by side so callers pick which one to score against.

use crate::chunker::ChunkConfig;
use crate::document::DocId;
use crate::error::{BenchError, Result};
use crate::neighbors::{Neighbor, NeighborList, rank_and_truncate};
use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Neighbors recorded for one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct LabelEntry {
    pub neighbors: NeighborList,
}

/// A versioned gold-standard artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Encode, Decode)]
pub struct Labels {
    /// Corpus/benchmark version tag.
    pub version: String,
    /// Embedding model used to produce the rankings.
    pub model_id: String,
    /// Neighbors requested per document.
    pub k: usize,
    /// Chunking used before pooling.
    pub chunking: ChunkConfig,
    #[serde(rename = "labels")]
    entries: BTreeMap<DocId, LabelEntry>,
}

impl Labels {
    pub fn new(
        version: impl Into<String>,
        model_id: impl Into<String>,
        k: usize,
        chunking: ChunkConfig,
        neighbors: BTreeMap<DocId, NeighborList>,
    ) -> Self {
        let entries = neighbors
            .into_iter()
            .map(|(id, neighbors)| (id, LabelEntry { neighbors }))
            .collect();
        Self {
            version: version.into(),
            model_id: model_id.into(),
            k,
            chunking,
            entries,
        }
    }

    /// Neighbor list for a document.
    pub fn get(&self, doc_id: &DocId) -> Option<&NeighborList> {
        self.entries.get(doc_id).map(|e| &e.neighbors)
    }

    /// The gold top-1 neighbor; `None` if the document has no entry,
    /// `Some(None)` if its list is empty.
    pub fn top1(&self, doc_id: &DocId) -> Option<Option<&Neighbor>> {
        self.get(doc_id).map(|list| list.first())
    }

    pub fn contains(&self, doc_id: &DocId) -> bool {
        self.entries.contains_key(doc_id)
    }

    pub fn doc_ids(&self) -> impl Iterator<Item = &DocId> {
        self.entries.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DocId, &NeighborList)> {
        self.entries.iter().map(|(id, e)| (id, &e.neighbors))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Pretty JSON with a stable key order.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Import a `labels.json` written by the older scripts
    /// (`{doc_id: [{"id": .., "score": ..}]}`), freezing it under `version`.
    pub fn from_legacy_json(
        json: &str,
        version: impl Into<String>,
        model_id: impl Into<String>,
        chunking: ChunkConfig,
    ) -> Result<Self> {
        #[derive(Deserialize)]
        struct LegacyNeighbor {
            id: String,
            score: f32,
        }

        let raw: BTreeMap<DocId, Vec<LegacyNeighbor>> = serde_json::from_str(json)?;
        let k = raw.values().map(Vec::len).max().unwrap_or(0);

        let mut neighbors = BTreeMap::new();
        for (doc_id, list) in raw {
            let converted: Vec<Neighbor> = list
                .into_iter()
                .map(|n| Neighbor::new(DocId::new(n.id), n.score))
                .collect();
            if converted.iter().any(|n| n.doc_id == doc_id) {
                return Err(BenchError::Serialization(format!(
                    "legacy labels list self-reference for '{}'",
                    doc_id
                )));
            }
            neighbors.insert(doc_id, rank_and_truncate(converted, k));
        }

        Ok(Self::new(version, model_id, k, chunking, neighbors))
    }
}

/// In-memory collection of immutable labels, keyed by version.
#[derive(Debug, Default, Clone)]
pub struct LabelArena {
    versions: BTreeMap<String, Arc<Labels>>,
}

impl LabelArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a new version. Existing versions are never replaced.
    pub fn insert(&mut self, labels: Labels) -> Result<Arc<Labels>> {
        if self.versions.contains_key(&labels.version) {
            return Err(BenchError::VersionExists(labels.version));
        }
        let labels = Arc::new(labels);
        self.versions.insert(labels.version.clone(), Arc::clone(&labels));
        Ok(labels)
    }

    pub fn get(&self, version: &str) -> Result<Arc<Labels>> {
        self.versions
            .get(version)
            .cloned()
            .ok_or_else(|| BenchError::LabelsNotFound(version.to_string()))
    }

    /// Versions in ascending order.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.versions.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.versions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_labels(version: &str) -> Labels {
        let mut map = BTreeMap::new();
        map.insert(
            DocId::new("A"),
            vec![Neighbor::new("B", 0.9), Neighbor::new("C", 0.5)],
        );
        map.insert(
            DocId::new("B"),
            vec![Neighbor::new("A", 0.9), Neighbor::new("C", 0.4)],
        );
        map.insert(
            DocId::new("C"),
            vec![Neighbor::new("A", 0.5), Neighbor::new("B", 0.4)],
        );
        Labels::new(version, "hash-test", 2, ChunkConfig::default(), map)
    }

    #[test]
    fn test_json_round_trip() {
        let labels = sample_labels("v1");
        let json = labels.to_json().unwrap();
        let back = Labels::from_json(&json).unwrap();
        assert_eq!(back, labels);
        assert_eq!(back.to_json().unwrap(), json);
    }

    #[test]
    fn test_json_layout() {
        let json = sample_labels("v1").to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["version"], "v1");
        assert_eq!(value["model_id"], "hash-test");
        assert_eq!(value["labels"]["A"]["neighbors"][0]["doc_id"], "B");
        assert_eq!(value["chunking"]["max_chars"], 4000);
    }

    #[test]
    fn test_top1() {
        let labels = sample_labels("v1");
        let top = labels.top1(&DocId::new("A")).unwrap().unwrap();
        assert_eq!(top.doc_id, DocId::new("B"));
        assert!(labels.top1(&DocId::new("Z")).is_none());
    }

    #[test]
    fn test_legacy_import() {
        let legacy = r#"{
            "wf-1": [{"id": "wf-3", "score": 0.2}, {"id": "wf-2", "score": 0.8}],
            "wf-2": [{"id": "wf-1", "score": 0.8}]
        }"#;
        let labels =
            Labels::from_legacy_json(legacy, "legacy-1", "text-embedding-3-small", ChunkConfig::default())
                .unwrap();
        assert_eq!(labels.k, 2);
        assert_eq!(labels.version, "legacy-1");
        let first = &labels.get(&DocId::new("wf-1")).unwrap()[0];
        assert_eq!(first.doc_id, DocId::new("wf-2"));
    }

    #[test]
    fn test_legacy_import_rejects_self_reference() {
        let legacy = r#"{"a": [{"id": "a", "score": 1.0}]}"#;
        let result = Labels::from_legacy_json(legacy, "v", "m", ChunkConfig::default());
        assert!(matches!(result, Err(BenchError::Serialization(_))));
    }

    #[test]
    fn test_arena_never_replaces_a_version() {
        let mut arena = LabelArena::new();
        arena.insert(sample_labels("v1")).unwrap();
        arena.insert(sample_labels("v2")).unwrap();

        let result = arena.insert(sample_labels("v1"));
        assert!(matches!(result, Err(BenchError::VersionExists(v)) if v == "v1"));

        assert_eq!(arena.versions().collect::<Vec<_>>(), vec!["v1", "v2"]);
        assert_eq!(arena.get("v2").unwrap().version, "v2");
        assert!(matches!(arena.get("v3"), Err(BenchError::LabelsNotFound(_))));
    }
}
