//! Candidate result sets: what a pipeline under test retrieved per query.
//!
//! Candidates are ephemeral. They come from a candidate file, from replayed
//! benchmark records written by the older query scripts, or from running a
//! pipeline live against a [`NeighborIndex`].

use crate::document::{DocId, Document, DocumentMetadata};
use crate::embedder::Embedder;
use crate::error::{BenchError, Result};
use crate::neighbors::NeighborIndex;
use crate::pipeline::{CancelHandle, EmbedRun, FailedDocument, RunSummary, embed_corpus};
use crate::pooling::{MeanPooler, Pooler};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Serialized shape of a hit; at least one id must be present.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawHit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    doc_id: Option<DocId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent_id: Option<DocId>,
    score: f32,
}

/// One retrieved hit. Chunk- or field-level hits carry the owning document
/// in `parent_id`; document-level hits only need `doc_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawHit", into = "RawHit")]
pub struct CandidateHit {
    doc_id: Option<DocId>,
    parent: DocId,
    has_parent: bool,
    pub score: f32,
}

impl TryFrom<RawHit> for CandidateHit {
    type Error = String;

    fn try_from(raw: RawHit) -> std::result::Result<Self, Self::Error> {
        match (raw.doc_id, raw.parent_id) {
            (doc_id, Some(parent)) => Ok(Self {
                doc_id,
                parent,
                has_parent: true,
                score: raw.score,
            }),
            (Some(doc_id), None) => Ok(Self::doc(doc_id, raw.score)),
            (None, None) => Err("hit needs a doc_id or parent_id".to_string()),
        }
    }
}

impl From<CandidateHit> for RawHit {
    fn from(hit: CandidateHit) -> Self {
        if hit.has_parent {
            RawHit {
                doc_id: hit.doc_id,
                parent_id: Some(hit.parent),
                score: hit.score,
            }
        } else {
            RawHit {
                doc_id: Some(hit.parent),
                parent_id: None,
                score: hit.score,
            }
        }
    }
}

impl CandidateHit {
    /// A document-level hit.
    pub fn doc(doc_id: impl Into<DocId>, score: f32) -> Self {
        let id = doc_id.into();
        Self {
            doc_id: Some(id.clone()),
            parent: id,
            has_parent: false,
            score,
        }
    }

    /// A chunk-level hit belonging to `parent_id`.
    pub fn chunk(entry_id: impl Into<DocId>, parent_id: impl Into<DocId>, score: f32) -> Self {
        Self {
            doc_id: Some(entry_id.into()),
            parent: parent_id.into(),
            has_parent: true,
            score,
        }
    }

    /// The document this hit counts for.
    pub fn parent(&self) -> &DocId {
        &self.parent
    }

    /// The retrieved entry's own id, if any.
    pub fn entry_id(&self) -> Option<&DocId> {
        self.doc_id.as_ref()
    }
}

/// Hits per query document for one evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateSet {
    /// Corpus version the candidates were produced against.
    pub corpus_version: String,
    /// Name of the pipeline under test.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<String>,
    /// Retrieved hits in retrieval order, keyed by query document.
    pub queries: BTreeMap<DocId, Vec<CandidateHit>>,
}

impl CandidateSet {
    pub fn new(corpus_version: impl Into<String>) -> Self {
        Self {
            corpus_version: corpus_version.into(),
            pipeline: None,
            queries: BTreeMap::new(),
        }
    }

    pub fn with_pipeline(mut self, name: impl Into<String>) -> Self {
        self.pipeline = Some(name.into());
        self
    }

    /// Record the hits for one query, replacing earlier ones.
    pub fn insert(&mut self, query: impl Into<DocId>, hits: Vec<CandidateHit>) {
        self.queries.insert(query.into(), hits);
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    /// Load from a JSON candidate file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        serde_json::from_str(&content).map_err(|e| {
            BenchError::Serialization(format!("candidate file '{}': {}", path.display(), e))
        })
    }

    /// Save as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).map_err(|e| BenchError::io(path, e))
    }

    /// Fold replayed benchmark records into a candidate set. The query document
    /// is the stem of each record's `query_file`; a later record for the same
    /// query replaces an earlier one.
    pub fn from_benchmark_records(
        corpus_version: impl Into<String>,
        records: impl IntoIterator<Item = BenchmarkRecord>,
    ) -> Result<Self> {
        let mut set = Self::new(corpus_version);
        for record in records {
            let query = query_doc_id(&record.query_file)
                .ok_or_else(|| {
                    BenchError::Serialization(format!(
                        "benchmark record has no usable query_file: '{}'",
                        record.query_file
                    ))
                })?
                .to_string();

            let hits = record
                .results
                .into_iter()
                .map(|hit| match (hit.id, hit.parent_id) {
                    (Some(id), Some(parent)) => Ok(CandidateHit::chunk(id, parent, hit.score)),
                    (None, Some(parent)) => Ok(CandidateHit::doc(parent, hit.score)),
                    (Some(id), None) => Ok(CandidateHit::doc(id, hit.score)),
                    (None, None) => Err(BenchError::Serialization(format!(
                        "hit without id in record for '{}'",
                        query
                    ))),
                })
                .collect::<Result<Vec<_>>>()?;

            if set.queries.contains_key(&DocId::new(query.clone())) {
                debug!(query = %query, run_id = ?record.run_id, "replacing earlier record");
            }
            set.insert(query, hits);
        }
        Ok(set)
    }
}

/// A `benchmark.json` record written by the single-query benchmark script.
#[derive(Debug, Clone, Deserialize)]
pub struct BenchmarkRecord {
    #[serde(default)]
    pub run_id: Option<String>,
    /// Path as the recording machine wrote it, with `/` or `\` separators.
    pub query_file: String,
    #[serde(default)]
    pub k: Option<usize>,
    #[serde(default)]
    pub results: Vec<RecordHit>,
}

/// A raw search hit inside a [`BenchmarkRecord`].
#[derive(Debug, Clone, Deserialize)]
pub struct RecordHit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "parentId")]
    pub parent_id: Option<String>,
    #[serde(rename = "@search.score")]
    pub score: f32,
}

/// File stem of a recorded path, whichever separator style it uses.
fn query_doc_id(query_file: &str) -> Option<&str> {
    let name = query_file.rsplit(['/', '\\']).next()?;
    let stem = match name.rfind('.') {
        Some(0) | None => name,
        Some(dot) => &name[..dot],
    };
    (!stem.is_empty()).then_some(stem)
}

/// Read benchmark records from files.
pub fn load_benchmark_records(paths: &[PathBuf]) -> Result<Vec<BenchmarkRecord>> {
    paths
        .iter()
        .map(|path| {
            let content = fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
            serde_json::from_str(&content).map_err(|e| {
                BenchError::Serialization(format!("benchmark record '{}': {}", path.display(), e))
            })
        })
        .collect()
}

/// A chunk-level retrieval pipeline run live against an index.
#[derive(Debug, Clone)]
pub struct CandidatePipeline {
    pub name: String,
    pub run: EmbedRun,
    /// Entries requested from the index per query.
    pub hits_per_query: usize,
}

/// Index every chunk of `documents`, then query with each document's pooled
/// vector. Hits are chunk-level, tagged with their parent document.
pub async fn collect_candidates(
    documents: &[Document],
    embedder: Arc<dyn Embedder>,
    index: &mut dyn NeighborIndex,
    pipeline: &CandidatePipeline,
    corpus_version: &str,
    cancel: &CancelHandle,
) -> Result<(CandidateSet, RunSummary)> {
    if pipeline.hits_per_query == 0 {
        return Err(BenchError::InvalidConfig(
            "hits_per_query must be positive".to_string(),
        ));
    }

    let embedded = embed_corpus(documents, embedder, &pipeline.run, cancel).await?;
    let mut summary = embedded.summary;

    let mut parents: HashMap<DocId, DocId> = HashMap::new();
    for (doc_id, doc) in &embedded.documents {
        for (chunk, vector) in doc.chunks.iter().zip(&doc.vectors) {
            let entry = DocId::new(format!("{}#{}", doc_id, chunk.index));
            parents.insert(entry.clone(), doc_id.clone());
            index
                .upsert(entry, vector.clone(), DocumentMetadata::default())
                .await?;
        }
    }
    info!(entries = index.len(), pipeline = %pipeline.name, "index populated");

    let mut set = CandidateSet::new(corpus_version).with_pipeline(pipeline.name.clone());
    for (doc_id, doc) in &embedded.documents {
        if cancel.is_cancelled() {
            return Err(BenchError::Cancelled);
        }

        let query = match MeanPooler.pool_chunks(&doc.chunks, &doc.vectors) {
            Ok(v) => v,
            Err(e) => {
                warn!(doc_id = %doc_id, error = %e, "cannot form query vector");
                summary.failed.push(FailedDocument {
                    doc_id: doc_id.clone(),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let hits = index
            .query(&query, pipeline.hits_per_query)
            .await?
            .into_iter()
            .map(|n| match parents.get(&n.doc_id) {
                Some(parent) => CandidateHit::chunk(n.doc_id.clone(), parent.clone(), n.score),
                None => CandidateHit::doc(n.doc_id, n.score),
            })
            .collect();
        set.insert(doc_id.clone(), hits);
    }

    Ok((set, summary))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::{ChunkConfig, Chunker};
    use crate::embedder::HashEmbedder;
    use crate::neighbors::InMemoryIndex;
    use tempfile::TempDir;

    #[test]
    fn test_hit_json_shapes() {
        let hits: Vec<CandidateHit> = serde_json::from_str(
            r#"[{"doc_id": "A", "score": 0.5},
                {"doc_id": "A#2", "parent_id": "B", "score": 0.4},
                {"parent_id": "C", "score": 0.3}]"#,
        )
        .unwrap();
        assert_eq!(hits[0].parent(), &DocId::new("A"));
        assert_eq!(hits[1].parent(), &DocId::new("B"));
        assert_eq!(hits[1].entry_id(), Some(&DocId::new("A#2")));
        assert_eq!(hits[2].parent(), &DocId::new("C"));
        assert_eq!(hits[2].entry_id(), None);
    }

    #[test]
    fn test_hit_without_ids_rejected() {
        let result: std::result::Result<CandidateHit, _> = serde_json::from_str(r#"{"score": 0.1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out/candidates.json");

        let mut set = CandidateSet::new("v1").with_pipeline("compressed");
        set.insert("A", vec![CandidateHit::doc("C", 0.7), CandidateHit::chunk("B#0", "B", 0.6)]);
        set.save(&path).unwrap();

        let loaded = CandidateSet::load(&path).unwrap();
        assert_eq!(loaded, set);
    }

    #[test]
    fn test_from_benchmark_records() {
        let record: BenchmarkRecord = serde_json::from_str(
            r#"{
                "run_id": "0000002",
                "timestamp": "2024-05-01T00:00:00Z",
                "index": "sgws-compressed",
                "query_file": "C:/corpus/wf-17.sgws",
                "k": 3,
                "results": [
                    {"id": "wf-17", "@search.score": 0.99},
                    {"id": "wf-3-c1", "parentId": "wf-3", "@search.score": 0.81},
                    {"id": "wf-9", "name": "Permit", "@search.score": 0.77}
                ]
            }"#,
        )
        .unwrap();

        let set = CandidateSet::from_benchmark_records("v1", vec![record]).unwrap();
        let hits = &set.queries[&DocId::new("wf-17")];
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[1].parent(), &DocId::new("wf-3"));
        assert_eq!(hits[2].parent(), &DocId::new("wf-9"));
    }

    #[test]
    fn test_windows_query_paths() {
        let record: BenchmarkRecord = serde_json::from_str(
            r#"{
                "query_file": "C:\\corpus\\compressed-wf-17.sgws",
                "results": [{"id": "wf-3", "@search.score": 0.8}]
            }"#,
        )
        .unwrap();

        let set = CandidateSet::from_benchmark_records("v1", vec![record]).unwrap();
        assert_eq!(
            set.queries.keys().collect::<Vec<_>>(),
            vec![&DocId::new("compressed-wf-17")]
        );
    }

    #[test]
    fn test_query_doc_id() {
        assert_eq!(query_doc_id("C:\\data\\wf-1.sgws"), Some("wf-1"));
        assert_eq!(query_doc_id("/srv/corpus/wf-2.sgws"), Some("wf-2"));
        assert_eq!(query_doc_id("mixed\\dir/wf-3.tar.sgws"), Some("wf-3.tar"));
        assert_eq!(query_doc_id("wf-4"), Some("wf-4"));
        assert_eq!(query_doc_id("C:\\corpus\\"), None);
        assert_eq!(query_doc_id(""), None);
    }

    #[tokio::test]
    async fn test_collect_candidates_tags_parents() {
        let docs = vec![
            Document::new("a", "river bridge inspection report"),
            Document::new("b", "river bridge maintenance report"),
            Document::new("c", "library card renewal form"),
        ];
        let pipeline = CandidatePipeline {
            name: "chunked".to_string(),
            run: EmbedRun {
                chunker: Chunker::new(ChunkConfig::new(16, 4)).unwrap(),
                model_id: "m".to_string(),
                max_in_flight: 2,
                determinism_probe: false,
            },
            hits_per_query: 5,
        };
        let mut index = InMemoryIndex::new();
        let (set, summary) = collect_candidates(
            &docs,
            Arc::new(HashEmbedder::new(128)),
            &mut index,
            &pipeline,
            "v1",
            &CancelHandle::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.embedded_documents, 3);
        assert_eq!(set.len(), 3);
        assert_eq!(set.pipeline.as_deref(), Some("chunked"));
        for hits in set.queries.values() {
            assert!(hits.len() <= 5);
            for hit in hits {
                assert!(["a", "b", "c"].contains(&hit.parent().as_str()));
                assert!(hit.entry_id().is_some());
            }
        }
    }
}
