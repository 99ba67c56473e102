//! Persistence layer for gold-standard labels.
//!
//! Single files can be JSON (human-readable) or bincode (compact). The
//! [`LabelStore`] keeps one directory per published version and never
//! overwrites an existing one.

use crate::error::{BenchError, Result};
use crate::labels::{LabelArena, Labels};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Filename of the labels inside a version directory.
pub const LABELS_FILENAME: &str = "labels.json";

const STAGING_PREFIX: &str = ".staging-";

/// Save format for labels files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    /// JSON format (human-readable, larger).
    Json,
    /// Bincode format (binary, compact).
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

/// Save labels, picking the format from the extension.
pub fn save_labels(labels: &Labels, path: &Path) -> Result<()> {
    save_labels_with_format(labels, path, SaveFormat::from_path(path))
}

pub fn save_labels_with_format(labels: &Labels, path: &Path, format: SaveFormat) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| BenchError::io(parent, e))?;
        }
    }

    let data = match format {
        SaveFormat::Json => labels.to_json()?.into_bytes(),
        SaveFormat::Bincode => bincode::encode_to_vec(labels, bincode::config::standard())
            .map_err(|e| BenchError::Serialization(e.to_string()))?,
    };

    fs::write(path, &data).map_err(|e| BenchError::io(path, e))
}

/// Load labels, picking the format from the extension.
pub fn load_labels(path: &Path) -> Result<Labels> {
    load_labels_with_format(path, SaveFormat::from_path(path))
}

pub fn load_labels_with_format(path: &Path, format: SaveFormat) -> Result<Labels> {
    let data = fs::read(path).map_err(|e| BenchError::io(path, e))?;

    match format {
        SaveFormat::Json => {
            let json = String::from_utf8(data).map_err(|e| BenchError::Serialization(e.to_string()))?;
            Labels::from_json(&json)
        }
        SaveFormat::Bincode => {
            let (labels, _): (Labels, usize) =
                bincode::decode_from_slice(&data, bincode::config::standard())
                    .map_err(|e| BenchError::Serialization(e.to_string()))?;
            Ok(labels)
        }
    }
}

/// Directory of published label versions: `<root>/<version>/labels.json`.
#[derive(Debug, Clone)]
pub struct LabelStore {
    root: PathBuf,
}

impl LabelStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn version_dir(&self, version: &str) -> PathBuf {
        self.root.join(version)
    }

    /// Publish a new version. The labels are written into a staging directory
    /// and renamed into place, so a version is either complete or absent.
    pub fn publish(&self, labels: &Labels) -> Result<PathBuf> {
        validate_version_name(&labels.version)?;

        let target = self.version_dir(&labels.version);
        if target.exists() {
            return Err(BenchError::VersionExists(labels.version.clone()));
        }

        fs::create_dir_all(&self.root).map_err(|e| BenchError::io(&self.root, e))?;
        let staging = self
            .root
            .join(format!("{}{}-{}", STAGING_PREFIX, labels.version, std::process::id()));
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| BenchError::io(&staging, e))?;
        }
        fs::create_dir(&staging).map_err(|e| BenchError::io(&staging, e))?;

        let written = save_labels(labels, &staging.join(LABELS_FILENAME));
        let result = written.and_then(|_| {
            if target.exists() {
                return Err(BenchError::VersionExists(labels.version.clone()));
            }
            fs::rename(&staging, &target).map_err(|e| BenchError::io(&target, e))
        });

        if let Err(e) = result {
            debug!(staging = %staging.display(), "removing staging directory");
            let _ = fs::remove_dir_all(&staging);
            return Err(e);
        }

        info!(version = %labels.version, path = %target.display(), "labels published");
        Ok(target.join(LABELS_FILENAME))
    }

    /// Load a published version.
    pub fn load(&self, version: &str) -> Result<Labels> {
        validate_version_name(version)?;
        let path = self.version_dir(version).join(LABELS_FILENAME);
        if !path.is_file() {
            return Err(BenchError::LabelsNotFound(version.to_string()));
        }

        let labels = load_labels(&path)?;
        if labels.version != version {
            return Err(BenchError::Serialization(format!(
                "'{}' holds labels for version '{}'",
                path.display(),
                labels.version
            )));
        }
        Ok(labels)
    }

    pub fn contains(&self, version: &str) -> bool {
        self.version_dir(version).join(LABELS_FILENAME).is_file()
    }

    /// Published versions in ascending order.
    pub fn versions(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut versions = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(|e| BenchError::io(&self.root, e))? {
            let entry = entry.map_err(|e| BenchError::io(&self.root, e))?;
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            if entry.path().join(LABELS_FILENAME).is_file() {
                versions.push(name);
            }
        }
        versions.sort();
        Ok(versions)
    }

    /// Load every published version.
    pub fn load_arena(&self) -> Result<LabelArena> {
        let mut arena = LabelArena::new();
        for version in self.versions()? {
            arena.insert(self.load(&version)?)?;
        }
        Ok(arena)
    }
}

fn validate_version_name(version: &str) -> Result<()> {
    let valid = !version.is_empty()
        && !version.starts_with('.')
        && version
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(BenchError::InvalidConfig(format!(
            "invalid version tag '{}' (use letters, digits, '-', '_' or '.')",
            version
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunker::ChunkConfig;
    use crate::document::DocId;
    use crate::neighbors::Neighbor;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn create_test_labels(version: &str) -> Labels {
        let mut map = BTreeMap::new();
        map.insert(DocId::new("wf-1"), vec![Neighbor::new("wf-2", 0.75)]);
        map.insert(DocId::new("wf-2"), vec![Neighbor::new("wf-1", 0.75)]);
        Labels::new(version, "text-embedding-3-small", 1, ChunkConfig::default(), map)
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("labels.json");

        let original = create_test_labels("v1");
        save_labels(&original, &path).unwrap();
        assert_eq!(load_labels(&path).unwrap(), original);

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.contains("text-embedding-3-small"));
    }

    #[test]
    fn test_save_and_load_bincode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/labels.bin");

        let original = create_test_labels("v1");
        save_labels(&original, &path).unwrap();
        assert_eq!(load_labels(&path).unwrap(), original);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SaveFormat::from_path(Path::new("l.json")), SaveFormat::Json);
        assert_eq!(SaveFormat::from_path(Path::new("l.bin")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("l.bincode")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("labels")), SaveFormat::Json);
    }

    #[test]
    fn test_publish_and_load() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path().join("store"));

        let path = store.publish(&create_test_labels("v1")).unwrap();
        assert!(path.ends_with("v1/labels.json"));
        assert!(store.contains("v1"));
        assert_eq!(store.load("v1").unwrap(), create_test_labels("v1"));
    }

    #[test]
    fn test_publish_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path());
        store.publish(&create_test_labels("v1")).unwrap();

        let result = store.publish(&create_test_labels("v1"));
        assert!(matches!(result, Err(BenchError::VersionExists(v)) if v == "v1"));
        assert_eq!(store.versions().unwrap(), vec!["v1"]);
    }

    #[test]
    fn test_versions_ignore_staging_and_stray_dirs() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path());
        store.publish(&create_test_labels("v2")).unwrap();
        store.publish(&create_test_labels("v1")).unwrap();
        fs::create_dir_all(dir.path().join(".staging-v3-1")).unwrap();
        fs::create_dir_all(dir.path().join("empty")).unwrap();

        assert_eq!(store.versions().unwrap(), vec!["v1", "v2"]);

        let arena = store.load_arena().unwrap();
        assert_eq!(arena.versions().collect::<Vec<_>>(), vec!["v1", "v2"]);
    }

    #[test]
    fn test_missing_version() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path());
        assert!(matches!(store.load("v9"), Err(BenchError::LabelsNotFound(_))));
        assert!(store.versions().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_version_names() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path());
        for bad in ["", "../escape", ".hidden", "a/b"] {
            let result = store.publish(&create_test_labels(bad));
            assert!(matches!(result, Err(BenchError::InvalidConfig(_))), "{bad}");
        }
    }

    #[test]
    fn test_mislabelled_directory_rejected() {
        let dir = TempDir::new().unwrap();
        let store = LabelStore::new(dir.path());
        save_labels(&create_test_labels("v1"), &dir.path().join("v2").join(LABELS_FILENAME)).unwrap();
        assert!(matches!(store.load("v2"), Err(BenchError::Serialization(_))));
    }
}
