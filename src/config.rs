//! Configuration for the benchmark harness.
//!
//! Values are layered: defaults, then the YAML config file, then environment
//! variables. The binary applies its command-line flags last.

use crate::chunker::ChunkConfig;
use crate::embedder::RetryConfig;
use crate::error::{BenchError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// Embedding service settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Base URL of an OpenAI-compatible API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Embedding model name; also recorded in the labels
    pub model: String,

    /// Requested output dimensions, if the model supports shortening
    #[serde(default)]
    pub dimensions: Option<usize>,

    /// Per-request timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Longest input sent to the service; longer inputs fail locally
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_input_chars() -> usize {
    32_000
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            api_base: String::new(),
            api_key: String::new(),
            model: "text-embedding-3-small".to_string(),
            dimensions: None,
            timeout_secs: default_timeout_secs(),
            max_input_chars: default_max_input_chars(),
        }
    }
}

/// Gold-standard build settings.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BuildConfig {
    pub top_k: usize,
    pub max_in_flight: usize,
    pub determinism_probe: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            max_in_flight: 4,
            determinism_probe: true,
        }
    }
}

/// Where published labels live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    pub labels_root: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        let labels_root = directories::ProjectDirs::from("", "", "sgw-bench")
            .map(|dirs| dirs.data_dir().join("labels"))
            .unwrap_or_else(|| PathBuf::from("labels"));
        Self { labels_root }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub embedding: EmbeddingConfig,
    pub chunking: ChunkConfig,
    pub build: BuildConfig,
    pub retry: RetryConfig,
    pub store: StoreConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    embedding: Option<EmbeddingFileSection>,
    chunking: Option<ChunkingFileSection>,
    build: Option<BuildFileSection>,
    retry: Option<RetryConfig>,
    store: Option<StoreFileSection>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
    timeout_secs: Option<u64>,
    max_input_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ChunkingFileSection {
    max_chars: Option<usize>,
    overlap_chars: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct BuildFileSection {
    top_k: Option<usize>,
    max_in_flight: Option<usize>,
    determinism_probe: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StoreFileSection {
    labels_root: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the config file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (SGW_EMBED_API_BASE, SGW_EMBED_API_KEY,
    ///    SGW_EMBED_MODEL, SGW_MAX_IN_FLIGHT, SGW_LABELS_ROOT)
    /// 2. `path`, or ~/.config/sgw-bench/config.yaml when it exists
    /// 3. Default values
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::config_file_path() {
                Some(default_path) if default_path.exists() => Self::load_from_file(&default_path)?,
                _ => Config::default(),
            },
        };

        config.apply_env(|key| env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BenchError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse YAML on top of the defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = if content.trim().is_empty() {
            ConfigFile::default()
        } else {
            serde_yaml::from_str(content)
                .map_err(|e| BenchError::Config(format!("Failed to parse config file: {}", e)))?
        };

        let mut config = Config::default();

        if let Some(embedding) = file_config.embedding {
            if let Some(api_base) = embedding.api_base {
                config.embedding.api_base = api_base;
            }
            if let Some(api_key) = embedding.api_key {
                config.embedding.api_key = api_key;
            }
            if let Some(model) = embedding.model {
                config.embedding.model = model;
            }
            if embedding.dimensions.is_some() {
                config.embedding.dimensions = embedding.dimensions;
            }
            if let Some(timeout) = embedding.timeout_secs {
                config.embedding.timeout_secs = timeout;
            }
            if let Some(max_input) = embedding.max_input_chars {
                config.embedding.max_input_chars = max_input;
            }
        }

        if let Some(chunking) = file_config.chunking {
            if let Some(max_chars) = chunking.max_chars {
                config.chunking.max_chars = max_chars;
            }
            if let Some(overlap) = chunking.overlap_chars {
                config.chunking.overlap_chars = overlap;
            }
        }

        if let Some(build) = file_config.build {
            if let Some(top_k) = build.top_k {
                config.build.top_k = top_k;
            }
            if let Some(max_in_flight) = build.max_in_flight {
                config.build.max_in_flight = max_in_flight;
            }
            if let Some(probe) = build.determinism_probe {
                config.build.determinism_probe = probe;
            }
        }

        if let Some(retry) = file_config.retry {
            config.retry = retry;
        }

        if let Some(store) = file_config.store.and_then(|s| s.labels_root) {
            config.store.labels_root = store;
        }

        Ok(config)
    }

    /// Override values from environment variables, read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(api_base) = lookup("SGW_EMBED_API_BASE") {
            self.embedding.api_base = api_base;
        }

        if let Some(api_key) = lookup("SGW_EMBED_API_KEY") {
            self.embedding.api_key = api_key;
        }

        if let Some(model) = lookup("SGW_EMBED_MODEL") {
            self.embedding.model = model;
        }

        if let Some(max_in_flight) = lookup("SGW_MAX_IN_FLIGHT") {
            self.build.max_in_flight = max_in_flight.parse().map_err(|_| {
                BenchError::Config(format!("SGW_MAX_IN_FLIGHT is not a number: '{}'", max_in_flight))
            })?;
        }

        if let Some(root) = lookup("SGW_LABELS_ROOT") {
            self.store.labels_root = PathBuf::from(root);
        }

        Ok(())
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "sgw-bench")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate chunking, build and retry parameters.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;

        if self.build.top_k == 0 {
            return Err(BenchError::InvalidConfig("build.top_k must be positive".to_string()));
        }

        if self.build.max_in_flight == 0 {
            return Err(BenchError::InvalidConfig(
                "build.max_in_flight must be positive".to_string(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(BenchError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        if self.embedding.model.is_empty() {
            return Err(BenchError::Config(
                "Embedding model is required. Set SGW_EMBED_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validate everything a live embedding service needs as well.
    pub fn validate_live(&self) -> Result<()> {
        self.validate()?;

        if self.embedding.api_base.is_empty() {
            return Err(BenchError::Config(
                "Embedding API base URL is required. Set SGW_EMBED_API_BASE environment variable or add to config file.".to_string()
            ));
        }

        if self.embedding.api_key.is_empty() {
            return Err(BenchError::Config(
                "Embedding API key is required. Set SGW_EMBED_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        Ok(())
    }
}
