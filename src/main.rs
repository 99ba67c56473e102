//! SGW Bench CLI
//!
//! Build versioned gold-standard labels and score retrieval pipelines against them.

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use sgw_bench::{
    aggregate::AggregationMode,
    candidate::{CandidatePipeline, CandidateSet, collect_candidates, load_benchmark_records},
    chunker::Chunker,
    config::Config,
    document::{DEFAULT_EXTENSION, load_corpus},
    embedder::{Embedder, HashEmbedder, HttpEmbedder, RetryingEmbedder},
    eval::EvaluationRunner,
    gold::{GoldConfig, GoldStandardBuilder},
    labels::Labels,
    neighbors::InMemoryIndex,
    persistence::LabelStore,
    pipeline::{CancelHandle, EmbedRun},
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// SGW Bench - gold-standard similarity benchmark for SGW documents
#[derive(Parser)]
#[command(name = "sgw-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Labels store root (overrides config and SGW_LABELS_ROOT)
    #[arg(long, global = true)]
    labels_root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct EmbedderArgs {
    /// Use the deterministic offline hash embedder
    #[arg(long, conflicts_with = "local_model")]
    fake: bool,

    /// Run a sentence-transformers model in-process (needs the local-model feature)
    #[arg(long)]
    local_model: Option<String>,

    /// Maximum concurrent embedding calls
    #[arg(long)]
    max_in_flight: Option<usize>,
}

#[derive(Args, Clone)]
struct ChunkArgs {
    /// Characters per chunk
    #[arg(long)]
    max_chars: Option<usize>,

    /// Characters shared by consecutive chunks
    #[arg(long)]
    overlap: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Build gold-standard labels for a corpus and publish them
    Build {
        /// Directory containing the corpus documents
        #[arg(long)]
        corpus: PathBuf,

        /// Version tag for the new labels
        #[arg(long)]
        version: String,

        /// Neighbors per document
        #[arg(short = 'k', long)]
        top: Option<usize>,

        /// File extension of corpus documents
        #[arg(long, default_value = DEFAULT_EXTENSION)]
        ext: String,

        /// Skip the embedder determinism probe
        #[arg(long)]
        no_probe: bool,

        #[command(flatten)]
        embedder: EmbedderArgs,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// Produce a candidate file, live or from replayed benchmark records
    Candidates {
        /// Corpus version the candidates are for
        #[arg(long)]
        version: String,

        /// Run a chunk-level pipeline over this corpus
        #[arg(long, required_unless_present = "records")]
        corpus: Option<PathBuf>,

        /// Replay benchmark.json records instead of running a pipeline
        #[arg(long, num_args = 1.., conflicts_with = "corpus")]
        records: Vec<PathBuf>,

        /// Hits requested per query
        #[arg(short = 'k', long, default_value_t = 10)]
        top: usize,

        /// File extension of corpus documents
        #[arg(long, default_value = DEFAULT_EXTENSION)]
        ext: String,

        /// Pipeline name recorded in the candidate file
        #[arg(long, default_value = "chunked-mean")]
        pipeline: String,

        /// Output candidate file
        #[arg(short, long, default_value = "candidates.json")]
        out: PathBuf,

        #[command(flatten)]
        embedder: EmbedderArgs,

        #[command(flatten)]
        chunking: ChunkArgs,
    },

    /// Score a candidate file against published labels
    Evaluate {
        /// Candidate file
        #[arg(long)]
        candidates: PathBuf,

        /// Labels version (defaults to the candidate file's corpus_version)
        #[arg(long)]
        version: Option<String>,

        /// How chunk hits are combined per document
        #[arg(long, default_value = "max")]
        mode: AggregationMode,

        /// Keep the query document in its own candidate list
        #[arg(long)]
        keep_self: bool,

        /// Only score the first N aggregated documents
        #[arg(long)]
        depth: Option<usize>,

        /// Write the report as JSON
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Display a published labels version
    Show {
        #[arg(long)]
        version: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List published label versions
    Versions,

    /// Freeze a legacy `{doc_id: [{id, score}]}` labels file as a new version
    ImportLegacy {
        #[arg(long)]
        file: PathBuf,

        #[arg(long)]
        version: String,

        /// Embedding model the legacy labels were built with
        #[arg(long)]
        model: String,

        #[command(flatten)]
        chunking: ChunkArgs,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(root) = cli.labels_root {
        config.store.labels_root = root;
    }
    let store = LabelStore::new(config.store.labels_root.clone());

    match cli.command {
        Commands::Build {
            corpus,
            version,
            top,
            ext,
            no_probe,
            embedder,
            chunking,
        } => {
            if let Some(k) = top {
                config.build.top_k = k;
            }
            if no_probe {
                config.build.determinism_probe = false;
            }
            apply_overrides(&mut config, &embedder, &chunking);
            cmd_build(&config, &store, &corpus, &version, &ext, &embedder).await
        }
        Commands::Candidates {
            version,
            corpus,
            records,
            top,
            ext,
            pipeline,
            out,
            embedder,
            chunking,
        } => {
            apply_overrides(&mut config, &embedder, &chunking);
            match corpus {
                Some(corpus) => {
                    cmd_candidates_live(&config, &corpus, &version, top, &ext, pipeline, &out, &embedder)
                        .await
                }
                None => cmd_candidates_replay(&version, &records, pipeline, &out),
            }
        }
        Commands::Evaluate {
            candidates,
            version,
            mode,
            keep_self,
            depth,
            out,
        } => {
            let runner = EvaluationRunner {
                mode,
                exclude_self: !keep_self,
                depth,
            };
            cmd_evaluate(&store, &candidates, version, runner, out.as_deref())
        }
        Commands::Show { version, json } => cmd_show(&store, &version, json),
        Commands::Versions => cmd_versions(&store),
        Commands::ImportLegacy {
            file,
            version,
            model,
            chunking,
        } => {
            apply_chunking(&mut config, &chunking);
            cmd_import_legacy(&config, &store, &file, &version, &model)
        }
    }
}

fn apply_chunking(config: &mut Config, chunking: &ChunkArgs) {
    if let Some(max_chars) = chunking.max_chars {
        config.chunking.max_chars = max_chars;
    }
    if let Some(overlap) = chunking.overlap {
        config.chunking.overlap_chars = overlap;
    }
}

fn apply_overrides(config: &mut Config, embedder: &EmbedderArgs, chunking: &ChunkArgs) {
    apply_chunking(config, chunking);
    if let Some(n) = embedder.max_in_flight {
        config.build.max_in_flight = n;
    }
}

/// Pick the embedder and the model id recorded with its output.
async fn make_embedder(config: &Config, args: &EmbedderArgs) -> Result<(Arc<dyn Embedder>, String)> {
    if args.fake {
        let embedder = match config.embedding.dimensions {
            Some(dims) => HashEmbedder::new(dims),
            None => HashEmbedder::default(),
        };
        let model_id = format!("hash-{}", embedder.dimensions());
        warn!(model = %model_id, "using the offline hash embedder");
        return Ok((Arc::new(embedder), model_id));
    }

    if let Some(ref model_id) = args.local_model {
        return load_local(model_id, config).await;
    }

    config
        .validate_live()
        .context("Invalid configuration for the live embedder")?;
    let client = HttpEmbedder::new(config.embedding.clone()).context("Failed to create embedding client")?;
    let embedder = RetryingEmbedder::new(client, config.retry);
    Ok((Arc::new(embedder), config.embedding.model.clone()))
}

#[cfg(feature = "local-model")]
async fn load_local(model_id: &str, config: &Config) -> Result<(Arc<dyn Embedder>, String)> {
    use sgw_bench::embedder::LocalEmbedder;

    info!(model = %model_id, "loading local model");
    let id = model_id.to_string();
    let model = tokio::task::spawn_blocking(move || LocalEmbedder::load(&id))
        .await
        .context("Model loading task failed")?
        .context("Failed to load local model")?;
    let embedder = RetryingEmbedder::new(model, config.retry);
    Ok((Arc::new(embedder), model_id.to_string()))
}

#[cfg(not(feature = "local-model"))]
async fn load_local(_model_id: &str, _config: &Config) -> Result<(Arc<dyn Embedder>, String)> {
    bail!("--local-model needs a build with the `local-model` feature")
}

/// Cancel the run on Ctrl-C.
fn cancel_on_ctrl_c(handle: CancelHandle) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, cancelling");
            handle.cancel();
        }
    });
}

async fn cmd_build(
    config: &Config,
    store: &LabelStore,
    corpus: &Path,
    version: &str,
    ext: &str,
    embedder_args: &EmbedderArgs,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    if store.contains(version) {
        bail!("labels version '{}' already exists in {}", version, store.root().display());
    }

    let documents = load_corpus(corpus, ext).context("Failed to load corpus")?;
    info!(documents = documents.len(), corpus = %corpus.display(), "corpus loaded");

    let (embedder, model_id) = make_embedder(config, embedder_args).await?;
    let gold_config = GoldConfig {
        top_k: config.build.top_k,
        chunking: config.chunking,
        max_in_flight: config.build.max_in_flight,
        determinism_probe: config.build.determinism_probe,
        ..GoldConfig::new(version, model_id)
    };

    let builder = GoldStandardBuilder::new(embedder, gold_config).context("Invalid build settings")?;
    cancel_on_ctrl_c(builder.cancel_handle());

    let outcome = builder.build(&documents).await.context("Gold standard build failed")?;
    outcome.summary.print_summary("Gold Standard Build");

    let path = store.publish(&outcome.labels).context("Failed to publish labels")?;
    println!("Labels saved to: {}", path.display());
    println!("  Documents labelled: {}", outcome.labels.len());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn cmd_candidates_live(
    config: &Config,
    corpus: &Path,
    version: &str,
    top: usize,
    ext: &str,
    pipeline: String,
    out: &Path,
    embedder_args: &EmbedderArgs,
) -> Result<()> {
    config.validate().context("Invalid configuration")?;
    let documents = load_corpus(corpus, ext).context("Failed to load corpus")?;
    let (embedder, model_id) = make_embedder(config, embedder_args).await?;

    let pipeline = CandidatePipeline {
        name: pipeline,
        run: EmbedRun {
            chunker: Chunker::new(config.chunking).context("Invalid chunking")?,
            model_id,
            max_in_flight: config.build.max_in_flight,
            determinism_probe: false,
        },
        hits_per_query: top,
    };

    let cancel = CancelHandle::new();
    cancel_on_ctrl_c(cancel.clone());

    let mut index = InMemoryIndex::new();
    let (set, summary) = collect_candidates(&documents, embedder, &mut index, &pipeline, version, &cancel)
        .await
        .context("Candidate pipeline failed")?;
    summary.print_summary("Candidate Pipeline");

    set.save(out).context("Failed to save candidates")?;
    println!("Candidates for {} queries saved to: {}", set.len(), out.display());
    Ok(())
}

fn cmd_candidates_replay(version: &str, records: &[PathBuf], pipeline: String, out: &Path) -> Result<()> {
    let records = load_benchmark_records(records).context("Failed to read benchmark records")?;
    let set = CandidateSet::from_benchmark_records(version, records)
        .context("Failed to convert benchmark records")?
        .with_pipeline(pipeline);

    set.save(out).context("Failed to save candidates")?;
    println!("Candidates for {} queries saved to: {}", set.len(), out.display());
    Ok(())
}

fn cmd_evaluate(
    store: &LabelStore,
    candidates_path: &Path,
    version: Option<String>,
    runner: EvaluationRunner,
    out: Option<&Path>,
) -> Result<()> {
    let candidates = CandidateSet::load(candidates_path).context("Failed to load candidates")?;
    let version = version.unwrap_or_else(|| candidates.corpus_version.clone());
    let labels = store
        .load(&version)
        .with_context(|| format!("Failed to load labels version '{}'", version))?;

    let report = runner.evaluate(&candidates, &labels).context("Evaluation failed")?;
    report.print_summary();

    if let Some(out) = out {
        report.save(out).context("Failed to save report")?;
        println!("Report saved to: {}", out.display());
    }
    Ok(())
}

fn cmd_show(store: &LabelStore, version: &str, json: bool) -> Result<()> {
    let labels = store
        .load(version)
        .with_context(|| format!("Failed to load labels version '{}'", version))?;

    if json {
        println!("{}", labels.to_json().context("Failed to serialize labels")?);
        return Ok(());
    }

    println!("Labels {}", labels.version);
    println!("{}", "─".repeat(40));
    println!("  Model:      {}", labels.model_id);
    println!("  k:          {}", labels.k);
    println!(
        "  Chunking:   {} chars, {} overlap",
        labels.chunking.max_chars, labels.chunking.overlap_chars
    );
    println!("  Documents:  {}", labels.len());
    println!("{}", "─".repeat(40));
    for (doc_id, neighbors) in labels.iter() {
        let row: Vec<String> = neighbors
            .iter()
            .map(|n| format!("{} ({:.3})", n.doc_id, n.score))
            .collect();
        println!("  {} -> {}", doc_id, row.join(", "));
    }
    Ok(())
}

fn cmd_versions(store: &LabelStore) -> Result<()> {
    let versions = store.versions().context("Failed to list label versions")?;
    if versions.is_empty() {
        println!("No label versions in {}", store.root().display());
        return Ok(());
    }
    for version in versions {
        println!("{}", version);
    }
    Ok(())
}

fn cmd_import_legacy(config: &Config, store: &LabelStore, file: &Path, version: &str, model: &str) -> Result<()> {
    config.chunking.validate().context("Invalid chunking")?;
    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let labels = Labels::from_legacy_json(&content, version, model, config.chunking)
        .context("Failed to parse legacy labels")?;

    let path = store.publish(&labels).context("Failed to publish labels")?;
    println!("Imported {} documents as version {}", labels.len(), labels.version);
    println!("Labels saved to: {}", path.display());
    Ok(())
}

