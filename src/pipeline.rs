//! Outward interface: ingest a directory, answer a query, report stats.
//!
//! [`Pipeline::bootstrap`] wires the configured providers, index,
//! orchestrator, and mode selector together and resolves the mode once.
//! Callers (the `ask` CLI, or an HTTP layer) hold one `Pipeline` per process.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::chunk::Chunker;
use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{create_generator, BackendProbe, GenerationProvider};
use crate::index::EmbeddingIndex;
use crate::ingest::{DocumentIngestor, FileOutcome};
use crate::mode::ModeSelector;
use crate::models::{Mode, QueryRequest, QueryResult};
use crate::orchestrator::{load_instructions, QueryOrchestrator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub chunks_processed: usize,
    pub files_ingested: usize,
    pub files_skipped: usize,
    #[serde(skip)]
    pub files: Vec<FileOutcome>,
}

/// Index contents, resolved mode, and the backends behind them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub count: usize,
    pub embedding_dimension: usize,
    pub mode: Mode,
    pub index_path: PathBuf,
    pub embedding_model: String,
    pub generation_model: String,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// True when the instructions came from the configured file.
    pub instructions_loaded: bool,
    pub instructions_length: usize,
}

pub struct Pipeline {
    ingestor: DocumentIngestor,
    index: Arc<EmbeddingIndex>,
    selector: ModeSelector,
}

impl Pipeline {
    /// Build every component from `config` and resolve the mode.
    ///
    /// A corrupt snapshot fails with [`RagError::IndexCorrupt`] unless
    /// `index.recreate_on_corrupt` is set, in which case it is replaced by
    /// an empty index.
    pub async fn bootstrap(config: &Config) -> Result<Self> {
        let embedder: Arc<dyn EmbeddingProvider> = Arc::from(create_provider(&config.embedding)?);
        let generator: Arc<dyn GenerationProvider> =
            Arc::from(create_generator(&config.generation)?);
        if !config.embedding.is_enabled() {
            tracing::warn!("embedding provider is disabled, queries will be answered in simulated mode");
        }

        let index = open_index(
            config.index.path.clone(),
            embedder.clone(),
            config.index.recreate_on_corrupt,
        )
        .await?;
        let index = Arc::new(
            index
                .with_batch_size(config.embedding.batch_size)
                .with_timeout(Duration::from_secs(config.embedding.timeout_secs)),
        );

        let chunker = Chunker::new(config.chunking.size, config.chunking.overlap)?;
        let instructions = load_instructions(config.generation.instructions_path.as_deref());
        let orchestrator = QueryOrchestrator::new(index.clone(), generator.clone(), instructions)
            .with_timeout(Duration::from_secs(config.generation.timeout_secs));
        let probe = Arc::new(BackendProbe::new(generator, embedder));
        let selector = ModeSelector::new(orchestrator, probe)
            .with_probe_timeout(Duration::from_secs(config.mode.probe_timeout_secs));

        let pipeline = Self::from_parts(DocumentIngestor::new(chunker), selector);
        let mode = pipeline.selector.resolve().await;
        tracing::info!(%mode, "pipeline ready");
        Ok(pipeline)
    }

    /// Assemble a pipeline from prebuilt components. The index is the one
    /// the selector's orchestrator searches.
    pub fn from_parts(ingestor: DocumentIngestor, selector: ModeSelector) -> Self {
        let index = Arc::clone(selector.orchestrator().index());
        Self {
            ingestor,
            index,
            selector,
        }
    }

    /// Extract, chunk, embed, and persist every supported file in `dir`.
    pub async fn ingest(&self, dir: &Path) -> Result<IngestSummary> {
        let ingestor = self.ingestor.clone();
        let dir = dir.to_path_buf();
        let ingestion = tokio::task::spawn_blocking(move || ingestor.ingest_directory(&dir))
            .await
            .map_err(std::io::Error::other)??;
        self.index.add(&ingestion.chunks).await?;

        Ok(IngestSummary {
            chunks_processed: ingestion.chunks.len(),
            files_ingested: ingestion.files_ingested(),
            files_skipped: ingestion.files_skipped(),
            files: ingestion.files,
        })
    }

    pub async fn query(&self, request: &QueryRequest) -> Result<QueryResult> {
        self.selector.route(request).await
    }

    pub async fn index_stats(&self) -> PipelineStats {
        let stats = self.index.stats().await;
        let orchestrator = self.selector.orchestrator();
        let instructions = orchestrator.instructions();
        let chunker = self.ingestor.chunker();
        PipelineStats {
            count: stats.count,
            embedding_dimension: stats.embedding_dimension,
            mode: self.selector.resolve().await,
            index_path: self.index.path().to_path_buf(),
            embedding_model: self.index.embedder().model_name().to_string(),
            generation_model: orchestrator.generator().model_name().to_string(),
            chunk_size: chunker.size(),
            chunk_overlap: chunker.overlap(),
            instructions_loaded: instructions.from_file,
            instructions_length: instructions.text.len(),
        }
    }

    pub async fn clear(&self) -> Result<()> {
        self.index.clear().await
    }

    /// Probe the backends again and return the new mode.
    pub async fn reinitialize(&mut self) -> Mode {
        self.selector.reinitialize().await
    }

    pub fn mode(&self) -> Option<Mode> {
        self.selector.current()
    }
}

/// Load or create the index on the blocking pool. A corrupt snapshot is
/// replaced by an empty one only when `recreate_on_corrupt` is set.
async fn open_index(
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    recreate_on_corrupt: bool,
) -> Result<EmbeddingIndex> {
    tokio::task::spawn_blocking(move || match EmbeddingIndex::initialize(&path, embedder.clone()) {
        Err(RagError::IndexCorrupt { path: corrupt, reason }) if recreate_on_corrupt => {
            tracing::warn!(path = %corrupt.display(), %reason, "index snapshot corrupt, recreating empty");
            EmbeddingIndex::create_empty(&path, embedder)
        }
        other => other,
    })
    .await
    .map_err(std::io::Error::other)?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config(tmp: &TempDir, extra: &str) -> Config {
        let toml = format!(
            "[documents]\npath = \"{docs}\"\n\n[index]\npath = \"{index}\"\n{extra}",
            docs = tmp.path().join("docs").display(),
            index = tmp.path().join("data").join("index.json").display(),
            extra = extra,
        );
        toml::from_str(&toml).unwrap()
    }

    #[tokio::test]
    async fn bootstrap_with_disabled_backends_is_simulated() {
        let tmp = TempDir::new().unwrap();
        let pipeline = Pipeline::bootstrap(&config(&tmp, "")).await.unwrap();

        assert_eq!(pipeline.mode(), Some(Mode::Simulated));
        assert!(tmp.path().join("data").join("index.json").exists());
        let stats = pipeline.index_stats().await;
        assert_eq!(stats.count, 0);
        assert_eq!(stats.mode, Mode::Simulated);
    }

    #[tokio::test]
    async fn stats_describe_backends_and_instructions() {
        let tmp = TempDir::new().unwrap();
        let instructions = tmp.path().join("instructions.txt");
        std::fs::write(&instructions, "Answer in one sentence.").unwrap();
        let extra = format!(
            "[embedding]\nprovider = \"hash\"\ndims = 64\n\n[generation]\ninstructions_path = \"{}\"\n",
            instructions.display()
        );

        let stats = Pipeline::bootstrap(&config(&tmp, &extra)).await.unwrap().index_stats().await;

        assert_eq!(stats.embedding_model, "hash");
        assert_eq!(stats.embedding_dimension, 64);
        assert_eq!(stats.generation_model, "disabled");
        assert_eq!(stats.index_path, tmp.path().join("data").join("index.json"));
        assert_eq!((stats.chunk_size, stats.chunk_overlap), (1000, 200));
        assert!(stats.instructions_loaded);
        assert_eq!(stats.instructions_length, "Answer in one sentence.".len());

        let defaults = Pipeline::bootstrap(&config(&tmp, "")).await.unwrap().index_stats().await;
        assert!(!defaults.instructions_loaded);
        assert_eq!(defaults.instructions_length, crate::orchestrator::DEFAULT_INSTRUCTIONS.len());
    }

    #[tokio::test]
    async fn corrupt_snapshot_fails_unless_recreate() {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("data")).unwrap();
        std::fs::write(tmp.path().join("data").join("index.json"), "garbage").unwrap();

        let err = Pipeline::bootstrap(&config(&tmp, "")).await.err().unwrap();
        assert!(matches!(err, RagError::IndexCorrupt { .. }));

        let recreate = config(&tmp, "recreate_on_corrupt = true\n");
        let pipeline = Pipeline::bootstrap(&recreate).await.unwrap();
        assert_eq!(pipeline.index_stats().await.count, 0);
    }

    #[tokio::test]
    async fn ingest_with_hash_embeddings() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("doc1.txt"), "Paris is the capital of France.").unwrap();
        std::fs::write(docs.join("doc2.txt"), "Tokyo is the capital of Japan.").unwrap();
        std::fs::write(docs.join("table.csv"), "a,b").unwrap();

        let pipeline = Pipeline::bootstrap(&config(&tmp, "[embedding]\nprovider = \"hash\"\n"))
            .await
            .unwrap();
        let summary = pipeline.ingest(&docs).await.unwrap();

        assert_eq!(summary.chunks_processed, 2);
        assert_eq!(summary.files_ingested, 2);
        assert_eq!(summary.files_skipped, 1);
        assert_eq!(pipeline.index_stats().await.count, 2);

        pipeline.clear().await.unwrap();
        assert_eq!(pipeline.index_stats().await.count, 0);
    }

    #[tokio::test]
    async fn ingest_missing_directory_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let pipeline = Pipeline::bootstrap(&config(&tmp, "")).await.unwrap();
        let err = pipeline.ingest(&tmp.path().join("missing")).await.unwrap_err();
        assert!(matches!(err, RagError::DirectoryNotFound(_)));
    }
}
