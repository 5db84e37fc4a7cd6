//! Integration tests for the library pipeline with in-test capabilities.
//!
//! The fakes implement the public `EmbeddingProvider`, `GenerationProvider`,
//! and `AvailabilityProbe` traits, proving that custom backends plug into
//! ingestion, retrieval, and mode routing end to end.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use answer_harness::chunk::Chunker;
use answer_harness::embedding::{EmbeddingProvider, HashProvider};
use answer_harness::error::{RagError, Result};
use answer_harness::generation::{
    AvailabilityProbe, ChatMessage, GenerationProvider, ModelResponse, TokenUsage,
};
use answer_harness::index::EmbeddingIndex;
use answer_harness::ingest::DocumentIngestor;
use answer_harness::mode::ModeSelector;
use answer_harness::models::{Mode, QueryRequest};
use answer_harness::orchestrator::QueryOrchestrator;
use answer_harness::pipeline::Pipeline;
use async_trait::async_trait;
use tempfile::TempDir;

// ─── Test capabilities ──────────────────────────────────────────────

/// Hash embeddings that can be switched off mid-test.
struct SwitchableEmbedder {
    inner: HashProvider,
    fail: Mutex<bool>,
}

#[async_trait]
impl EmbeddingProvider for SwitchableEmbedder {
    fn model_name(&self) -> &str {
        "switchable"
    }
    fn dims(&self) -> usize {
        self.inner.dims()
    }
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if *self.fail.lock().unwrap() {
            return Err(RagError::EmbeddingUnavailable("service down".to_string()));
        }
        self.inner.embed(texts).await
    }
}

/// Answers with the sources named in the prompt, so grounding is observable.
struct CitingGenerator {
    prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl GenerationProvider for CitingGenerator {
    fn model_name(&self) -> &str {
        "citing-model"
    }

    async fn generate(&self, prompt: &str) -> Result<ModelResponse> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let cited: Vec<&str> = prompt
            .lines()
            .filter_map(|l| l.strip_prefix("Source: "))
            .collect();
        Ok(ModelResponse::Chat {
            message: ChatMessage {
                role: "assistant".to_string(),
                parts: vec![format!("According to {}.", cited.join(", "))],
            },
            usage: TokenUsage {
                prompt_tokens: Some(prompt.len() as u64 / 4),
                completion_tokens: Some(5),
            },
        })
    }

    async fn check_availability(&self) -> bool {
        true
    }
}

struct FixedProbe {
    available: bool,
    calls: AtomicUsize,
}

#[async_trait]
impl AvailabilityProbe for FixedProbe {
    async fn check_availability(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.available
    }
}

struct Harness {
    _tmp: TempDir,
    docs: std::path::PathBuf,
    pipeline: Pipeline,
    embedder: Arc<SwitchableEmbedder>,
    generator: Arc<CitingGenerator>,
    probe: Arc<FixedProbe>,
}

fn harness(available: bool) -> Harness {
    let tmp = TempDir::new().unwrap();
    let docs = tmp.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(docs.join("doc1.txt"), "Paris is the capital of France.").unwrap();
    std::fs::write(docs.join("doc2.txt"), "Tokyo is the capital of Japan.").unwrap();
    std::fs::write(docs.join("data.csv"), "x,y\n1,2\n").unwrap();

    let embedder = Arc::new(SwitchableEmbedder {
        inner: HashProvider::new(384),
        fail: Mutex::new(false),
    });
    let generator = Arc::new(CitingGenerator {
        prompts: Mutex::new(Vec::new()),
    });
    let probe = Arc::new(FixedProbe {
        available,
        calls: AtomicUsize::new(0),
    });

    let index = Arc::new(
        EmbeddingIndex::initialize(tmp.path().join("index.json"), embedder.clone()).unwrap(),
    );
    let orchestrator = QueryOrchestrator::new(index, generator.clone(), "Answer briefly.")
        .with_timeout(Duration::from_secs(5));
    let selector = ModeSelector::new(orchestrator, probe.clone());
    let pipeline = Pipeline::from_parts(
        DocumentIngestor::new(Chunker::new(200, 20).unwrap()),
        selector,
    );

    Harness {
        _tmp: tmp,
        docs,
        pipeline,
        embedder,
        generator,
        probe,
    }
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_live_query_is_grounded_in_retrieved_chunks() {
    let h = harness(true);
    let summary = h.pipeline.ingest(&h.docs).await.unwrap();
    assert_eq!(summary.chunks_processed, 2);
    assert_eq!(summary.files_skipped, 1);

    let result = h
        .pipeline
        .query(&QueryRequest::new("capital of France", 1, 0.3))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.mode, Mode::Live);
    assert_eq!(result.sources, vec!["doc1.txt"]);
    assert_eq!(result.documents_used, 1);
    assert_eq!(result.answer, "According to doc1.txt.");
    assert_eq!(result.model.as_deref(), Some("citing-model"));
    assert_eq!(result.usage.unwrap().completion_tokens, Some(5));

    let prompts = h.generator.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].starts_with("Answer briefly."));
    assert!(prompts[0].contains("Paris is the capital of France."));
    assert!(!prompts[0].contains("Tokyo"));
}

#[tokio::test]
async fn test_simulated_mode_answers_without_backends() {
    let h = harness(false);
    h.pipeline.ingest(&h.docs).await.unwrap();

    let result = h
        .pipeline
        .query(&QueryRequest::new("hello", 5, 0.7))
        .await
        .unwrap();

    assert!(result.success);
    assert_eq!(result.mode, Mode::Simulated);
    assert!(result.sources.is_empty());
    assert!(result.answer.contains("2 chunks"));
    assert!(h.generator.prompts.lock().unwrap().is_empty());

    let again = h
        .pipeline
        .query(&QueryRequest::new("hello", 5, 0.7))
        .await
        .unwrap();
    assert_eq!(again, result);
    assert_eq!(h.probe.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_stats_include_mode() {
    let h = harness(true);
    assert_eq!(h.pipeline.mode(), None);
    h.pipeline.ingest(&h.docs).await.unwrap();

    let stats = h.pipeline.index_stats().await;
    assert_eq!(stats.count, 2);
    assert_eq!(stats.embedding_dimension, 384);
    assert_eq!(stats.mode, Mode::Live);
    assert_eq!(h.pipeline.mode(), Some(Mode::Live));
}

#[tokio::test]
async fn test_embedding_outage_during_ingest_commits_nothing() {
    let h = harness(true);
    *h.embedder.fail.lock().unwrap() = true;

    let err = h.pipeline.ingest(&h.docs).await.unwrap_err();
    assert!(matches!(err, RagError::EmbeddingUnavailable(_)));
    assert_eq!(h.pipeline.index_stats().await.count, 0);
}

#[tokio::test]
async fn test_embedding_outage_during_query_degrades() {
    let h = harness(true);
    h.pipeline.ingest(&h.docs).await.unwrap();
    *h.embedder.fail.lock().unwrap() = true;

    let result = h
        .pipeline
        .query(&QueryRequest::new("capital of France", 3, 0.3))
        .await
        .unwrap();

    assert!(!result.success);
    assert_eq!(result.mode, Mode::Live);
    assert!(result.error.unwrap().contains("service down"));
    assert!(h.generator.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_reingest_and_clear() {
    let h = harness(true);
    h.pipeline.ingest(&h.docs).await.unwrap();
    h.pipeline.ingest(&h.docs).await.unwrap();
    assert_eq!(h.pipeline.index_stats().await.count, 4);

    h.pipeline.clear().await.unwrap();
    assert_eq!(h.pipeline.index_stats().await.count, 0);

    let result = h
        .pipeline
        .query(&QueryRequest::new("capital of France", 3, 0.3))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(result.documents_used, 0);
    assert!(h.generator.prompts.lock().unwrap()[0].contains("No relevant documents found."));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_searches_and_adds() {
    let h = harness(true);
    h.pipeline.ingest(&h.docs).await.unwrap();
    let pipeline = Arc::new(h.pipeline);

    let mut tasks = tokio::task::JoinSet::new();
    for i in 0..8 {
        let pipeline = Arc::clone(&pipeline);
        let docs = h.docs.clone();
        tasks.spawn(async move {
            if i % 2 == 0 {
                pipeline.ingest(&docs).await.map(|_| ())
            } else {
                pipeline
                    .query(&QueryRequest::new("capital of Japan", 2, 0.3))
                    .await
                    .map(|r| assert!(r.success))
            }
        });
    }
    while let Some(outcome) = tasks.join_next().await {
        outcome.unwrap().unwrap();
    }

    assert_eq!(pipeline.index_stats().await.count, 2 + 4 * 2);
}
