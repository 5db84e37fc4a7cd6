//! Persistent vector index over embedded chunks.
//!
//! An [`EmbeddingIndex`] owns every embedded chunk together with the snapshot
//! file that persists them. Search is brute-force cosine similarity over all
//! stored vectors, which is adequate for a single private corpus.
//!
//! # Similarity
//!
//! Distance is cosine distance `d = 1 - cos(q, v)`. It is reported as
//! similarity `s = clamp(1 - d, 0, 1)`, so vectors pointing away from the
//! query score `0.0`. A result passes the threshold when `s >= threshold`.
//!
//! # Snapshot format
//!
//! One JSON document:
//!
//! ```json
//! {
//!   "version": 1,
//!   "model": "text-embedding-3-small",
//!   "dimension": 1536,
//!   "entries": [
//!     { "content": "...", "source": "a.txt", "chunk_id": 0, "file_type": "text",
//!       "vector": "<base64 of little-endian f32s>" }
//!   ]
//! }
//! ```
//!
//! Entries are stored in insertion order. Writes go to `<path>.tmp`, are
//! fsynced, and then renamed over `<path>`.
//!
//! # Locking
//!
//! State lives behind one `tokio::sync::RwLock`. Writers (`add`, `save`,
//! `clear`) take it exclusively; `search` and `stats` share it. Embedding
//! calls happen before the lock is taken and are bounded by
//! [`EmbeddingIndex::with_timeout`]. Snapshot files are written on the
//! blocking pool.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::embedding::{blob_to_vec, cosine_similarity, embed_query, vec_to_blob, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::models::{Chunk, IndexStats, ScoredChunk};

const SNAPSHOT_VERSION: u32 = 1;
const DEFAULT_BATCH_SIZE: usize = 64;
const DEFAULT_EMBED_TIMEOUT: Duration = Duration::from_secs(30);

struct Entry {
    chunk: Chunk,
    vector: Vec<f32>,
}

struct IndexState {
    /// Embedding model the stored vectors came from.
    model: String,
    dimension: usize,
    entries: Vec<Entry>,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    model: String,
    dimension: usize,
    entries: Vec<SnapshotEntry>,
}

#[derive(Serialize, Deserialize)]
struct SnapshotEntry {
    #[serde(flatten)]
    chunk: Chunk,
    vector: String,
}

pub struct EmbeddingIndex {
    path: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    embed_timeout: Duration,
    state: RwLock<IndexState>,
}

impl EmbeddingIndex {
    /// Load the snapshot at `path`, or create and persist an empty index
    /// if none exists.
    ///
    /// Fails with [`RagError::IndexCorrupt`] when the file exists but cannot
    /// be decoded, and with [`RagError::DimensionMismatch`] or
    /// [`RagError::ModelMismatch`] when its vectors came from another
    /// embedder. A disabled embedder (dimension 0) loads any snapshot.
    pub fn initialize(path: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Self::create_empty(path, embedder);
        }

        let state = load_snapshot(&path)?;
        let dims = embedder.dims();
        if !state.entries.is_empty() && dims != 0 {
            if dims != state.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: state.dimension,
                    actual: dims,
                });
            }
            if embedder.model_name() != state.model {
                return Err(RagError::ModelMismatch {
                    expected: state.model,
                    actual: embedder.model_name().to_string(),
                });
            }
        }
        tracing::info!(
            path = %path.display(),
            count = state.entries.len(),
            dimension = state.dimension,
            model = %state.model,
            "index loaded"
        );

        Ok(Self::from_state(path, embedder, state))
    }

    /// Start from an empty index and persist it at `path`, replacing any
    /// existing snapshot.
    pub fn create_empty(path: impl Into<PathBuf>, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let path = path.into();
        let state = IndexState {
            model: embedder.model_name().to_string(),
            dimension: embedder.dims(),
            entries: Vec::new(),
        };
        write_atomic(&path, &encode_snapshot(&state)?)?;
        tracing::info!(path = %path.display(), "created empty index");

        Ok(Self::from_state(path, embedder, state))
    }

    fn from_state(path: PathBuf, embedder: Arc<dyn EmbeddingProvider>, state: IndexState) -> Self {
        Self {
            path,
            embedder,
            batch_size: DEFAULT_BATCH_SIZE,
            embed_timeout: DEFAULT_EMBED_TIMEOUT,
            state: RwLock::new(state),
        }
    }

    /// Number of texts sent to the embedder per call. Values below 1 are
    /// treated as 1.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Upper bound for one embedding call, in `add` and `search` alike.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.embed_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Embed `chunks` and append them, then persist.
    ///
    /// All-or-nothing: if any embedding batch fails, or the snapshot cannot
    /// be written, neither the in-memory state nor the file changes.
    pub async fn add(&self, chunks: &[Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embedded = self
                .bounded(self.embedder.embed(&texts))
                .await
                .inspect_err(|e| {
                    tracing::warn!(error = %e, "embedding failed, nothing added");
                })?;
            if embedded.len() != batch.len() {
                return Err(RagError::embedding(format!(
                    "expected {} embeddings, got {}",
                    batch.len(),
                    embedded.len()
                )));
            }
            vectors.extend(embedded);
        }

        let mut state = self.state.write().await;
        let was_empty = state.entries.is_empty();
        let dimension = if was_empty {
            vectors[0].len()
        } else {
            state.dimension
        };
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let previous_len = state.entries.len();
        let previous_dimension = state.dimension;
        let previous_model = state.model.clone();
        state.dimension = dimension;
        if was_empty {
            state.model = self.embedder.model_name().to_string();
        }
        state
            .entries
            .extend(chunks.iter().cloned().zip(vectors).map(|(chunk, vector)| Entry { chunk, vector }));

        if let Err(e) = self.persist(&state).await {
            state.entries.truncate(previous_len);
            state.dimension = previous_dimension;
            state.model = previous_model;
            return Err(e);
        }

        tracing::info!(
            added = chunks.len(),
            total = state.entries.len(),
            "chunks added to index"
        );
        Ok(())
    }

    /// Persist the current state.
    pub async fn save(&self) -> Result<()> {
        let state = self.state.write().await;
        self.persist(&state).await
    }

    /// Up to `k` chunks with similarity `>= threshold`, best first. Equal
    /// similarities keep insertion order.
    pub async fn search(&self, query: &str, k: usize, threshold: f32) -> Result<Vec<ScoredChunk>> {
        if k == 0 || self.state.read().await.entries.is_empty() {
            return Ok(Vec::new());
        }

        let query_vec = self.bounded(embed_query(self.embedder.as_ref(), query)).await?;

        let state = self.state.read().await;
        if state.entries.is_empty() {
            return Ok(Vec::new());
        }
        if query_vec.len() != state.dimension {
            return Err(RagError::DimensionMismatch {
                expected: state.dimension,
                actual: query_vec.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = state
            .entries
            .iter()
            .enumerate()
            .map(|(i, entry)| (i, similarity(&query_vec, &entry.vector)))
            .filter(|(_, s)| *s >= threshold)
            .collect();
        // sort_by is stable, so ties stay in insertion order
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, similarity)| ScoredChunk {
                chunk: state.entries[i].chunk.clone(),
                similarity,
            })
            .collect())
    }

    /// Drop every entry and persist the empty state. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        let mut state = self.state.write().await;
        let cleared = IndexState {
            model: self.embedder.model_name().to_string(),
            dimension: self.embedder.dims(),
            entries: Vec::new(),
        };
        self.persist(&cleared).await?;
        let removed = state.entries.len();
        *state = cleared;
        tracing::info!(removed, "index cleared");
        Ok(())
    }

    pub async fn stats(&self) -> IndexStats {
        let state = self.state.read().await;
        IndexStats {
            count: state.entries.len(),
            embedding_dimension: state.dimension,
        }
    }

    async fn bounded<T>(&self, call: impl std::future::Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.embed_timeout, call)
            .await
            .map_err(|_| {
                RagError::embedding(format!(
                    "no response within {}s",
                    self.embed_timeout.as_secs_f32()
                ))
            })?
    }

    /// Encode under the caller's lock, write on the blocking pool.
    async fn persist(&self, state: &IndexState) -> Result<()> {
        let bytes = encode_snapshot(state)?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&path, &bytes))
            .await
            .map_err(std::io::Error::other)?
    }
}

/// Cosine similarity clamped to `[0, 1]`.
pub fn similarity(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).clamp(0.0, 1.0)
}

fn load_snapshot(path: &Path) -> Result<IndexState> {
    let corrupt = |reason: String| RagError::IndexCorrupt {
        path: path.to_path_buf(),
        reason,
    };

    let bytes = std::fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes).map_err(|e| corrupt(e.to_string()))?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(corrupt(format!(
            "unsupported snapshot version {}",
            snapshot.version
        )));
    }

    let mut entries = Vec::with_capacity(snapshot.entries.len());
    for entry in snapshot.entries {
        let blob = STANDARD
            .decode(entry.vector.as_bytes())
            .map_err(|e| corrupt(format!("chunk {}#{}: {}", entry.chunk.source, entry.chunk.chunk_id, e)))?;
        let vector = blob_to_vec(&blob);
        if blob.len() % 4 != 0 || vector.len() != snapshot.dimension {
            return Err(corrupt(format!(
                "chunk {}#{} has {} bytes of vector data, expected dimension {}",
                entry.chunk.source,
                entry.chunk.chunk_id,
                blob.len(),
                snapshot.dimension
            )));
        }
        entries.push(Entry {
            chunk: entry.chunk,
            vector,
        });
    }

    Ok(IndexState {
        model: snapshot.model,
        dimension: snapshot.dimension,
        entries,
    })
}

fn encode_snapshot(state: &IndexState) -> Result<Vec<u8>> {
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        model: state.model.clone(),
        dimension: state.dimension,
        entries: state
            .entries
            .iter()
            .map(|e| SnapshotEntry {
                chunk: e.chunk.clone(),
                vector: STANDARD.encode(vec_to_blob(&e.vector)),
            })
            .collect(),
    };
    Ok(serde_json::to_vec(&snapshot).map_err(std::io::Error::other)?)
}

/// Write `bytes` to `<path>.tmp`, fsync, and rename over `path`.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    use std::io::Write;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    {
        let mut file = std::fs::File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
