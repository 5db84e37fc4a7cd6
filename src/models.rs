//! Core data models used throughout the pipeline.
//!
//! These types represent the source files, chunks, queries, and answers that
//! flow through ingestion and retrieval.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Document formats the ingestor can extract text from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Docx,
    Text,
}

impl FileType {
    /// Classify a path by its extension (case-insensitive).
    /// Returns `None` for unsupported types.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(FileType::Pdf),
            "docx" => Some(FileType::Docx),
            "txt" | "md" | "markdown" => Some(FileType::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Pdf => "pdf",
            FileType::Docx => "docx",
            FileType::Text => "text",
        }
    }
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file discovered by a directory scan.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub filename: String,
    pub file_type: FileType,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// A bounded substring of a source document.
///
/// `chunk_id` is sequential within one document's extraction pass; the
/// identity of a chunk is `(source, chunk_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub source: String,
    pub chunk_id: u32,
    pub file_type: String,
}

/// A retrieved chunk with its similarity in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub message: String,
    pub max_results: usize,
    pub similarity_threshold: f32,
}

impl QueryRequest {
    pub fn new(message: impl Into<String>, max_results: usize, similarity_threshold: f32) -> Self {
        Self {
            message: message.into(),
            max_results,
            similarity_threshold,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.message.trim().is_empty() {
            return Err(RagError::InvalidRequest("message must not be empty".into()));
        }
        if self.max_results < 1 {
            return Err(RagError::InvalidRequest("max_results must be >= 1".into()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(RagError::InvalidRequest(format!(
                "similarity_threshold must be in [0, 1], got {}",
                self.similarity_threshold
            )));
        }
        Ok(())
    }
}

/// Whether queries are answered by the real backend or the simulated responder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Simulated,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Live => "live",
            Mode::Simulated => "simulated",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token and size accounting for one generation call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_chars: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_tokens: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResult {
    pub success: bool,
    pub answer: String,
    /// Deduplicated source filenames in retrieval rank order.
    pub sources: Vec<String>,
    pub documents_used: usize,
    pub mode: Mode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

/// Read-only index introspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub count: usize,
    pub embedding_dimension: usize,
}
