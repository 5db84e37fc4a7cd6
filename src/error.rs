//! Error taxonomy for the retrieval pipeline.
//!
//! Ingestion- and index-level failures are returned to the direct caller.
//! Backend failures (`EmbeddingUnavailable`, `GenerationUnavailable`) are
//! degraded to unsuccessful [`QueryResult`](crate::models::QueryResult)s by
//! the query path, and converted into a durable [`Mode`](crate::models::Mode)
//! decision by the [`ModeSelector`](crate::mode::ModeSelector).

use std::path::PathBuf;

/// Result type used throughout the library.
pub type Result<T> = std::result::Result<T, RagError>;

/// All failure conditions surfaced by the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// Bad chunking or provider parameters.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Empty or malformed query.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A snapshot exists but cannot be decoded.
    #[error("index snapshot at {path} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    /// The embedding capability failed, timed out, or is not configured.
    #[error("embedding backend unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// The generation capability failed, timed out, or is not configured.
    #[error("generation backend unavailable: {0}")]
    GenerationUnavailable(String),

    /// The ingestion target does not exist or is not a directory.
    #[error("directory not found: {0}")]
    DirectoryNotFound(PathBuf),

    /// A vector's length does not match the index dimension.
    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The snapshot was built by a different embedding model.
    #[error("embedding model mismatch: index was built with '{expected}', embedder is '{actual}'")]
    ModelMismatch { expected: String, actual: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// True for failures of the network-bound capabilities.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingUnavailable(_) | RagError::GenerationUnavailable(_)
        )
    }

    pub(crate) fn embedding<E: std::fmt::Display>(e: E) -> Self {
        RagError::EmbeddingUnavailable(e.to_string())
    }

    pub(crate) fn generation<E: std::fmt::Display>(e: E) -> Self {
        RagError::GenerationUnavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_errors_are_classified() {
        assert!(RagError::embedding("timeout").is_backend_unavailable());
        assert!(RagError::generation("403").is_backend_unavailable());
        assert!(!RagError::InvalidRequest("empty".into()).is_backend_unavailable());
        assert!(!RagError::DirectoryNotFound("/nope".into()).is_backend_unavailable());
    }

    #[test]
    fn messages_name_the_failure() {
        let err = RagError::IndexCorrupt {
            path: "/tmp/index.json".into(),
            reason: "expected value".into(),
        };
        assert_eq!(
            err.to_string(),
            "index snapshot at /tmp/index.json is corrupt: expected value"
        );
        let err = RagError::DimensionMismatch {
            expected: 3,
            actual: 4,
        };
        assert!(err.to_string().contains("index has 3, got 4"));
        let err = RagError::ModelMismatch {
            expected: "hash-384".into(),
            actual: "nomic".into(),
        };
        assert!(err.to_string().contains("built with 'hash-384', embedder is 'nomic'"));
    }
}
