//! Directory ingestion: scan → extract → chunk → tag.
//!
//! [`DocumentIngestor::ingest_directory`] walks one directory (non-recursive),
//! extracts text from every supported file, splits it with the configured
//! [`Chunker`], and tags each chunk with its source filename, sequential
//! chunk id, and file type. One bad file never aborts the batch: unsupported
//! types, extraction failures, and empty documents are logged and reported
//! as skipped.

use std::path::Path;

use chrono::{DateTime, Utc};
use walkdir::WalkDir;

use crate::chunk::Chunker;
use crate::error::{RagError, Result};
use crate::extract;
use crate::models::{Chunk, FileType, SourceFile};

/// Why a file contributed no chunks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    UnsupportedType,
    EmptyText,
    ExtractionFailed(String),
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::UnsupportedType => f.write_str("unsupported file type"),
            SkipReason::EmptyText => f.write_str("no text extracted"),
            SkipReason::ExtractionFailed(e) => write!(f, "extraction failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileStatus {
    Ingested { chunks: usize },
    Skipped(SkipReason),
}

/// Per-file result of one ingestion pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileOutcome {
    pub filename: String,
    pub status: FileStatus,
}

/// All chunks produced by one pass plus a report line per file.
#[derive(Debug, Clone, Default)]
pub struct Ingestion {
    pub chunks: Vec<Chunk>,
    pub files: Vec<FileOutcome>,
}

impl Ingestion {
    pub fn files_ingested(&self) -> usize {
        self.files
            .iter()
            .filter(|f| matches!(f.status, FileStatus::Ingested { .. }))
            .count()
    }

    pub fn files_skipped(&self) -> usize {
        self.files.len() - self.files_ingested()
    }
}

#[derive(Debug, Clone)]
pub struct DocumentIngestor {
    chunker: Chunker,
}

impl DocumentIngestor {
    pub fn new(chunker: Chunker) -> Self {
        Self { chunker }
    }

    pub fn chunker(&self) -> &Chunker {
        &self.chunker
    }

    /// Ingest every regular file directly inside `dir`, in filename order.
    /// Symlinks to files are followed.
    ///
    /// Fails only with [`RagError::DirectoryNotFound`] (or an I/O error
    /// while listing the directory).
    pub fn ingest_directory(&self, dir: &Path) -> Result<Ingestion> {
        if !dir.is_dir() {
            return Err(RagError::DirectoryNotFound(dir.to_path_buf()));
        }

        let mut entries = Vec::new();
        let walker = WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|e| {
                RagError::Io(
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                )
            })?;
            // links are followed; dangling ones stay listed and get reported below
            let is_file = if entry.path_is_symlink() {
                std::fs::metadata(entry.path()).map_or(true, |m| m.is_file())
            } else {
                entry.file_type().is_file()
            };
            if is_file {
                entries.push(entry.into_path());
            }
        }

        let mut ingestion = Ingestion::default();
        for path in entries {
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();

            let status = match scan_file(&path) {
                Ok(Some(file)) => {
                    let status = self.ingest_file(&file, &mut ingestion.chunks);
                    match &status {
                        FileStatus::Ingested { chunks } => {
                            tracing::info!(file = %filename, chunks, "document processed")
                        }
                        FileStatus::Skipped(reason) => {
                            tracing::warn!(file = %filename, %reason, "skipping document")
                        }
                    }
                    status
                }
                Ok(None) => {
                    tracing::info!(file = %filename, "skipping unsupported file type");
                    FileStatus::Skipped(SkipReason::UnsupportedType)
                }
                Err(e) => {
                    tracing::warn!(file = %filename, error = %e, "skipping unreadable document");
                    FileStatus::Skipped(SkipReason::ExtractionFailed(e.to_string()))
                }
            };
            ingestion.files.push(FileOutcome { filename, status });
        }

        tracing::info!(
            dir = %dir.display(),
            chunks = ingestion.chunks.len(),
            files = ingestion.files_ingested(),
            skipped = ingestion.files_skipped(),
            "directory ingested"
        );
        Ok(ingestion)
    }

    /// Extract and chunk one file, appending its chunks to `out`.
    pub fn ingest_file(&self, file: &SourceFile, out: &mut Vec<Chunk>) -> FileStatus {
        let text = match extract::extract_file(&file.path, file.file_type) {
            Ok(text) => text,
            Err(e) => return FileStatus::Skipped(SkipReason::ExtractionFailed(e.to_string())),
        };
        if text.trim().is_empty() {
            return FileStatus::Skipped(SkipReason::EmptyText);
        }

        let before = out.len();
        let pieces = self
            .chunker
            .split(&text)
            .filter(|piece| !piece.trim().is_empty());
        for (chunk_id, piece) in (0u32..).zip(pieces) {
            out.push(Chunk {
                content: piece.to_string(),
                source: file.filename.clone(),
                chunk_id,
                file_type: file.file_type.to_string(),
            });
        }
        FileStatus::Ingested {
            chunks: out.len() - before,
        }
    }
}

/// Stat a path and classify it. `None` for unsupported file types.
pub fn scan_file(path: &Path) -> Result<Option<SourceFile>> {
    let Some(file_type) = FileType::from_path(path) else {
        return Ok(None);
    };
    let metadata = std::fs::metadata(path)?;
    let modified: DateTime<Utc> = metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or_default();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(Some(SourceFile {
        path: path.to_path_buf(),
        filename,
        file_type,
        size: metadata.len(),
        modified,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use tracing_test::traced_test;

    fn ingestor(size: usize, overlap: usize) -> DocumentIngestor {
        DocumentIngestor::new(Chunker::new(size, overlap).unwrap())
    }

    #[traced_test]
    #[test]
    fn unsupported_files_are_skipped_not_fatal() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("data.csv"), "a,b,c\n1,2,3\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "Paris is the capital of France.").unwrap();

        let ingestion = ingestor(1000, 200).ingest_directory(tmp.path()).unwrap();

        assert_eq!(ingestion.chunks.len(), 1);
        assert!(ingestion.chunks.iter().all(|c| c.source == "notes.txt"));
        assert_eq!(ingestion.chunks[0].file_type, "text");
        assert_eq!(
            ingestion.files[0],
            FileOutcome {
                filename: "data.csv".to_string(),
                status: FileStatus::Skipped(SkipReason::UnsupportedType),
            }
        );
        assert!(logs_contain("skipping unsupported file type"));
    }

    #[test]
    fn chunk_ids_are_sequential_per_file() {
        let tmp = TempDir::new().unwrap();
        let long = "word ".repeat(60);
        fs::write(tmp.path().join("a.txt"), &long).unwrap();
        fs::write(tmp.path().join("b.md"), &long).unwrap();

        let ingestion = ingestor(50, 10).ingest_directory(tmp.path()).unwrap();

        for source in ["a.txt", "b.md"] {
            let ids: Vec<u32> = ingestion
                .chunks
                .iter()
                .filter(|c| c.source == source)
                .map(|c| c.chunk_id)
                .collect();
            assert!(ids.len() > 1);
            assert_eq!(ids, (0..ids.len() as u32).collect::<Vec<_>>());
        }
    }

    #[test]
    fn whitespace_only_file_reported_as_empty() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("blank.txt"), "   \n\n\t  ").unwrap();

        let ingestion = ingestor(100, 10).ingest_directory(tmp.path()).unwrap();

        assert!(ingestion.chunks.is_empty());
        assert_eq!(
            ingestion.files[0].status,
            FileStatus::Skipped(SkipReason::EmptyText)
        );
        assert_eq!(ingestion.files_skipped(), 1);
    }

    #[test]
    fn broken_docx_is_skipped() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("broken.docx"), "not a zip archive").unwrap();
        fs::write(tmp.path().join("ok.txt"), "still ingested").unwrap();

        let ingestion = ingestor(100, 10).ingest_directory(tmp.path()).unwrap();

        assert!(matches!(
            ingestion.files[0].status,
            FileStatus::Skipped(SkipReason::ExtractionFailed(_))
        ));
        assert_eq!(ingestion.files_ingested(), 1);
        assert_eq!(ingestion.chunks[0].content, "still ingested");
    }

    #[test]
    fn subdirectories_are_not_walked() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir(tmp.path().join("nested")).unwrap();
        fs::write(tmp.path().join("nested").join("deep.txt"), "hidden").unwrap();

        let ingestion = ingestor(100, 10).ingest_directory(tmp.path()).unwrap();
        assert!(ingestion.chunks.is_empty());
        assert!(ingestion.files.is_empty());
    }

    #[cfg(unix)]
    #[traced_test]
    #[test]
    fn symlinked_files_are_followed_and_dangling_links_reported() {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        let target = tmp.path().join("real.txt");
        fs::write(&target, "Linked text about Lisbon.").unwrap();
        std::os::unix::fs::symlink(&target, docs.join("notes.txt")).unwrap();
        std::os::unix::fs::symlink(tmp.path().join("gone.txt"), docs.join("stale.txt")).unwrap();
        std::os::unix::fs::symlink(tmp.path(), docs.join("parent")).unwrap();

        let ingestion = ingestor(100, 10).ingest_directory(&docs).unwrap();

        assert_eq!(ingestion.files.len(), 2);
        assert_eq!(ingestion.files[0].filename, "notes.txt");
        assert_eq!(ingestion.files[0].status, FileStatus::Ingested { chunks: 1 });
        assert_eq!(ingestion.chunks[0].content, "Linked text about Lisbon.");
        assert_eq!(ingestion.files[1].filename, "stale.txt");
        assert!(matches!(
            ingestion.files[1].status,
            FileStatus::Skipped(SkipReason::ExtractionFailed(_))
        ));
        assert!(logs_contain("skipping unreadable document"));
    }

    #[test]
    fn missing_directory_is_reported() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("nope");
        let err = ingestor(100, 10).ingest_directory(&missing).unwrap_err();
        assert!(matches!(err, RagError::DirectoryNotFound(p) if p == missing));
    }
}
