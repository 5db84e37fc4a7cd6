//! # Answer Harness
//!
//! Retrieval-augmented question answering over a private document folder.
//!
//! Documents are extracted, split into overlapping chunks, embedded, and kept
//! in a persistent vector index. A question retrieves the closest chunks,
//! which are rendered into a grounded prompt for a generative model. When the
//! model backend is unreachable the pipeline answers in a deterministic
//! simulated mode instead of failing.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────┐   ┌────────────────┐
//! │ documents │──▶│ ingest   │──▶│ EmbeddingIndex │
//! │ pdf/docx/ │   │ + chunk  │   │ (JSON snapshot)│
//! │ txt/md    │   └──────────┘   └───────┬────────┘
//! └───────────┘                          │ search
//!                                        ▼
//!                 ┌──────────────┐  ┌───────────────────┐
//!   question ───▶ │ ModeSelector │─▶│ QueryOrchestrator │──▶ generation
//!                 └──────────────┘  └───────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`chunk`] | Overlapping text chunking |
//! | [`extract`] | PDF / DOCX / text extraction |
//! | [`ingest`] | Directory ingestion |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Persistent vector index |
//! | [`generation`] | Generation providers and availability probes |
//! | [`orchestrator`] | Context and prompt building, answer assembly |
//! | [`mode`] | Live / simulated mode selection |
//! | [`pipeline`] | Outward `ingest` / `query` / `index_stats` interface |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extract;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod mode;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
