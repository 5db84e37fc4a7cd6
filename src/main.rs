//! # Answer Harness CLI (`ask`)
//!
//! Ask questions about a private document folder from the terminal.
//!
//! ## Usage
//!
//! ```bash
//! ask --config ./config/ask.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ask ingest` | Chunk, embed, and index the documents directory |
//! | `ask query "<question>"` | Answer a question from the indexed documents |
//! | `ask stats` | Show chunk count, embedding dimension, and mode |
//! | `ask clear` | Empty the index |
//! | `ask probe` | Check whether the backends are reachable |
//!
//! Logs go to stderr and honour `RUST_LOG` (default `info`).

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use answer_harness::config::{self, Config};
use answer_harness::ingest::FileStatus;
use answer_harness::models::{QueryRequest, QueryResult};
use answer_harness::pipeline::{Pipeline, PipelineStats};

/// Answer Harness: grounded answers from your own documents.
#[derive(Parser)]
#[command(name = "ask", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/ask.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest every supported file in the documents directory.
    ///
    /// Supported types: `.pdf`, `.docx`, `.txt`, `.md`, `.markdown`.
    /// Other files are skipped and reported.
    Ingest {
        /// Directory to ingest instead of `[documents] path`.
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Ask a question.
    Query {
        /// The question.
        message: String,

        /// Maximum number of chunks to retrieve (default: `[retrieval] max_results`).
        #[arg(long)]
        max_results: Option<usize>,

        /// Minimum similarity in [0, 1] (default: `[retrieval] similarity_threshold`).
        #[arg(long)]
        threshold: Option<f32>,

        /// Print the full result as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Show index statistics and the resolved mode.
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Remove every chunk from the index.
    Clear,

    /// Probe the generation and embedding backends.
    Probe,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;
    let pipeline = Pipeline::bootstrap(&cfg).await?;

    match cli.command {
        Commands::Ingest { dir } => run_ingest(&pipeline, &cfg, dir).await?,
        Commands::Query {
            message,
            max_results,
            threshold,
            json,
        } => {
            let request = QueryRequest::new(
                message,
                max_results.unwrap_or(cfg.retrieval.max_results),
                threshold.unwrap_or(cfg.retrieval.similarity_threshold),
            );
            let result = pipeline.query(&request).await?;
            print_result(&result, json)?;
            if !result.success {
                bail!(
                    "query failed: {}",
                    result.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        Commands::Stats { json } => {
            let stats = pipeline.index_stats().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("Index:        {}", stats.index_path.display());
                println!("Chunks:       {}", stats.count);
                println!("Dimension:    {}", stats.embedding_dimension);
                println!("Mode:         {}", stats.mode);
                println!("Embedding:    {}", stats.embedding_model);
                println!("Generation:   {}", stats.generation_model);
                println!("Chunking:     {} / {} overlap", stats.chunk_size, stats.chunk_overlap);
                println!("Instructions: {}", instructions_line(&stats));
            }
        }
        Commands::Clear => {
            pipeline.clear().await?;
            println!("Index cleared.");
        }
        Commands::Probe => {
            let stats = pipeline.index_stats().await;
            println!("mode: {}", stats.mode);
            println!("embedding model: {}", stats.embedding_model);
            println!("generation model: {}", stats.generation_model);
            println!("instructions: {}", instructions_line(&stats));
        }
    }

    Ok(())
}

async fn run_ingest(pipeline: &Pipeline, cfg: &Config, dir: Option<PathBuf>) -> Result<()> {
    let dir = dir.unwrap_or_else(|| cfg.documents.path.clone());
    let summary = pipeline.ingest(&dir).await?;

    for file in &summary.files {
        match &file.status {
            FileStatus::Ingested { chunks } => println!("  ingested  {} ({} chunks)", file.filename, chunks),
            FileStatus::Skipped(reason) => println!("  skipped   {} ({})", file.filename, reason),
        }
    }
    println!(
        "Ingested {} chunks from {} files ({} skipped).",
        summary.chunks_processed, summary.files_ingested, summary.files_skipped
    );
    Ok(())
}

fn instructions_line(stats: &PipelineStats) -> String {
    let origin = if stats.instructions_loaded { "loaded" } else { "default" };
    format!("{} ({} chars)", origin, stats.instructions_length)
}

fn print_result(result: &QueryResult, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.answer);
    println!();
    if result.sources.is_empty() {
        println!("Sources: (none)");
    } else {
        println!("Sources:");
        for source in &result.sources {
            println!("  - {}", source);
        }
    }
    println!(
        "mode: {}  documents used: {}",
        result.mode, result.documents_used
    );
    if let Some(error) = &result.error {
        println!("error: {}", error);
    }
    Ok(())
}
