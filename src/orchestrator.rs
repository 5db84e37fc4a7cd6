//! Query orchestration: retrieve, build a grounded prompt, generate.
//!
//! A query moves through [`QueryStage`]s:
//!
//! ```text
//! Validated ─▶ Retrieved ─▶ Prompted ─▶ Generated ─▶ Completed
//!     │                                     │
//!     └──────────────▶ Failed ◀─────────────┘
//! ```
//!
//! Nothing is retried. Invalid requests are returned as
//! [`RagError::InvalidRequest`]; backend failures become a
//! [`QueryResult`] with `success = false`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, TokenUsage};
use crate::index::EmbeddingIndex;
use crate::models::{Mode, QueryRequest, QueryResult, ScoredChunk, Usage};

/// Used when no instructions file is configured or it cannot be read.
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant specialised in answering questions about the user's documents.";

/// Rendered in place of the context block when retrieval found nothing.
pub const NO_CONTEXT_MARKER: &str = "No relevant documents found.";

const DIRECTIVES: &str = "\
- Answer using only the information in the document context above.
- Cite the source filenames whenever you use information from them.
- If the context contains no relevant information, say so explicitly.";

const GENERATION_FAILED_ANSWER: &str =
    "The answer could not be generated because the language model is unavailable. Please try again later.";

const RETRIEVAL_FAILED_ANSWER: &str =
    "The documents could not be searched because the embedding service is unavailable. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryStage {
    Validated,
    Retrieved,
    Prompted,
    Generated,
    Completed,
    Failed,
}

/// Normalised output of one generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generated {
    pub text: String,
    pub usage: TokenUsage,
}

/// Instruction template and whether it came from the configured file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instructions {
    pub text: String,
    /// `false` when [`DEFAULT_INSTRUCTIONS`] is in use.
    pub from_file: bool,
}

impl Instructions {
    pub fn default_template() -> Self {
        Self {
            text: DEFAULT_INSTRUCTIONS.to_string(),
            from_file: false,
        }
    }
}

impl From<&str> for Instructions {
    fn from(text: &str) -> Self {
        Self {
            text: text.to_string(),
            from_file: false,
        }
    }
}

/// Read the instruction template, falling back to [`DEFAULT_INSTRUCTIONS`].
pub fn load_instructions(path: Option<&Path>) -> Instructions {
    let Some(path) = path else {
        return Instructions::default_template();
    };
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            tracing::info!(path = %path.display(), chars = text.len(), "loaded agent instructions");
            Instructions {
                text,
                from_file: true,
            }
        }
        Ok(_) => {
            tracing::warn!(path = %path.display(), "instructions file is empty, using defaults");
            Instructions::default_template()
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read instructions, using defaults");
            Instructions::default_template()
        }
    }
}

/// Render ranked chunks as numbered blocks, or [`NO_CONTEXT_MARKER`].
pub fn build_context(ranked: &[ScoredChunk]) -> String {
    if ranked.is_empty() {
        return NO_CONTEXT_MARKER.to_string();
    }

    let mut parts = vec!["=== DOCUMENT CONTEXT ===\n".to_string()];
    for (i, scored) in ranked.iter().enumerate() {
        parts.push(format!("[DOCUMENT {}]", i + 1));
        parts.push(format!("Source: {}", scored.chunk.source));
        parts.push(format!("Chunk: {}", scored.chunk.chunk_id));
        parts.push(format!("Relevance: {:.2}", scored.similarity));
        parts.push(format!("Content:\n{}", scored.chunk.content));
        parts.push("-".repeat(50));
    }
    parts.join("\n")
}

/// Instructions, context, question, then the grounding directives.
pub fn build_prompt(instructions: &str, context: &str, user_message: &str) -> String {
    format!(
        "{}\n\n{}\n\n=== USER QUESTION ===\n{}\n\n=== DIRECTIVES ===\n{}\n\nAnswer:",
        instructions.trim(),
        context,
        user_message.trim(),
        DIRECTIVES
    )
}

/// Source filenames in rank order, first appearance wins.
pub fn unique_sources(ranked: &[ScoredChunk]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for scored in ranked {
        if !sources.iter().any(|s| s == &scored.chunk.source) {
            sources.push(scored.chunk.source.clone());
        }
    }
    sources
}

pub struct QueryOrchestrator {
    index: Arc<EmbeddingIndex>,
    generator: Arc<dyn GenerationProvider>,
    instructions: Instructions,
    timeout: Duration,
}

impl QueryOrchestrator {
    pub fn new(
        index: Arc<EmbeddingIndex>,
        generator: Arc<dyn GenerationProvider>,
        instructions: impl Into<Instructions>,
    ) -> Self {
        Self {
            index,
            generator,
            instructions: instructions.into(),
            timeout: Duration::from_secs(60),
        }
    }

    /// Upper bound for one generation call.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn index(&self) -> &Arc<EmbeddingIndex> {
        &self.index
    }

    pub fn generator(&self) -> &Arc<dyn GenerationProvider> {
        &self.generator
    }

    pub fn instructions(&self) -> &Instructions {
        &self.instructions
    }

    /// Call the generator once and flatten its response to text.
    pub async fn invoke(&self, prompt: &str) -> Result<Generated> {
        let response = tokio::time::timeout(self.timeout, self.generator.generate(prompt))
            .await
            .map_err(|_| {
                RagError::generation(format!(
                    "no response within {}s",
                    self.timeout.as_secs_f32()
                ))
            })??;

        tracing::debug!(shape = ?response.shape(), "model responded");
        let text = response.text();
        if text.is_empty() {
            return Err(RagError::generation("model returned an empty answer"));
        }
        Ok(Generated {
            text,
            usage: response.usage().clone(),
        })
    }

    pub async fn answer(&self, request: &QueryRequest) -> Result<QueryResult> {
        request.validate().inspect_err(|e| {
            tracing::debug!(stage = ?QueryStage::Failed, error = %e, "query rejected");
        })?;
        tracing::debug!(stage = ?QueryStage::Validated, "query accepted");

        let ranked = match self
            .index
            .search(
                &request.message,
                request.max_results,
                request.similarity_threshold,
            )
            .await
        {
            Ok(ranked) => ranked,
            Err(e) if e.is_backend_unavailable() => {
                tracing::warn!(stage = ?QueryStage::Failed, error = %e, "retrieval failed");
                return Ok(self.failed(RETRIEVAL_FAILED_ANSWER, &e, Vec::new(), 0, None));
            }
            Err(e) => return Err(e),
        };
        tracing::debug!(stage = ?QueryStage::Retrieved, documents = ranked.len());

        let context = build_context(&ranked);
        let prompt = build_prompt(&self.instructions.text, &context, &request.message);
        let prompt_chars = prompt.chars().count();
        tracing::debug!(stage = ?QueryStage::Prompted, prompt_chars);

        let sources = unique_sources(&ranked);
        let generated = match self.invoke(&prompt).await {
            Ok(generated) => generated,
            Err(e) => {
                tracing::warn!(stage = ?QueryStage::Failed, error = %e, "generation failed");
                let usage = Usage {
                    prompt_chars,
                    ..Usage::default()
                };
                return Ok(self.failed(GENERATION_FAILED_ANSWER, &e, sources, ranked.len(), Some(usage)));
            }
        };
        tracing::debug!(stage = ?QueryStage::Generated, answer_chars = generated.text.len());

        let result = QueryResult {
            success: true,
            answer: generated.text,
            sources,
            documents_used: ranked.len(),
            mode: Mode::Live,
            error: None,
            model: Some(self.generator.model_name().to_string()),
            usage: Some(Usage {
                prompt_chars,
                prompt_tokens: generated.usage.prompt_tokens,
                completion_tokens: generated.usage.completion_tokens,
            }),
        };
        tracing::debug!(stage = ?QueryStage::Completed, sources = result.sources.len());
        Ok(result)
    }

    fn failed(
        &self,
        answer: &str,
        error: &RagError,
        sources: Vec<String>,
        documents_used: usize,
        usage: Option<Usage>,
    ) -> QueryResult {
        QueryResult {
            success: false,
            answer: answer.to_string(),
            sources,
            documents_used,
            mode: Mode::Live,
            error: Some(error.to_string()),
            model: Some(self.generator.model_name().to_string()),
            usage,
        }
    }
}
