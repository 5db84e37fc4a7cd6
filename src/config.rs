use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub documents: DocumentsConfig,
    pub index: IndexConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub mode: ModeConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DocumentsConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    pub path: PathBuf,
    #[serde(default)]
    pub recreate_on_corrupt: bool,
}

/// Chunk window parameters, in characters.
#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default = "default_chunk_overlap")]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            size: default_chunk_size(),
            overlap: default_chunk_overlap(),
        }
    }
}

fn default_chunk_size() -> usize {
    1000
}
fn default_chunk_overlap() -> usize {
    200
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_results: default_max_results(),
            similarity_threshold: default_similarity_threshold(),
        }
    }
}

fn default_max_results() -> usize {
    5
}
fn default_similarity_threshold() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            dims: None,
            url: None,
            batch_size: default_batch_size(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub instructions_path: Option<PathBuf>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: None,
            url: None,
            timeout_secs: default_generation_timeout_secs(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            instructions_path: None,
        }
    }
}

fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_max_tokens() -> u32 {
    2000
}
fn default_temperature() -> f32 {
    0.1
}
fn default_top_p() -> f32 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModeConfig {
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for ModeConfig {
    fn default() -> Self {
        Self {
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

fn default_probe_timeout_secs() -> u64 {
    10
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    // Validate chunking
    if config.chunking.size == 0 {
        bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        bail!(
            "chunking.overlap ({}) must be smaller than chunking.size ({})",
            config.chunking.overlap,
            config.chunking.size
        );
    }

    // Validate retrieval
    if config.retrieval.max_results < 1 {
        bail!("retrieval.max_results must be >= 1");
    }
    if !(0.0..=1.0).contains(&config.retrieval.similarity_threshold) {
        bail!("retrieval.similarity_threshold must be in [0.0, 1.0]");
    }

    // Validate embedding
    let embedding = &config.embedding;
    match embedding.provider.as_str() {
        "disabled" | "local" => {}
        "openai" | "ollama" => {
            if embedding.model.is_none() {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    embedding.provider
                );
            }
            if embedding.dims.is_none() || embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    embedding.provider
                );
            }
        }
        "hash" => {
            if embedding.dims == Some(0) {
                bail!("embedding.dims must be > 0 when provider is 'hash'");
            }
        }
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, hash, or local.",
            other
        ),
    }
    if embedding.batch_size == 0 {
        bail!("embedding.batch_size must be > 0");
    }

    // Validate generation
    let generation = &config.generation;
    match generation.provider.as_str() {
        "disabled" => {}
        "openai" | "ollama" => {
            if generation.model.is_none() {
                bail!(
                    "generation.model must be specified when provider is '{}'",
                    generation.provider
                );
            }
        }
        other => bail!(
            "Unknown generation provider: '{}'. Must be disabled, openai, or ollama.",
            other
        ),
    }
    if !(0.0..=2.0).contains(&generation.temperature) {
        bail!("generation.temperature must be in [0.0, 2.0]");
    }
    if !(0.0..=1.0).contains(&generation.top_p) {
        bail!("generation.top_p must be in [0.0, 1.0]");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
[documents]
path = "./documents"

[index]
path = "./data/index.json"
"#;

    fn parse(extra: &str) -> Result<Config> {
        let config: Config = toml::from_str(&format!("{}{}", MINIMAL, extra))?;
        validate(&config)?;
        Ok(config)
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.chunking.size, 1000);
        assert_eq!(config.chunking.overlap, 200);
        assert_eq!(config.retrieval.max_results, 5);
        assert!((config.retrieval.similarity_threshold - 0.7).abs() < f32::EPSILON);
        assert!(!config.embedding.is_enabled());
        assert_eq!(config.generation.provider, "disabled");
        assert_eq!(config.mode.probe_timeout_secs, 10);
        assert!(!config.index.recreate_on_corrupt);
    }

    #[test]
    fn overlap_must_be_smaller_than_size() {
        let err = parse("[chunking]\nsize = 100\noverlap = 100\n").unwrap_err();
        assert!(err.to_string().contains("chunking.overlap"));
    }

    #[test]
    fn threshold_out_of_range_rejected() {
        let err = parse("[retrieval]\nsimilarity_threshold = 1.5\n").unwrap_err();
        assert!(err.to_string().contains("similarity_threshold"));
    }

    #[test]
    fn openai_embedding_requires_model_and_dims() {
        let err = parse("[embedding]\nprovider = \"openai\"\n").unwrap_err();
        assert!(err.to_string().contains("embedding.model"));

        let err =
            parse("[embedding]\nprovider = \"openai\"\nmodel = \"text-embedding-3-small\"\n")
                .unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn unknown_generation_provider_rejected() {
        let err = parse("[generation]\nprovider = \"bedrock\"\n").unwrap_err();
        assert!(err.to_string().contains("Unknown generation provider"));
    }

    #[test]
    fn hash_embedding_needs_no_model() {
        let config = parse("[embedding]\nprovider = \"hash\"\ndims = 64\n").unwrap();
        assert_eq!(config.embedding.dims, Some(64));
    }
}
