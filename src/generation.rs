//! Generation capability abstraction and availability probes.
//!
//! A [`GenerationProvider`] turns a prompt into a [`ModelResponse`]. Chat
//! backends answer with a message object, completion backends with raw
//! text; the orchestrator flattens both with [`ModelResponse::text`].
//!
//! Implementations:
//! - **[`DisabledGenerator`]**: always fails; the pipeline runs simulated.
//! - **[`OpenAIGenerator`]**: OpenAI-compatible chat completions.
//! - **[`OllamaGenerator`]**: Ollama `/api/generate` (completion shape).
//!
//! [`BackendProbe`] combines the generation and embedding probes into the
//! single [`AvailabilityProbe`] consumed by the mode selector.

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::GenerationConfig;
use crate::embedding::{http_client, EmbeddingProvider};
use crate::error::{RagError, Result};

/// Which response shape a backend produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelResponseShape {
    Chat,
    Completion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: String,
    /// Text parts in order. Single-string chat APIs produce one part.
    pub parts: Vec<String>,
}

/// Raw backend output before normalisation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelResponse {
    Chat {
        message: ChatMessage,
        usage: TokenUsage,
    },
    Completion {
        text: String,
        usage: TokenUsage,
    },
}

impl ModelResponse {
    pub fn shape(&self) -> ModelResponseShape {
        match self {
            ModelResponse::Chat { .. } => ModelResponseShape::Chat,
            ModelResponse::Completion { .. } => ModelResponseShape::Completion,
        }
    }

    /// Plain answer text, trimmed.
    pub fn text(&self) -> String {
        match self {
            ModelResponse::Chat { message, .. } => message.parts.concat().trim().to_string(),
            ModelResponse::Completion { text, .. } => text.trim().to_string(),
        }
    }

    pub fn usage(&self) -> &TokenUsage {
        match self {
            ModelResponse::Chat { usage, .. } | ModelResponse::Completion { usage, .. } => usage,
        }
    }
}

/// Sampling parameters forwarded to the backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&GenerationConfig> for GenerationParams {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// The generation capability consumed by the orchestrator.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    fn model_name(&self) -> &str;

    /// One call, no retries. Every failure is [`RagError::GenerationUnavailable`].
    async fn generate(&self, prompt: &str) -> Result<ModelResponse>;

    /// Identity check plus capability listing. Never errors.
    async fn check_availability(&self) -> bool;
}

/// Single yes/no reachability check used to resolve the query mode.
#[async_trait]
pub trait AvailabilityProbe: Send + Sync {
    async fn check_availability(&self) -> bool;
}

/// Live only when both the generator and the embedder answer.
pub struct BackendProbe {
    generator: Arc<dyn GenerationProvider>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl BackendProbe {
    pub fn new(generator: Arc<dyn GenerationProvider>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            generator,
            embedder,
        }
    }
}

#[async_trait]
impl AvailabilityProbe for BackendProbe {
    async fn check_availability(&self) -> bool {
        if !self.generator.check_availability().await {
            tracing::warn!(model = self.generator.model_name(), "generation backend unavailable");
            return false;
        }
        if !self.embedder.check_availability().await {
            tracing::warn!(model = self.embedder.model_name(), "embedding backend unavailable");
            return false;
        }
        true
    }
}

// ============ Disabled ============

#[derive(Debug, Default)]
pub struct DisabledGenerator;

#[async_trait]
impl GenerationProvider for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<ModelResponse> {
        Err(RagError::generation("generation provider is disabled"))
    }
    async fn check_availability(&self) -> bool {
        false
    }
}

// ============ OpenAI ============

/// Chat-completions generator for OpenAI-compatible servers.
///
/// Reads `OPENAI_API_KEY` at construction; a missing key is reported by the
/// probe and by every call rather than at startup.
pub struct OpenAIGenerator {
    model: String,
    url: String,
    api_key: Option<String>,
    params: GenerationParams,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RagError::InvalidConfiguration("generation.model required for OpenAI provider".into())
        })?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            params: GenerationParams::from(config),
            client: http_client(config.timeout_secs)?,
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| RagError::generation("OPENAI_API_KEY environment variable not set"))
    }

    /// `GET /v1/models`: authenticates the key and lists the model ids it can use.
    async fn list_models(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/v1/models", self.url))
            .bearer_auth(self.api_key()?)
            .send()
            .await
            .map_err(RagError::generation)?;
        if !response.status().is_success() {
            return Err(RagError::generation(format!(
                "model listing returned {}",
                response.status()
            )));
        }
        let json: serde_json::Value = response.json().await.map_err(RagError::generation)?;
        Ok(listed_ids(&json, "data", "id"))
    }
}

#[async_trait]
impl GenerationProvider for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<ModelResponse> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
            "max_tokens": self.params.max_tokens,
            "temperature": self.params.temperature,
            "top_p": self.params.top_p,
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .bearer_auth(self.api_key()?)
            .json(&body)
            .send()
            .await
            .map_err(RagError::generation)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::generation(format!(
                "OpenAI API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(RagError::generation)?;
        parse_chat_response(&json)
    }

    async fn check_availability(&self) -> bool {
        let result = self
            .list_models()
            .await
            .map(|ids| ids.iter().any(|id| id == &self.model));
        probe_outcome(&self.model, result)
    }
}

/// `choices[0].message` → [`ModelResponse::Chat`]. `content` may be a
/// string or an array of `{ "type": "text", "text": ... }` parts.
fn parse_chat_response(json: &serde_json::Value) -> Result<ModelResponse> {
    let message = json
        .pointer("/choices/0/message")
        .ok_or_else(|| RagError::generation("invalid chat response: missing choices[0].message"))?;
    let role = message
        .get("role")
        .and_then(|r| r.as_str())
        .unwrap_or("assistant")
        .to_string();
    let parts = match message.get("content") {
        Some(serde_json::Value::String(s)) => vec![s.clone()],
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.get("text").and_then(|t| t.as_str()))
            .map(str::to_string)
            .collect(),
        _ => return Err(RagError::generation("invalid chat response: missing content")),
    };

    Ok(ModelResponse::Chat {
        message: ChatMessage { role, parts },
        usage: TokenUsage {
            prompt_tokens: json.pointer("/usage/prompt_tokens").and_then(|v| v.as_u64()),
            completion_tokens: json
                .pointer("/usage/completion_tokens")
                .and_then(|v| v.as_u64()),
        },
    })
}

// ============ Ollama ============

/// Completion-style generator using a local Ollama instance
/// (default `http://localhost:11434`).
pub struct OllamaGenerator {
    model: String,
    url: String,
    params: GenerationParams,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config.model.clone().ok_or_else(|| {
            RagError::InvalidConfiguration("generation.model required for Ollama provider".into())
        })?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            params: GenerationParams::from(config),
            client: http_client(config.timeout_secs)?,
        })
    }

    /// `GET /api/tags`: names of the locally pulled models.
    async fn list_tags(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(format!("{}/api/tags", self.url))
            .send()
            .await
            .map_err(RagError::generation)?;
        if !response.status().is_success() {
            return Err(RagError::generation(format!(
                "tag listing returned {}",
                response.status()
            )));
        }
        let json: serde_json::Value = response.json().await.map_err(RagError::generation)?;
        Ok(listed_ids(&json, "models", "name"))
    }
}

#[async_trait]
impl GenerationProvider for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<ModelResponse> {
        let body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": self.params.max_tokens,
                "temperature": self.params.temperature,
                "top_p": self.params.top_p,
            },
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.url))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::generation(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::generation(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let json: serde_json::Value = response.json().await.map_err(RagError::generation)?;
        parse_completion_response(&json)
    }

    async fn check_availability(&self) -> bool {
        let result = self
            .list_tags()
            .await
            .map(|names| names.iter().any(|name| ollama_name_matches(name, &self.model)));
        probe_outcome(&self.model, result)
    }
}

fn parse_completion_response(json: &serde_json::Value) -> Result<ModelResponse> {
    let text = json
        .get("response")
        .and_then(|r| r.as_str())
        .ok_or_else(|| RagError::generation("invalid Ollama response: missing response"))?;
    Ok(ModelResponse::Completion {
        text: text.to_string(),
        usage: TokenUsage {
            prompt_tokens: json.get("prompt_eval_count").and_then(|v| v.as_u64()),
            completion_tokens: json.get("eval_count").and_then(|v| v.as_u64()),
        },
    })
}

/// `llama3` matches `llama3` and `llama3:latest`.
fn ollama_name_matches(listed: &str, model: &str) -> bool {
    listed == model
        || listed
            .strip_prefix(model)
            .is_some_and(|rest| rest.starts_with(':'))
}

/// Create the configured [`GenerationProvider`].
///
/// | Config Value | Provider |
/// |-------------|----------|
/// | `"disabled"` | [`DisabledGenerator`] |
/// | `"openai"` | [`OpenAIGenerator`] |
/// | `"ollama"` | [`OllamaGenerator`] |
pub fn create_generator(config: &GenerationConfig) -> Result<Box<dyn GenerationProvider>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledGenerator)),
        "openai" => Ok(Box::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Box::new(OllamaGenerator::new(config)?)),
        other => Err(RagError::InvalidConfiguration(format!(
            "Unknown generation provider: {}",
            other
        ))),
    }
}

/// Collect `json[array_key][*][field]` strings.
fn listed_ids(json: &serde_json::Value, array_key: &str, field: &str) -> Vec<String> {
    json.get(array_key)
        .and_then(|a| a.as_array())
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.get(field).and_then(|v| v.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn probe_outcome(model: &str, result: Result<bool>) -> bool {
    match result {
        Ok(true) => true,
        Ok(false) => {
            tracing::warn!(model, "model not offered by generation backend");
            false
        }
        Err(e) => {
            tracing::warn!(model, error = %e, "generation probe failed");
            false
        }
    }
}
