//! SQL Drafting Oracle
//!
//! The oracle turns a prompt into draft SQL text. This crate owns prompt construction
//! ([`prompt`]) and output cleaning; the oracle only generates text.
//!
//! [`OllamaOracle`] talks to an Ollama `/api/generate` endpoint. Tests and embedders
//! supply their own [`SqlDraftingOracle`] implementations.

pub mod prompt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{QueryError, Result};

pub use prompt::{build_prompt, clean_sql_response, enhance_for_multi_table};

/// Prompt lengths (in characters) that select the drafting timeout tier
const TIMEOUT_TIERS: &[(usize, u64)] = &[(8_000, 30), (16_000, 45)];

/// Timeout for prompts beyond the last tier
const MAX_TIMEOUT_SECS: u64 = 60;

/// Drafting timeout for a prompt of `prompt_len` characters
///
/// ≤ 8 000 → 30 s, ≤ 16 000 → 45 s, otherwise 60 s.
#[must_use]
pub fn draft_timeout(prompt_len: usize) -> Duration {
    let secs = TIMEOUT_TIERS
        .iter()
        .find(|(limit, _)| prompt_len <= *limit)
        .map_or(MAX_TIMEOUT_SECS, |(_, secs)| *secs);
    Duration::from_secs(secs)
}

/// Turns a prompt into raw SQL text
#[async_trait]
pub trait SqlDraftingOracle: Send + Sync {
    /// Short name for logs and metadata
    fn name(&self) -> &str;

    /// Raw oracle output for a prompt
    ///
    /// # Errors
    /// * `DraftingFailed` on transport errors or an unusable response
    async fn draft(&self, prompt: &str) -> Result<String>;
}

/// Ollama connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleSettings {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub top_p: f32,

    /// Replaces the built-in prompt template; must contain `{schema_context}` and `{question}`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<String>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "qwen3".to_string(),
            temperature: 0.1,
            top_p: 0.9,
            prompt_template: None,
        }
    }
}

impl OracleSettings {
    /// Apply `OLLAMA_BASE_URL` and `OLLAMA_MODEL` when set
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("OLLAMA_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = url;
            }
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            if !model.trim().is_empty() {
                self.model = model;
            }
        }
        self
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Oracle backed by an Ollama server
pub struct OllamaOracle {
    client: reqwest::Client,
    settings: OracleSettings,
}

impl OllamaOracle {
    /// # Errors
    /// * `ConfigError` if the HTTP client cannot be built
    pub fn new(settings: OracleSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(MAX_TIMEOUT_SECS))
            .build()
            .map_err(|e| QueryError::config_error(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self { client, settings })
    }

    pub fn settings(&self) -> &OracleSettings {
        &self.settings
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.settings.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl SqlDraftingOracle for OllamaOracle {
    fn name(&self) -> &str {
        &self.settings.model
    }

    async fn draft(&self, prompt: &str) -> Result<String> {
        let body = GenerateRequest {
            model: &self.settings.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.settings.temperature,
                top_p: self.settings.top_p,
            },
        };

        let response = self
            .client
            .post(self.endpoint())
            .timeout(draft_timeout(prompt.len()))
            .json(&body)
            .send()
            .await
            .map_err(|e| QueryError::drafting_failed(format!("Ollama request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(QueryError::drafting_failed(format!(
                "Ollama request failed with status {status}"
            )));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| QueryError::drafting_failed(format!("Invalid Ollama response: {e}")))?;

        tracing::debug!(model = %self.settings.model, chars = parsed.response.len(), "oracle draft received");
        Ok(parsed.response)
    }
}
