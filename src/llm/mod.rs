//! Provider boundary: embedding and generation traits, the HTTP client that
//! implements both for Ollama and OpenAI-compatible servers, and the
//! LLM-assisted retrieval helpers built on top of them.

pub mod embeddings;
pub mod generate;
pub mod mock;
pub mod query_expand;
pub mod rerank;

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;

use crate::config::LlmConfig;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Same length and order as `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize;
}

#[async_trait]
pub trait GenerationProvider: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Result of a best-effort stage: the fresh value, or the fallback used
/// after a provider failure together with the reason.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<T> {
    Fresh(T),
    Fallback { value: T, reason: String },
}

impl<T> Outcome<T> {
    pub fn fallback(value: T, reason: impl Into<String>) -> Self {
        Outcome::Fallback {
            value,
            reason: reason.into(),
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Outcome::Fallback { .. })
    }

    pub fn value(&self) -> &T {
        match self {
            Outcome::Fresh(v) | Outcome::Fallback { value: v, .. } => v,
        }
    }

    pub fn into_value(self) -> T {
        match self {
            Outcome::Fresh(v) | Outcome::Fallback { value: v, .. } => v,
        }
    }

    /// Unwraps the value, logging the reason if `stage` fell back.
    pub fn into_logged(self, stage: &str) -> T {
        if let Outcome::Fallback { reason, .. } = &self {
            tracing::warn!("{stage} failed, using fallback: {reason}");
        }
        self.into_value()
    }
}

// ─── HTTP client ─────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Ollama,
    OpenAi,
}

impl ProviderKind {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        match config.provider.as_str() {
            "ollama" => Ok(ProviderKind::Ollama),
            "openai" => Ok(ProviderKind::OpenAi),
            other => anyhow::bail!("Unknown LLM provider: {other}"),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProviderKind::Ollama => "Ollama",
            ProviderKind::OpenAi => "OpenAI",
        }
    }
}

/// Talks to a local Ollama or an OpenAI-compatible endpoint.
pub struct LlmClient {
    client: reqwest::Client,
    config: LlmConfig,
    kind: ProviderKind,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Result<Self> {
        let kind = ProviderKind::from_config(&config)?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            config,
            kind,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }
}

#[async_trait]
impl EmbeddingProvider for LlmClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        embeddings::embed_single(&self.client, &self.config, self.kind, text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        embeddings::embed_batch(&self.client, &self.config, self.kind, texts).await
    }

    fn dimensions(&self) -> usize {
        self.config.embedding_dim
    }
}

#[async_trait]
impl GenerationProvider for LlmClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        generate::generate(&self.client, &self.config, self.kind, prompt).await
    }
}

pub(crate) fn authorize(req: reqwest::RequestBuilder, config: &LlmConfig) -> reqwest::RequestBuilder {
    match config.api_key.as_deref() {
        Some(key) if !key.is_empty() => req.header("Authorization", format!("Bearer {key}")),
        _ => req,
    }
}

// ─── Prompt helpers ──────────────────────────────────────

/// Strip chat-template control tokens from untrusted text before it is
/// interpolated into a prompt.
pub fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|im_start|>", "")
        .replace("<|im_end|>", "")
        .replace("<|endoftext|>", "")
}

static LIST_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:[-*•+]\s+|\d+\s*[.):]\s*|(?i:variation|query|concept)\s*\d*\s*[:.)-]\s*)")
        .unwrap()
});

/// Non-empty lines of an LLM response with list numbering, bullets and
/// surrounding quotes removed.
pub(crate) fn parse_list_lines(response: &str) -> Vec<String> {
    response
        .lines()
        .map(|line| {
            let stripped = LIST_MARKER.replace(line.trim(), "");
            stripped
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '`')
                .trim()
                .to_string()
        })
        .filter(|line| !line.is_empty())
        .collect()
}
