use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

use super::{authorize, ProviderKind};

/// Maximum bytes of text sent per input to the embedding API. Long inputs
/// are cut on a char boundary; nomic-embed-text tops out around 8k tokens.
const MAX_EMBED_CHARS: usize = 3_000;

fn truncate_for_embedding(text: &str) -> &str {
    if text.len() <= MAX_EMBED_CHARS {
        return text;
    }
    let mut end = MAX_EMBED_CHARS;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

/// Embeds `texts` in provider-sized batches. Output order matches input.
pub async fn embed_batch(
    client: &reqwest::Client,
    config: &LlmConfig,
    kind: ProviderKind,
    texts: &[String],
) -> Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }

    let batch_size = match kind {
        ProviderKind::Ollama => 32,
        ProviderKind::OpenAi => 64,
    };

    let mut all = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size) {
        let input: Vec<String> = batch
            .iter()
            .map(|t| truncate_for_embedding(t).to_string())
            .collect();
        let vectors = match kind {
            ProviderKind::Ollama => request_ollama(client, config, input).await?,
            ProviderKind::OpenAi => request_openai(client, config, input).await?,
        };
        if vectors.len() != batch.len() {
            anyhow::bail!(
                "{} embed API returned {} vectors for {} inputs",
                kind.label(),
                vectors.len(),
                batch.len()
            );
        }
        all.extend(vectors);
    }

    tracing::debug!("Embedded {} texts via {}", texts.len(), kind.label());
    Ok(all)
}

pub async fn embed_single(
    client: &reqwest::Client,
    config: &LlmConfig,
    kind: ProviderKind,
    text: &str,
) -> Result<Vec<f32>> {
    embed_batch(client, config, kind, &[text.to_string()])
        .await?
        .into_iter()
        .next()
        .context("No embedding returned")
}

async fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
    client: &reqwest::Client,
    config: &LlmConfig,
    kind: ProviderKind,
    url: String,
    req: &Req,
) -> Result<Resp> {
    let resp = authorize(client.post(&url), config)
        .json(req)
        .send()
        .await
        .with_context(|| format!("Failed to call {} embed API", kind.label()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        anyhow::bail!("{} embed API returned {status}: {body}", kind.label());
    }

    resp.json()
        .await
        .with_context(|| format!("Failed to parse {} embed response", kind.label()))
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
    truncate: bool,
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

async fn request_ollama(
    client: &reqwest::Client,
    config: &LlmConfig,
    input: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    let req = OllamaEmbedRequest {
        model: &config.embedding_model,
        input,
        truncate: true,
    };
    let url = format!("{}/api/embed", config.base_url.trim_end_matches('/'));
    let body: OllamaEmbedResponse =
        post_json(client, config, ProviderKind::Ollama, url, &req).await?;
    Ok(body.embeddings)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiEmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct OpenAiEmbedResponse {
    data: Vec<OpenAiEmbedData>,
}

#[derive(Deserialize)]
struct OpenAiEmbedData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

async fn request_openai(
    client: &reqwest::Client,
    config: &LlmConfig,
    input: Vec<String>,
) -> Result<Vec<Vec<f32>>> {
    let req = OpenAiEmbedRequest {
        model: &config.embedding_model,
        input,
    };
    let url = format!("{}/v1/embeddings", config.base_url.trim_end_matches('/'));
    let mut body: OpenAiEmbedResponse =
        post_json(client, config, ProviderKind::OpenAi, url, &req).await?;
    body.data.sort_by_key(|d| d.index);
    Ok(body.data.into_iter().map(|d| d.embedding).collect())
}
