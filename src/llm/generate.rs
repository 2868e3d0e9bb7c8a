//! Single-shot, non-streaming text generation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;

use super::{authorize, ProviderKind};

pub async fn generate(
    client: &reqwest::Client,
    config: &LlmConfig,
    kind: ProviderKind,
    prompt: &str,
) -> Result<String> {
    let content = match kind {
        ProviderKind::Ollama => generate_ollama(client, config, prompt).await?,
        ProviderKind::OpenAi => generate_openai(client, config, prompt).await?,
    };
    Ok(content.trim().to_string())
}

#[derive(Serialize, Deserialize)]
struct Message {
    role: String,
    content: String,
}

impl Message {
    fn user(content: &str) -> Self {
        Self {
            role: "user".to_string(),
            content: content.to_string(),
        }
    }
}

async fn check_status(resp: reqwest::Response, kind: ProviderKind) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    anyhow::bail!("{} chat API returned {status}: {body}", kind.label())
}

// ─── Ollama ──────────────────────────────────────────────

#[derive(Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
}

#[derive(Deserialize)]
struct OllamaChatResponse {
    message: Message,
}

async fn generate_ollama(client: &reqwest::Client, config: &LlmConfig, prompt: &str) -> Result<String> {
    let url = format!("{}/api/chat", config.base_url.trim_end_matches('/'));
    let req = OllamaChatRequest {
        model: &config.chat_model,
        messages: vec![Message::user(prompt)],
        stream: false,
    };

    let resp = authorize(client.post(&url), config)
        .json(&req)
        .send()
        .await
        .context("Failed to call Ollama chat API")?;
    let body: OllamaChatResponse = check_status(resp, ProviderKind::Ollama)
        .await?
        .json()
        .await
        .context("Failed to parse Ollama chat response")?;
    Ok(body.message.content)
}

// ─── OpenAI-compatible ───────────────────────────────────

#[derive(Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
}

#[derive(Deserialize)]
struct OpenAiChatResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

async fn generate_openai(client: &reqwest::Client, config: &LlmConfig, prompt: &str) -> Result<String> {
    let url = format!("{}/v1/chat/completions", config.base_url.trim_end_matches('/'));
    let req = OpenAiChatRequest {
        model: &config.chat_model,
        messages: vec![Message::user(prompt)],
        temperature: 0.3,
    };

    let resp = authorize(client.post(&url), config)
        .json(&req)
        .send()
        .await
        .context("Failed to call OpenAI chat API")?;
    let body: OpenAiChatResponse = check_status(resp, ProviderKind::OpenAi)
        .await?
        .json()
        .await
        .context("Failed to parse OpenAI chat response")?;

    body.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .context("OpenAI chat API returned no choices")
}
