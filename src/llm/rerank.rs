use std::sync::{Arc, LazyLock};

use regex::Regex;
use tokio::sync::Semaphore;

use crate::models::{Chunk, ScoredChunk};

use super::{sanitize_for_prompt, GenerationProvider, Outcome};

/// Score used when a chunk cannot be judged.
pub const NEUTRAL_SCORE: f32 = 0.5;

/// Chars of chunk text shown to the judge.
const MAX_JUDGED_CHARS: usize = 2_000;

static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?|\.\d+").unwrap());

/// Reorders chunks by a per-chunk LLM relevance judgment in [0, 1].
pub struct Reranker {
    provider: Arc<dyn GenerationProvider>,
    semaphore: Arc<Semaphore>,
}

impl Reranker {
    pub fn new(provider: Arc<dyn GenerationProvider>, max_concurrency: usize) -> Self {
        Self {
            provider,
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
        }
    }

    /// Same chunks, highest score first; equal scores keep their input
    /// order. Zero or one chunk is returned as is without a provider call.
    pub async fn rerank(&self, query: &str, chunks: Vec<Chunk>) -> Vec<Chunk> {
        if chunks.len() <= 1 {
            return chunks;
        }

        let scores = self.score_all(query, &chunks).await;
        let mut scored: Vec<ScoredChunk> = chunks
            .into_iter()
            .zip(scores)
            .map(|(chunk, score)| ScoredChunk { chunk, score })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.into_iter().map(|s| s.chunk).collect()
    }

    /// One score per chunk, in input order.
    pub async fn score_all(&self, query: &str, chunks: &[Chunk]) -> Vec<f32> {
        let mut handles = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let provider = self.provider.clone();
            let sem = self.semaphore.clone();
            let prompt = build_relevance_prompt(query, &chunk.text);

            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await;
                score_prompt(provider.as_ref(), &prompt).await
            }));
        }

        let mut scores = Vec::with_capacity(handles.len());
        for handle in handles {
            let outcome = handle
                .await
                .unwrap_or_else(|e| Outcome::fallback(NEUTRAL_SCORE, e.to_string()));
            scores.push(outcome.into_logged("relevance scoring"));
        }
        scores
    }
}

async fn score_prompt(provider: &dyn GenerationProvider, prompt: &str) -> Outcome<f32> {
    match provider.generate(prompt).await {
        Ok(response) => match parse_relevance_score(&response) {
            Some(score) => Outcome::Fresh(score),
            None => Outcome::fallback(
                NEUTRAL_SCORE,
                format!("no score in response {response:?}"),
            ),
        },
        Err(e) => Outcome::fallback(NEUTRAL_SCORE, e.to_string()),
    }
}

fn build_relevance_prompt(query: &str, text: &str) -> String {
    let snippet: String = text.chars().take(MAX_JUDGED_CHARS).collect();
    format!(
        "Rate the relevance of this chunk to the query on a scale of 0.0 to 1.0, where:\n\
         - 1.0 = Perfectly relevant, directly answers the query\n\
         - 0.7-0.9 = Highly relevant, contains important information\n\
         - 0.4-0.6 = Somewhat relevant, tangentially related\n\
         - 0.1-0.3 = Low relevance, minimal connection\n\
         - 0.0 = Not relevant at all\n\n\
         Query: \"{}\"\n\n\
         Chunk:\n{}\n\n\
         Respond with ONLY a number between 0.0 and 1.0 (e.g., 0.85):",
        sanitize_for_prompt(query),
        sanitize_for_prompt(&snippet)
    )
}

/// First number in the response, clamped to [0, 1].
pub fn parse_relevance_score(response: &str) -> Option<f32> {
    let m = SCORE_RE.find(response)?;
    let score: f32 = m.as_str().parse().ok()?;
    Some(score.clamp(0.0, 1.0))
}
