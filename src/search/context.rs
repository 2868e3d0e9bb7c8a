//! Sentence-window context expansion for retrieved chunks.

use std::path::Path;

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};

use crate::chunking::{split_sentences, Sentence};
use crate::llm::Outcome;
use crate::models::Chunk;

pub const DEFAULT_WINDOW: usize = 2;

#[derive(Debug, Clone, Copy)]
pub struct ContextExpander {
    window: usize,
    max_concurrency: usize,
}

impl Default for ContextExpander {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl ContextExpander {
    /// `window` sentences are added on each side of the chunk.
    pub fn new(window: usize) -> Self {
        Self {
            window,
            max_concurrency: 4,
        }
    }

    /// Source files read at once by `expand_chunks`.
    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// A new chunk covering the sentences that overlap the original span
    /// plus the window. Any failure returns the original chunk.
    pub async fn expand_chunk(&self, chunk: &Chunk) -> Chunk {
        let outcome = match self.try_expand(chunk).await {
            Ok(expanded) => Outcome::Fresh(expanded),
            Err(e) => Outcome::fallback(chunk.clone(), format!("{e:#}")),
        };
        outcome.into_logged("context expansion")
    }

    /// Expands chunks with at most `max_concurrency` reads in flight,
    /// preserving order.
    pub async fn expand_chunks(&self, chunks: &[Chunk]) -> Vec<Chunk> {
        stream::iter(chunks.iter().map(|c| self.expand_chunk(c)))
            .buffered(self.max_concurrency)
            .collect()
            .await
    }

    async fn try_expand(&self, chunk: &Chunk) -> Result<Chunk> {
        let path = chunk
            .metadata
            .source()
            .context("chunk has no source path")?;
        let document = tokio::fs::read_to_string(Path::new(path))
            .await
            .with_context(|| format!("failed to read {path}"))?;

        let sentences = split_sentences(&document);
        let (first, last) = overlapping_range(&sentences, chunk.metadata.start_index, chunk.metadata.end_index)
            .context("chunk span matches no sentence in the source")?;

        let from = first.saturating_sub(self.window);
        let to = (last + self.window).min(sentences.len() - 1);
        let span = &sentences[from..=to];

        let mut expanded = chunk.clone();
        expanded.text = span
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");
        expanded.metadata.start_index = span[0].start;
        expanded.metadata.end_index = span[span.len() - 1].end;
        Ok(expanded)
    }
}

/// Indices of the first and last sentences overlapping `[start, end)`.
fn overlapping_range(sentences: &[Sentence], start: usize, end: usize) -> Option<(usize, usize)> {
    let first = sentences.iter().position(|s| s.end > start)?;
    let last = sentences.iter().rposition(|s| s.start < end)?;
    (first <= last).then_some((first, last))
}
