//! Embedding-driven chunking: consecutive sentences stay together until the
//! cosine similarity between neighbours drops below a threshold, then the
//! resulting groups are packed into chunks between min and max size.

use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::llm::EmbeddingProvider;
use crate::models::{Chunk, ChunkMetadata};
use crate::search::vector::cosine_similarity;

use super::{split_sentences, Sentence};

pub struct SemanticChunker {
    embedder: Arc<dyn EmbeddingProvider>,
    min_chunk_size: usize,
    max_chunk_size: usize,
    similarity_threshold: f32,
    max_concurrency: usize,
}

impl SemanticChunker {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            min_chunk_size: 200,
            max_chunk_size: 1000,
            similarity_threshold: 0.7,
            max_concurrency: 4,
        }
    }

    pub fn with_sizes(mut self, min_chunk_size: usize, max_chunk_size: usize) -> Self {
        self.min_chunk_size = min_chunk_size;
        self.max_chunk_size = max_chunk_size;
        self
    }

    pub fn with_threshold(mut self, similarity_threshold: f32) -> Self {
        self.similarity_threshold = similarity_threshold;
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub async fn chunk_document(&self, content: &str, source_path: &str) -> Vec<Chunk> {
        let sentences = split_sentences(content);
        if sentences.is_empty() {
            return Vec::new();
        }

        let embeddings = self.embed_sentences(&sentences).await;
        let boundaries = find_boundaries(&embeddings, self.similarity_threshold);
        let groups = group_sentences(&sentences, &boundaries);

        self.pack(&groups)
            .into_iter()
            .enumerate()
            .map(|(i, span)| {
                Chunk::new(
                    span.text,
                    ChunkMetadata::new(span.start, span.end, i).with_source(source_path),
                )
            })
            .collect()
    }

    /// One embedding per sentence, in sentence order. A failed call yields a
    /// zero vector, which scores 0 against its neighbours and forces a split.
    async fn embed_sentences(&self, sentences: &[Sentence]) -> Vec<Vec<f32>> {
        let dims = self.embedder.dimensions();
        stream::iter(sentences.iter().map(|s| {
            let embedder = self.embedder.clone();
            async move {
                match embedder.embed(&s.text).await {
                    Ok(v) => v,
                    Err(e) => {
                        tracing::warn!("Sentence embedding failed, using zero vector: {e}");
                        vec![0.0; dims]
                    }
                }
            }
        }))
        .buffered(self.max_concurrency.max(1))
        .collect()
        .await
    }

    fn pack(&self, groups: &[Span]) -> Vec<Span> {
        let mut chunks = Vec::new();
        let mut current: Option<Span> = None;

        for group in groups {
            let group_len = group.text.chars().count();
            current = match current.take() {
                Some(cur) if cur.len() + 1 + group_len > self.max_chunk_size => {
                    chunks.push(cur);
                    Some(group.clone())
                }
                Some(cur) => Some(cur.join(group)),
                None => Some(group.clone()),
            };

            if let Some(cur) = current.take() {
                if cur.len() >= self.min_chunk_size {
                    chunks.push(cur);
                } else {
                    current = Some(cur);
                }
            }
        }

        chunks.extend(current.filter(|c| !c.text.trim().is_empty()));
        chunks
    }
}

#[derive(Debug, Clone)]
struct Span {
    text: String,
    start: usize,
    end: usize,
}

impl Span {
    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn join(mut self, next: &Span) -> Span {
        self.text.push(' ');
        self.text.push_str(&next.text);
        self.end = next.end;
        self
    }
}

/// Indices `i` where sentence `i` starts a new group.
fn find_boundaries(embeddings: &[Vec<f32>], threshold: f32) -> Vec<usize> {
    embeddings
        .windows(2)
        .enumerate()
        .filter(|(_, pair)| cosine_similarity(&pair[0], &pair[1]) < threshold)
        .map(|(i, _)| i + 1)
        .collect()
}

fn group_sentences(sentences: &[Sentence], boundaries: &[usize]) -> Vec<Span> {
    let mut cuts = Vec::with_capacity(boundaries.len() + 2);
    cuts.push(0);
    cuts.extend_from_slice(boundaries);
    cuts.push(sentences.len());

    cuts.windows(2)
        .filter(|w| w[0] < w[1])
        .map(|w| {
            let members = &sentences[w[0]..w[1]];
            Span {
                text: members
                    .iter()
                    .map(|s| s.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" "),
                start: members[0].start,
                end: members[members.len() - 1].end,
            }
        })
        .collect()
}
