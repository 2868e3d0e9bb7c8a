//! Two-pass retrieval: a broad semantic search, LLM concept extraction from
//! its best results, then a focused search per concept.

use std::collections::HashSet;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};

use crate::llm::{parse_list_lines, sanitize_for_prompt, EmbeddingProvider, GenerationProvider, Outcome};
use crate::models::Chunk;
use crate::search::vector::semantic_search;

const MAX_CONCEPTS: usize = 5;
/// Pass-1 results shown to the concept extractor.
const CONCEPT_CONTEXT_CHUNKS: usize = 10;

pub struct MultiPassRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    pass1_top_k: usize,
    pass2_top_k: usize,
    max_concurrency: usize,
}

impl MultiPassRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, generator: Arc<dyn GenerationProvider>) -> Self {
        Self {
            embedder,
            generator,
            pass1_top_k: 20,
            pass2_top_k: 5,
            max_concurrency: 4,
        }
    }

    pub fn with_limits(mut self, pass1_top_k: usize, pass2_top_k: usize) -> Self {
        self.pass1_top_k = pass1_top_k;
        self.pass2_top_k = pass2_top_k;
        self
    }

    pub fn with_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Pass-1 chunks in their original order, then chunks first found in
    /// pass 2, truncated to `top_k`.
    pub async fn retrieve(&self, query: &str, chunks: &[Chunk], top_k: usize) -> Vec<Chunk> {
        let pass1: Vec<Chunk> = semantic_search(self.embedder.as_ref(), query, chunks, self.pass1_top_k)
            .await
            .into_iter()
            .map(|s| s.chunk)
            .collect();
        if pass1.is_empty() {
            return Vec::new();
        }

        let concepts = self
            .extract_concepts(query, &pass1)
            .await
            .into_logged("concept extraction");
        tracing::debug!("Multi-pass concepts: {:?}", concepts);

        let pass2 = self.focused_pass(&concepts, chunks).await;
        aggregate(pass1, pass2, top_k)
    }

    /// Up to five concepts; `[query]` when the provider fails or returns
    /// nothing usable.
    pub async fn extract_concepts(&self, query: &str, pass1: &[Chunk]) -> Outcome<Vec<String>> {
        let prompt = build_concept_prompt(query, pass1);
        match self.generator.generate(&prompt).await {
            Ok(response) => {
                let concepts: Vec<String> = parse_list_lines(&response)
                    .into_iter()
                    .take(MAX_CONCEPTS)
                    .collect();
                if concepts.is_empty() {
                    Outcome::fallback(vec![query.to_string()], "no concepts in response")
                } else {
                    Outcome::Fresh(concepts)
                }
            }
            Err(e) => Outcome::fallback(vec![query.to_string()], e.to_string()),
        }
    }

    async fn focused_pass(&self, concepts: &[String], chunks: &[Chunk]) -> Vec<Chunk> {
        let per_concept: Vec<Vec<Chunk>> = stream::iter(concepts.iter().map(|concept| async move {
            semantic_search(self.embedder.as_ref(), concept, chunks, self.pass2_top_k)
                .await
                .into_iter()
                .map(|s| s.chunk)
                .collect::<Vec<_>>()
        }))
        .buffered(self.max_concurrency)
        .collect()
        .await;

        let mut seen = HashSet::new();
        per_concept
            .into_iter()
            .flatten()
            .filter(|c| seen.insert(c.key()))
            .collect()
    }
}

fn build_concept_prompt(query: &str, pass1: &[Chunk]) -> String {
    let context = pass1
        .iter()
        .take(CONCEPT_CONTEXT_CHUNKS)
        .enumerate()
        .map(|(i, c)| format!("[Chunk {}]\n{}", i + 1, sanitize_for_prompt(&c.text)))
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "Given this query and the retrieved context, identify 3-5 key concepts or topics \
         that should be explored further.\n\n\
         Query: \"{}\"\n\n\
         Context:\n{context}\n\n\
         Identify 3-5 key concepts (one per line, without numbering or bullets) that would \
         help answer this query comprehensively:",
        sanitize_for_prompt(query)
    )
}

fn aggregate(pass1: Vec<Chunk>, pass2: Vec<Chunk>, top_k: usize) -> Vec<Chunk> {
    let mut seen = HashSet::new();
    pass1
        .into_iter()
        .chain(pass2)
        .filter(|c| seen.insert(c.key()))
        .take(top_k)
        .collect()
}
