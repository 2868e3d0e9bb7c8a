//! Semantic + keyword retrieval over the same collection, fused by RRF or
//! by weighted reciprocal rank.

use std::collections::HashMap;
use std::sync::Arc;

use crate::llm::EmbeddingProvider;
use crate::models::{Chunk, ScoredChunk};
use crate::search::bm25::Bm25Searcher;
use crate::search::fusion::ReciprocalRankFusion;
use crate::search::vector::semantic_search;

#[derive(Debug, Clone, Copy)]
pub enum FusionStrategy {
    Rrf(ReciprocalRankFusion),
    /// `semantic_weight / (rank + 1) + keyword_weight / (rank + 1)`
    Weighted { semantic_weight: f64, keyword_weight: f64 },
}

impl Default for FusionStrategy {
    fn default() -> Self {
        FusionStrategy::Rrf(ReciprocalRankFusion::default())
    }
}

pub struct HybridRetriever {
    embedder: Arc<dyn EmbeddingProvider>,
    keyword: Arc<Bm25Searcher>,
    fusion: FusionStrategy,
}

impl HybridRetriever {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, keyword: Arc<Bm25Searcher>, fusion: FusionStrategy) -> Self {
        Self {
            embedder,
            keyword,
            fusion,
        }
    }

    /// Both searches fetch `2 * top_k` candidates concurrently before fusion.
    pub async fn retrieve(&self, query: &str, chunks: &Arc<Vec<Chunk>>, top_k: usize) -> Vec<Chunk> {
        let fetch = top_k.saturating_mul(2);

        let semantic = semantic_search(self.embedder.as_ref(), query, chunks, fetch);
        let keyword = {
            let searcher = self.keyword.clone();
            let chunks = chunks.clone();
            let query = query.to_string();
            tokio::task::spawn_blocking(move || searcher.search(&query, &chunks, fetch))
        };

        let (semantic, keyword) = tokio::join!(semantic, keyword);
        let keyword = keyword.unwrap_or_else(|e| {
            tracing::warn!("Keyword search task failed: {e}");
            Vec::new()
        });

        tracing::debug!(
            "Hybrid search: {} semantic, {} keyword candidates",
            semantic.len(),
            keyword.len()
        );

        let semantic = strip_scores(semantic);
        let keyword = strip_scores(keyword);

        match self.fusion {
            FusionStrategy::Rrf(rrf) => rrf.fuse(&[semantic, keyword], top_k),
            FusionStrategy::Weighted {
                semantic_weight,
                keyword_weight,
            } => weighted_fusion(&semantic, &keyword, semantic_weight, keyword_weight, top_k),
        }
    }
}

fn strip_scores(scored: Vec<ScoredChunk>) -> Vec<Chunk> {
    scored.into_iter().map(|s| s.chunk).collect()
}

/// Weighted reciprocal-rank fusion. Ties keep first-seen order, semantic
/// list first.
pub fn weighted_fusion(
    semantic: &[Chunk],
    keyword: &[Chunk],
    semantic_weight: f64,
    keyword_weight: f64,
    top_k: usize,
) -> Vec<Chunk> {
    let mut order: Vec<&Chunk> = Vec::new();
    let mut scores: HashMap<String, (usize, f64)> = HashMap::new();

    for (list, weight) in [(semantic, semantic_weight), (keyword, keyword_weight)] {
        for (rank, chunk) in list.iter().enumerate() {
            let contribution = weight / (rank as f64 + 1.0);
            let next = order.len();
            let entry = scores.entry(chunk.key()).or_insert((next, 0.0));
            if entry.0 == next {
                order.push(chunk);
            }
            entry.1 += contribution;
        }
    }

    let mut ranked: Vec<(usize, f64)> = scores.into_values().collect();
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    ranked
        .into_iter()
        .take(top_k)
        .map(|(pos, _)| order[pos].clone())
        .collect()
}
