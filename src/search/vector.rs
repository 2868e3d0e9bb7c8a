use crate::llm::EmbeddingProvider;
use crate::models::{Chunk, ScoredChunk};

/// Cosine similarity; 0.0 for mismatched lengths, empty or zero vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Top `limit` chunks by similarity to `query_embedding`, best first.
/// Equal scores keep collection order.
pub fn rank_by_similarity(query_embedding: &[f32], chunks: &[Chunk], limit: usize) -> Vec<ScoredChunk> {
    let mut scored: Vec<(f32, &Chunk)> = chunks
        .iter()
        .map(|c| (cosine_similarity(query_embedding, &c.embedding), c))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);

    scored
        .into_iter()
        .map(|(score, chunk)| ScoredChunk {
            chunk: chunk.clone(),
            score,
        })
        .collect()
}

/// Embeds the query and ranks the collection. A failed embedding call
/// yields no results.
pub async fn semantic_search(
    embedder: &dyn EmbeddingProvider,
    query: &str,
    chunks: &[Chunk],
    limit: usize,
) -> Vec<ScoredChunk> {
    if chunks.is_empty() || limit == 0 {
        return Vec::new();
    }
    match embedder.embed(query).await {
        Ok(embedding) => rank_by_similarity(&embedding, chunks, limit),
        Err(e) => {
            tracing::warn!("Query embedding failed, semantic results empty: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{FailingProvider, HashEmbedder};
    use crate::models::ChunkMetadata;

    fn chunk(i: usize, embedding: Vec<f32>) -> Chunk {
        let mut c = Chunk::new(format!("chunk {i}"), ChunkMetadata::new(i, i + 1, i));
        c.embedding = embedding;
        c
    }

    #[test]
    fn test_cosine_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_opposite() {
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_degenerate_inputs() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_rank_orders_and_truncates() {
        let chunks = vec![
            chunk(0, vec![0.0, 1.0]),
            chunk(1, vec![1.0, 0.0]),
            chunk(2, vec![0.7, 0.7]),
        ];
        let ranked = rank_by_similarity(&[1.0, 0.0], &chunks, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].chunk.metadata.chunk_index, 1);
        assert_eq!(ranked[1].chunk.metadata.chunk_index, 2);
    }

    #[test]
    fn test_rank_ties_keep_collection_order() {
        let chunks: Vec<Chunk> = (0..4).map(|i| chunk(i, vec![1.0, 1.0])).collect();
        let ranked = rank_by_similarity(&[1.0, 1.0], &chunks, 4);
        let order: Vec<usize> = ranked.iter().map(|s| s.chunk.metadata.chunk_index).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn test_semantic_search_embed_failure_is_empty() {
        let chunks = vec![chunk(0, vec![1.0])];
        let out = semantic_search(&FailingProvider::new(1), "q", &chunks, 5).await;
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_semantic_search_uses_query_embedding() {
        let embedder = HashEmbedder::new(128);
        let chunks = vec![
            chunk(0, embedder.vector("bread baking")),
            chunk(1, embedder.vector("rust borrow checker")),
        ];
        let out = semantic_search(&embedder, "borrow checker", &chunks, 1).await;
        assert_eq!(out[0].chunk.metadata.chunk_index, 1);
    }
}
