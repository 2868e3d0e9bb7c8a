//! Retrieval orchestration: one primary retrieval mode, an ordered list of
//! post-processing stages, and prompt assembly for the final answer.

use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::stream::{self, StreamExt};

use crate::chunking::HierarchyIndex;
use crate::config::RetrievalConfig;
use crate::llm::query_expand::QueryExpander;
use crate::llm::rerank::Reranker;
use crate::llm::{sanitize_for_prompt, EmbeddingProvider, GenerationProvider};
use crate::models::{Chunk, RagOptions, ScoredChunk};
use crate::search::bm25::Bm25Searcher;
use crate::search::context::ContextExpander;
use crate::search::fusion::ReciprocalRankFusion;
use crate::search::hybrid::{FusionStrategy, HybridRetriever};
use crate::search::multi_pass::MultiPassRetriever;
use crate::search::vector::semantic_search;

pub const NO_CONTEXT_RESPONSE: &str = "No relevant context found in the indexed document.";

/// Minimum candidates fetched per query variant or before reranking.
const MIN_CANDIDATES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrievalMode {
    Semantic,
    MultiQuery { variations: usize },
    Hybrid,
    MultiPass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostStage {
    Rerank,
    IncludeParents,
    ExpandContext,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievalPlan {
    pub mode: RetrievalMode,
    /// Applied in order.
    pub stages: Vec<PostStage>,
}

impl RetrievalPlan {
    /// Mode priority: multi-pass, hybrid, expanded queries, plain semantic.
    /// Reranking is dropped under multi-pass.
    pub fn from_options(options: &RagOptions, retrieval: &RetrievalConfig) -> Self {
        let mode = if options.multi_pass {
            RetrievalMode::MultiPass
        } else if options.hybrid {
            RetrievalMode::Hybrid
        } else if options.expand_queries {
            RetrievalMode::MultiQuery {
                variations: retrieval.query_variations,
            }
        } else {
            RetrievalMode::Semantic
        };

        let mut stages = Vec::new();
        if options.rerank && mode != RetrievalMode::MultiPass {
            stages.push(PostStage::Rerank);
        }
        if options.hierarchical_chunking {
            stages.push(PostStage::IncludeParents);
        }
        if options.expand_context {
            stages.push(PostStage::ExpandContext);
        }

        Self { mode, stages }
    }

    pub fn semantic() -> Self {
        Self {
            mode: RetrievalMode::Semantic,
            stages: Vec::new(),
        }
    }

    fn reranks(&self) -> bool {
        self.stages.contains(&PostStage::Rerank)
    }
}

pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    keyword: Arc<Bm25Searcher>,
    config: RetrievalConfig,
    max_concurrency: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        keyword: Arc<Bm25Searcher>,
        config: RetrievalConfig,
        max_concurrency: usize,
    ) -> Self {
        Self {
            embedder,
            generator,
            keyword,
            config,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Runs the plan's primary mode, then its post stages in order.
    pub async fn retrieve(&self, query: &str, chunks: &Arc<Vec<Chunk>>, top_k: usize, plan: &RetrievalPlan) -> Vec<Chunk> {
        let fetch = if plan.reranks() {
            top_k.saturating_mul(2).max(MIN_CANDIDATES)
        } else {
            top_k
        };

        let mut results = self.primary(query, chunks, fetch, plan.mode).await;
        tracing::debug!("{:?} retrieval returned {} chunks", plan.mode, results.len());

        for stage in &plan.stages {
            results = match stage {
                PostStage::Rerank => {
                    let mut reranked = Reranker::new(self.generator.clone(), self.max_concurrency)
                        .rerank(query, results)
                        .await;
                    reranked.truncate(top_k);
                    reranked
                }
                PostStage::IncludeParents => HierarchyIndex::new(chunks).include_parents(results),
                PostStage::ExpandContext => {
                    ContextExpander::new(self.config.context_window)
                        .with_concurrency(self.max_concurrency)
                        .expand_chunks(&results)
                        .await
                }
            };
        }

        results
    }

    async fn primary(&self, query: &str, chunks: &Arc<Vec<Chunk>>, top_k: usize, mode: RetrievalMode) -> Vec<Chunk> {
        match mode {
            RetrievalMode::Semantic => semantic_search(self.embedder.as_ref(), query, chunks, top_k)
                .await
                .into_iter()
                .map(|s| s.chunk)
                .collect(),
            RetrievalMode::MultiQuery { variations } => {
                self.multi_query(query, chunks, top_k, variations).await
            }
            RetrievalMode::Hybrid => {
                let fusion = if self.config.use_rrf {
                    FusionStrategy::Rrf(ReciprocalRankFusion::new(self.config.rrf_k))
                } else {
                    FusionStrategy::Weighted {
                        semantic_weight: self.config.semantic_weight,
                        keyword_weight: self.config.keyword_weight,
                    }
                };
                HybridRetriever::new(self.embedder.clone(), self.keyword.clone(), fusion)
                    .retrieve(query, chunks, top_k)
                    .await
            }
            RetrievalMode::MultiPass => {
                MultiPassRetriever::new(self.embedder.clone(), self.generator.clone())
                    .with_limits(self.config.pass1_top_k, self.config.pass2_top_k)
                    .with_concurrency(self.max_concurrency)
                    .retrieve(query, chunks, top_k)
                    .await
            }
        }
    }

    /// One semantic search per query variant, fused by RRF.
    async fn multi_query(&self, query: &str, chunks: &[Chunk], top_k: usize, variations: usize) -> Vec<Chunk> {
        let queries = QueryExpander::new(variations)
            .expand(self.generator.as_ref(), query)
            .await
            .into_logged("query expansion");
        let per_variant = top_k.saturating_mul(2).max(MIN_CANDIDATES);

        let lists: Vec<Vec<ScoredChunk>> = stream::iter(
            queries
                .iter()
                .map(|q| semantic_search(self.embedder.as_ref(), q, chunks, per_variant)),
        )
        .buffered(self.max_concurrency)
        .collect()
        .await;

        let rrf = ReciprocalRankFusion::new(self.config.rrf_k);
        if self.config.similarity_fusion {
            return rrf
                .fuse_with_similarities(&lists, top_k)
                .into_iter()
                .map(|s| s.chunk)
                .collect();
        }
        let lists: Vec<Vec<Chunk>> = lists
            .into_iter()
            .map(|l| l.into_iter().map(|s| s.chunk).collect())
            .collect();
        rrf.fuse(&lists, top_k)
    }

    /// Retrieves, then asks the generation provider once. An empty
    /// retrieval returns `NO_CONTEXT_RESPONSE` without a provider call.
    pub async fn answer(&self, query: &str, chunks: &Arc<Vec<Chunk>>, top_k: usize, plan: &RetrievalPlan) -> Result<String> {
        self.answer_with_context(query, chunks, top_k, plan)
            .await
            .map(|(_, answer)| answer)
    }

    /// Like `answer`, also returning the chunks the answer was built from.
    pub async fn answer_with_context(
        &self,
        query: &str,
        chunks: &Arc<Vec<Chunk>>,
        top_k: usize,
        plan: &RetrievalPlan,
    ) -> Result<(Vec<Chunk>, String)> {
        let retrieved = self.retrieve(query, chunks, top_k, plan).await;
        if retrieved.is_empty() {
            return Ok((retrieved, NO_CONTEXT_RESPONSE.to_string()));
        }

        tracing::info!("Answering from {} chunks", retrieved.len());
        let prompt = build_answer_prompt(query, &retrieved);
        let answer = self
            .generator
            .generate(&prompt)
            .await
            .context("Failed to generate answer")?;
        Ok((retrieved, answer))
    }
}

/// `[Context i]`, an optional `[Source: …]` line, then the chunk text;
/// blocks separated by a blank line.
pub fn build_context_block(chunks: &[Chunk]) -> String {
    let mut context = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            context.push_str("\n\n");
        }
        context.push_str(&format!("[Context {}]", i + 1));
        let source = chunk
            .metadata
            .source_file
            .as_deref()
            .or(chunk.metadata.source_path.as_deref());
        if let Some(source) = source {
            context.push_str(&format!("\n[Source: {source}]"));
        }
        context.push('\n');
        context.push_str(&sanitize_for_prompt(&chunk.text));
    }
    context
}

pub fn build_answer_prompt(query: &str, chunks: &[Chunk]) -> String {
    format!(
        "Based on the following context, answer the question. If the context doesn't contain \
         enough information, say so.\n\n\
         Context:\n{}\n\n\
         Question: {}\n\n\
         Answer:",
        build_context_block(chunks),
        sanitize_for_prompt(query)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::HierarchicalChunker;
    use crate::llm::mock::{FailingProvider, HashEmbedder, ScriptedGenerator};
    use crate::models::ChunkMetadata;

    fn embedded(embedder: &HashEmbedder, chunks: Vec<Chunk>) -> Arc<Vec<Chunk>> {
        Arc::new(
            chunks
                .into_iter()
                .map(|mut c| {
                    c.embedding = embedder.vector(&c.text);
                    c
                })
                .collect(),
        )
    }

    fn corpus(embedder: &HashEmbedder) -> Arc<Vec<Chunk>> {
        let texts = [
            "rust ownership moves values",
            "borrowing lets code reference values",
            "sourdough bread needs starter",
            "tokio drives async tasks",
        ];
        embedded(
            embedder,
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| Chunk::new(*t, ChunkMetadata::new(i * 40, i * 40 + 30, i).with_source("notes.md")))
                .collect(),
        )
    }

    fn retriever(generator: Arc<dyn GenerationProvider>) -> Retriever {
        Retriever::new(
            Arc::new(HashEmbedder::new(256)),
            generator,
            Arc::new(Bm25Searcher::default()),
            RetrievalConfig::default(),
            2,
        )
    }

    #[test]
    fn test_plan_mode_priority() {
        let retrieval = RetrievalConfig::default();
        let all = RagOptions {
            multi_pass: true,
            hybrid: true,
            expand_queries: true,
            rerank: true,
            ..RagOptions::default()
        };
        let plan = RetrievalPlan::from_options(&all, &retrieval);
        assert_eq!(plan.mode, RetrievalMode::MultiPass);
        assert!(plan.stages.is_empty());

        let hybrid = RagOptions {
            hybrid: true,
            expand_queries: true,
            ..RagOptions::default()
        };
        assert_eq!(RetrievalPlan::from_options(&hybrid, &retrieval).mode, RetrievalMode::Hybrid);

        let expand = RagOptions {
            expand_queries: true,
            ..RagOptions::default()
        };
        assert_eq!(
            RetrievalPlan::from_options(&expand, &retrieval).mode,
            RetrievalMode::MultiQuery { variations: 3 }
        );
        assert_eq!(
            RetrievalPlan::from_options(&RagOptions::default(), &retrieval),
            RetrievalPlan::semantic()
        );
    }

    #[test]
    fn test_plan_stage_order_is_fixed() {
        let options = RagOptions {
            rerank: true,
            expand_context: true,
            hierarchical_chunking: true,
            ..RagOptions::default()
        };
        let plan = RetrievalPlan::from_options(&options, &RetrievalConfig::default());
        assert_eq!(
            plan.stages,
            vec![PostStage::Rerank, PostStage::IncludeParents, PostStage::ExpandContext]
        );
    }

    #[test]
    fn test_context_block_format() {
        let mut with_source = Chunk::new("alpha", ChunkMetadata::new(0, 5, 0).with_source("/a/b.md"));
        with_source.metadata.source_file = Some("b.md".into());
        let anonymous = Chunk::new("beta", ChunkMetadata::new(5, 9, 1));
        assert_eq!(
            build_context_block(&[with_source, anonymous]),
            "[Context 1]\n[Source: b.md]\nalpha\n\n[Context 2]\nbeta"
        );
    }

    #[test]
    fn test_answer_prompt_template() {
        let prompt = build_answer_prompt("why?", &[Chunk::new("because", ChunkMetadata::new(0, 7, 0))]);
        assert!(prompt.starts_with("Based on the following context, answer the question."));
        assert!(prompt.contains("Context:\n[Context 1]\nbecause\n\nQuestion: why?\n\nAnswer:"));
    }

    #[tokio::test]
    async fn test_semantic_retrieval_top_k() {
        let embedder = HashEmbedder::new(256);
        let chunks = corpus(&embedder);
        let r = retriever(Arc::new(ScriptedGenerator::constant("")));
        let out = r.retrieve("tokio async tasks", &chunks, 1, &RetrievalPlan::semantic()).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].metadata.chunk_index, 3);
    }

    #[tokio::test]
    async fn test_multi_query_with_failing_expansion_still_retrieves() {
        let embedder = HashEmbedder::new(256);
        let chunks = corpus(&embedder);
        let r = retriever(Arc::new(FailingProvider::new(1)));
        let plan = RetrievalPlan {
            mode: RetrievalMode::MultiQuery { variations: 3 },
            stages: Vec::new(),
        };
        let out = r.retrieve("sourdough bread", &chunks, 2, &plan).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].metadata.chunk_index, 2);
    }

    #[tokio::test]
    async fn test_rerank_stage_reorders_and_truncates() {
        let embedder = HashEmbedder::new(256);
        let chunks = corpus(&embedder);
        let gen = Arc::new(ScriptedGenerator::new(|p| {
            Ok(if p.contains("sourdough") { "0.99".to_string() } else { "0.1".to_string() })
        }));
        let r = retriever(gen);
        let plan = RetrievalPlan {
            mode: RetrievalMode::Semantic,
            stages: vec![PostStage::Rerank],
        };
        let out = r.retrieve("rust ownership", &chunks, 2, &plan).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].metadata.chunk_index, 2);
    }

    #[tokio::test]
    async fn test_include_parents_stage() {
        let text = "Ownership rules govern memory. ".repeat(60);
        let embedder = HashEmbedder::new(256);
        // Parents get a zero vector so the top hit is always a child
        let chunks: Vec<Chunk> = embedded(&embedder, HierarchicalChunker::default().chunk_document(&text, "doc.md"))
            .iter()
            .cloned()
            .map(|mut c| {
                if c.metadata.is_parent {
                    c.embedding = vec![0.0; 256];
                }
                c
            })
            .collect();
        let chunks = Arc::new(chunks);
        let r = retriever(Arc::new(ScriptedGenerator::constant("")));

        let without = r.retrieve("ownership memory", &chunks, 1, &RetrievalPlan::semantic()).await;
        assert_eq!(without.len(), 1);
        assert!(without[0].metadata.is_child);

        let plan = RetrievalPlan {
            mode: RetrievalMode::Semantic,
            stages: vec![PostStage::IncludeParents],
        };
        let out = r.retrieve("ownership memory", &chunks, 1, &plan).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0], without[0]);
        assert!(out[1].metadata.is_parent);
        assert_eq!(out[0].metadata.parent_id.as_deref(), Some(out[1].key().as_str()));
    }

    #[tokio::test]
    async fn test_multi_query_similarity_fusion() {
        let embedder = HashEmbedder::new(256);
        let chunks = corpus(&embedder);
        let r = Retriever::new(
            Arc::new(HashEmbedder::new(256)),
            Arc::new(ScriptedGenerator::constant("1. sourdough starter bread\n2. bread starter")),
            Arc::new(Bm25Searcher::default()),
            RetrievalConfig {
                similarity_fusion: true,
                ..RetrievalConfig::default()
            },
            2,
        );
        let plan = RetrievalPlan {
            mode: RetrievalMode::MultiQuery { variations: 3 },
            stages: Vec::new(),
        };
        let out = r.retrieve("sourdough bread", &chunks, 2, &plan).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].metadata.chunk_index, 2);
    }

    #[tokio::test]
    async fn test_answer_empty_store_skips_generation() {
        let gen = Arc::new(ScriptedGenerator::constant("should not be called"));
        let r = retriever(gen.clone());
        let empty = Arc::new(Vec::new());
        let answer = r.answer("q", &empty, 3, &RetrievalPlan::semantic()).await.unwrap();
        assert_eq!(answer, NO_CONTEXT_RESPONSE);
        assert_eq!(gen.calls(), 0);
    }

    #[tokio::test]
    async fn test_answer_generation_failure_surfaces() {
        let embedder = HashEmbedder::new(256);
        let chunks = corpus(&embedder);
        let r = retriever(Arc::new(FailingProvider::new(1)));
        assert!(r.answer("rust", &chunks, 2, &RetrievalPlan::semantic()).await.is_err());
    }

    #[tokio::test]
    async fn test_answer_sends_context_prompt() {
        let embedder = HashEmbedder::new(256);
        let chunks = corpus(&embedder);
        let gen = Arc::new(ScriptedGenerator::new(|p| {
            assert!(p.contains("[Source: notes.md]"));
            assert!(p.contains("Question: tokio tasks"));
            Ok("Tokio runs tasks.".to_string())
        }));
        let r = retriever(gen.clone());
        let answer = r.answer("tokio tasks", &chunks, 2, &RetrievalPlan::semantic()).await.unwrap();
        assert_eq!(answer, "Tokio runs tasks.");
        assert_eq!(gen.calls(), 1);
    }

    #[tokio::test]
    async fn test_answer_with_context_returns_prompted_chunks() {
        let embedder = HashEmbedder::new(256);
        let chunks = corpus(&embedder);
        let r = retriever(Arc::new(ScriptedGenerator::constant("Bread needs starter.")));
        let (used, answer) = r
            .answer_with_context("sourdough starter", &chunks, 1, &RetrievalPlan::semantic())
            .await
            .unwrap();
        assert_eq!(answer, "Bread needs starter.");
        assert_eq!(used.len(), 1);
        assert_eq!(used[0].metadata.chunk_index, 2);

        let empty = Arc::new(Vec::new());
        let (none, sentinel) = r
            .answer_with_context("q", &empty, 3, &RetrievalPlan::semantic())
            .await
            .unwrap();
        assert!(none.is_empty());
        assert_eq!(sentinel, NO_CONTEXT_RESPONSE);
    }
}
