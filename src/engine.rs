use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::chunking::{FixedSizeChunker, HierarchicalChunker, MetadataExtractor, SemanticChunker};
use crate::collect::collect_files;
use crate::config::Config;
use crate::error::RagError;
use crate::llm::{EmbeddingProvider, GenerationProvider, LlmClient};
use crate::models::{Chunk, RagOptions};
use crate::search::bm25::Bm25Searcher;
use crate::search::pipeline::{RetrievalPlan, Retriever};
use crate::store::{StoreFormat, VectorStore};

pub const DEFAULT_TOP_K: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub files: Vec<String>,
    pub chunks: usize,
    /// The store already covered every collected file.
    pub skipped: bool,
    pub store_path: PathBuf,
}

/// Entry point tying the chunkers, the persisted stores and the retrieval
/// pipeline together.
pub struct RagEngine {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    keyword: Arc<Bm25Searcher>,
    json_store: VectorStore,
    binary_store: VectorStore,
}

impl RagEngine {
    /// Engine backed by the HTTP provider named in `config.llm`.
    pub fn from_config(config: Config) -> Result<Self> {
        let client = Arc::new(LlmClient::new(config.llm.clone())?);
        let embedder: Arc<dyn EmbeddingProvider> = client.clone();
        let generator: Arc<dyn GenerationProvider> = client;
        Ok(Self::with_providers(config, embedder, generator))
    }

    pub fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Self {
        let keyword = Arc::new(Bm25Searcher::new(
            config.retrieval.bm25_k1,
            config.retrieval.bm25_b,
        ));
        let json_store = VectorStore::in_dir(&config.store_dir, StoreFormat::Json);
        let binary_store = VectorStore::in_dir(&config.store_dir, StoreFormat::Binary);

        Self {
            config,
            embedder,
            generator,
            keyword,
            json_store,
            binary_store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn generator(&self) -> Arc<dyn GenerationProvider> {
        self.generator.clone()
    }

    pub fn store(&self, format: StoreFormat) -> &VectorStore {
        match format {
            StoreFormat::Json => &self.json_store,
            StoreFormat::Binary => &self.binary_store,
        }
    }

    // ─── Indexing ───

    /// Collects, chunks, optionally enriches, embeds and saves every
    /// supported file under `paths`. Skips all work when the selected store
    /// already records every collected file.
    pub async fn index<P: AsRef<Path>>(&self, paths: &[P], options: &RagOptions) -> Result<IndexReport> {
        let files = collect_files(paths)?;
        let file_paths: Vec<String> = files.iter().map(|f| f.path_string()).collect();
        let store = self.store(StoreFormat::from_json_flag(options.json));

        if store.exists_for_document(&file_paths) {
            tracing::info!("Store already covers {} file(s), skipping indexing", file_paths.len());
            return Ok(IndexReport {
                chunks: store.chunks().map(|c| c.len()).unwrap_or(0),
                files: file_paths,
                skipped: true,
                store_path: store.path().to_path_buf(),
            });
        }

        if store.format() == StoreFormat::Binary && (options.enrich_metadata || options.hierarchical_chunking) {
            tracing::warn!("Binary store does not persist enrichment or hierarchy metadata; use the JSON store to keep them");
        }

        let mut chunks = Vec::new();
        for path in &file_paths {
            let content = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read {path}"))?;
            let mut doc_chunks = self.chunk_document(&content, path, options).await?;
            if options.enrich_metadata {
                doc_chunks = self.extractor().enrich(doc_chunks, &content, path).await;
            }
            tracing::debug!("{path}: {} chunks", doc_chunks.len());
            chunks.extend(doc_chunks);
        }

        self.embed_chunks(&mut chunks).await?;

        let count = chunks.len();
        store.save(chunks, &file_paths)?;
        self.keyword.invalidate();

        tracing::info!("Indexed {} chunks from {} file(s)", count, file_paths.len());
        Ok(IndexReport {
            files: file_paths,
            chunks: count,
            skipped: false,
            store_path: store.path().to_path_buf(),
        })
    }

    /// Hierarchical wins over semantic, semantic over fixed-size.
    async fn chunk_document(&self, content: &str, path: &str, options: &RagOptions) -> Result<Vec<Chunk>> {
        let cfg = &self.config.chunking;
        let chunks = if options.hierarchical_chunking {
            HierarchicalChunker::new(
                cfg.child_chunk_size,
                cfg.child_overlap,
                cfg.parent_chunk_size,
                cfg.parent_overlap,
            )?
            .chunk_document(content, path)
        } else if options.semantic_chunking {
            SemanticChunker::new(self.embedder.clone())
                .with_sizes(cfg.min_chunk_size, cfg.max_chunk_size)
                .with_threshold(cfg.similarity_threshold)
                .with_concurrency(self.config.max_concurrency)
                .chunk_document(content, path)
                .await
        } else {
            FixedSizeChunker::new(cfg.chunk_size, cfg.chunk_overlap)?.chunk_document(content, path)
        };
        Ok(chunks)
    }

    fn extractor(&self) -> MetadataExtractor {
        MetadataExtractor::with_llm(self.generator.clone(), self.config.max_concurrency)
    }

    async fn embed_chunks(&self, chunks: &mut [Chunk]) -> Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed chunks")?;
        if embeddings.len() != chunks.len() {
            bail!(
                "Embedding provider returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            );
        }
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = embedding;
        }
        Ok(())
    }

    // ─── Querying ───

    /// Chunks of the selected store, loading it from disk on first use.
    pub fn loaded_chunks(&self, format: StoreFormat) -> Result<Arc<Vec<Chunk>>, RagError> {
        let store = self.store(format);
        if !store.is_loaded() && !store.load() {
            return Err(RagError::StoreNotLoaded);
        }
        store.chunks()
    }

    /// Store to query. `json` forces the JSON store; otherwise the binary
    /// store is preferred when present, then the JSON store.
    pub fn query_format(&self, options: &RagOptions) -> StoreFormat {
        if options.json {
            return StoreFormat::Json;
        }
        let present = |format: StoreFormat| {
            let store = self.store(format);
            store.is_loaded() || store.path().exists()
        };
        if !present(StoreFormat::Binary) && present(StoreFormat::Json) {
            tracing::debug!("No binary store, querying the JSON store");
            StoreFormat::Json
        } else {
            StoreFormat::Binary
        }
    }

    fn retriever(&self) -> Retriever {
        Retriever::new(
            self.embedder.clone(),
            self.generator.clone(),
            self.keyword.clone(),
            self.config.retrieval.clone(),
            self.config.max_concurrency,
        )
    }

    /// Retrieved chunks only, without answer generation.
    pub async fn retrieve(&self, text: &str, top_k: usize, options: &RagOptions) -> Result<Vec<Chunk>> {
        let chunks = self.loaded_chunks(self.query_format(options))?;
        let plan = RetrievalPlan::from_options(options, &self.config.retrieval);
        Ok(self.retriever().retrieve(text, &chunks, top_k, &plan).await)
    }

    /// Answers `text` from the store picked by `query_format`.
    pub async fn query(&self, text: &str, top_k: usize, options: &RagOptions) -> Result<String> {
        let chunks = self.loaded_chunks(self.query_format(options))?;
        let plan = RetrievalPlan::from_options(options, &self.config.retrieval);
        tracing::info!("Query plan: {:?} with stages {:?}", plan.mode, plan.stages);
        self.retriever().answer(text, &chunks, top_k, &plan).await
    }

    /// The answer together with the chunks its prompt was built from.
    pub async fn query_with_context(
        &self,
        text: &str,
        top_k: usize,
        options: &RagOptions,
    ) -> Result<(Vec<Chunk>, String)> {
        let chunks = self.loaded_chunks(self.query_format(options))?;
        let plan = RetrievalPlan::from_options(options, &self.config.retrieval);
        self.retriever()
            .answer_with_context(text, &chunks, top_k, &plan)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::{FailingProvider, HashEmbedder, ScriptedGenerator};

    fn engine(store_dir: &Path, generator: Arc<dyn GenerationProvider>) -> RagEngine {
        let config = Config {
            store_dir: store_dir.to_path_buf(),
            ..Config::default()
        };
        RagEngine::with_providers(config, Arc::new(HashEmbedder::new(128)), generator)
    }

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_query_before_index_is_not_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(dir.path(), Arc::new(ScriptedGenerator::constant("x")));
        let err = e.query("q", 3, &RagOptions::default()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RagError>(), Some(RagError::StoreNotLoaded)));
    }

    #[tokio::test]
    async fn test_index_embeds_and_saves() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = write(docs.path(), "a.txt", &"Tokio schedules tasks. ".repeat(40));

        let e = engine(store.path(), Arc::new(ScriptedGenerator::constant("x")));
        let report = e.index(&[&file], &RagOptions::default()).await.unwrap();
        assert!(!report.skipped);
        assert!(report.chunks > 1);
        assert!(report.store_path.ends_with("vector-store.bin"));

        let chunks = e.loaded_chunks(StoreFormat::Binary).unwrap();
        assert_eq!(chunks.len(), report.chunks);
        assert!(chunks.iter().all(|c| c.embedding.len() == 128));
    }

    #[tokio::test]
    async fn test_reindex_same_paths_is_skipped() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        write(docs.path(), "a.md", "# Title\n\nSome text about ownership.");
        let options = RagOptions {
            json: true,
            ..RagOptions::default()
        };

        let first = engine(store.path(), Arc::new(ScriptedGenerator::constant("x")));
        assert!(!first.index(&[docs.path()], &options).await.unwrap().skipped);

        let embedder = Arc::new(HashEmbedder::new(128));
        let second = RagEngine::with_providers(
            Config {
                store_dir: store.path().to_path_buf(),
                ..Config::default()
            },
            embedder.clone(),
            Arc::new(ScriptedGenerator::constant("x")),
        );
        let report = second.index(&[docs.path()], &options).await.unwrap();
        assert!(report.skipped);
        assert_eq!(report.chunks, 1);
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_embedding_failure_fails_indexing() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let file = write(docs.path(), "a.txt", "Some content here.");
        let e = RagEngine::with_providers(
            Config {
                store_dir: store.path().to_path_buf(),
                ..Config::default()
            },
            Arc::new(FailingProvider::new(8)),
            Arc::new(FailingProvider::new(8)),
        );
        assert!(e.index(&[file], &RagOptions::default()).await.is_err());
        assert!(!store.path().join("vector-store.bin").exists());
    }

    #[tokio::test]
    async fn test_hierarchical_enriched_index_in_json() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        let text = format!("# Guide\n\n{}", "Borrowing rules keep references valid. ".repeat(50));
        let file = write(docs.path(), "guide.md", &text);
        let options = RagOptions {
            json: true,
            hierarchical_chunking: true,
            enrich_metadata: true,
            ..RagOptions::default()
        };

        let e = engine(store.path(), Arc::new(ScriptedGenerator::constant("low")));
        e.index(&[file], &options).await.unwrap();

        let reopened = engine(store.path(), Arc::new(ScriptedGenerator::constant("x")));
        let chunks = reopened.loaded_chunks(StoreFormat::Json).unwrap();
        assert!(chunks.iter().any(|c| c.metadata.is_parent));
        assert!(chunks.iter().any(|c| c.metadata.is_child));
        assert!(chunks.iter().all(|c| c.metadata.document_type.as_deref() == Some("markdown")));
        assert!(chunks.iter().all(|c| c.metadata.source_file.as_deref() == Some("guide.md")));
    }

    #[tokio::test]
    async fn test_query_without_flag_reads_json_only_index() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        write(docs.path(), "bread.txt", "Sourdough needs a lively starter.");
        let json = RagOptions {
            json: true,
            ..RagOptions::default()
        };
        engine(store.path(), Arc::new(ScriptedGenerator::constant("x")))
            .index(&[docs.path()], &json)
            .await
            .unwrap();

        let reopened = engine(store.path(), Arc::new(ScriptedGenerator::constant("x")));
        assert_eq!(reopened.query_format(&RagOptions::default()), StoreFormat::Json);
        let chunks = reopened.retrieve("starter", 1, &RagOptions::default()).await.unwrap();
        assert!(chunks[0].text.contains("Sourdough"));
    }

    #[tokio::test]
    async fn test_query_without_flag_prefers_binary() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        write(docs.path(), "bread.txt", "Sourdough needs a lively starter.");
        let e = engine(store.path(), Arc::new(ScriptedGenerator::constant("x")));

        e.index(&[docs.path()], &RagOptions::default()).await.unwrap();
        let reopened = engine(store.path(), Arc::new(ScriptedGenerator::constant("x")));
        assert_eq!(reopened.query_format(&RagOptions::default()), StoreFormat::Binary);

        let json = RagOptions {
            json: true,
            ..RagOptions::default()
        };
        e.index(&[docs.path()], &json).await.unwrap();
        let both = engine(store.path(), Arc::new(ScriptedGenerator::constant("x")));
        assert_eq!(both.query_format(&RagOptions::default()), StoreFormat::Binary);
        assert_eq!(both.query_format(&json), StoreFormat::Json);
        assert_eq!(both.retrieve("starter", 1, &RagOptions::default()).await.unwrap().len(), 1);
        assert!(both.store(StoreFormat::Binary).is_loaded());
        assert!(!both.store(StoreFormat::Json).is_loaded());
    }

    #[tokio::test]
    async fn test_query_without_any_store_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let e = engine(dir.path(), Arc::new(ScriptedGenerator::constant("x")));
        let err = e.retrieve("q", 3, &RagOptions::default()).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<RagError>(), Some(RagError::StoreNotLoaded)));
        let json = RagOptions {
            json: true,
            ..RagOptions::default()
        };
        assert!(e.retrieve("q", 3, &json).await.is_err());
    }

    #[tokio::test]
    async fn test_query_answers_from_index() {
        let docs = tempfile::tempdir().unwrap();
        let store = tempfile::tempdir().unwrap();
        write(docs.path(), "rust.txt", "Ownership moves values between bindings.");
        write(docs.path(), "bread.txt", "Sourdough needs a lively starter.");

        let gen = Arc::new(ScriptedGenerator::new(|prompt| {
            Ok(if prompt.contains("Sourdough") { "starter".into() } else { "unknown".into() })
        }));
        let e = engine(store.path(), gen.clone());
        e.index(&[docs.path()], &RagOptions::default()).await.unwrap();

        let answer = e.query("sourdough starter", 1, &RagOptions::default()).await.unwrap();
        assert_eq!(answer, "starter");
        assert_eq!(gen.calls(), 1);
    }
}
