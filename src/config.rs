use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::store::StoreFormat;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding the persisted vector store
    pub store_dir: PathBuf,
    /// LLM provider configuration
    pub llm: LlmConfig,
    /// Chunker sizes and thresholds
    pub chunking: ChunkingConfig,
    /// Retrieval tuning
    pub retrieval: RetrievalConfig,
    /// Upper bound on concurrent provider calls per fan-out
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for generation (answers, reranking, query expansion)
    pub chat_model: String,
    /// Model name for embeddings
    pub embedding_model: String,
    /// API key (only needed for cloud providers)
    pub api_key: Option<String>,
    /// Embedding vector dimension, used for zero-vector fallbacks
    pub embedding_dim: usize,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

/// Sizes are measured in characters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_size: usize,
    pub max_chunk_size: usize,
    pub similarity_threshold: f32,
    pub child_chunk_size: usize,
    pub child_overlap: usize,
    pub parent_chunk_size: usize,
    pub parent_overlap: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Total queries per multi-query search, original included (clamped to 2..=5)
    pub query_variations: usize,
    /// Sentences added on each side by the context expander
    pub context_window: usize,
    /// Reciprocal rank fusion constant
    pub rrf_k: f64,
    /// Use RRF in hybrid search; weighted fusion otherwise
    pub use_rrf: bool,
    pub semantic_weight: f64,
    pub keyword_weight: f64,
    pub bm25_k1: f64,
    pub bm25_b: f64,
    /// Candidates fetched by the first multi-pass search
    pub pass1_top_k: usize,
    /// Candidates fetched per concept in the second multi-pass search
    pub pass2_top_k: usize,
    /// Fold each variant's cosine score into multi-query RRF
    pub similarity_fusion: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_dir: PathBuf::from("./.rag-store"),
            llm: LlmConfig::default(),
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            max_concurrency: 4,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "llama2".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            embedding_dim: 768,
            timeout_secs: 120,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            min_chunk_size: 200,
            max_chunk_size: 1000,
            similarity_threshold: 0.7,
            child_chunk_size: 250,
            child_overlap: 30,
            parent_chunk_size: 1200,
            parent_overlap: 100,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            query_variations: 3,
            context_window: 2,
            rrf_k: 60.0,
            use_rrf: true,
            semantic_weight: 0.7,
            keyword_weight: 0.3,
            bm25_k1: 1.5,
            bm25_b: 0.75,
            pass1_top_k: 20,
            pass2_top_k: 5,
            similarity_fusion: false,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, slot: &mut T) {
    if let Ok(val) = std::env::var(key) {
        if let Ok(v) = val.parse() {
            *slot = v;
        }
    }
}

impl Config {
    /// Defaults overridden by environment variables. Values that fail to
    /// parse are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("RAG_STORE_DIR") {
            config.store_dir = PathBuf::from(dir);
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        env_parse("LLM_EMBEDDING_DIM", &mut config.llm.embedding_dim);
        env_parse("LLM_TIMEOUT_SECS", &mut config.llm.timeout_secs);

        env_parse("RAG_CHUNK_SIZE", &mut config.chunking.chunk_size);
        env_parse("RAG_CHUNK_OVERLAP", &mut config.chunking.chunk_overlap);
        env_parse("RAG_MAX_CONCURRENCY", &mut config.max_concurrency);
        env_parse(
            "RAG_QUERY_VARIATIONS",
            &mut config.retrieval.query_variations,
        );
        env_parse("RAG_CONTEXT_WINDOW", &mut config.retrieval.context_window);
        env_parse("RAG_SIMILARITY_FUSION", &mut config.retrieval.similarity_fusion);

        config.max_concurrency = config.max_concurrency.max(1);
        config
    }

    pub fn json_store_path(&self) -> PathBuf {
        self.store_dir.join(StoreFormat::Json.file_name())
    }

    pub fn binary_store_path(&self) -> PathBuf {
        self.store_dir.join(StoreFormat::Binary.file_name())
    }

    pub fn store_path(&self, format: StoreFormat) -> PathBuf {
        self.store_dir.join(format.file_name())
    }
}
