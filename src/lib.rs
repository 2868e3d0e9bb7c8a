//! # rag-engine
//!
//! Retrieval-augmented generation over local files: chunk documents, embed
//! and persist the chunks, then answer questions from the passages that a
//! configurable retrieval pipeline selects.
//!
//! ## Architecture
//!
//! ```text
//!   index(paths)                              query(text, top_k)
//!        │                                           │
//!        ▼                                           ▼
//!  ┌────────────┐                         ┌────────────────────┐
//!  │  collect   │                         │   primary mode     │
//!  └─────┬──────┘                         │ (exactly one of)   │
//!        ▼                                │  multi-pass        │
//!  ┌────────────────────┐                 │  hybrid (vec+BM25) │
//!  │ chunk              │                 │  multi-query + RRF │
//!  │ hierarchical /     │                 │  semantic          │
//!  │ semantic / fixed   │                 └─────────┬──────────┘
//!  └─────┬──────────────┘                           ▼
//!        ▼                                ┌────────────────────┐
//!  ┌────────────┐                         │ post stages, fixed │
//!  │  enrich?   │                         │ order, each opt.:  │
//!  └─────┬──────┘                         │  rerank            │
//!        ▼                                │  include parents   │
//!  ┌────────────┐      ┌──────────┐       │  expand context    │
//!  │   embed    │─────▶│  store   │──────▶└─────────┬──────────┘
//!  └────────────┘      │ JSON/bin │                 ▼
//!                      └──────────┘       ┌────────────────────┐
//!                                         │ context + prompt   │
//!                                         │ one LLM call       │
//!                                         └────────────────────┘
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for the store, chunkers, retrieval and LLM
//! - [`models`] - `Chunk`, `ChunkMetadata`, identity keys, `RagOptions`
//! - [`collect`] - File and directory collection for indexing
//! - [`chunking`] - Fixed-size, semantic and hierarchical chunkers plus metadata enrichment
//! - [`store`] - Vector store persisted as JSON or the compact `RAGB` binary format
//! - [`search::bm25`] - BM25 keyword index over the chunk collection
//! - [`search::fusion`] - Reciprocal rank fusion
//! - [`search::hybrid`] - Concurrent semantic and keyword retrieval
//! - [`search::multi_pass`] - Broad search followed by concept-focused searches
//! - [`search::context`] - Sentence-window expansion of retrieved chunks
//! - [`search::pipeline`] - Mode selection, post stages and answer prompt
//! - [`llm`] - Provider traits, Ollama/OpenAI client, query expansion, reranking
//! - [`eval`] - Precision@K, Recall@K, MRR, judged faithfulness and answer relevance, dataset reports
//! - [`engine`] - `RagEngine` with the `index` and `query` entry points

pub mod chunking;
pub mod collect;
pub mod config;
pub mod engine;
pub mod error;
pub mod eval;
pub mod llm;
pub mod models;
pub mod search;
pub mod store;
