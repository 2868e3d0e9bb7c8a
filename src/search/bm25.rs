//! In-memory BM25 keyword search over the loaded chunk collection.
//!
//! The index is built on first use and replaced wholesale when searched
//! against a different collection. Readers always see a complete index.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::models::{Chunk, ScoredChunk};

pub const DEFAULT_K1: f64 = 1.5;
pub const DEFAULT_B: f64 = 0.75;

/// Lowercased runs of letters, digits and underscores.
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Term statistics for one chunk collection.
pub struct KeywordIndex {
    chunks: Arc<Vec<Chunk>>,
    /// term -> (document position -> term frequency)
    postings: HashMap<String, HashMap<usize, u32>>,
    doc_lengths: Vec<usize>,
    avg_doc_length: f64,
}

impl KeywordIndex {
    pub fn build(chunks: Arc<Vec<Chunk>>) -> Self {
        let mut postings: HashMap<String, HashMap<usize, u32>> = HashMap::new();
        let mut doc_lengths = Vec::with_capacity(chunks.len());

        for (doc, chunk) in chunks.iter().enumerate() {
            let tokens = tokenize(&chunk.text);
            doc_lengths.push(tokens.len());
            for token in tokens {
                *postings.entry(token).or_default().entry(doc).or_insert(0) += 1;
            }
        }

        let avg_doc_length = if doc_lengths.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<usize>() as f64 / doc_lengths.len() as f64
        };

        Self {
            chunks,
            postings,
            doc_lengths,
            avg_doc_length,
        }
    }

    pub fn document_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn average_document_length(&self) -> f64 {
        self.avg_doc_length
    }

    pub fn is_built_from(&self, chunks: &Arc<Vec<Chunk>>) -> bool {
        Arc::ptr_eq(&self.chunks, chunks)
    }

    fn term_score(&self, term: &str, doc: usize, k1: f64, b: f64) -> f64 {
        let Some(posting) = self.postings.get(term) else {
            return 0.0;
        };
        let tf = posting.get(&doc).copied().unwrap_or(0) as f64;
        if tf == 0.0 {
            return 0.0;
        }

        let n = self.document_count() as f64;
        let df = posting.len() as f64;
        let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();

        let doc_len = match self.doc_lengths.get(doc) {
            Some(&len) if len > 0 => len as f64,
            _ => 1.0,
        };
        let avg = if self.avg_doc_length > 0.0 {
            self.avg_doc_length
        } else {
            1.0
        };

        idf * (tf * (k1 + 1.0)) / (tf + k1 * (1.0 - b + b * doc_len / avg))
    }

    /// Chunks with a positive score, best first; ties keep collection order.
    pub fn search(&self, query: &str, top_k: usize, k1: f64, b: f64) -> Vec<ScoredChunk> {
        let terms = tokenize(query);
        if terms.is_empty() || top_k == 0 {
            return Vec::new();
        }

        let mut scored: Vec<(usize, f64)> = (0..self.document_count())
            .map(|doc| {
                let score = terms.iter().map(|t| self.term_score(t, doc, k1, b)).sum();
                (doc, score)
            })
            // Chunks sharing no query term score zero and are dropped
            .filter(|(_, score)| *score > 0.0)
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        scored
            .into_iter()
            .map(|(doc, score)| ScoredChunk {
                chunk: self.chunks[doc].clone(),
                score: score as f32,
            })
            .collect()
    }
}

/// Lazily indexing BM25 searcher shared across queries.
pub struct Bm25Searcher {
    k1: f64,
    b: f64,
    index: RwLock<Option<Arc<KeywordIndex>>>,
}

impl Default for Bm25Searcher {
    fn default() -> Self {
        Self::new(DEFAULT_K1, DEFAULT_B)
    }
}

impl Bm25Searcher {
    pub fn new(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            index: RwLock::new(None),
        }
    }

    /// Index for `chunks`, building and publishing a new one if the current
    /// index is missing or was built from another collection.
    pub fn index_for(&self, chunks: &Arc<Vec<Chunk>>) -> Arc<KeywordIndex> {
        if let Some(index) = self.index.read().as_ref() {
            if index.is_built_from(chunks) {
                return index.clone();
            }
        }

        let built = Arc::new(KeywordIndex::build(chunks.clone()));
        tracing::debug!(
            "Built keyword index: {} documents, avg length {:.1}",
            built.document_count(),
            built.average_document_length()
        );
        *self.index.write() = Some(built.clone());
        built
    }

    /// Drops the current index so the next search rebuilds it.
    pub fn invalidate(&self) {
        *self.index.write() = None;
    }

    pub fn search(&self, query: &str, chunks: &Arc<Vec<Chunk>>, top_k: usize) -> Vec<ScoredChunk> {
        self.index_for(chunks).search(query, top_k, self.k1, self.b)
    }
}
