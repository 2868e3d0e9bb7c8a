//! Retrieval quality metrics keyed by chunk identity, plus LLM-judged
//! answer metrics and a dataset runner in the submodules.

pub mod evaluator;
pub mod generation;

use std::collections::HashSet;

use serde::Serialize;

use crate::models::Chunk;

pub const DEFAULT_K: usize = 5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievalMetrics {
    pub precision_at_k: f64,
    pub recall_at_k: f64,
    pub mrr: f64,
}

/// One query's retrieved chunks and the keys judged relevant.
#[derive(Debug, Clone)]
pub struct JudgedRetrieval {
    pub retrieved: Vec<Chunk>,
    pub relevant: Vec<String>,
}

/// Relevant hits in the top `k`, divided by `min(k, retrieved.len())`.
pub fn precision_at_k(retrieved: &[Chunk], relevant: &[String], k: usize) -> f64 {
    if retrieved.is_empty() || k == 0 {
        return 0.0;
    }
    let relevant: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    let hits = retrieved
        .iter()
        .take(k)
        .filter(|c| relevant.contains(c.key().as_str()))
        .count();
    hits as f64 / k.min(retrieved.len()) as f64
}

pub fn recall_at_k(retrieved: &[Chunk], relevant: &[String], k: usize) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let wanted: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    let hits = retrieved
        .iter()
        .take(k)
        .filter(|c| wanted.contains(c.key().as_str()))
        .count();
    hits as f64 / relevant.len() as f64
}

/// Reciprocal of the 1-based rank of the first relevant chunk, 0 if none.
pub fn reciprocal_rank(retrieved: &[Chunk], relevant: &[String]) -> f64 {
    if relevant.is_empty() {
        return 0.0;
    }
    let wanted: HashSet<&str> = relevant.iter().map(String::as_str).collect();
    retrieved
        .iter()
        .position(|c| wanted.contains(c.key().as_str()))
        .map_or(0.0, |i| 1.0 / (i as f64 + 1.0))
}

pub fn evaluate(retrieved: &[Chunk], relevant: &[String], k: usize) -> RetrievalMetrics {
    RetrievalMetrics {
        precision_at_k: precision_at_k(retrieved, relevant, k),
        recall_at_k: recall_at_k(retrieved, relevant, k),
        mrr: reciprocal_rank(retrieved, relevant),
    }
}

/// Mean of each metric over all queries; zeros for an empty set.
pub fn evaluate_many(results: &[JudgedRetrieval], k: usize) -> RetrievalMetrics {
    if results.is_empty() {
        return RetrievalMetrics::default();
    }

    let n = results.len() as f64;
    let sum = results
        .iter()
        .map(|r| evaluate(&r.retrieved, &r.relevant, k))
        .fold(RetrievalMetrics::default(), |acc, m| RetrievalMetrics {
            precision_at_k: acc.precision_at_k + m.precision_at_k,
            recall_at_k: acc.recall_at_k + m.recall_at_k,
            mrr: acc.mrr + m.mrr,
        });

    RetrievalMetrics {
        precision_at_k: sum.precision_at_k / n,
        recall_at_k: sum.recall_at_k / n,
        mrr: sum.mrr / n,
    }
}
