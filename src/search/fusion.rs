//! Reciprocal rank fusion over ranked chunk lists.
//!
//! Every chunk at 0-based rank `r` in a list contributes `1 / (k + r + 1)`
//! under its identity key. Equal fused scores are ordered by key so the
//! result does not depend on the order of the input lists.

use std::collections::HashMap;

use crate::models::{Chunk, ScoredChunk};

pub const DEFAULT_RRF_K: f64 = 60.0;

/// Weight of a list's own similarity score in `fuse_with_similarities`.
pub const SIMILARITY_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct ReciprocalRankFusion {
    k: f64,
}

impl Default for ReciprocalRankFusion {
    fn default() -> Self {
        Self { k: DEFAULT_RRF_K }
    }
}

struct Accumulated<'a> {
    chunk: &'a Chunk,
    score: f64,
}

impl ReciprocalRankFusion {
    pub fn new(k: f64) -> Self {
        Self { k }
    }

    pub fn k(&self) -> f64 {
        self.k
    }

    /// Distinct chunks by fused score, at most `top_k`. A single list is
    /// returned truncated without rescoring.
    pub fn fuse(&self, lists: &[Vec<Chunk>], top_k: usize) -> Vec<Chunk> {
        match lists {
            [] => Vec::new(),
            [only] => only.iter().take(top_k).cloned().collect(),
            _ => self
                .fuse_scored(lists, top_k, |_, _| 0.0)
                .into_iter()
                .map(|s| s.chunk)
                .collect(),
        }
    }

    /// Like `fuse`, with each entry's own score added at `SIMILARITY_WEIGHT`.
    /// A single list is returned truncated with its scores untouched.
    pub fn fuse_with_similarities(&self, lists: &[Vec<ScoredChunk>], top_k: usize) -> Vec<ScoredChunk> {
        match lists {
            [] => return Vec::new(),
            [only] => return only.iter().take(top_k).cloned().collect(),
            _ => {}
        }
        let chunk_lists: Vec<Vec<Chunk>> = lists
            .iter()
            .map(|l| l.iter().map(|s| s.chunk.clone()).collect())
            .collect();
        self.fuse_scored(&chunk_lists, top_k, |list, rank| {
            SIMILARITY_WEIGHT * lists[list][rank].score as f64
        })
    }

    fn fuse_scored(
        &self,
        lists: &[Vec<Chunk>],
        top_k: usize,
        bonus: impl Fn(usize, usize) -> f64,
    ) -> Vec<ScoredChunk> {
        let mut scores: HashMap<String, Accumulated<'_>> = HashMap::new();

        for (list_idx, list) in lists.iter().enumerate() {
            for (rank, chunk) in list.iter().enumerate() {
                let contribution = 1.0 / (self.k + rank as f64 + 1.0) + bonus(list_idx, rank);
                scores
                    .entry(chunk.key())
                    .or_insert(Accumulated { chunk, score: 0.0 })
                    .score += contribution;
            }
        }

        let mut ranked: Vec<(String, Accumulated<'_>)> = scores.into_iter().collect();
        ranked.sort_by(|a, b| {
            b.1.score
                .partial_cmp(&a.1.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(top_k);

        ranked
            .into_iter()
            .map(|(_, acc)| ScoredChunk {
                chunk: acc.chunk.clone(),
                score: acc.score as f32,
            })
            .collect()
    }
}
