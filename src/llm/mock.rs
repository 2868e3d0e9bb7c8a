//! Deterministic in-process providers for tests and offline runs.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;

use super::{EmbeddingProvider, GenerationProvider};

/// Bag-of-words embedder: each lowercase word is hashed onto one dimension
/// and the counts are L2-normalized. Texts sharing words score higher.
pub struct HashEmbedder {
    dimensions: usize,
    calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `embed` calls (batch calls count once per text).
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dimensions];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            let mut hasher = DefaultHasher::new();
            word.to_lowercase().hash(&mut hasher);
            let slot = (hasher.finish() % self.dimensions as u64) as usize;
            v[slot] += 1.0;
        }

        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.vector(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

type Responder = Box<dyn Fn(&str) -> Result<String> + Send + Sync>;

/// Generation provider driven by a closure over the prompt.
pub struct ScriptedGenerator {
    responder: Responder,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(responder: impl Fn(&str) -> Result<String> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn constant(response: &str) -> Self {
        let response = response.to_string();
        Self::new(move |_| Ok(response.clone()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerationProvider for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(prompt)
    }
}

/// Provider whose every call fails, standing in for an unreachable server.
pub struct FailingProvider {
    dimensions: usize,
    calls: AtomicUsize,
}

impl FailingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingProvider for FailingProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("embedding provider unavailable")
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[async_trait]
impl GenerationProvider for FailingProvider {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("generation provider unavailable")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::vector::cosine_similarity;

    #[tokio::test]
    async fn test_hash_embedder_deterministic_and_normalized() {
        let e = HashEmbedder::new(64);
        let a = e.embed("Hello world").await.unwrap();
        let b = e.embed("hello WORLD").await.unwrap();
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
        assert_eq!(e.calls(), 2);
    }

    #[tokio::test]
    async fn test_hash_embedder_shared_words_score_higher() {
        let e = HashEmbedder::new(512);
        let q = e.vector("vector database index");
        let near = e.vector("a vector index for the database");
        let far = e.vector("baking sourdough bread");
        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    async fn test_scripted_and_failing() {
        let g = ScriptedGenerator::new(|p| Ok(p.to_uppercase()));
        assert_eq!(g.generate("abc").await.unwrap(), "ABC");
        assert_eq!(g.calls(), 1);

        let f = FailingProvider::new(3);
        assert!(f.embed("x").await.is_err());
        assert!(f.generate("x").await.is_err());
        assert_eq!(f.calls(), 2);
        assert_eq!(f.dimensions(), 3);
    }
}
