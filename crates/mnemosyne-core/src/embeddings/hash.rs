//! Dependency-free deterministic embedder.
//!
//! Seeds a small PRNG from `sha256(text)` and fills a `D`-dimensional unit
//! vector from it, normalized. Not semantically meaningful, but
//! deterministic and dependency-free, which is what the engine's default
//! configuration and hermetic tests need — a real deployment swaps in
//! [`super::fastembed_backend::FastEmbedder`] via the `embeddings` feature.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::vector_math;

use super::{EmbedError, EmbedResult, Embedder, Embedding, MAX_TEXT_LENGTH};

/// Seeded, hash-derived embedder. Always succeeds for valid input; has no
/// external state or I/O, so it cannot produce `Unavailable`/`RateLimited`.
pub struct DeterministicEmbedder {
    dimension: usize,
}

impl DeterministicEmbedder {
    /// Builds an embedder producing vectors of length `dimension`.
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

fn splitmix64(seed: &mut u64) -> u64 {
    *seed = seed.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = *seed;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

#[async_trait]
impl Embedder for DeterministicEmbedder {
    async fn embed(&self, text: &str, model_id: &str) -> EmbedResult<Embedding> {
        if text.trim().is_empty() {
            return Err(EmbedError::InvalidInput("text is empty".to_string()));
        }
        if text.len() > MAX_TEXT_LENGTH {
            return Err(EmbedError::InvalidInput(format!(
                "text exceeds max length of {MAX_TEXT_LENGTH} bytes"
            )));
        }

        let mut hasher = Sha256::new();
        hasher.update(model_id.as_bytes());
        hasher.update(b"\0");
        hasher.update(text.as_bytes());
        let digest = hasher.finalize();

        let mut seed = u64::from_le_bytes(digest[0..8].try_into().unwrap());
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            let bits = splitmix64(&mut seed);
            // map to [-1, 1]
            let value = (bits as f64 / u64::MAX as f64) * 2.0 - 1.0;
            vector.push(value as f32);
        }
        vector_math::normalize(&mut vector);

        Ok(Embedding {
            vector,
            tokens_used: (text.len() / 4).max(1) as u32,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_math::cosine_similarity;

    #[tokio::test]
    async fn same_input_produces_same_vector() {
        let embedder = DeterministicEmbedder::new(8);
        let a = embedder.embed("hello world", "model-a").await.unwrap();
        let b = embedder.embed("hello world", "model-a").await.unwrap();
        assert_eq!(a.vector, b.vector);
    }

    #[tokio::test]
    async fn different_model_id_changes_vector() {
        let embedder = DeterministicEmbedder::new(8);
        let a = embedder.embed("hello world", "model-a").await.unwrap();
        let b = embedder.embed("hello world", "model-b").await.unwrap();
        assert_ne!(a.vector, b.vector);
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let embedder = DeterministicEmbedder::new(8);
        let err = embedder.embed("   ", "model-a").await.unwrap_err();
        assert!(matches!(err, EmbedError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn vector_is_unit_norm() {
        let embedder = DeterministicEmbedder::new(16);
        let result = embedder.embed("some content", "model-a").await.unwrap();
        let norm: f32 = result.vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[tokio::test]
    async fn similar_content_is_not_necessarily_similar_vector() {
        // sanity check only: hash-derived vectors are not semantically
        // meaningful, so we only assert determinism and dimension here.
        let embedder = DeterministicEmbedder::new(32);
        let a = embedder.embed("Alice likes tea", "m").await.unwrap();
        let b = embedder.embed("Alice likes tea", "m").await.unwrap();
        assert_eq!(cosine_similarity(&a.vector, &b.vector).unwrap(), 1.0);
    }
}
