//! Embedding provider contract.
//!
//! `Embedder` is the engine's only dependency on a concrete embedding
//! backend. [`hash::DeterministicEmbedder`] is the dependency-free default;
//! [`fastembed_backend::FastEmbedder`] (feature `embeddings`) wraps the
//! teacher's local ONNX inference path for production use.

pub mod hash;

#[cfg(feature = "embeddings")]
pub mod fastembed_backend;

use async_trait::async_trait;
use thiserror::Error;

/// Errors an [`Embedder`] can surface. Exactly these three kinds are
/// recognized by [`crate::error::MemoryError`]'s conversion.
#[derive(Debug, Error, Clone)]
pub enum EmbedError {
    /// The input text failed validation (empty, too long, invalid encoding).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider is rate-limiting calls.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Transient provider failure.
    #[error("embedder unavailable: {0}")]
    Unavailable(String),
}

/// Embedder-side result alias.
pub type EmbedResult<T> = Result<T, EmbedError>;

/// The vector and token accounting for one embedding call.
#[derive(Debug, Clone)]
pub struct Embedding {
    /// The embedding vector, length `D`.
    pub vector: Vec<f32>,
    /// Tokens consumed producing it, for usage accounting.
    pub tokens_used: u32,
}

/// `embed(text, model_id) -> { vector, tokens_used }`. Implementations
/// MUST be deterministic for the same `(text, model_id)` to the engine's
/// satisfaction (a content hash suffices even for non-deterministic
/// providers, since the embedding cache is keyed on the hash, not re-derived
/// from the vector).
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds `text` using `model_id`.
    async fn embed(&self, text: &str, model_id: &str) -> EmbedResult<Embedding>;

    /// The fixed output dimension `D` this embedder produces.
    fn dimension(&self) -> usize;
}

/// Maximum input length accepted by any embedder before truncation occurs
/// upstream in the engine's content sanitization.
pub const MAX_TEXT_LENGTH: usize = 8192;
