//! Crate-wide error type
//!
//! Composes the component-level error kinds (store, embeddings, resilience)
//! into the closed set of kinds a caller of the engine can observe.

use crate::embeddings::EmbedError;
use crate::resilience::breaker::BreakerError;
use crate::store::StoreError;

/// Every error a `MemoryEngine` method can return.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    /// Operation attempted before `initialize()` completed (or after `close()`).
    #[error("engine is not initialized")]
    NotInitialized,

    /// Content failed validation (empty, whitespace-only, or otherwise rejected).
    #[error("invalid content: {0}")]
    InvalidContent(String),

    /// Query failed validation.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Embedding dimension disagreed with the store's configured dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// expected dimension
        expected: usize,
        /// dimension actually observed
        got: usize,
    },

    /// Target id does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The circuit breaker for this operation is open; downstream was not contacted.
    #[error("circuit open for operation {0}")]
    CircuitOpen(String),

    /// A call exceeded its deadline.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// A downstream collaborator failed transiently.
    #[error("downstream unavailable: {0}")]
    Unavailable(String),

    /// An invariant was violated. Should never happen; logged at the call site.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for MemoryError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => MemoryError::NotFound(id),
            StoreError::DimensionMismatch { expected, got } => {
                MemoryError::DimensionMismatch { expected, got }
            }
            StoreError::Unavailable(msg) => MemoryError::Unavailable(msg),
            other => MemoryError::Internal(other.to_string()),
        }
    }
}

impl From<EmbedError> for MemoryError {
    fn from(e: EmbedError) -> Self {
        match e {
            EmbedError::InvalidInput(msg) => MemoryError::InvalidContent(msg),
            EmbedError::RateLimited(msg) => MemoryError::Unavailable(msg),
            EmbedError::Unavailable(msg) => MemoryError::Unavailable(msg),
        }
    }
}

impl From<BreakerError> for MemoryError {
    fn from(e: BreakerError) -> Self {
        match e {
            BreakerError::Open(op) => MemoryError::CircuitOpen(op),
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, MemoryError>;
