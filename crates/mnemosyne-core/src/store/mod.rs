//! Vector store adapter: the only component allowed to touch durable
//! storage. All operations are scoped by `tenant_id`; implementations MUST
//! enforce the filter server-side before returning.

pub mod migrations;
pub mod sqlite;

#[cfg(feature = "vector-search")]
pub mod hnsw;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::memory::{Memory, MemoryType, SimilarityHit};

/// Errors a [`VectorStore`] implementation can surface.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Target id does not exist (scoped to the caller's tenant).
    #[error("memory not found: {0}")]
    NotFound(String),

    /// The vector's length disagreed with the store's configured dimension.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// expected dimension
        expected: usize,
        /// dimension actually observed
        got: usize,
    },

    /// Transient failure; the resilience layer may retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// Underlying database error.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Store-side result alias.
pub type StoreResult<T> = Result<T, StoreError>;

/// Search parameters for [`VectorStore::search`]. `limit` is capped at 50
/// and `threshold` defaults to `0.6` by the engine before reaching the store.
#[derive(Debug, Clone)]
pub struct SearchQuery {
    /// Required tenant scope.
    pub tenant_id: String,
    /// Optional secondary scope.
    pub agent_id: Option<String>,
    /// Optional type filter.
    pub memory_type: Option<MemoryType>,
    /// Maximum results, `<= 50`.
    pub limit: usize,
    /// Minimum cosine similarity, in `[0, 1]`.
    pub threshold: f64,
}

/// The tenant/agent-filtered ANN search and persistence contract. Either
/// a brute-force in-process scan ([`sqlite::SqliteStore`]) or an
/// HNSW-accelerated index ([`hnsw::HnswStore`], feature-gated) can satisfy
/// this trait; the engine is written against the trait alone.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Prepares the store for use (opens connections, runs migrations).
    async fn initialize(&self) -> StoreResult<()>;

    /// Inserts or replaces a memory. `memory.embedding.len()` MUST equal
    /// the store's configured dimension.
    async fn upsert(&self, memory: &Memory) -> StoreResult<()>;

    /// Tenant/agent/type-filtered similarity search. Only hits with
    /// `similarity >= query.threshold` are returned.
    async fn search(&self, vector: &[f32], query: &SearchQuery) -> StoreResult<Vec<SimilarityHit>>;

    /// Looks up an existing memory by exact content-hash match, scoped to
    /// tenant (and optionally agent).
    async fn find_duplicate_by_hash(
        &self,
        content_hash: &str,
        tenant_id: &str,
        agent_id: Option<&str>,
    ) -> StoreResult<Option<Uuid>>;

    /// Updates `last_accessed_at` and increments `access_count`.
    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()>;

    /// Fetches a single memory by id, scoped to tenant.
    async fn get(&self, id: Uuid, tenant_id: &str) -> StoreResult<Memory>;

    /// Deletes a memory by id, scoped to tenant.
    async fn delete(&self, id: Uuid, tenant_id: &str) -> StoreResult<()>;

    /// Deletes a batch of memories, scoped to tenant. Returns the count
    /// actually deleted; missing ids are not errors.
    async fn delete_batch(&self, ids: &[Uuid], tenant_id: &str) -> StoreResult<usize>;

    /// Marks a memory archived (still queryable, reduced retrieval weight).
    async fn set_archived(&self, id: Uuid, tenant_id: &str, archived: bool) -> StoreResult<()>;

    /// Lists every live memory in scope for maintenance passes (TTL purge,
    /// low-activity sweep, near-duplicate fusion, score-based triage). Not
    /// part of the read path; the optimizer is the only caller.
    async fn list_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Memory>>;

    /// Recently accessed/created memories for a tenant (and optional
    /// agent), most-recent-first, capped at `limit`. Backs `get_context`.
    async fn recent_for_tenant(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<Memory>>;

    /// Total live memory count for a tenant, for health/stats reporting.
    async fn count_for_tenant(&self, tenant_id: &str) -> StoreResult<usize>;
}
