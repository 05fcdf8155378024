//! The memory engine: orchestrates validate -> deduplicate -> embed ->
//! classify -> persist on write, and embed -> search -> decay-rerank ->
//! cache on read.

pub mod classify;

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::cache::{CacheLayer, CachedContextEntry, CachedResultEntry};
use crate::config::EngineConfig;
use crate::embeddings::Embedder;
use crate::error::{MemoryError, Result};
use crate::memory::{Memory, MemoryResult, MemoryType};
use crate::resilience::{BreakerError, CircuitBreaker, CircuitBreakerConfig, RetryConfig, RetryPolicy};
use crate::store::{SearchQuery, VectorStore};
use crate::temporal::{self, DecayInputs, DecayTable};

/// Engine lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Ready,
    Closed,
}

/// Per-call options for `remember`.
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    /// Overrides the deterministic type classifier.
    pub memory_type: Option<MemoryType>,
    /// Overrides the computed importance score.
    pub importance: Option<f64>,
    /// Skips the exact-duplicate lookup.
    pub skip_duplicate_check: bool,
    /// Optional tags.
    pub tags: HashSet<String>,
    /// Optional opaque context.
    pub context: HashMap<String, Value>,
    /// Optional emotional weight, in `[-1, 1]`.
    pub emotional_weight: Option<f64>,
    /// Optional agent scope.
    pub agent_id: Option<String>,
    /// Optional TTL.
    pub ttl: Option<DateTime<Utc>>,
}

/// Per-call options for `recall`.
#[derive(Debug, Clone)]
pub struct RecallOptions {
    /// Optional agent scope.
    pub agent_id: Option<String>,
    /// Optional type filter.
    pub memory_type: Option<MemoryType>,
    /// Result cap, `<= 50`.
    pub limit: usize,
    /// Minimum similarity, in `[0, 1]`.
    pub threshold: f64,
    /// Whether to consult the result cache.
    pub use_cache: bool,
    /// Whether to apply temporal-decay reranking.
    pub time_decay: bool,
    /// Caller-supplied contextual boost per §4.B, in `[0, 1]`.
    pub contextual_boost: f64,
    /// Types that receive the 1.2x rank multiplier.
    pub preferred_types: HashSet<MemoryType>,
}

impl Default for RecallOptions {
    fn default() -> Self {
        Self {
            agent_id: None,
            memory_type: None,
            limit: 10,
            threshold: 0.6,
            use_cache: true,
            time_decay: true,
            contextual_boost: 0.0,
            preferred_types: HashSet::new(),
        }
    }
}

/// Options for `forget`.
#[derive(Debug, Clone, Default)]
pub struct ForgetOptions {
    /// If true, a missing id is treated as already-forgotten rather than `NotFound`.
    pub ignore_missing: bool,
}

/// Request for `get_context`.
#[derive(Debug, Clone)]
pub struct ContextRequest {
    /// Tenant scope.
    pub tenant_id: String,
    /// Optional agent scope.
    pub agent_id: Option<String>,
    /// Upper bound, capped at 25.
    pub max_memories: usize,
}

/// Response for `get_context`.
#[derive(Debug, Clone)]
pub struct ContextResponse {
    /// The bounded recent-memory set.
    pub memories: Vec<Memory>,
    /// Count of memories per type.
    pub type_counts: HashMap<MemoryType, usize>,
    /// `mean(importance) * recency_present`.
    pub confidence: f64,
}

/// Health of one engine sub-component.
#[derive(Debug, Clone)]
pub struct SubCheck {
    /// Sub-component name.
    pub name: String,
    /// Whether it's currently healthy.
    pub healthy: bool,
    /// Human-readable detail.
    pub detail: String,
}

/// Overall engine health.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthStatus {
    /// Every sub-check passed.
    Healthy,
    /// At least one sub-check is degraded but the engine still serves requests.
    Degraded,
    /// A critical sub-check failed.
    Unhealthy,
}

/// Result of `get_health`.
#[derive(Debug, Clone)]
pub struct HealthReport {
    /// Overall status.
    pub status: HealthStatus,
    /// Per-component detail.
    pub checks: Vec<SubCheck>,
}

/// Aggregate engine statistics, for `get_stats`.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Live memory count for the tenant.
    pub memory_count: usize,
    /// Embedding-cache hit rate.
    pub embedding_cache_hit_rate: f64,
    /// Result-cache hit rate.
    pub result_cache_hit_rate: f64,
}

/// Orchestrates the write and read paths over a [`VectorStore`] and an
/// [`Embedder`], both wrapped in the resilience layer.
pub struct MemoryEngine {
    state: RwLock<State>,
    config: EngineConfig,
    store: Box<dyn VectorStore>,
    embedder: Box<dyn Embedder>,
    cache: CacheLayer,
    decay_table: DecayTable,
    embed_breaker: CircuitBreaker,
    store_breaker: CircuitBreaker,
    retry: RetryPolicy,
}

impl MemoryEngine {
    /// Builds an engine. Call `initialize` before use.
    pub fn new(config: EngineConfig, store: Box<dyn VectorStore>, embedder: Box<dyn Embedder>) -> Self {
        let cache = CacheLayer::new(
            10_000,
            std::time::Duration::from_secs(config.performance.cache_ttl_seconds),
            std::time::Duration::from_secs(config.performance.cache_ttl_seconds),
        );
        Self {
            state: RwLock::new(State::Uninitialized),
            config,
            store,
            embedder,
            cache,
            decay_table: DecayTable::with_defaults(),
            embed_breaker: CircuitBreaker::new("embed", CircuitBreakerConfig::default()),
            store_breaker: CircuitBreaker::new("store", CircuitBreakerConfig::default()),
            retry: RetryPolicy::new(RetryConfig::default()),
        }
    }

    /// Prepares the store and transitions `Uninitialized -> Ready`.
    pub async fn initialize(&self) -> Result<()> {
        self.store.initialize().await?;
        *self.state.write().unwrap() = State::Ready;
        tracing::info!("engine initialized");
        Ok(())
    }

    /// Transitions `Ready -> Closed`. Subsequent operations fail with
    /// `NotInitialized`.
    pub fn close(&self) {
        *self.state.write().unwrap() = State::Closed;
    }

    fn require_ready(&self) -> Result<()> {
        if *self.state.read().unwrap() != State::Ready {
            return Err(MemoryError::NotInitialized);
        }
        Ok(())
    }

    async fn embed_resilient(&self, text: &str, model_id: &str) -> Result<Vec<f32>> {
        self.embed_breaker.is_call_permitted().map_err(map_breaker_err)?;
        let embedder = &self.embedder;
        let deadline = self.config.max_query_time();
        let result = tokio::time::timeout(
            deadline,
            self.retry.execute(
                || async { embedder.embed(text, model_id).await },
                |e| matches!(e, crate::embeddings::EmbedError::Unavailable(_)),
            ),
        )
        .await;
        match result {
            Ok(Ok(embedding)) => {
                self.embed_breaker.record_success();
                Ok(embedding.vector)
            }
            Ok(Err(e)) => {
                self.embed_breaker.record_failure();
                Err(e.into())
            }
            Err(_elapsed) => {
                self.embed_breaker.record_failure();
                Err(MemoryError::Timeout(deadline))
            }
        }
    }

    /// Runs a store operation under `config.performance.max_query_time_ms`,
    /// recording the outcome on `breaker`. A deadline miss surfaces as
    /// `MemoryError::Timeout` without waiting out the underlying call.
    async fn store_call<F, T>(&self, breaker: &CircuitBreaker, fut: F) -> Result<T>
    where
        F: std::future::Future<Output = crate::store::StoreResult<T>>,
    {
        breaker.is_call_permitted().map_err(map_breaker_err)?;
        let deadline = self.config.max_query_time();
        match tokio::time::timeout(deadline, fut).await {
            Ok(Ok(value)) => {
                breaker.record_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                breaker.record_failure();
                Err(e.into())
            }
            Err(_elapsed) => {
                breaker.record_failure();
                Err(MemoryError::Timeout(deadline))
            }
        }
    }

    async fn cached_embedding(&self, tenant_id: &str, content_hash: &str, content: &str) -> Result<Vec<f32>> {
        let key = CacheLayer::embedding_key(tenant_id, &self.config.embedding.model_id, content_hash);
        if let Some(vector) = self.cache.get_embedding(&key) {
            return Ok(vector);
        }
        let vector = self.embed_resilient(content, &self.config.embedding.model_id).await?;
        self.cache.put_embedding(tenant_id, key, vector.clone());
        Ok(vector)
    }

    /// Validates, deduplicates, embeds, classifies, and persists a memory.
    /// Returns the new or pre-existing memory id.
    pub async fn remember(
        &self,
        content: &str,
        tenant_id: &str,
        options: RememberOptions,
    ) -> Result<Uuid> {
        self.require_ready()?;

        let sanitized = classify::sanitize_content(content)
            .ok_or_else(|| MemoryError::InvalidContent("content is empty after sanitization".to_string()))?;
        let hash = classify::content_hash(&sanitized, tenant_id);

        if !options.skip_duplicate_check {
            let existing = self
                .store_call(
                    &self.store_breaker,
                    self.store
                        .find_duplicate_by_hash(&hash, tenant_id, options.agent_id.as_deref()),
                )
                .await?;
            if let Some(existing_id) = existing {
                self.store_call(&self.store_breaker, self.store.touch(existing_id, Utc::now()))
                    .await?;
                self.cache.invalidate_tenant_reads(tenant_id);
                tracing::info!(tenant_id, %existing_id, "remember matched existing duplicate");
                return Ok(existing_id);
            }
        }

        let embedding = self.cached_embedding(tenant_id, &hash, &sanitized).await?;

        let memory_type = options.memory_type.unwrap_or_else(|| classify::classify_type(&sanitized));
        let importance = options
            .importance
            .unwrap_or_else(|| classify::score_importance(&sanitized));

        let now = Utc::now();
        let memory = Memory {
            id: Uuid::new_v4(),
            tenant_id: tenant_id.to_string(),
            agent_id: options.agent_id,
            memory_type,
            content: sanitized,
            embedding,
            confidence: 1.0,
            importance,
            emotional_weight: options.emotional_weight,
            tags: options.tags,
            context: options.context,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl: options.ttl,
            content_hash: hash,
            archived: false,
        };
        let id = memory.id;

        self.store_call(&self.store_breaker, self.store.upsert(&memory)).await?;

        self.cache.invalidate_tenant_reads(tenant_id);
        tracing::info!(tenant_id, %id, memory_type = %memory_type, "remembered new memory");
        Ok(id)
    }

    /// Embeds the query, searches the store, reranks by temporal decay, and
    /// caches the ordered result list.
    pub async fn recall(
        &self,
        query: &str,
        tenant_id: &str,
        options: RecallOptions,
    ) -> Result<Vec<MemoryResult>> {
        self.require_ready()?;
        if query.trim().is_empty() {
            return Err(MemoryError::InvalidQuery("query is empty".to_string()));
        }

        let limit = options.limit.min(50);
        let query_fingerprint = classify::content_hash(
            &format!(
                "{query}|{:?}|{:?}|{limit}|{}",
                options.agent_id, options.memory_type, options.threshold
            ),
            tenant_id,
        );
        let result_key = CacheLayer::result_key(tenant_id, &query_fingerprint);

        if options.use_cache {
            if let Some(cached) = self.cache.get_result(&result_key) {
                let mut results = Vec::with_capacity(cached.memory_ids.len());
                for (id, score) in cached.memory_ids.iter().zip(cached.scores.iter()) {
                    if let Ok(memory) = self.store.get(*id, tenant_id).await {
                        results.push(MemoryResult {
                            memory,
                            score: *score,
                            relevance_reason: "cached result".to_string(),
                        });
                    }
                }
                return Ok(results);
            }
        }

        let query_hash = classify::content_hash(query, tenant_id);
        let vector = self.cached_embedding(tenant_id, &query_hash, query).await?;

        let search_query = SearchQuery {
            tenant_id: tenant_id.to_string(),
            agent_id: options.agent_id.clone(),
            memory_type: options.memory_type,
            limit,
            threshold: options.threshold,
        };

        let hits = self
            .store_call(&self.store_breaker, self.store.search(&vector, &search_query))
            .await?;

        let now = Utc::now();
        let mut results: Vec<MemoryResult> = hits
            .into_iter()
            .map(|hit| {
                let recency = temporal::recency(hit.memory.created_at, now);
                let preferred = options.preferred_types.contains(&hit.memory.memory_type);
                // score <- similarity * exp(-age_days/30), per the literal
                // rerank step; contextual_boost/preferred_types feed only the
                // narrative reason below, not the score itself.
                let score = if options.time_decay { hit.similarity * recency } else { hit.similarity };
                let reason = relevance_reason(hit.similarity, recency, options.contextual_boost, preferred);
                MemoryResult {
                    memory: hit.memory,
                    score,
                    relevance_reason: reason,
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap()
                .then_with(|| b.memory.last_accessed_at.cmp(&a.memory.last_accessed_at))
                .then_with(|| a.memory.id.cmp(&b.memory.id))
        });
        results.truncate(limit);

        let cache_entry = CachedResultEntry {
            memory_ids: results.iter().map(|r| r.memory.id).collect(),
            scores: results.iter().map(|r| r.score).collect(),
        };
        self.cache.put_result(tenant_id, result_key, cache_entry);

        Ok(results)
    }

    /// Returns a bounded set of recent memories plus a type-count summary.
    /// Cached under a tenant/agent key for a fixed 5 minutes.
    pub async fn get_context(&self, request: ContextRequest) -> Result<ContextResponse> {
        self.require_ready()?;
        let key = CacheLayer::context_key(&request.tenant_id, request.agent_id.as_deref());
        if let Some(cached) = self.cache.get_context(&key) {
            return Ok(ContextResponse {
                memories: cached.memories,
                type_counts: cached.type_counts,
                confidence: cached.confidence,
            });
        }

        let limit = request.max_memories.min(25);
        let memories = self
            .store
            .recent_for_tenant(&request.tenant_id, request.agent_id.as_deref(), limit)
            .await?;

        let mut type_counts: HashMap<MemoryType, usize> = HashMap::new();
        for memory in &memories {
            *type_counts.entry(memory.memory_type).or_insert(0) += 1;
        }

        let confidence = if memories.is_empty() {
            0.0
        } else {
            let now = Utc::now();
            let mean_importance: f64 =
                memories.iter().map(|m| m.importance).sum::<f64>() / memories.len() as f64;
            // recency-present: how recently this set was actually touched,
            // via the same exp(-age_days/30) decay used in recall.
            let recency_present: f64 = memories
                .iter()
                .map(|m| temporal::recency(m.last_accessed_at, now))
                .sum::<f64>()
                / memories.len() as f64;
            mean_importance * recency_present
        };

        self.cache.put_context(
            &request.tenant_id,
            key,
            CachedContextEntry {
                memories: memories.clone(),
                type_counts: type_counts.clone(),
                confidence,
            },
        );

        Ok(ContextResponse {
            memories,
            type_counts,
            confidence,
        })
    }

    /// Deletes a memory and invalidates the tenant's result cache.
    pub async fn forget(&self, id: Uuid, tenant_id: &str, options: ForgetOptions) -> Result<()> {
        self.require_ready()?;
        match self.store.delete(id, tenant_id).await {
            Ok(()) => {
                self.cache.invalidate_tenant_reads(tenant_id);
                Ok(())
            }
            Err(crate::store::StoreError::NotFound(_)) if options.ignore_missing => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Per-tenant statistics.
    pub async fn get_stats(&self, tenant_id: &str) -> Result<EngineStats> {
        self.require_ready()?;
        let memory_count = self.store.count_for_tenant(tenant_id).await?;
        Ok(EngineStats {
            memory_count,
            embedding_cache_hit_rate: self.cache.embedding_stats().hit_rate(),
            result_cache_hit_rate: self.cache.result_stats().hit_rate(),
        })
    }

    /// Aggregates embedder/store/cache health into an overall status.
    pub async fn get_health(&self) -> HealthReport {
        let mut checks = Vec::new();

        let store_status = self.store_breaker.status();
        let store_healthy = store_status.state != crate::resilience::CircuitState::Open;
        checks.push(SubCheck {
            name: "vector_store".to_string(),
            healthy: store_healthy,
            detail: format!("{:?}", store_status.state),
        });

        let embed_status = self.embed_breaker.status();
        let embed_healthy = embed_status.state != crate::resilience::CircuitState::Open;
        checks.push(SubCheck {
            name: "embedder".to_string(),
            healthy: embed_healthy,
            detail: format!("{:?}", embed_status.state),
        });

        let cache_entries = self.cache.total_entries();
        checks.push(SubCheck {
            name: "cache".to_string(),
            healthy: true,
            detail: format!("{cache_entries} entries"),
        });

        let status = if !store_healthy {
            HealthStatus::Unhealthy
        } else if !embed_healthy {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        HealthReport { status, checks }
    }

    /// Read-only access to the store, for the optimizer.
    pub(crate) fn store(&self) -> &dyn VectorStore {
        self.store.as_ref()
    }

    /// Read-only access to the cache layer, for the optimizer's prune step.
    pub(crate) fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    /// Read-only access to the decay table, for the optimizer's triage step.
    pub(crate) fn decay_table(&self) -> &DecayTable {
        &self.decay_table
    }

    /// Engine configuration, for the optimizer's thresholds.
    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }
}

fn map_breaker_err(e: BreakerError) -> MemoryError {
    e.into()
}

fn relevance_reason(similarity: f64, recency: f64, contextual_boost: f64, preferred_type: bool) -> String {
    let mut parts = vec![format!("similarity={similarity:.2}")];
    if recency > 0.5 {
        parts.push("recent".to_string());
    }
    if contextual_boost > 0.5 {
        parts.push("contextual match".to_string());
    }
    if preferred_type {
        parts.push("preferred type".to_string());
    }
    parts.join(", ")
}

pub(crate) fn decay_inputs_for(memory: &Memory) -> DecayInputs {
    DecayInputs {
        created_at: memory.created_at,
        last_accessed_at: memory.last_accessed_at,
        confidence: memory.confidence,
        importance: memory.importance,
        access_count: memory.access_count,
        emotional_weight: memory.emotional_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::hash::DeterministicEmbedder;
    use crate::store::sqlite::SqliteStore;

    fn build_engine(dimension: usize) -> MemoryEngine {
        let mut config = EngineConfig::default();
        config.vector_db.dimension = dimension;
        let store = Box::new(SqliteStore::open_in_memory(dimension).unwrap());
        let embedder = Box::new(DeterministicEmbedder::new(dimension));
        MemoryEngine::new(config, store, embedder)
    }

    #[tokio::test]
    async fn operations_fail_before_initialize() {
        let engine = build_engine(16);
        let err = engine
            .remember("hello", "t1", RememberOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotInitialized));
    }

    #[tokio::test]
    async fn remember_then_recall_finds_the_memory() {
        let engine = build_engine(16);
        engine.initialize().await.unwrap();
        let id = engine
            .remember("Alice likes tea", "t1", RememberOptions::default())
            .await
            .unwrap();

        let results = engine
            .recall(
                "Alice likes tea",
                "t1",
                RecallOptions {
                    threshold: 0.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(results.iter().any(|r| r.memory.id == id));
    }

    #[tokio::test]
    async fn duplicate_remember_returns_same_id() {
        let engine = build_engine(16);
        engine.initialize().await.unwrap();
        let id1 = engine
            .remember("Alice likes tea", "t1", RememberOptions::default())
            .await
            .unwrap();
        let id2 = engine
            .remember("Alice likes tea", "t1", RememberOptions::default())
            .await
            .unwrap();
        assert_eq!(id1, id2);

        let stats = engine.get_stats("t1").await.unwrap();
        assert_eq!(stats.memory_count, 1);
    }

    #[tokio::test]
    async fn tenant_isolation_on_recall() {
        let engine = build_engine(16);
        engine.initialize().await.unwrap();
        engine
            .remember("secret plan", "t1", RememberOptions::default())
            .await
            .unwrap();

        let results = engine
            .recall(
                "secret",
                "t2",
                RecallOptions {
                    threshold: 0.0,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn forget_removes_memory() {
        let engine = build_engine(16);
        engine.initialize().await.unwrap();
        let id = engine
            .remember("temporary note", "t1", RememberOptions::default())
            .await
            .unwrap();
        engine.forget(id, "t1", ForgetOptions::default()).await.unwrap();

        let results = engine
            .recall(
                "temporary note",
                "t1",
                RecallOptions {
                    threshold: 0.0,
                    use_cache: false,
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(!results.iter().any(|r| r.memory.id == id));
    }

    #[tokio::test]
    async fn forget_missing_with_ignore_missing_succeeds() {
        let engine = build_engine(16);
        engine.initialize().await.unwrap();
        let result = engine
            .forget(Uuid::new_v4(), "t1", ForgetOptions { ignore_missing: true })
            .await;
        assert!(result.is_ok());
    }
}
