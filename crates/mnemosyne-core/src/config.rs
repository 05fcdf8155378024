//! Engine configuration
//!
//! Mirrors the configuration record fixed by spec §7. The library only
//! deals in plain Rust values; parsing these from environment variables or
//! a config file is the transport layer's concern.

use serde::{Deserialize, Serialize};

/// Vector database / collection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VectorDbConfig {
    /// Fixed embedding dimension `D` for the collection.
    pub dimension: usize,
    /// Logical namespace for the collection.
    pub collection: String,
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            dimension: 1536,
            collection: "memories".to_string(),
        }
    }
}

/// Embedding provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingConfig {
    /// Model identifier passed through to the embedder.
    pub model_id: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            model_id: "text-embedding-3-small".to_string(),
        }
    }
}

/// Latency and batching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceConfig {
    /// Per-call deadline for embedder/store operations, in milliseconds.
    pub max_query_time_ms: u64,
    /// Default result-cache TTL, in seconds.
    pub cache_ttl_seconds: u64,
    /// Optimizer batch size.
    pub batch_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_query_time_ms: 100,
            cache_ttl_seconds: 300,
            batch_size: 500,
        }
    }
}

/// Security-adjacent configuration. The engine itself does not implement
/// at-rest encryption (see DESIGN.md); these fields are threaded through
/// for a future storage/transport layer to consume.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityConfig {
    /// At-rest encryption key (>= 32 bytes). Required by the transport layer
    /// that persists this config; the engine does not validate or use it.
    pub encryption_key: Option<String>,
    /// Whether tenant isolation is enforced (always true in this engine;
    /// present for config-record compatibility).
    pub tenant_isolation: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: None,
            tenant_isolation: true,
        }
    }
}

/// Background optimizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerConfig {
    /// Sweep cadence, in hours.
    pub interval_hours: u64,
    /// Cosine-similarity threshold above which two memories are fused.
    pub duplicate_threshold: f32,
    /// Access-count floor for the low-activity sweep.
    pub low_access_threshold: i64,
    /// Idle-age floor (days) for the low-activity sweep.
    pub low_access_max_age_days: i64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            interval_hours: 6,
            duplicate_threshold: 0.98,
            low_access_threshold: 1,
            low_access_max_age_days: 21,
        }
    }
}

/// Top-level engine configuration, as fixed by spec §7's table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Vector store / collection settings.
    pub vector_db: VectorDbConfig,
    /// Embedding provider settings.
    pub embedding: EmbeddingConfig,
    /// Latency/batching settings.
    pub performance: PerformanceConfig,
    /// Security-adjacent settings (see [`SecurityConfig`]).
    pub security: SecurityConfig,
    /// Background optimizer settings.
    pub optimizer: OptimizerConfig,
    /// Decayed-score floor below which a memory is eligible for forgetting.
    pub forget_threshold: f64,
    /// Decayed-score floor below which a memory is eligible for archival.
    pub archive_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vector_db: VectorDbConfig::default(),
            embedding: EmbeddingConfig::default(),
            performance: PerformanceConfig::default(),
            security: SecurityConfig::default(),
            optimizer: OptimizerConfig::default(),
            forget_threshold: 0.05,
            archive_threshold: 0.10,
        }
    }
}

impl EngineConfig {
    /// Per-call deadline as a [`std::time::Duration`].
    pub fn max_query_time(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.performance.max_query_time_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.vector_db.dimension, 1536);
        assert_eq!(cfg.vector_db.collection, "memories");
        assert_eq!(cfg.embedding.model_id, "text-embedding-3-small");
        assert_eq!(cfg.performance.max_query_time_ms, 100);
        assert_eq!(cfg.performance.cache_ttl_seconds, 300);
        assert_eq!(cfg.performance.batch_size, 500);
        assert!(cfg.security.tenant_isolation);
        assert_eq!(cfg.optimizer.interval_hours, 6);
        assert_eq!(cfg.optimizer.duplicate_threshold, 0.98);
        assert_eq!(cfg.optimizer.low_access_threshold, 1);
        assert_eq!(cfg.optimizer.low_access_max_age_days, 21);
        assert_eq!(cfg.forget_threshold, 0.05);
        assert_eq!(cfg.archive_threshold, 0.10);
    }
}
