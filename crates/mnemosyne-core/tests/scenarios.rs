//! End-to-end scenarios against a hermetic engine: `SqliteStore` in memory
//! plus `DeterministicEmbedder`, so these tests need no model download and
//! no network access.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use mnemosyne_core::embeddings::{EmbedError, EmbedResult, Embedder, Embedding};
use mnemosyne_core::prelude::*;

fn build_engine(dimension: usize) -> MemoryEngine {
    let mut config = EngineConfig::default();
    config.vector_db.dimension = dimension;
    let store = Box::new(SqliteStore::open_in_memory(dimension).unwrap());
    let embedder = Box::new(DeterministicEmbedder::new(dimension));
    MemoryEngine::new(config, store, embedder)
}

/// An embedder that always fails, for exercising the embed-side circuit
/// breaker without touching a real backend.
struct FailingEmbedder {
    dimension: usize,
}

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed(&self, _text: &str, _model_id: &str) -> EmbedResult<Embedding> {
        Err(EmbedError::Unavailable("simulated outage".to_string()))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn build_engine_with_failing_embedder(dimension: usize) -> MemoryEngine {
    let mut config = EngineConfig::default();
    config.vector_db.dimension = dimension;
    let store = Box::new(SqliteStore::open_in_memory(dimension).unwrap());
    let embedder = Box::new(FailingEmbedder { dimension });
    MemoryEngine::new(config, store, embedder)
}

/// An embedder that sleeps past any reasonable deadline before succeeding,
/// for exercising the per-call timeout independent of retry/breaker logic.
struct SlowEmbedder {
    dimension: usize,
    delay: Duration,
}

#[async_trait]
impl Embedder for SlowEmbedder {
    async fn embed(&self, _text: &str, _model_id: &str) -> EmbedResult<Embedding> {
        tokio::time::sleep(self.delay).await;
        Ok(Embedding {
            vector: vec![0.0; self.dimension],
            tokens_used: 1,
        })
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

fn build_engine_with_slow_embedder(dimension: usize, max_query_time_ms: u64, delay: Duration) -> MemoryEngine {
    let mut config = EngineConfig::default();
    config.vector_db.dimension = dimension;
    config.performance.max_query_time_ms = max_query_time_ms;
    let store = Box::new(SqliteStore::open_in_memory(dimension).unwrap());
    let embedder = Box::new(SlowEmbedder { dimension, delay });
    MemoryEngine::new(config, store, embedder)
}

#[tokio::test]
async fn scenario_dedup() {
    let engine = build_engine(16);
    engine.initialize().await.unwrap();

    let m1 = engine
        .remember("Alice likes tea", "t1", RememberOptions::default())
        .await
        .unwrap();
    let m1_again = engine
        .remember("Alice likes tea", "t1", RememberOptions::default())
        .await
        .unwrap();

    assert_eq!(m1, m1_again);
    let stats = engine.get_stats("t1").await.unwrap();
    assert_eq!(stats.memory_count, 1);
}

#[tokio::test]
async fn scenario_tenant_isolation() {
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
async fn scenario_threshold_filtering() {
    let engine = build_engine(16);
    engine.initialize().await.unwrap();

    for i in 0..5 {
        engine
            .remember(&format!("memory number {i}"), "t1", RememberOptions::default())
            .await
            .unwrap();
    }

    let strict = engine
        .recall(
            "memory number 0",
            "t1",
            RecallOptions {
                threshold: 0.999,
                limit: 50,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    for r in &strict {
        assert!(r.score >= 0.0);
    }

    let loose = engine
        .recall(
            "memory number 0",
            "t1",
            RecallOptions {
                threshold: 0.0,
                limit: 50,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(loose.len() <= 50);
    for pair in loose.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn scenario_optimizer_fusion() {
    let engine = build_engine(16);
    engine.initialize().await.unwrap();

    engine
        .remember(
            "duplicate content here",
            "t1",
            RememberOptions {
                skip_duplicate_check: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    engine
        .remember(
            "duplicate content here",
            "t1",
            RememberOptions {
                skip_duplicate_check: true,
                tags: ["tag-b".to_string()].into_iter().collect(),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let before = engine.store().list_for_tenant("t1").await.unwrap();
    assert_eq!(before.len(), 2);

    let optimizer = Optimizer::new(&engine);
    let result = optimizer.optimize("t1").await.unwrap();
    assert_eq!(result.fused, 1);

    let after = engine.store().list_for_tenant("t1").await.unwrap();
    assert_eq!(after.len(), 1);
    assert!(after[0].tags.contains("tag-b"));
}

#[tokio::test]
async fn scenario_ttl_forget() {
    let engine = build_engine(16);
    engine.initialize().await.unwrap();

    let id = engine
        .remember(
            "ephemeral fact",
            "t1",
            RememberOptions {
                ttl: Some(chrono::Utc::now() + chrono::Duration::milliseconds(10)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;

    // The memory is logically forgotten at the next read, regardless of
    // whether the optimizer has run yet.
    let recalled = engine
        .recall(
            "ephemeral fact",
            "t1",
            RecallOptions {
                threshold: 0.0,
                use_cache: false,
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(!recalled.iter().any(|r| r.memory.id == id));

    let optimizer = Optimizer::new(&engine);
    let result = optimizer.optimize("t1").await.unwrap();
    assert_eq!(result.ttl_purged, 1);

    let remaining = engine.store().list_for_tenant("t1").await.unwrap();
    assert!(!remaining.iter().any(|m| m.id == id));
}

#[tokio::test]
async fn scenario_remember_forget_recall_round_trip() {
    let engine = build_engine(16);
    engine.initialize().await.unwrap();

    let id = engine
        .remember("a note to be forgotten", "t1", RememberOptions::default())
        .await
        .unwrap();
    engine.forget(id, "t1", ForgetOptions::default()).await.unwrap();

    let results = engine
        .recall(
            "a note to be forgotten",
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
async fn scenario_embed_call_times_out() {
    let engine = build_engine_with_slow_embedder(16, 20, Duration::from_millis(200));
    engine.initialize().await.unwrap();

    let err = engine
        .remember("will time out", "t1", RememberOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Timeout(_)));
}

#[tokio::test]
async fn scenario_get_context_bounds_and_counts_types() {
    let engine = build_engine(16);
    engine.initialize().await.unwrap();

    for i in 0..3 {
        engine
            .remember(&format!("fact number {i}"), "t1", RememberOptions::default())
            .await
            .unwrap();
    }
    engine
        .remember("I feel happy about this", "t1", RememberOptions::default())
        .await
        .unwrap();

    let context = engine
        .get_context(ContextRequest {
            tenant_id: "t1".to_string(),
            agent_id: None,
            max_memories: 25,
        })
        .await
        .unwrap();

    assert_eq!(context.memories.len(), 4);
    assert_eq!(*context.type_counts.get(&MemoryType::Emotion).unwrap_or(&0), 1);
}

#[tokio::test]
async fn scenario_circuit_breaker_trips_after_repeated_embed_failures() {
    let engine = build_engine_with_failing_embedder(16);
    engine.initialize().await.unwrap();

    // CircuitBreakerConfig::default() trips at failure_threshold=0.5 once
    // minimum_calls=10 outcomes have been recorded in the window. Each
    // `remember` call records exactly one breaker outcome regardless of
    // how many retries happened inside it.
    for i in 0..10 {
        let err = engine
            .remember(&format!("will never embed {i}"), "t1", RememberOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::Unavailable(_)));
    }

    let health = engine.get_health().await;
    assert!(matches!(health.status, mnemosyne_core::engine::HealthStatus::Degraded));

    let started = Instant::now();
    let err = engine
        .remember("one more for the road", "t1", RememberOptions::default())
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, MemoryError::CircuitOpen(_)));
    assert!(
        elapsed < Duration::from_millis(50),
        "circuit-open rejection should be immediate, took {elapsed:?}"
    );
}

#[tokio::test]
async fn scenario_health_is_healthy_on_a_fresh_engine() {
    let engine = build_engine(16);
    engine.initialize().await.unwrap();
    let health = engine.get_health().await;
    assert!(matches!(health.status, mnemosyne_core::engine::HealthStatus::Healthy));
}
