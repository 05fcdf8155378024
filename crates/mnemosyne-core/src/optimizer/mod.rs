//! Background maintenance: TTL purge, low-activity sweep, near-duplicate
//! fusion, score-based archival/forgetting, and cache pruning.
//!
//! Grounded on the teacher's `SleepConsolidation` (a `ConsolidationRun`
//! counter-tracking pass over records, `should_promote`/`should_prune`
//! predicates feeding a `ConsolidationResult` summary); replaces its
//! decay-driven promotion/pruning with the five ordered steps this engine's
//! optimizer runs per invocation, and adds near-duplicate fusion via
//! union-find, which the teacher never needed.

use std::collections::HashMap;

use chrono::Utc;
use uuid::Uuid;

use crate::engine::{decay_inputs_for, MemoryEngine};
use crate::error::Result;
use crate::memory::{Memory, MemoryType};
use crate::temporal::{self, DecayParameters};
use crate::vector_math;

/// Summary of one optimizer pass, in the style of the teacher's
/// `ConsolidationResult`.
#[derive(Debug, Clone, Default)]
pub struct OptimizeResult {
    /// Memories deleted for `ttl < now`.
    pub ttl_purged: usize,
    /// Memories deleted for being low-activity and stale.
    pub low_activity_purged: usize,
    /// Memories merged by near-duplicate fusion.
    pub fused: usize,
    /// Memories archived by score-based triage.
    pub archived: usize,
    /// Memories forgotten by score-based triage.
    pub forgotten: usize,
    /// Whether the cache was pruned this pass.
    pub cache_pruned: bool,
}

struct RunCounters {
    ttl_purged: usize,
    low_activity_purged: usize,
    fused: usize,
    archived: usize,
    forgotten: usize,
}

impl RunCounters {
    fn new() -> Self {
        Self {
            ttl_purged: 0,
            low_activity_purged: 0,
            fused: 0,
            archived: 0,
            forgotten: 0,
        }
    }

    fn finish(self, cache_pruned: bool) -> OptimizeResult {
        OptimizeResult {
            ttl_purged: self.ttl_purged,
            low_activity_purged: self.low_activity_purged,
            fused: self.fused,
            archived: self.archived,
            forgotten: self.forgotten,
            cache_pruned,
        }
    }
}

/// Union-find over a batch's memory ids, used by near-duplicate fusion to
/// collapse similarity-edge groups without building a heap-of-pointers graph.
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// Runs the five-step maintenance pass against an engine's store and cache.
pub struct Optimizer<'a> {
    engine: &'a MemoryEngine,
}

impl<'a> Optimizer<'a> {
    /// Builds an optimizer bound to the given engine.
    pub fn new(engine: &'a MemoryEngine) -> Self {
        Self { engine }
    }

    /// Runs all five steps in order for `tenant_id`, yielding between
    /// steps; each step is internally bounded by `config.optimizer`'s
    /// batch size (via chunking, not a hard cap on total work).
    pub async fn optimize(&self, tenant_id: &str) -> Result<OptimizeResult> {
        let mut counters = RunCounters::new();
        let batch_size = self.engine.config().performance.batch_size;

        let mut memories = self.engine.store().list_for_tenant(tenant_id).await?;
        tracing::info!(tenant_id, count = memories.len(), "optimizer pass starting");

        self.ttl_purge(tenant_id, &mut memories, &mut counters, batch_size).await?;
        tokio::task::yield_now().await;

        self.low_activity_sweep(tenant_id, &mut memories, &mut counters, batch_size)
            .await?;
        tokio::task::yield_now().await;

        self.near_duplicate_fusion(tenant_id, &mut memories, &mut counters, batch_size)
            .await?;
        tokio::task::yield_now().await;

        self.score_based_triage(tenant_id, &mut memories, &mut counters, batch_size)
            .await?;
        tokio::task::yield_now().await;

        let cache_pruned = self.cache_prune();

        let result = counters.finish(cache_pruned);
        tracing::info!(
            tenant_id,
            ttl_purged = result.ttl_purged,
            low_activity_purged = result.low_activity_purged,
            fused = result.fused,
            archived = result.archived,
            forgotten = result.forgotten,
            "optimizer pass complete"
        );
        Ok(result)
    }

    /// Step 1: delete every memory with `ttl < now`.
    async fn ttl_purge(
        &self,
        tenant_id: &str,
        memories: &mut Vec<Memory>,
        counters: &mut RunCounters,
        batch_size: usize,
    ) -> Result<()> {
        let now = Utc::now();
        let (expired, live): (Vec<Memory>, Vec<Memory>) = std::mem::take(memories)
            .into_iter()
            .partition(|m| m.ttl.map(|t| t < now).unwrap_or(false));

        for chunk in expired.chunks(batch_size.max(1)) {
            let ids: Vec<Uuid> = chunk.iter().map(|m| m.id).collect();
            let deleted = self.engine.store().delete_batch(&ids, tenant_id).await?;
            counters.ttl_purged += deleted;
        }
        *memories = live;
        Ok(())
    }

    /// Step 2: delete memories with `access_count <= low_access_threshold`
    /// and `now - last_accessed_at > low_access_max_age`.
    async fn low_activity_sweep(
        &self,
        tenant_id: &str,
        memories: &mut Vec<Memory>,
        counters: &mut RunCounters,
        batch_size: usize,
    ) -> Result<()> {
        let now = Utc::now();
        let opt_config = &self.engine.config().optimizer;
        let max_age = chrono::Duration::days(opt_config.low_access_max_age_days);

        let (stale, live): (Vec<Memory>, Vec<Memory>) = std::mem::take(memories).into_iter().partition(|m| {
            m.access_count <= opt_config.low_access_threshold && now - m.last_accessed_at > max_age
        });

        for chunk in stale.chunks(batch_size.max(1)) {
            let ids: Vec<Uuid> = chunk.iter().map(|m| m.id).collect();
            let deleted = self.engine.store().delete_batch(&ids, tenant_id).await?;
            counters.low_activity_purged += deleted;
        }
        *memories = live;
        Ok(())
    }

    /// Step 3: within each `(tenant, type)` bucket, union memories whose
    /// pairwise cosine similarity is `>= duplicate_threshold`, then keep one
    /// survivor per group (highest importance, lowest id as tiebreak),
    /// merging tags and summing access counts into the survivor.
    async fn near_duplicate_fusion(
        &self,
        tenant_id: &str,
        memories: &mut Vec<Memory>,
        counters: &mut RunCounters,
        batch_size: usize,
    ) -> Result<()> {
        let threshold = self.engine.config().optimizer.duplicate_threshold as f64;

        let mut buckets: HashMap<MemoryType, Vec<usize>> = HashMap::new();
        for (idx, memory) in memories.iter().enumerate() {
            buckets.entry(memory.memory_type).or_default().push(idx);
        }

        let mut to_delete: Vec<Uuid> = Vec::new();
        let mut survivors: Vec<Memory> = Vec::new();
        let mut fused_indices: std::collections::HashSet<usize> = std::collections::HashSet::new();

        for (_type, indices) in buckets {
            for batch in indices.chunks(batch_size.max(1)) {
                let mut uf = UnionFind::new(batch.len());
                for i in 0..batch.len() {
                    for j in (i + 1)..batch.len() {
                        let a = &memories[batch[i]];
                        let b = &memories[batch[j]];
                        if let Ok(sim) = vector_math::cosine_similarity(&a.embedding, &b.embedding) {
                            if sim as f64 >= threshold {
                                uf.union(i, j);
                            }
                        }
                    }
                }

                let mut groups: HashMap<usize, Vec<usize>> = HashMap::new();
                for i in 0..batch.len() {
                    let root = uf.find(i);
                    groups.entry(root).or_default().push(i);
                }

                for (_root, group) in groups {
                    if group.len() < 2 {
                        continue;
                    }
                    let group_indices: Vec<usize> = group.iter().map(|&i| batch[i]).collect();
                    let survivor_local_idx = *group_indices
                        .iter()
                        .min_by(|&&a, &&b| {
                            let ma = &memories[a];
                            let mb = &memories[b];
                            mb.importance
                                .partial_cmp(&ma.importance)
                                .unwrap()
                                .then_with(|| ma.id.cmp(&mb.id))
                        })
                        .unwrap();

                    let mut survivor = memories[survivor_local_idx].clone();
                    let mut summed_access = survivor.access_count;
                    for &idx in &group_indices {
                        if idx == survivor_local_idx {
                            continue;
                        }
                        let other = &memories[idx];
                        survivor.tags.extend(other.tags.iter().cloned());
                        summed_access += other.access_count;
                        to_delete.push(other.id);
                        fused_indices.insert(idx);
                        counters.fused += 1;
                    }
                    survivor.access_count = summed_access;
                    survivors.push(survivor);
                }
            }
        }

        if !to_delete.is_empty() {
            self.engine.store().delete_batch(&to_delete, tenant_id).await?;
        }
        for survivor in &survivors {
            self.engine.store().upsert(survivor).await?;
        }

        let mut updated: Vec<Memory> = Vec::new();
        for (idx, memory) in std::mem::take(memories).into_iter().enumerate() {
            if fused_indices.contains(&idx) {
                continue;
            }
            updated.push(memory);
        }
        for survivor in survivors {
            if let Some(slot) = updated.iter_mut().find(|m| m.id == survivor.id) {
                *slot = survivor;
            } else {
                updated.push(survivor);
            }
        }
        *memories = updated;
        Ok(())
    }

    /// Step 4: for each remaining memory, compute decayed score; delete if
    /// `should_forget`, else archive if `should_archive`.
    async fn score_based_triage(
        &self,
        tenant_id: &str,
        memories: &mut [Memory],
        counters: &mut RunCounters,
        batch_size: usize,
    ) -> Result<()> {
        let now = Utc::now();
        let decay_table = self.engine.decay_table();
        let config = self.engine.config();

        let mut to_forget: Vec<Uuid> = Vec::new();
        let mut to_archive: Vec<Uuid> = Vec::new();

        for memory in memories.iter() {
            let params: DecayParameters = decay_table.get(memory.memory_type);
            let inputs = decay_inputs_for(memory);
            let score = temporal::decayed_score(&inputs, &params, now);

            if temporal::should_forget(score, config.forget_threshold, memory.ttl, now) {
                to_forget.push(memory.id);
            } else if temporal::should_archive(score, config.archive_threshold) && !memory.archived {
                to_archive.push(memory.id);
            }
        }

        for chunk in to_forget.chunks(batch_size.max(1)) {
            let deleted = self.engine.store().delete_batch(chunk, tenant_id).await?;
            counters.forgotten += deleted;
        }
        for id in to_archive {
            self.engine.store().set_archived(id, tenant_id, true).await?;
            counters.archived += 1;
        }
        Ok(())
    }

    /// Step 5: clear stale result-cache entries once the cache nears capacity.
    fn cache_prune(&self) -> bool {
        let threshold = 0.9;
        let was_near_capacity = self.engine.cache().result_fill_ratio() >= threshold;
        self.engine.cache().prune_if_near_capacity(threshold);
        was_near_capacity
    }
}
