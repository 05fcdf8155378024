//! HNSW-accelerated `VectorStore`, an alternative to
//! [`super::sqlite::SqliteStore`]'s brute-force scan for tenants with large
//! memory counts.
//!
//! Grounded on the teacher's `VectorIndex` (a `usearch::Index` wrapper with
//! string-key <-> internal-id mapping). Durable row data (content, tags,
//! timestamps) still lives in SQLite; only the nearest-neighbor search
//! itself is delegated to usearch. Tenant filtering still happens
//! server-side, by post-filtering usearch hits against the SQLite row's
//! `tenant_id` before returning.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use usearch::{Index, IndexOptions, MetricKind, ScalarKind};
use uuid::Uuid;

use crate::memory::SimilarityHit;

use super::sqlite::SqliteStore;
use super::{SearchQuery, StoreError, StoreResult, VectorStore};

struct KeyMap {
    key_to_id: HashMap<Uuid, u64>,
    id_to_key: HashMap<u64, Uuid>,
    next_id: u64,
}

impl KeyMap {
    fn new() -> Self {
        Self {
            key_to_id: HashMap::new(),
            id_to_key: HashMap::new(),
            next_id: 0,
        }
    }

    fn id_for(&mut self, key: Uuid) -> u64 {
        if let Some(&id) = self.key_to_id.get(&key) {
            return id;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.key_to_id.insert(key, id);
        self.id_to_key.insert(id, key);
        id
    }
}

/// Wraps [`SqliteStore`] for durable row storage and adds a `usearch` HNSW
/// index for the nearest-neighbor search step.
pub struct HnswStore {
    rows: SqliteStore,
    index: Mutex<Index>,
    keys: Mutex<KeyMap>,
    dimension: usize,
}

impl HnswStore {
    /// Opens the backing SQLite file and builds a fresh in-memory HNSW
    /// index over its rows.
    pub fn open(path: &Path, dimension: usize) -> StoreResult<Self> {
        let rows = SqliteStore::open(path, dimension)?;
        let options = IndexOptions {
            dimensions: dimension,
            metric: MetricKind::Cos,
            quantization: ScalarKind::F32,
            ..Default::default()
        };
        let index = Index::new(&options)
            .map_err(|e| StoreError::Unavailable(format!("usearch init failed: {e}")))?;
        index
            .reserve(1000)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        Ok(Self {
            rows,
            index: Mutex::new(index),
            keys: Mutex::new(KeyMap::new()),
            dimension,
        })
    }
}

#[async_trait]
impl VectorStore for HnswStore {
    async fn initialize(&self) -> StoreResult<()> {
        self.rows.initialize().await
    }

    async fn upsert(&self, memory: &crate::memory::Memory) -> StoreResult<()> {
        if memory.embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: memory.embedding.len(),
            });
        }
        self.rows.upsert(memory).await?;

        let mut index = self.index.lock().unwrap();
        let mut keys = self.keys.lock().unwrap();
        let id = keys.id_for(memory.id);
        if index.size() >= index.capacity() {
            index
                .reserve(index.capacity() * 2 + 16)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        if index.contains(id) {
            index
                .remove(id)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        }
        index
            .add(id, &memory.embedding)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], query: &SearchQuery) -> StoreResult<Vec<SimilarityHit>> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        // Over-fetch from the ANN index since tenant/agent/type filtering
        // happens after the usearch lookup.
        let fetch_count = (query.limit.min(50) * 5).max(50);
        let matches = {
            let index = self.index.lock().unwrap();
            index
                .search(vector, fetch_count)
                .map_err(|e| StoreError::Unavailable(e.to_string()))?
        };

        let keys = self.keys.lock().unwrap();
        let mut hits = Vec::new();
        for (internal_id, distance) in matches.keys.iter().zip(matches.distances.iter()) {
            let Some(&memory_id) = keys.id_to_key.get(internal_id) else {
                continue;
            };
            let memory = match self.rows.get(memory_id, &query.tenant_id).await {
                Ok(m) => m,
                Err(StoreError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            if let Some(agent) = &query.agent_id {
                if memory.agent_id.as_deref() != Some(agent.as_str()) {
                    continue;
                }
            }
            if let Some(memory_type) = query.memory_type {
                if memory.memory_type != memory_type {
                    continue;
                }
            }
            // usearch's Cos metric reports a distance in [0, 2]; similarity = 1 - distance/2.
            let similarity = (1.0 - (*distance as f64) / 2.0).clamp(0.0, 1.0);
            if similarity >= query.threshold {
                hits.push(SimilarityHit { memory, similarity });
            }
        }
        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap());
        hits.truncate(query.limit.min(50));
        Ok(hits)
    }

    async fn find_duplicate_by_hash(
        &self,
        content_hash: &str,
        tenant_id: &str,
        agent_id: Option<&str>,
    ) -> StoreResult<Option<Uuid>> {
        self.rows
            .find_duplicate_by_hash(content_hash, tenant_id, agent_id)
            .await
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        self.rows.touch(id, now).await
    }

    async fn get(&self, id: Uuid, tenant_id: &str) -> StoreResult<crate::memory::Memory> {
        self.rows.get(id, tenant_id).await
    }

    async fn delete(&self, id: Uuid, tenant_id: &str) -> StoreResult<()> {
        self.rows.delete(id, tenant_id).await?;
        let mut index = self.index.lock().unwrap();
        let mut keys = self.keys.lock().unwrap();
        if let Some(internal_id) = keys.key_to_id.remove(&id) {
            keys.id_to_key.remove(&internal_id);
            let _ = index.remove(internal_id);
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[Uuid], tenant_id: &str) -> StoreResult<usize> {
        let mut deleted = 0;
        for id in ids {
            if self.delete(*id, tenant_id).await.is_ok() {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn set_archived(&self, id: Uuid, tenant_id: &str, archived: bool) -> StoreResult<()> {
        self.rows.set_archived(id, tenant_id, archived).await
    }

    async fn list_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<crate::memory::Memory>> {
        self.rows.list_for_tenant(tenant_id).await
    }

    async fn recent_for_tenant(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<crate::memory::Memory>> {
        self.rows.recent_for_tenant(tenant_id, agent_id, limit).await
    }

    async fn count_for_tenant(&self, tenant_id: &str) -> StoreResult<usize> {
        self.rows.count_for_tenant(tenant_id).await
    }
}
