//! In-process `VectorStore` backed by SQLite, scanning candidate vectors
//! with brute-force cosine similarity.
//!
//! Grounded on the teacher's `Storage` struct: separate writer/reader
//! connections, each behind its own `Mutex`, so long-running reads don't
//! block the single writer and vice versa. WAL mode lets SQLite serve the
//! reader concurrently with writer commits.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

use crate::memory::{Memory, MemoryType, SimilarityHit};
use crate::vector_math;

use super::migrations::run_migrations;
use super::{SearchQuery, StoreError, StoreResult, VectorStore};

fn configure_connection(conn: &Connection) -> StoreResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(())
}

fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().unwrap()))
        .collect()
}

fn parse_timestamp(s: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Unavailable(format!("invalid timestamp {s}: {e}")))
}

fn row_to_memory(row: &Row<'_>, vector: Vec<f32>) -> rusqlite::Result<Memory> {
    let id: String = row.get("id")?;
    let tenant_id: String = row.get("tenant_id")?;
    let agent_id: Option<String> = row.get("agent_id")?;
    let memory_type: String = row.get("memory_type")?;
    let content: String = row.get("content")?;
    let confidence: f64 = row.get("confidence")?;
    let importance: f64 = row.get("importance")?;
    let emotional_weight: Option<f64> = row.get("emotional_weight")?;
    let tags_json: String = row.get("tags")?;
    let context_json: String = row.get("context")?;
    let created_at: String = row.get("created_at")?;
    let updated_at: String = row.get("updated_at")?;
    let last_accessed_at: String = row.get("last_accessed_at")?;
    let access_count: i64 = row.get("access_count")?;
    let ttl: Option<String> = row.get("ttl")?;
    let content_hash: String = row.get("content_hash")?;
    let archived: i64 = row.get("archived")?;

    Ok(Memory {
        id: Uuid::parse_str(&id).unwrap_or_else(|_| Uuid::nil()),
        tenant_id,
        agent_id,
        memory_type: MemoryType::parse(&memory_type).unwrap_or(MemoryType::Fact),
        content,
        embedding: vector,
        confidence,
        importance,
        emotional_weight,
        tags: serde_json::from_str(&tags_json).unwrap_or_default(),
        context: serde_json::from_str(&context_json).unwrap_or_default(),
        created_at: parse_timestamp(&created_at).unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
        updated_at: parse_timestamp(&updated_at).unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
        last_accessed_at: parse_timestamp(&last_accessed_at)
            .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap()),
        access_count,
        ttl: ttl.and_then(|t| parse_timestamp(&t).ok()),
        content_hash,
        archived: archived != 0,
    })
}

/// SQLite-backed [`VectorStore`]. `dimension` is the fixed embedding
/// length `D`; `upsert` rejects vectors of any other length.
pub struct SqliteStore {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
    dimension: usize,
}

impl SqliteStore {
    /// Opens (or creates) the database at `path` and runs migrations.
    pub fn open(path: &Path, dimension: usize) -> StoreResult<Self> {
        let writer = Connection::open(path)?;
        configure_connection(&writer)?;
        run_migrations(&writer)?;

        let reader = Connection::open(path)?;
        configure_connection(&reader)?;

        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
            dimension,
        })
    }

    /// In-memory store, for tests.
    pub fn open_in_memory(dimension: usize) -> StoreResult<Self> {
        let writer = Connection::open_in_memory()?;
        configure_connection(&writer)?;
        run_migrations(&writer)?;
        Ok(Self {
            writer: Mutex::new(writer),
            reader: Mutex::new(Connection::open_in_memory()?),
            dimension,
        })
    }

    fn fetch_vector(conn: &Connection, id: &str) -> StoreResult<Vec<f32>> {
        let bytes: Vec<u8> = conn.query_row(
            "SELECT vector FROM memory_embeddings WHERE memory_id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        Ok(decode_vector(&bytes))
    }
}

const MEMORY_COLUMNS: &str = "id, tenant_id, agent_id, memory_type, content, confidence, \
     importance, emotional_weight, tags, context, created_at, updated_at, last_accessed_at, \
     access_count, ttl, content_hash, archived";

#[async_trait]
impl VectorStore for SqliteStore {
    async fn initialize(&self) -> StoreResult<()> {
        let writer = self.writer.lock().unwrap();
        run_migrations(&writer)
    }

    async fn upsert(&self, memory: &Memory) -> StoreResult<()> {
        if memory.embedding.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: memory.embedding.len(),
            });
        }
        let conn = self.writer.lock().unwrap();
        let tags_json = serde_json::to_string(&memory.tags)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let context_json = serde_json::to_string(&memory.context)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        conn.execute(
            &format!(
                "INSERT INTO memories ({MEMORY_COLUMNS}) \
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17) \
                 ON CONFLICT(id) DO UPDATE SET \
                 tenant_id=excluded.tenant_id, agent_id=excluded.agent_id, \
                 memory_type=excluded.memory_type, content=excluded.content, \
                 confidence=excluded.confidence, importance=excluded.importance, \
                 emotional_weight=excluded.emotional_weight, tags=excluded.tags, \
                 context=excluded.context, updated_at=excluded.updated_at, \
                 last_accessed_at=excluded.last_accessed_at, access_count=excluded.access_count, \
                 ttl=excluded.ttl, content_hash=excluded.content_hash, archived=excluded.archived"
            ),
            params![
                memory.id.to_string(),
                memory.tenant_id,
                memory.agent_id,
                memory.memory_type.as_str(),
                memory.content,
                memory.confidence,
                memory.importance,
                memory.emotional_weight,
                tags_json,
                context_json,
                memory.created_at.to_rfc3339(),
                memory.updated_at.to_rfc3339(),
                memory.last_accessed_at.to_rfc3339(),
                memory.access_count,
                memory.ttl.map(|t| t.to_rfc3339()),
                memory.content_hash,
                memory.archived as i64,
            ],
        )?;

        conn.execute(
            "INSERT INTO memory_embeddings (memory_id, vector, dimension) VALUES (?1, ?2, ?3) \
             ON CONFLICT(memory_id) DO UPDATE SET vector=excluded.vector, dimension=excluded.dimension",
            params![
                memory.id.to_string(),
                encode_vector(&memory.embedding),
                memory.embedding.len() as i64
            ],
        )?;
        Ok(())
    }

    async fn search(&self, vector: &[f32], query: &SearchQuery) -> StoreResult<Vec<SimilarityHit>> {
        if vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let conn = self.reader.lock().unwrap();

        let mut sql = format!(
            "SELECT {cols}, e.vector FROM memories m \
             JOIN memory_embeddings e ON e.memory_id = m.id \
             WHERE m.tenant_id = ?1",
            cols = MEMORY_COLUMNS
                .split(", ")
                .map(|c| format!("m.{c}"))
                .collect::<Vec<_>>()
                .join(", ")
        );
        let mut bind_count = 1;
        if query.agent_id.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" AND m.agent_id = ?{bind_count}"));
        }
        if query.memory_type.is_some() {
            bind_count += 1;
            sql.push_str(&format!(" AND m.memory_type = ?{bind_count}"));
        }
        bind_count += 1;
        sql.push_str(&format!(" AND (m.ttl IS NULL OR m.ttl > ?{bind_count})"));

        let mut stmt = conn.prepare(&sql)?;
        let tenant = query.tenant_id.clone();
        let agent = query.agent_id.clone();
        let memory_type = query.memory_type.map(|t| t.as_str().to_string());
        let now = Utc::now().to_rfc3339();

        let rows = match (&agent, &memory_type) {
            (Some(a), Some(t)) => stmt.query_map(params![tenant, a, t, now], |row| {
                let vector_bytes: Vec<u8> = row.get(MEMORY_COLUMNS.split(", ").count())?;
                row_to_memory(row, decode_vector(&vector_bytes))
            })?,
            (Some(a), None) => stmt.query_map(params![tenant, a, now], |row| {
                let vector_bytes: Vec<u8> = row.get(MEMORY_COLUMNS.split(", ").count())?;
                row_to_memory(row, decode_vector(&vector_bytes))
            })?,
            (None, Some(t)) => stmt.query_map(params![tenant, t, now], |row| {
                let vector_bytes: Vec<u8> = row.get(MEMORY_COLUMNS.split(", ").count())?;
                row_to_memory(row, decode_vector(&vector_bytes))
            })?,
            (None, None) => stmt.query_map(params![tenant, now], |row| {
                let vector_bytes: Vec<u8> = row.get(MEMORY_COLUMNS.split(", ").count())?;
                row_to_memory(row, decode_vector(&vector_bytes))
            })?,
        };

        let mut hits = Vec::new();
        for row in rows {
            let memory = row?;
            let similarity = vector_math::cosine_similarity(vector, &memory.embedding)
                .map_err(|e| StoreError::DimensionMismatch {
                    expected: e.expected,
                    got: e.got,
                })? as f64;
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
        let conn = self.reader.lock().unwrap();
        let id: Option<String> = match agent_id {
            Some(agent) => conn
                .query_row(
                    "SELECT id FROM memories WHERE tenant_id = ?1 AND content_hash = ?2 AND agent_id = ?3",
                    params![tenant_id, content_hash, agent],
                    |row| row.get(0),
                )
                .optional()?,
            None => conn
                .query_row(
                    "SELECT id FROM memories WHERE tenant_id = ?1 AND content_hash = ?2",
                    params![tenant_id, content_hash],
                    |row| row.get(0),
                )
                .optional()?,
        };
        Ok(id.and_then(|s| Uuid::parse_str(&s).ok()))
    }

    async fn touch(&self, id: Uuid, now: DateTime<Utc>) -> StoreResult<()> {
        let conn = self.writer.lock().unwrap();
        let changed = conn.execute(
            "UPDATE memories SET last_accessed_at = ?1, access_count = access_count + 1 WHERE id = ?2",
            params![now.to_rfc3339(), id.to_string()],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get(&self, id: Uuid, tenant_id: &str) -> StoreResult<Memory> {
        let conn = self.reader.lock().unwrap();
        let sql = format!(
            "SELECT {MEMORY_COLUMNS} FROM memories \
             WHERE id = ?1 AND tenant_id = ?2 AND (ttl IS NULL OR ttl > ?3)"
        );
        let now = Utc::now().to_rfc3339();
        let vector = Self::fetch_vector(&conn, &id.to_string())?;
        conn.query_row(&sql, params![id.to_string(), tenant_id, now], |row| {
            row_to_memory(row, vector.clone())
        })
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn delete(&self, id: Uuid, tenant_id: &str) -> StoreResult<()> {
        let conn = self.writer.lock().unwrap();
        let changed = conn.execute(
            "DELETE FROM memories WHERE id = ?1 AND tenant_id = ?2",
            params![id.to_string(), tenant_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete_batch(&self, ids: &[Uuid], tenant_id: &str) -> StoreResult<usize> {
        let conn = self.writer.lock().unwrap();
        let mut deleted = 0;
        for id in ids {
            let changed = conn.execute(
                "DELETE FROM memories WHERE id = ?1 AND tenant_id = ?2",
                params![id.to_string(), tenant_id],
            )?;
            deleted += changed;
        }
        Ok(deleted)
    }

    async fn set_archived(&self, id: Uuid, tenant_id: &str, archived: bool) -> StoreResult<()> {
        let conn = self.writer.lock().unwrap();
        let changed = conn.execute(
            "UPDATE memories SET archived = ?1 WHERE id = ?2 AND tenant_id = ?3",
            params![archived as i64, id.to_string(), tenant_id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    // Intentionally includes ttl-expired rows: the optimizer's TTL purge
    // step needs to see them to delete them. search/get/recent_for_tenant
    // exclude them instead, since those back the read path.
    // Intentionally includes ttl-expired rows: the optimizer's TTL purge step
    // needs to see them to delete them. search/get/recent_for_tenant exclude
    // them instead, since those back the read path.
    async fn list_for_tenant(&self, tenant_id: &str) -> StoreResult<Vec<Memory>> {
        let conn = self.reader.lock().unwrap();
        let sql = format!(
            "SELECT {MEMORY_COLUMNS}, e.vector FROM memories m \
             JOIN memory_embeddings e ON e.memory_id = m.id WHERE m.tenant_id = ?1"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![tenant_id], |row| {
            let vector_bytes: Vec<u8> = row.get(MEMORY_COLUMNS.split(", ").count())?;
            row_to_memory(row, decode_vector(&vector_bytes))
        })?;
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    async fn recent_for_tenant(
        &self,
        tenant_id: &str,
        agent_id: Option<&str>,
        limit: usize,
    ) -> StoreResult<Vec<Memory>> {
        let conn = self.reader.lock().unwrap();
        let now = Utc::now().to_rfc3339();
        let sql = format!(
            "SELECT {MEMORY_COLUMNS}, e.vector FROM memories m \
             JOIN memory_embeddings e ON e.memory_id = m.id \
             WHERE m.tenant_id = ?1 AND (m.ttl IS NULL OR m.ttl > ?2) {agent_filter} \
             ORDER BY m.last_accessed_at DESC, m.created_at DESC LIMIT ?{limit_idx}",
            agent_filter = if agent_id.is_some() { "AND m.agent_id = ?3" } else { "" },
            limit_idx = if agent_id.is_some() { 4 } else { 3 },
        );
        let mut stmt = conn.prepare(&sql)?;
        let column_count = MEMORY_COLUMNS.split(", ").count();
        let rows = if let Some(agent) = agent_id {
            stmt.query_map(params![tenant_id, now, agent, limit as i64], |row| {
                let vector_bytes: Vec<u8> = row.get(column_count)?;
                row_to_memory(row, decode_vector(&vector_bytes))
            })?
        } else {
            stmt.query_map(params![tenant_id, now, limit as i64], |row| {
                let vector_bytes: Vec<u8> = row.get(column_count)?;
                row_to_memory(row, decode_vector(&vector_bytes))
            })?
        };
        let mut memories = Vec::new();
        for row in rows {
            memories.push(row?);
        }
        Ok(memories)
    }

    async fn count_for_tenant(&self, tenant_id: &str) -> StoreResult<usize> {
        let conn = self.reader.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM memories WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}
