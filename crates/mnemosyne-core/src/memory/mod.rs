//! Core memory types: the `Memory` record and result views over it.

pub mod node;

pub use node::{Memory, MemoryType, MAX_CONTENT_BYTES};

/// A view returned from `recall`: `{ memory, score, relevance_reason }`.
/// Scores are not persisted; they're recomputed per call.
#[derive(Debug, Clone)]
pub struct MemoryResult {
    /// The matched memory.
    pub memory: Memory,
    /// Final rank score in `[0, 1]`.
    pub score: f64,
    /// Short human-readable explanation of why this result ranked where it did.
    pub relevance_reason: String,
}

/// A similarity hit from the vector store, before temporal reranking.
#[derive(Debug, Clone)]
pub struct SimilarityHit {
    /// The matched memory.
    pub memory: Memory,
    /// Cosine similarity in `[0, 1]` (negative similarities are not
    /// meaningful for this store's normalized embeddings and are clamped).
    pub similarity: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::{HashMap, HashSet};
    use uuid::Uuid;

    #[test]
    fn memory_result_carries_score_and_reason() {
        let now = Utc::now();
        let memory = Memory {
            id: Uuid::new_v4(),
            tenant_id: "t1".to_string(),
            agent_id: None,
            memory_type: MemoryType::Fact,
            content: "hello".to_string(),
            embedding: vec![0.0],
            confidence: 1.0,
            importance: 0.5,
            emotional_weight: None,
            tags: HashSet::new(),
            context: HashMap::new(),
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
            access_count: 0,
            ttl: None,
            content_hash: "abc".to_string(),
            archived: false,
        };
        let result = MemoryResult {
            memory,
            score: 0.87,
            relevance_reason: "strong semantic match".to_string(),
        };
        assert!(result.score > 0.0);
    }
}
