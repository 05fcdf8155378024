//! The `Memory` record: the unit of storage, and its type taxonomy.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The seven memory type categories, each with its own decay coefficients
/// (see [`crate::temporal::DecayTable`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// Stable traits or dispositions of the agent or user.
    Personality,
    /// How-to knowledge: steps, processes.
    Procedure,
    /// Likes, dislikes, stated preferences.
    Preference,
    /// A factual statement.
    Fact,
    /// An ongoing conversational thread or topic.
    Thread,
    /// An actionable item: a todo, a pending task.
    Task,
    /// An affective statement.
    Emotion,
}

impl MemoryType {
    /// All variants, in a stable order. Used by the classifier and tests.
    pub const ALL: [MemoryType; 7] = [
        MemoryType::Personality,
        MemoryType::Procedure,
        MemoryType::Preference,
        MemoryType::Fact,
        MemoryType::Thread,
        MemoryType::Task,
        MemoryType::Emotion,
    ];

    /// Lowercase string form, used in storage and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::Personality => "personality",
            MemoryType::Procedure => "procedure",
            MemoryType::Preference => "preference",
            MemoryType::Fact => "fact",
            MemoryType::Thread => "thread",
            MemoryType::Task => "task",
            MemoryType::Emotion => "emotion",
        }
    }

    /// Parses the lowercase string form. `None` on an unrecognized value.
    pub fn parse(s: &str) -> Option<MemoryType> {
        match s {
            "personality" => Some(MemoryType::Personality),
            "procedure" => Some(MemoryType::Procedure),
            "preference" => Some(MemoryType::Preference),
            "fact" => Some(MemoryType::Fact),
            "thread" => Some(MemoryType::Thread),
            "task" => Some(MemoryType::Task),
            "emotion" => Some(MemoryType::Emotion),
            _ => None,
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maximum content size after sanitization, in bytes.
pub const MAX_CONTENT_BYTES: usize = 1_000_000;

/// A stored memory: the unit managed by the write and read paths.
///
/// `tenant_id` is immutable after creation. `content_hash` fingerprints
/// `(content, tenant_id)` for exact-duplicate detection; see
/// [`crate::engine::classify::content_hash`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    /// Opaque unique identifier, assigned on create.
    pub id: Uuid,
    /// Isolation scope. Every query filters by this.
    pub tenant_id: String,
    /// Optional secondary scope within the tenant.
    pub agent_id: Option<String>,
    /// Drives decay parameters.
    pub memory_type: MemoryType,
    /// Sanitized UTF-8 text, `1 <= len <= MAX_CONTENT_BYTES`.
    pub content: String,
    /// Fixed-length embedding vector of dimension `D`.
    pub embedding: Vec<f32>,
    /// In `[0, 1]`. Initial `1.0`.
    pub confidence: f64,
    /// In `[0, 1]`. Computed at creation unless overridden.
    pub importance: f64,
    /// In `[-1, 1]`, if present.
    pub emotional_weight: Option<f64>,
    /// Free-form tags.
    pub tags: HashSet<String>,
    /// Opaque caller-supplied context.
    pub context: HashMap<String, Value>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last-modification time.
    pub updated_at: DateTime<Utc>,
    /// Last-access time.
    pub last_accessed_at: DateTime<Utc>,
    /// Monotonically non-decreasing.
    pub access_count: i64,
    /// After which the memory is eligible for forgetting.
    pub ttl: Option<DateTime<Utc>>,
    /// 256-bit digest of `(content, tenant_id)`, hex-encoded.
    pub content_hash: String,
    /// Set by the optimizer's score-based triage; archived memories are
    /// still queryable but retrieved with reduced weight.
    pub archived: bool,
}

impl Memory {
    /// Bumps `last_accessed_at` to `now` and increments `access_count`, as
    /// the store's `touch` operation does on a duplicate hit or a read.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_type_round_trips_through_string() {
        for t in MemoryType::ALL {
            assert_eq!(MemoryType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn unknown_type_string_parses_to_none() {
        assert_eq!(MemoryType::parse("not-a-type"), None);
    }

    #[test]
    fn touch_increments_access_count() {
        let now = Utc::now();
        let mut memory = Memory {
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
        let later = now + chrono::Duration::seconds(5);
        memory.touch(later);
        assert_eq!(memory.access_count, 1);
        assert_eq!(memory.last_accessed_at, later);
    }
}
