//! Write-path helpers: content sanitization, fingerprinting, type
//! classification, and importance scoring.
//!
//! The keyword rules here are deliberately simple pattern matches, in the
//! style of the teacher's `HybridSearcher::should_use_semantic` heuristic:
//! cheap, explainable, and good enough to route content without a model
//! call on every `remember`.

use sha2::{Digest, Sha256};

use crate::memory::{MemoryType, MAX_CONTENT_BYTES};

/// Strips control characters (except newline/tab) and truncates to
/// `MAX_CONTENT_BYTES`. Returns `None` if nothing survives (empty or
/// whitespace-only after stripping).
pub fn sanitize_content(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect();
    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        return None;
    }
    let mut truncated = trimmed.to_string();
    if truncated.len() > MAX_CONTENT_BYTES {
        while !truncated.is_char_boundary(MAX_CONTENT_BYTES) {
            truncated.pop();
        }
        truncated.truncate(MAX_CONTENT_BYTES);
    }
    Some(truncated)
}

/// `sha256(content || tenant_id)`, hex-encoded.
pub fn content_hash(content: &str, tenant_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    hasher.update(tenant_id.as_bytes());
    hex::encode(hasher.finalize())
}

const PREFERENCE_WORDS: &[&str] = &["prefer", "like", "dislike", "favorite", "rather"];
const EMOTION_WORDS: &[&str] = &["feel", "happy", "sad", "angry", "emotion", "excited", "worried"];
const TASK_WORDS: &[&str] = &["task", "todo", "finish", "deadline", "complete"];
const PROCEDURE_WORDS: &[&str] = &["how to", "step", "process", "procedure", "instructions"];

/// Deterministic keyword classifier on lowercased content. First matching
/// category wins, in the order preference -> emotion -> task -> procedure,
/// falling back to `Fact`.
pub fn classify_type(content: &str) -> MemoryType {
    let lower = content.to_lowercase();
    if PREFERENCE_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryType::Preference;
    }
    if EMOTION_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryType::Emotion;
    }
    if TASK_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryType::Task;
    }
    if PROCEDURE_WORDS.iter().any(|w| lower.contains(w)) {
        return MemoryType::Procedure;
    }
    MemoryType::Fact
}

const PRIORITY_WORDS: &[&str] = &[
    "important", "critical", "urgent", "must", "always", "never", "remember", "essential",
];

/// Base `0.5`, `+0.1` per distinct priority word matched, capped at `1.0`.
pub fn score_importance(content: &str) -> f64 {
    let lower = content.to_lowercase();
    let matched = PRIORITY_WORDS.iter().filter(|w| lower.contains(*w)).count();
    (0.5 + 0.1 * matched as f64).min(1.0)
}
