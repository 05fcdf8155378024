//! Temporal decay scoring.
//!
//! Replaces the spaced-repetition scheduler this crate's structure was
//! originally built around: here decay drives ranking and eviction, not
//! flashcard review intervals. Per-type coefficients come from
//! `DecayParameters`; `decayed_score` is the single entry point used by
//! recall reranking and by the optimizer's score-based triage.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::MemoryType;

/// Per-type decay coefficients.
///
/// `base_decay_rate` sets the half-life (`1 / base_decay_rate` days); the
/// other three weights modulate the importance, access-frequency, and
/// emotional-weight boosts applied on top of the raw time decay.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DecayParameters {
    /// Weight of `importance` in stretching the half-life.
    pub importance_weight: f64,
    /// Weight of `log(1 + access_count)` in the access boost.
    pub frequency_weight: f64,
    /// Weight of `|emotional_weight|` in the emotional boost.
    pub emotional_weight: f64,
    /// Inverse half-life, in days^-1.
    pub base_decay_rate: f64,
}

impl DecayParameters {
    fn half_life_days(&self) -> f64 {
        1.0 / self.base_decay_rate
    }
}

/// Decay-parameter table keyed by memory type. Shared read-mostly; mutated
/// only via `set` / `reset_defaults`.
#[derive(Debug, Clone)]
pub struct DecayTable {
    params: HashMap<MemoryType, DecayParameters>,
}

impl DecayTable {
    /// Builds the default table. `personality` and `procedure` decay
    /// slowest; `thread` and `emotion` decay fastest.
    pub fn with_defaults() -> Self {
        let mut params = HashMap::new();
        params.insert(
            MemoryType::Personality,
            DecayParameters {
                importance_weight: 0.6,
                frequency_weight: 0.2,
                emotional_weight: 0.2,
                base_decay_rate: 1.0 / 180.0,
            },
        );
        params.insert(
            MemoryType::Procedure,
            DecayParameters {
                importance_weight: 0.5,
                frequency_weight: 0.3,
                emotional_weight: 0.1,
                base_decay_rate: 1.0 / 120.0,
            },
        );
        params.insert(
            MemoryType::Preference,
            DecayParameters {
                importance_weight: 0.4,
                frequency_weight: 0.3,
                emotional_weight: 0.2,
                base_decay_rate: 1.0 / 60.0,
            },
        );
        params.insert(
            MemoryType::Fact,
            DecayParameters {
                importance_weight: 0.4,
                frequency_weight: 0.3,
                emotional_weight: 0.1,
                base_decay_rate: 1.0 / 45.0,
            },
        );
        params.insert(
            MemoryType::Task,
            DecayParameters {
                importance_weight: 0.3,
                frequency_weight: 0.3,
                emotional_weight: 0.1,
                base_decay_rate: 1.0 / 14.0,
            },
        );
        params.insert(
            MemoryType::Thread,
            DecayParameters {
                importance_weight: 0.2,
                frequency_weight: 0.4,
                emotional_weight: 0.2,
                base_decay_rate: 1.0 / 7.0,
            },
        );
        params.insert(
            MemoryType::Emotion,
            DecayParameters {
                importance_weight: 0.2,
                frequency_weight: 0.2,
                emotional_weight: 0.5,
                base_decay_rate: 1.0 / 5.0,
            },
        );
        Self { params }
    }

    /// Looks up the parameters for a type, falling back to `Fact`'s if
    /// somehow absent (the table is always fully populated by `with_defaults`).
    pub fn get(&self, memory_type: MemoryType) -> DecayParameters {
        self.params
            .get(&memory_type)
            .copied()
            .unwrap_or_else(|| self.params[&MemoryType::Fact])
    }

    /// Overrides the parameters for one type.
    pub fn set(&mut self, memory_type: MemoryType, params: DecayParameters) {
        self.params.insert(memory_type, params);
    }

    /// Restores every type to its built-in defaults.
    pub fn reset_defaults(&mut self) {
        *self = Self::with_defaults();
    }
}

impl Default for DecayTable {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}

/// Inputs to [`decayed_score`], factored out of `Memory` so temporal scoring
/// has no dependency on the store or engine layers.
#[derive(Debug, Clone, Copy)]
pub struct DecayInputs {
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last-access time.
    pub last_accessed_at: DateTime<Utc>,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// Access count, non-negative.
    pub access_count: i64,
    /// Emotional weight in `[-1, 1]`, if any.
    pub emotional_weight: Option<f64>,
}

/// Computes the decayed score of a memory at time `now`, per the per-type
/// `params`. Always in `[0, 1]`.
pub fn decayed_score(inputs: &DecayInputs, params: &DecayParameters, now: DateTime<Utc>) -> f64 {
    let age_days = (now - inputs.created_at).num_milliseconds() as f64 / 86_400_000.0;
    let idle_days =
        (now - inputs.last_accessed_at).num_milliseconds() as f64 / 86_400_000.0;
    let age_days = age_days.max(0.0);
    let idle_days = idle_days.max(0.0);

    let importance = inputs.importance.clamp(0.0, 1.0);
    let half_life = params.half_life_days();
    let time_factor = (-age_days / (half_life * (1.0 + importance * params.importance_weight)))
        .exp();

    let access_count = inputs.access_count.max(0) as f64;
    let access_boost = 1.0 + params.frequency_weight * (1.0 + access_count).ln();

    let emo_boost = match inputs.emotional_weight {
        Some(w) => 1.0 + params.emotional_weight * w.abs(),
        None => 1.0,
    };

    let recent_boost = if idle_days < 1.0 { 1.15 } else { 1.0 };

    let confidence = inputs.confidence.clamp(0.0, 1.0);
    clamp01(confidence * time_factor * access_boost * emo_boost * recent_boost)
}

/// `should_archive(m) ≡ score(m) < archive_threshold`.
pub fn should_archive(score: f64, archive_threshold: f64) -> bool {
    score < archive_threshold
}

/// `should_forget(m) ≡ (ttl set ∧ now > ttl) ∨ score(m) < forget_threshold`.
/// Forgetting dominates archival: callers should check this before
/// `should_archive`.
pub fn should_forget(
    score: f64,
    forget_threshold: f64,
    ttl: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> bool {
    let ttl_expired = ttl.map(|t| now > t).unwrap_or(false);
    ttl_expired || score < forget_threshold
}

/// `recency(m) = exp(-age_days/30)`, used in recall's time-decay rerank:
/// `score ← similarity · recency(m)`.
pub fn recency(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = ((now - created_at).num_milliseconds() as f64 / 86_400_000.0).max(0.0);
    (-age_days / 30.0).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn base_inputs(now: DateTime<Utc>) -> DecayInputs {
        DecayInputs {
            created_at: now,
            last_accessed_at: now,
            confidence: 1.0,
            importance: 0.5,
            access_count: 0,
            emotional_weight: None,
        }
    }

    #[test]
    fn fresh_memory_scores_near_one() {
        let now = Utc::now();
        let table = DecayTable::with_defaults();
        let params = table.get(MemoryType::Fact);
        let score = decayed_score(&base_inputs(now), &params, now);
        assert!(score > 0.9, "expected near-1.0 score, got {score}");
    }

    #[test]
    fn score_is_always_bounded() {
        let now = Utc::now();
        let table = DecayTable::with_defaults();
        let params = table.get(MemoryType::Thread);
        let mut inputs = base_inputs(now - Duration::days(100_000));
        inputs.importance = 5.0;
        inputs.confidence = 5.0;
        inputs.access_count = 1_000_000;
        inputs.emotional_weight = Some(5.0);
        let score = decayed_score(&inputs, &params, now);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn temporal_monotonicity_newer_scores_at_least_as_high() {
        let now = Utc::now();
        let table = DecayTable::with_defaults();
        let params = table.get(MemoryType::Fact);

        let newer = DecayInputs {
            created_at: now - Duration::days(1),
            last_accessed_at: now - Duration::days(1),
            confidence: 1.0,
            importance: 0.5,
            access_count: 3,
            emotional_weight: None,
        };
        let older = DecayInputs {
            created_at: now - Duration::days(30),
            last_accessed_at: now - Duration::days(30),
            confidence: 1.0,
            importance: 0.5,
            access_count: 3,
            emotional_weight: None,
        };

        let newer_score = decayed_score(&newer, &params, now);
        let older_score = decayed_score(&older, &params, now);
        assert!(newer_score >= older_score);
    }

    #[test]
    fn personality_decays_slower_than_emotion() {
        let now = Utc::now();
        let table = DecayTable::with_defaults();
        let personality_params = table.get(MemoryType::Personality);
        let emotion_params = table.get(MemoryType::Emotion);

        let inputs = DecayInputs {
            created_at: now - Duration::days(30),
            last_accessed_at: now - Duration::days(30),
            confidence: 1.0,
            importance: 0.5,
            access_count: 0,
            emotional_weight: None,
        };

        let personality_score = decayed_score(&inputs, &personality_params, now);
        let emotion_score = decayed_score(&inputs, &emotion_params, now);
        assert!(personality_score > emotion_score);
    }

    #[test]
    fn forget_dominates_when_ttl_expired_even_if_score_high() {
        let now = Utc::now();
        let ttl = Some(now - Duration::seconds(1));
        assert!(should_forget(0.99, 0.05, ttl, now));
    }

    #[test]
    fn archive_threshold_below_score_is_false() {
        assert!(!should_archive(0.5, 0.10));
        assert!(should_archive(0.05, 0.10));
    }

    #[test]
    fn recency_decreases_with_age() {
        let now = Utc::now();
        let fresh = recency(now, now);
        let old = recency(now - Duration::days(60), now);
        assert!(fresh > old);
    }
}
