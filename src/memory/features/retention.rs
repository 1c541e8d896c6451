// src/memory/features/retention.rs
// Retention scoring: the ranking signal consolidation uses to decide who
// gets promoted and who gets pruned. Derived on demand, never persisted and
// never handed to callers as an entry attribute.

use chrono::{DateTime, Utc};

use crate::memory::types::MemoryEntry;

/// Blends four signals into one relative ranking score.
pub struct RetentionScorer {
    decay_weight: f32,
    access_weight: f32,
    recency_weight: f32,
    age_weight: f32,
}

impl RetentionScorer {
    pub fn new() -> Self {
        Self {
            decay_weight: 0.4,   // 40% decayed importance
            access_weight: 0.3,  // 30% access frequency
            recency_weight: 0.2, // 20% freshness of last access
            age_weight: 0.1,     // 10% youth of the entry itself
        }
    }

    /// Score an entry at `now`. Higher is more worth keeping.
    pub fn score(&self, entry: &MemoryEntry, now: DateTime<Utc>) -> f32 {
        let age_hours = entry.age_hours(now);
        let age_days = age_hours / 24.0;

        let decayed_importance = entry.importance * (-entry.decay_rate * age_hours).exp();
        let access_factor = (1.0 + entry.access_count as f32).ln() / 10.0;
        let recency_factor = 1.0 / (1.0 + entry.idle_hours(now));
        let age_factor = 1.0 / (1.0 + age_days);

        self.decay_weight * decayed_importance
            + self.access_weight * access_factor
            + self.recency_weight * recency_factor
            + self.age_weight * age_factor
    }
}

impl Default for RetentionScorer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::tests::test_entry;
    use chrono::Duration;

    #[test]
    fn fresh_important_entry_scores_near_maximum_components() {
        let scorer = RetentionScorer::new();
        let now = Utc::now();
        let mut entry = test_entry();
        entry.importance = 1.0;

        // age ~0: decayed importance ~1, recency ~1, age factor ~1,
        // access factor 0 -> 0.4 + 0.2 + 0.1 = 0.7
        let score = scorer.score(&entry, now);
        assert!((score - 0.7).abs() < 0.01, "score was {score}");
    }

    #[test]
    fn importance_decays_with_age() {
        let scorer = RetentionScorer::new();
        let now = Utc::now();

        let mut old = test_entry();
        old.importance = 1.0;
        old.decay_rate = 0.1;
        old.created_at = now - Duration::hours(48);
        old.last_accessed = old.created_at;

        let mut fresh = old.clone();
        fresh.created_at = now;
        fresh.last_accessed = now;

        assert!(scorer.score(&fresh, now) > scorer.score(&old, now));
    }

    #[test]
    fn access_count_raises_the_score() {
        let scorer = RetentionScorer::new();
        let now = Utc::now();

        let quiet = test_entry();
        let mut busy = quiet.clone();
        busy.access_count = 20;

        assert!(scorer.score(&busy, now) > scorer.score(&quiet, now));
    }

    #[test]
    fn recent_access_beats_stale_access() {
        let scorer = RetentionScorer::new();
        let now = Utc::now();

        let mut stale = test_entry();
        stale.created_at = now - Duration::hours(100);
        stale.last_accessed = now - Duration::hours(90);

        let mut warm = stale.clone();
        warm.last_accessed = now - Duration::minutes(5);

        assert!(scorer.score(&warm, now) > scorer.score(&stale, now));
    }
}
