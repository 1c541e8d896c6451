// src/config/mod.rs
// All engine tunables in one place; every field has a workable default so an
// engine can be built with `MemoryEngineConfig::default()` and no file at all.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryEngineConfig {
    // ── Storage limits
    /// Capacity of the short-term (working) tier. Crossing 80% of this
    /// triggers an eager consolidation pass.
    pub max_short_term: usize,
    /// Soft capacity of the long-term tier, reported in statistics.
    pub max_long_term: usize,
    /// Seconds between autosave flushes to the persistence backend.
    /// Zero disables the autosave timer.
    pub autosave_interval_secs: u64,

    // ── Embeddings
    pub embedding_dimension: usize,
    /// Maximum texts per batched provider call.
    pub embedding_batch_size: usize,
    /// Entries held by the text→vector cache (oldest-inserted evicted first).
    pub embedding_cache_size: usize,

    // ── Retention & consolidation
    /// Default per-hour exponential decay rate for new entries.
    pub default_decay_rate: f32,
    /// Importance added each time an entry is surfaced by `get` or a query.
    pub access_boost: f32,
    /// Retention score at or above which a short-term entry is promoted.
    pub consolidation_threshold: f32,
    /// Retention score below which a short-term entry becomes a prune
    /// candidate.
    pub prune_threshold: f32,
    /// Fraction of the prune-candidate set actually deleted per cycle.
    /// Backpressure valve: a single burst can never erase everything at once.
    pub prune_fraction: f32,
    /// Age in hours after which a sub-HIGH-importance long-term entry is
    /// flagged as archived.
    pub archive_age_hours: f32,
    /// Seconds between background consolidation passes. Zero disables the
    /// timer (eager passes still fire on occupancy).
    pub consolidation_interval_secs: u64,

    // ── Timeline
    pub timeline_enabled: bool,
    /// When true, session/task start and complete events open and close
    /// epochs automatically.
    pub auto_epoch_detection: bool,

    // ── Query cache
    pub query_cache_size: usize,
    /// Seconds a cached query result stays valid.
    pub query_cache_ttl_secs: u64,
}

impl Default for MemoryEngineConfig {
    fn default() -> Self {
        Self {
            max_short_term: 200,
            max_long_term: 10_000,
            autosave_interval_secs: 300,
            embedding_dimension: 256,
            embedding_batch_size: 100,
            embedding_cache_size: 1_000,
            default_decay_rate: 0.01,
            access_boost: 0.05,
            consolidation_threshold: 0.5,
            prune_threshold: 0.15,
            prune_fraction: 0.3,
            archive_age_hours: 24.0 * 30.0,
            consolidation_interval_secs: 600,
            timeline_enabled: true,
            auto_epoch_detection: true,
            query_cache_size: 128,
            query_cache_ttl_secs: 60,
        }
    }
}

impl MemoryEngineConfig {
    /// Short-term occupancy (entry count) at which an eager consolidation
    /// pass is forced.
    pub fn eager_consolidation_watermark(&self) -> usize {
        ((self.max_short_term as f32) * 0.8).ceil() as usize
    }
}
