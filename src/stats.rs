// src/stats.rs
// Point-in-time statistics snapshot. Per-category counters are always fully
// populated: every kind and source appears with an explicit zero, so readers
// never do arithmetic against a missing key.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::memory::types::{MemoryKind, MemorySource};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryStatistics {
    pub short_term_count: usize,
    pub long_term_count: usize,
    pub archived_count: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub by_source: BTreeMap<String, usize>,
    pub epoch_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_epoch: Option<String>,
    pub event_count: usize,
    pub embedding_cache: CacheStats,
    pub query_cache: CacheStats,
    pub generated_at: DateTime<Utc>,
}

impl MemoryStatistics {
    /// Empty snapshot with every category counter pre-seeded at zero.
    pub fn empty() -> Self {
        let by_kind = MemoryKind::ALL
            .iter()
            .map(|k| (k.as_str().to_string(), 0))
            .collect();
        let by_source = MemorySource::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        Self {
            short_term_count: 0,
            long_term_count: 0,
            archived_count: 0,
            by_kind,
            by_source,
            epoch_count: 0,
            open_epoch: None,
            event_count: 0,
            embedding_cache: CacheStats::default(),
            query_cache: CacheStats::default(),
            generated_at: Utc::now(),
        }
    }

    pub fn count_kind(&mut self, kind: MemoryKind) {
        *self.by_kind.entry(kind.as_str().to_string()).or_insert(0) += 1;
    }

    pub fn count_source(&mut self, source: MemorySource) {
        *self
            .by_source
            .entry(source.as_str().to_string())
            .or_insert(0) += 1;
    }
}
