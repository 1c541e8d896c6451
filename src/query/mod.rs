// src/query/mod.rs

//! Filtered, similarity-ranked retrieval over both tiers. The functions
//! here are pure ranking logic; the engine wraps them with locking, access
//! bookkeeping, and the result cache.

pub mod cache;
pub mod filter;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::embedding::cosine_similarity;
use crate::error::MemoryError;
use crate::memory::store::TieredStore;
use crate::memory::types::MemoryEntry;

pub use cache::QueryCache;
pub use filter::{MemoryFilter, TagMatch};

/// Requested result order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Similarity descending.
    #[default]
    Relevance,
    /// Importance descending.
    Importance,
    /// Creation time descending.
    Recency,
}

/// A ranked query against the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub text: String,
    pub top_k: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_similarity: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<MemoryFilter>,
    #[serde(default)]
    pub sort: SortKey,
    /// Reuse a pre-computed query vector instead of embedding `text`.
    #[serde(skip)]
    pub embedding: Option<Vec<f32>>,
}

impl MemoryQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k: 10,
            min_similarity: None,
            filter: None,
            sort: SortKey::Relevance,
            embedding: None,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_min_similarity(mut self, min_similarity: f32) -> Self {
        self.min_similarity = Some(min_similarity);
        self
    }

    pub fn with_filter(mut self, filter: MemoryFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn sorted_by(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    /// Reject malformed input before any side effect.
    pub fn validate(&self) -> Result<(), MemoryError> {
        if self.text.trim().is_empty() {
            return Err(MemoryError::InvalidQuery("query text is empty".into()));
        }
        if self.top_k == 0 {
            return Err(MemoryError::InvalidQuery("top_k must be at least 1".into()));
        }
        if let Some(min) = self.min_similarity {
            if !(-1.0..=1.0).contains(&min) {
                return Err(MemoryError::InvalidQuery(format!(
                    "min_similarity {min} outside -1.0..=1.0"
                )));
            }
        }
        Ok(())
    }

    /// Cache key: a digest over everything that affects the result set.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        hasher.update([self.top_k as u8, (self.top_k >> 8) as u8]);
        if let Some(min) = self.min_similarity {
            hasher.update(min.to_le_bytes());
        }
        if let Some(filter) = &self.filter {
            // Filter serialization is deterministic for our field types.
            if let Ok(raw) = serde_json::to_vec(filter) {
                hasher.update(raw);
            }
        }
        hasher.update(serde_json::to_string(&self.sort).unwrap_or_default());
        format!("{:x}", hasher.finalize())
    }
}

/// One ranked hit: the entry copy plus its similarity to the query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMemory {
    pub entry: MemoryEntry,
    pub similarity: f32,
}

/// What a query returns: owned entry copies, never aliases into the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub entries: Vec<ScoredMemory>,
    /// Candidates remaining after filtering and the similarity floor,
    /// before truncation to `top_k`.
    pub total_candidates: usize,
    pub elapsed_ms: u64,
}

/// Collect filter-passing candidates from both tiers, index-assisted where
/// the filter pins an epoch or tags. Output order is deterministic
/// (creation time, then intra-epoch sequence, then id) so sorting has a
/// stable tie-break.
pub fn collect_candidates(store: &TieredStore, filter: Option<&MemoryFilter>) -> Vec<MemoryEntry> {
    let mut candidates: Vec<MemoryEntry> = match filter {
        Some(f) if f.epoch_id.is_some() => {
            let epoch_id = f.epoch_id.as_ref().unwrap();
            match store.indexes().ids_for_epoch(epoch_id) {
                Some(ids) => ids
                    .iter()
                    .filter_map(|id| store.get(id))
                    .filter(|e| f.matches(e))
                    .cloned()
                    .collect(),
                None => Vec::new(),
            }
        }
        Some(f) if !f.tags.is_empty() => {
            let ids = match f.tag_match {
                TagMatch::Any => store.indexes().union_for_tags(&f.tags),
                TagMatch::All => store.indexes().intersection_for_tags(&f.tags),
            };
            ids.iter()
                .filter_map(|id| store.get(id))
                .filter(|e| f.matches(e))
                .cloned()
                .collect()
        }
        Some(f) if f.kinds.as_ref().is_some_and(|k| !k.is_empty()) => {
            let kinds = f.kinds.as_ref().unwrap();
            let mut ids: Vec<uuid::Uuid> = Vec::new();
            for kind in kinds {
                if let Some(bucket) = store.indexes().ids_for_kind(*kind) {
                    ids.extend(bucket.iter().copied());
                }
            }
            ids.iter()
                .filter_map(|id| store.get(id))
                .filter(|e| f.matches(e))
                .cloned()
                .collect()
        }
        Some(f) if f.sources.as_ref().is_some_and(|s| !s.is_empty()) => {
            let sources = f.sources.as_ref().unwrap();
            let mut ids: Vec<uuid::Uuid> = Vec::new();
            for source in sources {
                if let Some(bucket) = store.indexes().ids_for_source(*source) {
                    ids.extend(bucket.iter().copied());
                }
            }
            ids.iter()
                .filter_map(|id| store.get(id))
                .filter(|e| f.matches(e))
                .cloned()
                .collect()
        }
        Some(f) => store
            .all_entries()
            .filter(|e| f.matches(e))
            .cloned()
            .collect(),
        None => store.all_entries().cloned().collect(),
    };

    candidates.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then(a.stamp.sequence.cmp(&b.stamp.sequence))
            .then(a.id.cmp(&b.id))
    });
    candidates
}

/// Score, floor, sort, and truncate. Entries without an embedding score
/// similarity 0.0 and rank last under relevance order.
pub fn rank(
    candidates: Vec<MemoryEntry>,
    query_vector: Option<&[f32]>,
    min_similarity: Option<f32>,
    sort: SortKey,
    top_k: usize,
) -> (Vec<ScoredMemory>, usize) {
    let mut scored: Vec<ScoredMemory> = candidates
        .into_iter()
        .map(|entry| {
            let similarity = match (query_vector, entry.embedding.as_deref()) {
                (Some(q), Some(e)) => cosine_similarity(q, e),
                _ => 0.0,
            };
            ScoredMemory { entry, similarity }
        })
        .collect();

    if let Some(floor) = min_similarity {
        scored.retain(|s| s.similarity >= floor);
    }
    let total_candidates = scored.len();

    // Stable sorts: ties keep the deterministic candidate order.
    match sort {
        SortKey::Relevance => scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortKey::Importance => scored.sort_by(|a, b| {
            b.entry
                .importance
                .partial_cmp(&a.entry.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        }),
        SortKey::Recency => scored.sort_by(|a, b| b.entry.created_at.cmp(&a.entry.created_at)),
    }

    scored.truncate(top_k);
    debug!(
        "ranked {} candidates, returning {}",
        total_candidates,
        scored.len()
    );
    (scored, total_candidates)
}
