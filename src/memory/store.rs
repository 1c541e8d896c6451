// src/memory/store.rs

//! The two storage tiers plus their secondary indexes, as one synchronous
//! container. All access happens under the engine's state lock; everything
//! here is plain data manipulation, which keeps the locking story in exactly
//! one place (the engine).

use std::collections::HashMap;

use tracing::debug;
use uuid::Uuid;

use super::index::MemoryIndexes;
use super::types::MemoryEntry;

/// Which tier an entry currently lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    ShortTerm,
    LongTerm,
}

/// Disjoint short-term/long-term partitions over one id space. An id is
/// never present in both maps; movement between them goes through
/// [`TieredStore::promote`] only.
#[derive(Debug, Default)]
pub struct TieredStore {
    short_term: HashMap<Uuid, MemoryEntry>,
    long_term: HashMap<Uuid, MemoryEntry>,
    indexes: MemoryIndexes,
}

impl TieredStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn short_term_len(&self) -> usize {
        self.short_term.len()
    }

    pub fn long_term_len(&self) -> usize {
        self.long_term.len()
    }

    pub fn indexes(&self) -> &MemoryIndexes {
        &self.indexes
    }

    /// Insert a freshly created entry into the short-term tier and all four
    /// indexes. One atomic unit from the lock holder's point of view.
    pub fn insert(&mut self, entry: MemoryEntry) {
        self.indexes.insert(&entry);
        self.short_term.insert(entry.id, entry);
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.short_term.contains_key(id) || self.long_term.contains_key(id)
    }

    pub fn tier_of(&self, id: &Uuid) -> Option<Tier> {
        if self.short_term.contains_key(id) {
            Some(Tier::ShortTerm)
        } else if self.long_term.contains_key(id) {
            Some(Tier::LongTerm)
        } else {
            None
        }
    }

    /// Immutable lookup across both tiers, short-term first.
    pub fn get(&self, id: &Uuid) -> Option<&MemoryEntry> {
        self.short_term.get(id).or_else(|| self.long_term.get(id))
    }

    /// Mutable lookup across both tiers. Callers mutating kind, source,
    /// tags, or epoch must go through [`TieredStore::apply_reindexed`]
    /// instead, or the indexes drift.
    pub fn get_mut(&mut self, id: &Uuid) -> Option<&mut MemoryEntry> {
        if let Some(entry) = self.short_term.get_mut(id) {
            return Some(entry);
        }
        self.long_term.get_mut(id)
    }

    /// Replace an entry whose indexed fields may have changed, fixing the
    /// indexes in the same step.
    pub fn apply_reindexed(&mut self, before: &MemoryEntry, after: MemoryEntry) {
        self.indexes.reindex(before, &after);
        if self.short_term.contains_key(&after.id) {
            self.short_term.insert(after.id, after);
        } else {
            self.long_term.insert(after.id, after);
        }
    }

    /// Remove from whichever tier holds the id and purge every index.
    /// Returns the removed entry, `None` when the id was unknown.
    pub fn remove(&mut self, id: &Uuid) -> Option<MemoryEntry> {
        let entry = self
            .short_term
            .remove(id)
            .or_else(|| self.long_term.remove(id))?;
        self.indexes.remove(&entry);
        Some(entry)
    }

    /// Move a short-term entry to long-term. Indexes are untouched (they
    /// track ids, not tiers). Returns false when the id is not short-term.
    pub fn promote(&mut self, id: &Uuid) -> bool {
        match self.short_term.remove(id) {
            Some(entry) => {
                debug!("promoted {} to long-term", id);
                self.long_term.insert(entry.id, entry);
                true
            }
            None => false,
        }
    }

    pub fn short_term_entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.short_term.values()
    }

    pub fn long_term_entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.long_term.values()
    }

    pub fn long_term_entries_mut(&mut self) -> impl Iterator<Item = &mut MemoryEntry> {
        self.long_term.values_mut()
    }

    /// Union of both tiers, no particular order.
    pub fn all_entries(&self) -> impl Iterator<Item = &MemoryEntry> {
        self.short_term.values().chain(self.long_term.values())
    }

    /// (total, important) memory counts for one epoch, from the epoch index.
    pub fn epoch_counts(&self, epoch_id: &Uuid) -> (usize, usize) {
        let Some(ids) = self.indexes.ids_for_epoch(epoch_id) else {
            return (0, 0);
        };
        let mut total = 0;
        let mut important = 0;
        for id in ids {
            if let Some(entry) = self.get(id) {
                total += 1;
                if entry.importance >= 0.8 {
                    important += 1;
                }
            }
        }
        (total, important)
    }

    pub fn clear(&mut self) {
        self.short_term.clear();
        self.long_term.clear();
        self.indexes.clear();
    }

    // Persistence plumbing.

    pub fn snapshot(&self) -> (Vec<MemoryEntry>, Vec<MemoryEntry>) {
        let mut short: Vec<MemoryEntry> = self.short_term.values().cloned().collect();
        let mut long: Vec<MemoryEntry> = self.long_term.values().cloned().collect();
        short.sort_by_key(|e| (e.created_at, e.stamp.sequence));
        long.sort_by_key(|e| (e.created_at, e.stamp.sequence));
        (short, long)
    }

    /// Rebuild both tiers and all indexes from persisted entries. An id that
    /// somehow appears in both lists stays short-term only.
    pub fn restore(&mut self, short: Vec<MemoryEntry>, long: Vec<MemoryEntry>) {
        self.clear();
        for entry in long {
            self.indexes.insert(&entry);
            self.long_term.insert(entry.id, entry);
        }
        for entry in short {
            if let Some(shadow) = self.long_term.remove(&entry.id) {
                self.indexes.remove(&shadow);
            }
            self.indexes.insert(&entry);
            self.short_term.insert(entry.id, entry);
        }
    }
}

/// Initial importance for a brand-new entry: a medium base nudged up by
/// trust signals, clipped to 1.0.
pub fn initial_importance(
    content: &str,
    tool_name: Option<&str>,
    verified: bool,
    confidence: f32,
) -> f32 {
    let mut importance: f32 = 0.5;
    if tool_name.is_some() {
        importance += 0.1;
    }
    if verified {
        importance += 0.15;
    }
    if confidence > 0.8 {
        importance += 0.1;
    }
    if content.len() > 500 {
        importance += 0.05;
    }
    importance.min(1.0)
}
