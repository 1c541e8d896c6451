// src/memory/index.rs
// The four secondary indexes over entry ids. Maintained incrementally by the
// store under its write lock, so an index is never observed half-updated.

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use super::types::{MemoryEntry, MemoryKind, MemorySource};

#[derive(Debug, Default)]
pub struct MemoryIndexes {
    by_tag: HashMap<String, HashSet<Uuid>>,
    by_kind: HashMap<MemoryKind, HashSet<Uuid>>,
    by_source: HashMap<MemorySource, HashSet<Uuid>>,
    by_epoch: HashMap<Uuid, HashSet<Uuid>>,
}

impl MemoryIndexes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry in all four indexes.
    pub fn insert(&mut self, entry: &MemoryEntry) {
        for tag in &entry.tags {
            self.by_tag.entry(tag.clone()).or_default().insert(entry.id);
        }
        self.by_kind.entry(entry.kind).or_default().insert(entry.id);
        self.by_source
            .entry(entry.metadata.source)
            .or_default()
            .insert(entry.id);
        if let Some(epoch_id) = entry.stamp.epoch_id {
            self.by_epoch.entry(epoch_id).or_default().insert(entry.id);
        }
    }

    /// Purge an entry from all four indexes, dropping emptied buckets so the
    /// maps do not accumulate dead keys.
    pub fn remove(&mut self, entry: &MemoryEntry) {
        for tag in &entry.tags {
            if let Some(ids) = self.by_tag.get_mut(tag) {
                ids.remove(&entry.id);
                if ids.is_empty() {
                    self.by_tag.remove(tag);
                }
            }
        }
        if let Some(ids) = self.by_kind.get_mut(&entry.kind) {
            ids.remove(&entry.id);
            if ids.is_empty() {
                self.by_kind.remove(&entry.kind);
            }
        }
        if let Some(ids) = self.by_source.get_mut(&entry.metadata.source) {
            ids.remove(&entry.id);
            if ids.is_empty() {
                self.by_source.remove(&entry.metadata.source);
            }
        }
        if let Some(epoch_id) = entry.stamp.epoch_id {
            if let Some(ids) = self.by_epoch.get_mut(&epoch_id) {
                ids.remove(&entry.id);
                if ids.is_empty() {
                    self.by_epoch.remove(&epoch_id);
                }
            }
        }
    }

    /// Re-index after a mutation that may have changed kind/source/tags.
    /// `before` is the entry as it was indexed, `after` as it is now.
    pub fn reindex(&mut self, before: &MemoryEntry, after: &MemoryEntry) {
        self.remove(before);
        self.insert(after);
    }

    pub fn ids_for_tag(&self, tag: &str) -> Option<&HashSet<Uuid>> {
        self.by_tag.get(tag)
    }

    pub fn ids_for_kind(&self, kind: MemoryKind) -> Option<&HashSet<Uuid>> {
        self.by_kind.get(&kind)
    }

    pub fn ids_for_source(&self, source: MemorySource) -> Option<&HashSet<Uuid>> {
        self.by_source.get(&source)
    }

    pub fn ids_for_epoch(&self, epoch_id: &Uuid) -> Option<&HashSet<Uuid>> {
        self.by_epoch.get(epoch_id)
    }

    /// Any-match over tags: the union of all matching tag buckets.
    pub fn union_for_tags(&self, tags: &[String]) -> HashSet<Uuid> {
        let mut ids = HashSet::new();
        for tag in tags {
            if let Some(bucket) = self.by_tag.get(tag) {
                ids.extend(bucket.iter().copied());
            }
        }
        ids
    }

    /// All-match over tags: the intersection of every tag bucket. Empty if
    /// any tag has no entries.
    pub fn intersection_for_tags(&self, tags: &[String]) -> HashSet<Uuid> {
        let mut iter = tags.iter();
        let mut ids: HashSet<Uuid> = match iter.next().and_then(|t| self.by_tag.get(t)) {
            Some(bucket) => bucket.clone(),
            None => return HashSet::new(),
        };
        for tag in iter {
            match self.by_tag.get(tag) {
                Some(bucket) => ids.retain(|id| bucket.contains(id)),
                None => return HashSet::new(),
            }
            if ids.is_empty() {
                break;
            }
        }
        ids
    }

    /// True when the id appears nowhere. Test hook for the no-dangling-ids
    /// invariant.
    pub fn is_fully_removed(&self, id: &Uuid) -> bool {
        !self.by_tag.values().any(|ids| ids.contains(id))
            && !self.by_kind.values().any(|ids| ids.contains(id))
            && !self.by_source.values().any(|ids| ids.contains(id))
            && !self.by_epoch.values().any(|ids| ids.contains(id))
    }

    pub fn clear(&mut self) {
        self.by_tag.clear();
        self.by_kind.clear();
        self.by_source.clear();
        self.by_epoch.clear();
    }
}
