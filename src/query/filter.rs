// src/query/filter.rs
// Candidate filtering with AND semantics: every populated predicate must
// pass or the entry is excluded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::types::{MemoryEntry, MemoryKind, MemorySource};

/// How a multi-tag filter combines its tags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagMatch {
    /// Entry must carry at least one of the tags.
    #[default]
    Any,
    /// Entry must carry every tag.
    All,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<MemoryKind>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<MemorySource>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_after: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_before: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tag_match: TagMatch,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_importance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_importance: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch_id: Option<Uuid>,
}

impl MemoryFilter {
    pub fn matches(&self, entry: &MemoryEntry) -> bool {
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&entry.kind) {
                return false;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.contains(&entry.metadata.source) {
                return false;
            }
        }
        if let Some(after) = self.created_after {
            if entry.created_at < after {
                return false;
            }
        }
        if let Some(before) = self.created_before {
            if entry.created_at > before {
                return false;
            }
        }
        if !self.tags.is_empty() {
            let ok = match self.tag_match {
                TagMatch::Any => self.tags.iter().any(|t| entry.tags.contains(t)),
                TagMatch::All => self.tags.iter().all(|t| entry.tags.contains(t)),
            };
            if !ok {
                return false;
            }
        }
        if let Some(min) = self.min_importance {
            if entry.importance < min {
                return false;
            }
        }
        if let Some(max) = self.max_importance {
            if entry.importance > max {
                return false;
            }
        }
        if let Some(epoch_id) = self.epoch_id {
            if entry.stamp.epoch_id != Some(epoch_id) {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::tests::test_entry;

    #[test]
    fn empty_filter_matches_everything() {
        assert!(MemoryFilter::default().matches(&test_entry()));
    }

    #[test]
    fn all_predicates_are_anded() {
        let mut entry = test_entry();
        entry.kind = MemoryKind::Code;
        entry.tags.insert("rust".to_string());
        entry.importance = 0.6;

        let mut filter = MemoryFilter {
            kinds: Some(vec![MemoryKind::Code]),
            tags: vec!["rust".to_string()],
            min_importance: Some(0.5),
            ..Default::default()
        };
        assert!(filter.matches(&entry));

        // One failing predicate excludes the candidate.
        filter.min_importance = Some(0.9);
        assert!(!filter.matches(&entry));
    }

    #[test]
    fn tag_match_all_requires_every_tag() {
        let mut entry = test_entry();
        entry.tags.insert("x".to_string());

        let mut filter = MemoryFilter {
            tags: vec!["x".to_string(), "y".to_string()],
            tag_match: TagMatch::All,
            ..Default::default()
        };
        assert!(!filter.matches(&entry));

        filter.tag_match = TagMatch::Any;
        assert!(filter.matches(&entry));
    }

    #[test]
    fn time_range_bounds_are_inclusive_of_interior() {
        let entry = test_entry();
        let filter = MemoryFilter {
            created_after: Some(entry.created_at - chrono::Duration::hours(1)),
            created_before: Some(entry.created_at + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(filter.matches(&entry));

        let filter = MemoryFilter {
            created_after: Some(entry.created_at + chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(!filter.matches(&entry));
    }

    #[test]
    fn epoch_filter_excludes_unstamped_entries() {
        let filter = MemoryFilter {
            epoch_id: Some(Uuid::new_v4()),
            ..Default::default()
        };
        assert!(!filter.matches(&test_entry()));
    }
}
