// src/timeline/mod.rs

//! Epoch and event bookkeeping. An epoch is one named segment of the agent's
//! timeline (a session or a task); events are the immutable log that can
//! drive epoch transitions automatically.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::memory::types::TimelineStamp;

/// A named, bounded segment of the timeline. At most one epoch is open at a
/// time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEpoch {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    /// Entries stamped with this epoch, computed when the epoch closes.
    pub memory_count: usize,
    /// Of those, entries with importance >= 0.8.
    pub important_memory_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
}

/// Immutable record of a significant occurrence. Events never mutate after
/// capture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: Uuid,
    pub kind: TimelineEventKind,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_memory_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TimelineEventKind {
    SessionStart,
    SessionComplete,
    SessionFail,
    TaskStart,
    TaskComplete,
    TaskFail,
    Decision,
    Error,
    Learning,
    Handoff,
    Milestone,
}

impl TimelineEventKind {
    /// Whether this event opens or closes an epoch when auto-detection is on.
    pub fn epoch_transition(&self) -> Option<EpochTransition> {
        match self {
            TimelineEventKind::SessionStart | TimelineEventKind::TaskStart => {
                Some(EpochTransition::Open)
            }
            TimelineEventKind::SessionComplete
            | TimelineEventKind::TaskComplete => Some(EpochTransition::Close),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochTransition {
    Open,
    Close,
}

/// All timeline bookkeeping. Lives inside the engine's state lock; the
/// cross-cutting pieces (counting an epoch's memories) are orchestrated by
/// the engine, which owns both this and the tiers.
#[derive(Debug)]
pub struct TimelineState {
    pub enabled: bool,
    pub auto_detect: bool,
    epochs: HashMap<Uuid, TimelineEpoch>,
    current: Option<Uuid>,
    events: Vec<TimelineEvent>,
    next_sequence: u64,
}

impl TimelineState {
    pub fn new(enabled: bool, auto_detect: bool) -> Self {
        Self {
            enabled,
            auto_detect,
            epochs: HashMap::new(),
            current: None,
            events: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn current_epoch_id(&self) -> Option<Uuid> {
        self.current
    }

    pub fn current_epoch(&self) -> Option<&TimelineEpoch> {
        self.current.and_then(|id| self.epochs.get(&id))
    }

    pub fn epoch(&self, id: &Uuid) -> Option<&TimelineEpoch> {
        self.epochs.get(id)
    }

    pub fn epoch_count(&self) -> usize {
        self.epochs.len()
    }

    pub fn events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Stamp for the next stored entry: current epoch (if any) plus the next
    /// per-epoch sequence number.
    pub fn next_stamp(&mut self, phase: Option<String>) -> TimelineStamp {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        TimelineStamp {
            epoch_id: self.current,
            sequence,
            phase,
        }
    }

    /// Open a new epoch. The caller must have closed any open epoch first
    /// (closing needs memory counts this struct cannot compute alone).
    pub fn open_epoch(&mut self, name: &str, description: &str) -> TimelineEpoch {
        debug_assert!(self.current.is_none(), "open epoch left behind");

        let epoch = TimelineEpoch {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            memory_count: 0,
            important_memory_count: 0,
            parent_id: None,
        };
        self.current = Some(epoch.id);
        self.next_sequence = 0;
        self.epochs.insert(epoch.id, epoch.clone());

        info!("epoch started: {} ({})", epoch.name, epoch.id);
        epoch
    }

    /// Close the open epoch with counts the engine computed from its epoch
    /// index. No-op (returns `None`) when no epoch is open.
    pub fn close_current(
        &mut self,
        memory_count: usize,
        important_memory_count: usize,
    ) -> Option<TimelineEpoch> {
        let id = self.current.take()?;
        let epoch = self.epochs.get_mut(&id)?;

        epoch.ended_at = Some(Utc::now());
        epoch.memory_count = memory_count;
        epoch.important_memory_count = important_memory_count;

        info!(
            "epoch ended: {} ({} memories, {} important)",
            epoch.name, memory_count, important_memory_count
        );
        Some(epoch.clone())
    }

    /// Append an event to the log. Returns a clone of the stored record.
    pub fn record_event(
        &mut self,
        kind: TimelineEventKind,
        description: &str,
        related_memory_ids: Vec<Uuid>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> TimelineEvent {
        let event = TimelineEvent {
            id: Uuid::new_v4(),
            kind,
            description: description.to_string(),
            occurred_at: Utc::now(),
            epoch_id: self.current,
            related_memory_ids,
            metadata,
        };
        debug!("event captured: {:?} ({})", kind, event.id);
        self.events.push(event.clone());
        event
    }

    pub fn clear(&mut self) {
        self.epochs.clear();
        self.current = None;
        self.events.clear();
        self.next_sequence = 0;
    }

    // Persistence plumbing: flat dumps and restore.

    pub fn snapshot(&self) -> (Vec<TimelineEpoch>, Vec<TimelineEvent>, Option<Uuid>, u64) {
        let mut epochs: Vec<TimelineEpoch> = self.epochs.values().cloned().collect();
        epochs.sort_by_key(|e| e.started_at);
        (epochs, self.events.clone(), self.current, self.next_sequence)
    }

    pub fn restore(
        &mut self,
        epochs: Vec<TimelineEpoch>,
        events: Vec<TimelineEvent>,
        current: Option<Uuid>,
        next_sequence: u64,
    ) {
        self.epochs = epochs.into_iter().map(|e| (e.id, e)).collect();
        self.events = events;
        self.current = current.filter(|id| self.epochs.contains_key(id));
        self.next_sequence = next_sequence;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_resets_at_epoch_boundary() {
        let mut timeline = TimelineState::new(true, false);
        timeline.open_epoch("a", "");
        assert_eq!(timeline.next_stamp(None).sequence, 0);
        assert_eq!(timeline.next_stamp(None).sequence, 1);

        timeline.close_current(2, 0);
        timeline.open_epoch("b", "");
        assert_eq!(timeline.next_stamp(None).sequence, 0);
    }

    #[test]
    fn close_without_open_epoch_is_noop() {
        let mut timeline = TimelineState::new(true, false);
        assert!(timeline.close_current(0, 0).is_none());
    }

    #[test]
    fn events_carry_the_open_epoch() {
        let mut timeline = TimelineState::new(true, false);
        let epoch = timeline.open_epoch("work", "");
        let event = timeline.record_event(
            TimelineEventKind::Decision,
            "chose sqlite",
            vec![],
            serde_json::Map::new(),
        );
        assert_eq!(event.epoch_id, Some(epoch.id));
        assert_eq!(timeline.events().len(), 1);
    }

    #[test]
    fn transition_mapping_covers_start_and_complete() {
        use TimelineEventKind::*;
        assert_eq!(SessionStart.epoch_transition(), Some(EpochTransition::Open));
        assert_eq!(TaskStart.epoch_transition(), Some(EpochTransition::Open));
        assert_eq!(SessionComplete.epoch_transition(), Some(EpochTransition::Close));
        assert_eq!(TaskComplete.epoch_transition(), Some(EpochTransition::Close));
        assert_eq!(SessionFail.epoch_transition(), None);
        assert_eq!(Milestone.epoch_transition(), None);
    }

    #[test]
    fn snapshot_restore_round_trips() {
        let mut timeline = TimelineState::new(true, true);
        timeline.open_epoch("a", "first");
        timeline.record_event(
            TimelineEventKind::Milestone,
            "halfway",
            vec![],
            serde_json::Map::new(),
        );
        timeline.next_stamp(None);

        let (epochs, events, current, seq) = timeline.snapshot();
        let mut restored = TimelineState::new(true, true);
        restored.restore(epochs, events, current, seq);

        assert_eq!(restored.epoch_count(), 1);
        assert_eq!(restored.events().len(), 1);
        assert_eq!(restored.current_epoch_id(), timeline.current_epoch_id());
        assert_eq!(restored.next_stamp(None).sequence, 1);
    }
}
