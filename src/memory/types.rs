// src/memory/types.rs

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Primary record for everything the agent remembers: one piece of text plus
/// the scoring, timeline, and relationship bookkeeping the engine maintains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    // Core identity & content
    pub id: Uuid,
    pub content: String,
    pub kind: MemoryKind,

    // Vector / ranking
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_model: Option<String>,

    /// Ranking weight, always clipped to 0.0..=1.0 on every write.
    pub importance: f32,
    /// Per-entry exponential decay rate, in units of 1/hour.
    pub decay_rate: f32,
    pub access_count: u32,

    // Metadata
    pub metadata: MemoryMetadata,

    // Timeline stamp
    pub stamp: TimelineStamp,

    // Timestamps. Invariant: created_at <= updated_at and
    // created_at <= last_accessed.
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,

    // Relationships (advisory references, not owning pointers)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_ids: Vec<Uuid>,

    /// Unordered labels used for indexed lookup.
    #[serde(default)]
    pub tags: HashSet<String>,

    /// Set by consolidation once the entry is a cold-storage candidate.
    /// Physical migration belongs to the persistence backend, not this engine.
    #[serde(default)]
    pub archived: bool,
}

impl MemoryEntry {
    /// Mark the entry as accessed "now" and optionally apply an importance
    /// boost (clamped to 0.0..=1.0). Call this whenever the memory is
    /// surfaced to a caller.
    pub fn touch(&mut self, boost: Option<f32>) {
        self.last_accessed = Utc::now();
        self.access_count = self.access_count.saturating_add(1);
        if let Some(b) = boost {
            self.importance = (self.importance + b.max(0.0)).clamp(0.0, 1.0);
        }
    }

    /// Clip importance back into range after any external mutation.
    pub fn clip_importance(&mut self) {
        self.importance = self.importance.clamp(0.0, 1.0);
    }

    /// Age of the entry in fractional hours at `now`.
    pub fn age_hours(&self, now: DateTime<Utc>) -> f32 {
        (now - self.created_at).num_seconds().max(0) as f32 / 3600.0
    }

    /// Hours since the entry was last surfaced, at `now`.
    pub fn idle_hours(&self, now: DateTime<Utc>) -> f32 {
        (now - self.last_accessed).num_seconds().max(0) as f32 / 3600.0
    }
}

/// What sort of text a memory holds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Conversation,
    Code,
    File,
    Error,
    Decision,
    Learning,
    Preference,
    Context,
    Instruction,
    Feedback,
}

impl MemoryKind {
    /// Every variant, for pre-populating per-kind counters at zero.
    pub const ALL: [MemoryKind; 10] = [
        MemoryKind::Conversation,
        MemoryKind::Code,
        MemoryKind::File,
        MemoryKind::Error,
        MemoryKind::Decision,
        MemoryKind::Learning,
        MemoryKind::Preference,
        MemoryKind::Context,
        MemoryKind::Instruction,
        MemoryKind::Feedback,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Conversation => "conversation",
            MemoryKind::Code => "code",
            MemoryKind::File => "file",
            MemoryKind::Error => "error",
            MemoryKind::Decision => "decision",
            MemoryKind::Learning => "learning",
            MemoryKind::Preference => "preference",
            MemoryKind::Context => "context",
            MemoryKind::Instruction => "instruction",
            MemoryKind::Feedback => "feedback",
        }
    }
}

// Parse MemoryKind from strings defensively (persisted-state interop)
impl FromStr for MemoryKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "conversation" => MemoryKind::Conversation,
            "code" => MemoryKind::Code,
            "file" => MemoryKind::File,
            "error" => MemoryKind::Error,
            "decision" => MemoryKind::Decision,
            "learning" => MemoryKind::Learning,
            "preference" => MemoryKind::Preference,
            "instruction" => MemoryKind::Instruction,
            "feedback" => MemoryKind::Feedback,
            _ => MemoryKind::Context,
        })
    }
}

/// Who produced a memory.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MemorySource {
    User,
    Agent,
    System,
    Tool,
    External,
}

impl MemorySource {
    pub const ALL: [MemorySource; 5] = [
        MemorySource::User,
        MemorySource::Agent,
        MemorySource::System,
        MemorySource::Tool,
        MemorySource::External,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemorySource::User => "user",
            MemorySource::Agent => "agent",
            MemorySource::System => "system",
            MemorySource::Tool => "tool",
            MemorySource::External => "external",
        }
    }
}

/// Provenance and context attached to an entry at store time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryMetadata {
    pub source: MemorySource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    /// Caller's confidence in the content, 0.0..=1.0.
    pub confidence: f32,
    pub verified: bool,
    /// Free-form extension bag for callers that need more.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for MemoryMetadata {
    fn default() -> Self {
        Self {
            source: MemorySource::Agent,
            session_id: None,
            task_id: None,
            agent_id: None,
            tool_name: None,
            file_path: None,
            language: None,
            confidence: 1.0,
            verified: false,
            extra: serde_json::Map::new(),
        }
    }
}

/// Where on the timeline the entry was created.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimelineStamp {
    /// Epoch the entry was created under, when one was open.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub epoch_id: Option<Uuid>,
    /// Per-epoch monotonic sequence number, reset at each epoch boundary.
    /// Gives a deterministic intra-epoch order independent of clock
    /// resolution.
    pub sequence: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
}

/// Everything a caller can say about a new memory before the engine takes
/// over scoring and stamping.
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub content: String,
    pub kind: MemoryKind,
    pub metadata: MemoryMetadata,
    pub tags: HashSet<String>,
    pub parent_id: Option<Uuid>,
    pub related_ids: Vec<Uuid>,
    pub phase: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    /// Overrides the configured default decay rate when set.
    pub decay_rate: Option<f32>,
    /// Skip the embedding call entirely (the entry stays searchable by
    /// filters, just not by similarity).
    pub skip_embedding: bool,
}

impl StoreRequest {
    pub fn new(content: impl Into<String>, kind: MemoryKind) -> Self {
        Self {
            content: content.into(),
            kind,
            metadata: MemoryMetadata::default(),
            tags: HashSet::new(),
            parent_id: None,
            related_ids: Vec::new(),
            phase: None,
            expires_at: None,
            decay_rate: None,
            skip_embedding: false,
        }
    }

    pub fn with_source(mut self, source: MemorySource) -> Self {
        self.metadata.source = source;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.metadata.session_id = Some(session_id.into());
        self
    }

    pub fn with_tool(mut self, tool_name: impl Into<String>) -> Self {
        self.metadata.tool_name = Some(tool_name.into());
        self
    }

    pub fn verified(mut self) -> Self {
        self.metadata.verified = true;
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.metadata.confidence = confidence.clamp(0.0, 1.0);
        self
    }
}

/// Partial update applied by `update`. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateRequest {
    pub content: Option<String>,
    pub kind: Option<MemoryKind>,
    pub source: Option<MemorySource>,
    pub tags: Option<HashSet<String>>,
    pub importance: Option<f32>,
    pub phase: Option<String>,
    pub related_ids: Option<Vec<Uuid>>,
    pub verified: Option<bool>,
}

impl UpdateRequest {
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.kind.is_none()
            && self.source.is_none()
            && self.tags.is_none()
            && self.importance.is_none()
            && self.phase.is_none()
            && self.related_ids.is_none()
            && self.verified.is_none()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn touch_clamps_importance() {
        let mut entry = test_entry();
        entry.importance = 0.95;
        entry.touch(Some(0.5));
        assert_eq!(entry.importance, 1.0);
        assert_eq!(entry.access_count, 1);
    }

    #[test]
    fn kind_round_trips_through_str() {
        for kind in MemoryKind::ALL {
            assert_eq!(kind.as_str().parse::<MemoryKind>().unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_falls_back_to_context() {
        assert_eq!("whatever".parse::<MemoryKind>().unwrap(), MemoryKind::Context);
    }

    pub(crate) fn test_entry() -> MemoryEntry {
        let now = Utc::now();
        MemoryEntry {
            id: Uuid::new_v4(),
            content: "test".to_string(),
            kind: MemoryKind::Context,
            embedding: None,
            embedding_model: None,
            importance: 0.5,
            decay_rate: 0.01,
            access_count: 0,
            metadata: MemoryMetadata::default(),
            stamp: TimelineStamp::default(),
            created_at: now,
            updated_at: now,
            last_accessed: now,
            expires_at: None,
            parent_id: None,
            related_ids: Vec::new(),
            tags: HashSet::new(),
            archived: false,
        }
    }
}
