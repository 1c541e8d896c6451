// src/persistence/mod.rs

//! Durable-state seam. The engine serializes its whole world into a
//! [`PersistedState`] and hands it to whatever backend is configured; the
//! backend's technology (file, database, hosted store) is not this crate's
//! concern beyond the two shipped reference implementations.

pub mod json;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::memory::types::MemoryEntry;
use crate::timeline::{TimelineEpoch, TimelineEvent};

pub use json::JsonFileBackend;

/// Snapshot of everything the engine needs to survive a restart. Indexes are
/// deliberately absent; they are rebuilt from the entries on load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedState {
    pub short_term: Vec<MemoryEntry>,
    pub long_term: Vec<MemoryEntry>,
    pub epochs: Vec<TimelineEpoch>,
    pub events: Vec<TimelineEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_epoch: Option<Uuid>,
    pub next_sequence: u64,
    pub saved_at: Option<DateTime<Utc>>,
}

#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Load the last persisted state, or `None` when nothing was ever saved.
    async fn load(&self) -> Result<Option<PersistedState>>;

    /// Persist a snapshot. Must be atomic from the reader's point of view.
    async fn persist(&self, state: &PersistedState) -> Result<()>;
}

/// No-op backend for pure in-memory engines and tests.
#[derive(Debug, Default)]
pub struct NullBackend;

#[async_trait]
impl PersistenceBackend for NullBackend {
    async fn load(&self) -> Result<Option<PersistedState>> {
        Ok(None)
    }

    async fn persist(&self, _state: &PersistedState) -> Result<()> {
        Ok(())
    }
}
