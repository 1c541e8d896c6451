// src/lib.rs

//! Tiered, importance-weighted memory for autonomous coding agents: a
//! short-term/long-term store with vector-similarity retrieval, timeline
//! and epoch bookkeeping, and background consolidation of what is worth
//! keeping.

pub mod config;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod events;
pub mod memory;
pub mod persistence;
pub mod query;
pub mod stats;
pub mod timeline;

pub use config::MemoryEngineConfig;
pub use embedding::{EmbeddingProvider, HashEmbedder};
pub use engine::MemoryEngine;
pub use error::MemoryError;
pub use events::{MemoryNotification, NotificationKind};
pub use memory::{
    ConsolidationReport, MemoryEntry, MemoryKind, MemoryMetadata, MemorySource, StoreRequest,
    UpdateRequest,
};
pub use persistence::{JsonFileBackend, NullBackend, PersistenceBackend};
pub use query::{MemoryFilter, MemoryQuery, QueryOutcome, ScoredMemory, SortKey, TagMatch};
pub use stats::MemoryStatistics;
pub use timeline::{TimelineEpoch, TimelineEvent, TimelineEventKind};
