//! Memory data model, tiered storage, and the retention/consolidation
//! features that move entries between tiers.

pub mod features;
pub mod index;
pub mod store;
pub mod types;

pub use features::consolidation::ConsolidationReport;
pub use features::retention::RetentionScorer;
pub use store::{Tier, TieredStore};
pub use types::{
    MemoryEntry, MemoryKind, MemoryMetadata, MemorySource, StoreRequest, TimelineStamp,
    UpdateRequest,
};
