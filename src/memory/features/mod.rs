//! Scoring and maintenance logic layered over the tiered store.

pub mod consolidation;
pub mod retention;
