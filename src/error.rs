// src/error.rs

//! Typed failures the engine reports alongside `anyhow::Result` at the
//! facade. Anything a caller can branch on lives here; everything else is
//! context-wrapped `anyhow`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("batch embedding misaligned: expected {expected} vectors, got {got}")]
    BatchMismatch { expected: usize, got: usize },

    #[error("engine is shut down")]
    EngineClosed,
}
