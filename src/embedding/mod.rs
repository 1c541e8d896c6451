// src/embedding/mod.rs

//! Pluggable text→vector strategy plus the memoizing cache in front of it.
//! All embedding traffic in the engine goes through [`EmbeddingService`],
//! never direct provider calls in business logic.

pub mod cache;
pub mod hash;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::MemoryError;
use cache::EmbeddingCache;

pub use hash::HashEmbedder;

/// Strategy interface for whatever turns text into vectors. The shipped
/// [`HashEmbedder`] is a deterministic placeholder; a production deployment
/// swaps in a real model client without touching the engine.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed many texts in one backend call. The returned list must line up
    /// one-to-one with `texts`.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Fixed dimensionality of every vector this provider produces.
    fn dimension(&self) -> usize;

    /// Identifier recorded on entries so vectors from different models are
    /// never compared.
    fn model_name(&self) -> &str;
}

/// Provider plus cache. Clone-cheap via `Arc`s; shared by the store and the
/// query engine.
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<Mutex<EmbeddingCache>>,
    batch_size: usize,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, cache_size: usize, batch_size: usize) -> Self {
        Self {
            provider,
            cache: Arc::new(Mutex::new(EmbeddingCache::new(cache_size))),
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_name(&self) -> String {
        self.provider.model_name().to_string()
    }

    pub fn dimension(&self) -> usize {
        self.provider.dimension()
    }

    /// Embed one text, consulting the cache first.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        {
            let mut cache = self.cache.lock().await;
            if let Some(vector) = cache.get(text) {
                return Ok(vector);
            }
        }

        let vector = self.provider.embed(text).await?;
        self.cache.lock().await.insert(text, vector.clone());
        Ok(vector)
    }

    /// Embed one text but swallow provider failure: the caller gets `None`
    /// and keeps going. Losing a memory is worse than losing its vector.
    pub async fn embed_lossy(&self, text: &str) -> Option<Vec<f32>> {
        match self.embed(text).await {
            Ok(vector) => Some(vector),
            Err(err) => {
                warn!("embedding degraded to none: {err:#}");
                None
            }
        }
    }

    /// Embed many texts with as few provider calls as possible. Cache hits
    /// are filled in place; only misses go out, chunked at the configured
    /// batch size. Output order matches input order exactly.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut miss_indices: Vec<usize> = Vec::new();

        {
            let mut cache = self.cache.lock().await;
            for (i, text) in texts.iter().enumerate() {
                match cache.get(text) {
                    Some(vector) => results[i] = Some(vector),
                    None => miss_indices.push(i),
                }
            }
        }

        debug!(
            "batch embed: {} texts, {} cache hits, {} provider calls",
            texts.len(),
            texts.len() - miss_indices.len(),
            miss_indices.len().div_ceil(self.batch_size)
        );

        for chunk in miss_indices.chunks(self.batch_size) {
            let chunk_texts: Vec<String> =
                chunk.iter().map(|&i| texts[i].clone()).collect();
            let vectors = self.provider.embed_batch(&chunk_texts).await?;

            // Misaligned provider output would attach wrong vectors to
            // entries; abort instead.
            if vectors.len() != chunk_texts.len() {
                return Err(MemoryError::BatchMismatch {
                    expected: chunk_texts.len(),
                    got: vectors.len(),
                }
                .into());
            }

            let mut cache = self.cache.lock().await;
            for (&i, vector) in chunk.iter().zip(vectors) {
                cache.insert(&texts[i], vector.clone());
                results[i] = Some(vector);
            }
        }

        // Every slot was either a hit or filled by a chunk above.
        Ok(results.into_iter().map(|v| v.unwrap_or_default()).collect())
    }

    /// (hits, misses, current size) of the underlying cache.
    pub async fn cache_stats(&self) -> (u64, u64, usize) {
        let cache = self.cache.lock().await;
        (cache.hits(), cache.misses(), cache.len())
    }

    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
    }
}

/// Cosine similarity between two vectors; 0.0 when lengths differ or either
/// norm is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
