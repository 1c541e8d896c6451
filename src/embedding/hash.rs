// src/embedding/hash.rs
// Deterministic hash-based embedding fallback. No model, no network: each
// token (and adjacent token pair) is hashed into a fixed-dimension vector,
// so identical text always produces an identical, L2-normalized vector and
// texts sharing vocabulary land near each other.

use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::EmbeddingProvider;

pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(8),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        let tokens: Vec<String> = text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        for token in &tokens {
            self.accumulate(&mut vector, token);
        }
        // Adjacent pairs keep a little word order in the signal.
        for pair in tokens.windows(2) {
            self.accumulate(&mut vector, &format!("{} {}", pair[0], pair[1]));
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }

    fn accumulate(&self, vector: &mut [f32], token: &str) {
        let digest = Sha256::digest(token.as_bytes());
        let bucket = u64::from_le_bytes(digest[0..8].try_into().unwrap_or([0; 8]));
        let index = (bucket % self.dimension as u64) as usize;
        // Second hash word decides the sign, halving accidental collisions.
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign;
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_sync(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "hash-ngram-v1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[tokio::test]
    async fn identical_text_gives_identical_vectors() {
        let embedder = HashEmbedder::new(128);
        let a = embedder.embed("refactor the query engine").await.unwrap();
        let b = embedder.embed("refactor the query engine").await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn vectors_are_normalized() {
        let embedder = HashEmbedder::new(128);
        let v = embedder.embed("some text to embed").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn shared_vocabulary_scores_higher_than_disjoint() {
        let embedder = HashEmbedder::new(256);
        let base = embedder.embed("refactor the memory store").await.unwrap();
        let near = embedder.embed("refactor the query store").await.unwrap();
        let far = embedder.embed("completely unrelated banana metrics").await.unwrap();
        assert!(
            cosine_similarity(&base, &near) > cosine_similarity(&base, &far)
        );
    }

    #[tokio::test]
    async fn empty_text_embeds_to_zero_vector() {
        let embedder = HashEmbedder::new(64);
        let v = embedder.embed("").await.unwrap();
        assert!(v.iter().all(|&x| x == 0.0));
    }
}
