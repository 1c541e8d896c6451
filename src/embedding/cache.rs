// src/embedding/cache.rs
// Bounded text→vector memoization. Eviction is strictly oldest-inserted
// first (not LRU): re-reading an entry does not renew its slot.

use std::collections::{HashMap, VecDeque};

pub struct EmbeddingCache {
    capacity: usize,
    vectors: HashMap<String, Vec<f32>>,
    insertion_order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl EmbeddingCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            vectors: HashMap::new(),
            insertion_order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    pub fn get(&mut self, text: &str) -> Option<Vec<f32>> {
        match self.vectors.get(text) {
            Some(vector) => {
                self.hits += 1;
                Some(vector.clone())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, text: &str, vector: Vec<f32>) {
        if self.vectors.insert(text.to_string(), vector).is_none() {
            self.insertion_order.push_back(text.to_string());
        }

        while self.vectors.len() > self.capacity {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.vectors.remove(&oldest);
                }
                None => break,
            }
        }
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        self.vectors.clear();
        self.insertion_order.clear();
    }
}
