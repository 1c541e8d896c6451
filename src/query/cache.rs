// src/query/cache.rs
// Fingerprint→result cache for queries. Entries expire after the configured
// TTL; capacity is enforced oldest-inserted-first like the embedding cache.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use super::QueryOutcome;

struct CachedResult {
    outcome: QueryOutcome,
    inserted_at: Instant,
}

pub struct QueryCache {
    capacity: usize,
    ttl: Duration,
    results: HashMap<String, CachedResult>,
    insertion_order: VecDeque<String>,
    hits: u64,
    misses: u64,
}

impl QueryCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            capacity: capacity.max(1),
            ttl,
            results: HashMap::new(),
            insertion_order: VecDeque::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// A cached outcome for the fingerprint, unless it has aged out.
    pub fn get(&mut self, fingerprint: &str) -> Option<QueryOutcome> {
        let valid = match self.results.get(fingerprint) {
            Some(cached) => cached.inserted_at.elapsed() <= self.ttl,
            None => false,
        };
        if !valid {
            self.results.remove(fingerprint);
            self.misses += 1;
            return None;
        }
        self.hits += 1;
        self.results.get(fingerprint).map(|c| c.outcome.clone())
    }

    pub fn insert(&mut self, fingerprint: String, outcome: QueryOutcome) {
        if self
            .results
            .insert(
                fingerprint.clone(),
                CachedResult {
                    outcome,
                    inserted_at: Instant::now(),
                },
            )
            .is_none()
        {
            self.insertion_order.push_back(fingerprint);
        }

        while self.results.len() > self.capacity {
            match self.insertion_order.pop_front() {
                Some(oldest) => {
                    self.results.remove(&oldest);
                }
                None => break,
            }
        }
    }

    /// Drop everything. Called whenever stored state changes enough that
    /// cached rankings could be stale (store/update/delete/consolidate).
    pub fn invalidate(&mut self) {
        self.results.clear();
        self.insertion_order.clear();
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}
