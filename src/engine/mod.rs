// src/engine/mod.rs

//! The engine facade: owns the tiers, the timeline, the caches, and the
//! background maintenance tasks, and exposes the whole public operation
//! surface. Mutating operations serialize on one write lock; reads take the
//! read lock and hand back owned copies, never aliases into the store.

pub mod maintenance;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MemoryEngineConfig;
use crate::embedding::{EmbeddingProvider, EmbeddingService, HashEmbedder};
use crate::error::MemoryError;
use crate::events::{MemoryNotification, NotificationBus, NotificationKind};
use crate::memory::features::consolidation::run_consolidation;
use crate::memory::store::{initial_importance, TieredStore};
use crate::memory::types::{MemoryEntry, StoreRequest, UpdateRequest};
use crate::memory::{ConsolidationReport, RetentionScorer};
use crate::persistence::{NullBackend, PersistedState, PersistenceBackend};
use crate::query::{
    collect_candidates, rank, MemoryFilter, MemoryQuery, QueryCache, QueryOutcome, TagMatch,
};
use crate::stats::{CacheStats, MemoryStatistics};
use crate::timeline::{
    EpochTransition, TimelineEpoch, TimelineEvent, TimelineEventKind, TimelineState,
};

use maintenance::BackgroundTasks;

/// Everything behind the single state lock: the tiers with their indexes,
/// and the timeline. Keeping them under one lock makes a store (tier insert
/// + index updates + timeline stamp) one atomic unit.
pub(crate) struct EngineState {
    pub store: TieredStore,
    pub timeline: TimelineState,
}

impl EngineState {
    fn snapshot(&self) -> PersistedState {
        let (short_term, long_term) = self.store.snapshot();
        let (epochs, events, current_epoch, next_sequence) = self.timeline.snapshot();
        PersistedState {
            short_term,
            long_term,
            epochs,
            events,
            current_epoch,
            next_sequence,
            saved_at: None,
        }
    }

    fn restore(&mut self, persisted: PersistedState) {
        self.store.restore(persisted.short_term, persisted.long_term);
        self.timeline.restore(
            persisted.epochs,
            persisted.events,
            persisted.current_epoch,
            persisted.next_sequence,
        );
    }
}

pub struct MemoryEngine {
    config: MemoryEngineConfig,
    state: Arc<RwLock<EngineState>>,
    embeddings: EmbeddingService,
    backend: Arc<dyn PersistenceBackend>,
    query_cache: Arc<Mutex<QueryCache>>,
    bus: NotificationBus,
    scorer: RetentionScorer,
    tasks: Mutex<Option<BackgroundTasks>>,
    closed: AtomicBool,
}

impl MemoryEngine {
    pub fn new(
        config: MemoryEngineConfig,
        provider: Arc<dyn EmbeddingProvider>,
        backend: Arc<dyn PersistenceBackend>,
    ) -> Self {
        let embeddings = EmbeddingService::new(
            provider,
            config.embedding_cache_size,
            config.embedding_batch_size,
        );
        let query_cache = Arc::new(Mutex::new(QueryCache::new(
            config.query_cache_size,
            Duration::from_secs(config.query_cache_ttl_secs),
        )));
        let state = Arc::new(RwLock::new(EngineState {
            store: TieredStore::new(),
            timeline: TimelineState::new(config.timeline_enabled, config.auto_epoch_detection),
        }));

        Self {
            config,
            state,
            embeddings,
            backend,
            query_cache,
            bus: NotificationBus::new(256),
            scorer: RetentionScorer::new(),
            tasks: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    /// Pure in-memory engine: deterministic hash embeddings, no persistence.
    pub fn in_memory(config: MemoryEngineConfig) -> Self {
        let dimension = config.embedding_dimension;
        Self::new(
            config,
            Arc::new(HashEmbedder::new(dimension)),
            Arc::new(NullBackend),
        )
    }

    /// Load persisted state and start the background timers. Idempotent:
    /// calling twice does not double the timers.
    pub async fn initialize(&self) -> Result<()> {
        self.closed.store(false, Ordering::SeqCst);

        if let Some(persisted) = self.backend.load().await? {
            let mut state = self.state.write().await;
            state.restore(persisted);
            info!(
                "engine initialized with {} short-term / {} long-term entries",
                state.store.short_term_len(),
                state.store.long_term_len()
            );
        }

        let mut tasks = self.tasks.lock().await;
        if tasks.is_none() {
            *tasks = Some(BackgroundTasks::spawn(
                self.config.clone(),
                self.state.clone(),
                self.backend.clone(),
                self.query_cache.clone(),
                self.bus.clone(),
            ));
        }
        Ok(())
    }

    /// Cancel and drain every background task, then flush persistence. New
    /// mutations are refused afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);

        if let Some(tasks) = self.tasks.lock().await.take() {
            tasks.stop().await;
        }

        self.persist().await?;
        info!("memory engine shut down");
        Ok(())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MemoryNotification> {
        self.bus.subscribe()
    }

    fn ensure_open(&self) -> Result<(), MemoryError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(MemoryError::EngineClosed)
        } else {
            Ok(())
        }
    }

    // ── CRUD ──────────────────────────────────────────────────────────

    /// Store one memory. Embedding failure degrades to an un-embedded entry;
    /// crossing the short-term watermark triggers an eager consolidation
    /// pass before returning.
    pub async fn store(&self, request: StoreRequest) -> Result<MemoryEntry> {
        self.ensure_open()?;

        let embedding = if request.skip_embedding {
            None
        } else {
            self.embeddings.embed_lossy(&request.content).await
        };

        let entry = self.store_prepared(request, embedding).await;
        self.maybe_eager_consolidate().await;
        Ok(entry)
    }

    /// Store many memories with a single batched embedding call. Result
    /// order corresponds one-to-one with the input order.
    pub async fn store_batch(&self, requests: Vec<StoreRequest>) -> Result<Vec<MemoryEntry>> {
        self.ensure_open()?;

        let texts: Vec<String> = requests.iter().map(|r| r.content.clone()).collect();
        let vectors = match self.embeddings.embed_batch(&texts).await {
            Ok(vectors) => vectors.into_iter().map(Some).collect(),
            Err(err) => {
                // Same degradation contract as single store: keep the
                // memories, lose the vectors.
                warn!("batch embedding degraded to none: {err:#}");
                vec![None; requests.len()]
            }
        };

        let mut entries = Vec::with_capacity(requests.len());
        for (request, vector) in requests.into_iter().zip(vectors) {
            let embedding = if request.skip_embedding {
                None
            } else {
                vector.filter(|v: &Vec<f32>| !v.is_empty())
            };
            entries.push(self.store_prepared(request, embedding).await);
        }

        self.maybe_eager_consolidate().await;
        Ok(entries)
    }

    async fn store_prepared(
        &self,
        request: StoreRequest,
        embedding: Option<Vec<f32>>,
    ) -> MemoryEntry {
        let now = Utc::now();
        let importance = initial_importance(
            &request.content,
            request.metadata.tool_name.as_deref(),
            request.metadata.verified,
            request.metadata.confidence,
        );
        let embedding_model = embedding.as_ref().map(|_| self.embeddings.model_name());

        let mut state = self.state.write().await;
        let stamp = state.timeline.next_stamp(request.phase);
        let entry = MemoryEntry {
            id: Uuid::new_v4(),
            content: request.content,
            kind: request.kind,
            embedding,
            embedding_model,
            importance,
            decay_rate: request.decay_rate.unwrap_or(self.config.default_decay_rate),
            access_count: 0,
            metadata: request.metadata,
            stamp,
            created_at: now,
            updated_at: now,
            last_accessed: now,
            expires_at: request.expires_at,
            parent_id: request.parent_id,
            related_ids: request.related_ids,
            tags: request.tags,
            archived: false,
        };
        state.store.insert(entry.clone());
        drop(state);

        self.query_cache.lock().await.invalidate();
        self.bus.emit(NotificationKind::Stored { id: entry.id });
        debug!("stored {} ({})", entry.id, entry.kind.as_str());
        entry
    }

    /// Fetch a copy of one entry, stamping the access (last-accessed, count,
    /// importance boost). `None` on a miss, never an error.
    pub async fn get(&self, id: &Uuid) -> Option<MemoryEntry> {
        let mut state = self.state.write().await;
        let entry = state.store.get_mut(id)?;
        entry.touch(Some(self.config.access_boost));
        let copy = entry.clone();
        drop(state);

        self.bus.emit(NotificationKind::Retrieved { id: copy.id });
        Some(copy)
    }

    /// Merge partial fields into an entry. Content changes re-embed;
    /// kind/source/tag changes re-index. `None` when the id is unknown.
    pub async fn update(&self, id: &Uuid, request: UpdateRequest) -> Result<Option<MemoryEntry>> {
        self.ensure_open()?;
        if request.is_empty() {
            return Ok(self.peek(id).await);
        }

        // Embed outside the lock; the entry is re-checked afterwards.
        let new_embedding = match &request.content {
            Some(content) => self.embeddings.embed_lossy(content).await,
            None => None,
        };

        let mut state = self.state.write().await;
        let Some(before) = state.store.get(id).cloned() else {
            return Ok(None);
        };

        let mut after = before.clone();
        if let Some(content) = request.content {
            after.content = content;
            after.embedding = new_embedding;
            after.embedding_model = after
                .embedding
                .as_ref()
                .map(|_| self.embeddings.model_name());
        }
        if let Some(kind) = request.kind {
            after.kind = kind;
        }
        if let Some(source) = request.source {
            after.metadata.source = source;
        }
        if let Some(tags) = request.tags {
            after.tags = tags;
        }
        if let Some(importance) = request.importance {
            after.importance = importance;
            after.clip_importance();
        }
        if let Some(phase) = request.phase {
            after.stamp.phase = Some(phase);
        }
        if let Some(related) = request.related_ids {
            after.related_ids = related;
        }
        if let Some(verified) = request.verified {
            after.metadata.verified = verified;
        }
        after.updated_at = Utc::now();

        let copy = after.clone();
        state.store.apply_reindexed(&before, after);
        drop(state);

        self.query_cache.lock().await.invalidate();
        self.bus.emit(NotificationKind::Updated { id: *id });
        Ok(Some(copy))
    }

    /// Remove an entry from its tier and every index. Returns whether the
    /// id existed; never fails.
    pub async fn delete(&self, id: &Uuid) -> bool {
        let removed = {
            let mut state = self.state.write().await;
            state.store.remove(id).is_some()
        };
        if removed {
            self.query_cache.lock().await.invalidate();
            self.bus.emit(NotificationKind::Deleted { id: *id });
        }
        removed
    }

    /// Read an entry without access bookkeeping (internal and test use).
    pub async fn peek(&self, id: &Uuid) -> Option<MemoryEntry> {
        self.state.read().await.store.get(id).cloned()
    }

    // ── Query ─────────────────────────────────────────────────────────

    /// Ranked semantic retrieval. Returned entries get the same access
    /// bookkeeping as `get`.
    pub async fn query(&self, query: MemoryQuery) -> Result<QueryOutcome> {
        self.ensure_open()?;
        query.validate()?;

        let fingerprint = query.fingerprint();
        if let Some(cached) = self.query_cache.lock().await.get(&fingerprint) {
            debug!("query cache hit for {:.12}", fingerprint);
            return Ok(cached);
        }

        let started = Instant::now();
        let query_vector = match &query.embedding {
            Some(vector) => Some(vector.clone()),
            None => Some(self.embeddings.embed(&query.text).await?),
        };

        let candidates = {
            let state = self.state.read().await;
            collect_candidates(&state.store, query.filter.as_ref())
        };
        let (mut hits, total_candidates) = rank(
            candidates,
            query_vector.as_deref(),
            query.min_similarity,
            query.sort,
            query.top_k,
        );

        // Reads reinforce importance: touch every returned entry and mirror
        // the bookkeeping onto the copies handed back.
        {
            let mut state = self.state.write().await;
            for hit in &mut hits {
                if let Some(entry) = state.store.get_mut(&hit.entry.id) {
                    entry.touch(Some(self.config.access_boost));
                    hit.entry.access_count = entry.access_count;
                    hit.entry.importance = entry.importance;
                    hit.entry.last_accessed = entry.last_accessed;
                }
            }
        }
        for hit in &hits {
            self.bus
                .emit(NotificationKind::Retrieved { id: hit.entry.id });
        }

        let outcome = QueryOutcome {
            entries: hits,
            total_candidates,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        // Single cache write at completion; an abandoned query never gets
        // this far and so never half-updates the cache.
        self.query_cache
            .lock()
            .await
            .insert(fingerprint, outcome.clone());
        Ok(outcome)
    }

    /// `query` with defaults: top-10, relevance order.
    pub async fn search(&self, text: &str) -> Result<QueryOutcome> {
        self.query(MemoryQuery::new(text)).await
    }

    /// Entries created inside the range, importance-descending. No
    /// embeddings involved.
    pub async fn get_by_time_range(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Vec<MemoryEntry> {
        let filter = MemoryFilter {
            created_after: Some(start),
            created_before: Some(end),
            ..Default::default()
        };
        let state = self.state.read().await;
        let mut entries = collect_candidates(&state.store, Some(&filter));
        entries.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }

    /// Tag-indexed lookup (union for any, intersection for all),
    /// importance-descending. No embeddings involved.
    pub async fn get_by_tags(&self, tags: &[String], tag_match: TagMatch) -> Vec<MemoryEntry> {
        let filter = MemoryFilter {
            tags: tags.to_vec(),
            tag_match,
            ..Default::default()
        };
        let state = self.state.read().await;
        let mut entries = collect_candidates(&state.store, Some(&filter));
        entries.sort_by(|a, b| {
            b.importance
                .partial_cmp(&a.importance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        entries
    }

    // ── Timeline ──────────────────────────────────────────────────────

    /// Open a new epoch, implicitly closing any open one first. `None` when
    /// the timeline is disabled.
    pub async fn start_epoch(&self, name: &str, description: &str) -> Option<TimelineEpoch> {
        let mut state = self.state.write().await;
        if !state.timeline.enabled {
            return None;
        }

        if let Some(closed) = Self::close_open_epoch(&mut state) {
            self.bus.emit(NotificationKind::EpochEnded {
                epoch_id: closed.id,
                name: closed.name.clone(),
                memory_count: closed.memory_count,
            });
        }
        let epoch = state.timeline.open_epoch(name, description);
        drop(state);

        self.bus.emit(NotificationKind::EpochStarted {
            epoch_id: epoch.id,
            name: epoch.name.clone(),
        });
        Some(epoch)
    }

    /// Close the open epoch, computing its memory counts from the epoch
    /// index. No-op (`None`) when nothing is open.
    pub async fn end_epoch(&self) -> Option<TimelineEpoch> {
        let mut state = self.state.write().await;
        let closed = Self::close_open_epoch(&mut state)?;
        drop(state);

        self.bus.emit(NotificationKind::EpochEnded {
            epoch_id: closed.id,
            name: closed.name.clone(),
            memory_count: closed.memory_count,
        });
        Some(closed)
    }

    fn close_open_epoch(state: &mut EngineState) -> Option<TimelineEpoch> {
        let open_id = state.timeline.current_epoch_id()?;
        let (total, important) = state.store.epoch_counts(&open_id);
        state.timeline.close_current(total, important)
    }

    pub async fn current_epoch(&self) -> Option<TimelineEpoch> {
        self.state.read().await.timeline.current_epoch().cloned()
    }

    pub async fn epoch(&self, id: &Uuid) -> Option<TimelineEpoch> {
        self.state.read().await.timeline.epoch(id).cloned()
    }

    /// Append an immutable event. With auto-detection on, start events open
    /// an epoch named after the event and complete events close the open
    /// one. `None` when the timeline is disabled.
    pub async fn capture_event(
        &self,
        kind: TimelineEventKind,
        description: &str,
        related_memory_ids: Vec<Uuid>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Option<TimelineEvent> {
        let mut state = self.state.write().await;
        if !state.timeline.enabled {
            return None;
        }

        let mut epoch_notes: Vec<NotificationKind> = Vec::new();
        if state.timeline.auto_detect {
            match kind.epoch_transition() {
                Some(EpochTransition::Open) => {
                    if let Some(closed) = Self::close_open_epoch(&mut state) {
                        epoch_notes.push(NotificationKind::EpochEnded {
                            epoch_id: closed.id,
                            name: closed.name.clone(),
                            memory_count: closed.memory_count,
                        });
                    }
                    let epoch = state.timeline.open_epoch(description, "");
                    epoch_notes.push(NotificationKind::EpochStarted {
                        epoch_id: epoch.id,
                        name: epoch.name,
                    });
                }
                Some(EpochTransition::Close) => {
                    if let Some(closed) = Self::close_open_epoch(&mut state) {
                        epoch_notes.push(NotificationKind::EpochEnded {
                            epoch_id: closed.id,
                            name: closed.name.clone(),
                            memory_count: closed.memory_count,
                        });
                    }
                }
                None => {}
            }
        }

        let event = state
            .timeline
            .record_event(kind, description, related_memory_ids, metadata);
        drop(state);

        for note in epoch_notes {
            self.bus.emit(note);
        }
        self.bus
            .emit(NotificationKind::EventCaptured { event_id: event.id });
        Some(event)
    }

    pub async fn timeline_events(&self) -> Vec<TimelineEvent> {
        self.state.read().await.timeline.events().to_vec()
    }

    // ── Maintenance ───────────────────────────────────────────────────

    /// Run one consolidation pass now (the timer calls the same logic).
    pub async fn consolidate(&self) -> ConsolidationReport {
        self.run_consolidation_pass(false).await
    }

    async fn run_consolidation_pass(&self, force: bool) -> ConsolidationReport {
        let report = {
            let mut state = self.state.write().await;
            run_consolidation(&mut state.store, &self.scorer, &self.config, force, Utc::now())
        };
        if report.consolidated > 0 || report.pruned > 0 || report.archived > 0 {
            self.query_cache.lock().await.invalidate();
            self.bus.emit_report(&report);
        }
        report
    }

    async fn maybe_eager_consolidate(&self) {
        let over_watermark = {
            let state = self.state.read().await;
            state.store.short_term_len() > self.config.eager_consolidation_watermark()
        };
        if over_watermark {
            debug!("short-term over watermark, forcing consolidation");
            self.run_consolidation_pass(true).await;
        }
    }

    /// Flush the current state through the persistence backend.
    pub async fn persist(&self) -> Result<()> {
        let snapshot = self.state.read().await.snapshot();
        self.backend.persist(&snapshot).await
    }

    /// Wipe all entries, epochs, events, and caches.
    pub async fn clear(&self) {
        {
            let mut state = self.state.write().await;
            state.store.clear();
            state.timeline.clear();
        }
        self.query_cache.lock().await.invalidate();
        self.embeddings.clear_cache().await;
        info!("memory engine cleared");
    }

    // ── Statistics ────────────────────────────────────────────────────

    pub async fn statistics(&self) -> MemoryStatistics {
        let mut stats = MemoryStatistics::empty();

        {
            let state = self.state.read().await;
            stats.short_term_count = state.store.short_term_len();
            stats.long_term_count = state.store.long_term_len();
            for entry in state.store.all_entries() {
                stats.count_kind(entry.kind);
                stats.count_source(entry.metadata.source);
                if entry.archived {
                    stats.archived_count += 1;
                }
            }
            stats.epoch_count = state.timeline.epoch_count();
            stats.open_epoch = state.timeline.current_epoch().map(|e| e.name.clone());
            stats.event_count = state.timeline.events().len();
        }

        let (hits, misses, size) = self.embeddings.cache_stats().await;
        stats.embedding_cache = CacheStats { hits, misses, size };

        let query_cache = self.query_cache.lock().await;
        stats.query_cache = CacheStats {
            hits: query_cache.hits(),
            misses: query_cache.misses(),
            size: query_cache.len(),
        };
        stats
    }
}
