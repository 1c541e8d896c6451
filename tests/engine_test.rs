// tests/engine_test.rs

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use mnemo::engine::MemoryEngine;
use mnemo::query::MemoryQuery;
use mnemo::timeline::TimelineEventKind;
use mnemo::{
    EmbeddingProvider, JsonFileBackend, MemoryEngineConfig, MemoryFilter, MemoryKind,
    NotificationKind, SortKey, StoreRequest, TagMatch,
};

/// Engine with background timers disabled, so tests control every pass.
fn quiet_engine() -> MemoryEngine {
    init_tracing();
    MemoryEngine::in_memory(quiet_config())
}

/// Route engine logs through the test harness; later calls are no-ops.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .with_test_writer()
        .try_init();
}

fn quiet_config() -> MemoryEngineConfig {
    MemoryEngineConfig {
        consolidation_interval_secs: 0,
        autosave_interval_secs: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn store_then_get_round_trips_content() {
    let engine = quiet_engine();

    let stored = engine
        .store(StoreRequest::new("the build uses workspace lints", MemoryKind::Learning))
        .await
        .unwrap();

    let fetched = engine.get(&stored.id).await.unwrap();
    assert_eq!(fetched.content, "the build uses workspace lints");
    assert_eq!(fetched.kind, MemoryKind::Learning);
    // Access bookkeeping: the fetch itself counts.
    assert_eq!(fetched.access_count, 1);
    assert!(fetched.importance > stored.importance);
}

#[tokio::test]
async fn importance_stays_clipped_after_repeated_access() {
    let engine = quiet_engine();
    let stored = engine
        .store(StoreRequest::new("hot entry", MemoryKind::Context))
        .await
        .unwrap();

    for _ in 0..50 {
        engine.get(&stored.id).await.unwrap();
    }

    let entry = engine.peek(&stored.id).await.unwrap();
    assert!(entry.importance <= 1.0);
    assert_eq!(entry.access_count, 50);
}

#[tokio::test]
async fn get_returns_none_for_unknown_id() {
    let engine = quiet_engine();
    assert!(engine.get(&uuid::Uuid::new_v4()).await.is_none());
    assert!(!engine.delete(&uuid::Uuid::new_v4()).await);
}

#[tokio::test]
async fn delete_removes_entry_from_tag_lookup() {
    let engine = quiet_engine();
    let stored = engine
        .store(
            StoreRequest::new("tagged memory", MemoryKind::Decision)
                .with_tags(["architecture", "storage"]),
        )
        .await
        .unwrap();

    assert_eq!(
        engine
            .get_by_tags(&["architecture".to_string()], TagMatch::Any)
            .await
            .len(),
        1
    );

    assert!(engine.delete(&stored.id).await);

    assert!(engine
        .get_by_tags(&["architecture".to_string()], TagMatch::Any)
        .await
        .is_empty());
    assert!(engine.peek(&stored.id).await.is_none());
}

#[tokio::test]
async fn update_merges_fields_and_reindexes() {
    let engine = quiet_engine();
    let stored = engine
        .store(StoreRequest::new("initial text", MemoryKind::Context).with_tags(["old"]))
        .await
        .unwrap();

    let updated = engine
        .update(
            &stored.id,
            mnemo::UpdateRequest {
                content: Some("revised text".to_string()),
                tags: Some(["new".to_string()].into_iter().collect()),
                importance: Some(2.5), // must clip to 1.0
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.content, "revised text");
    assert_eq!(updated.importance, 1.0);
    assert!(engine
        .get_by_tags(&["old".to_string()], TagMatch::Any)
        .await
        .is_empty());
    assert_eq!(
        engine
            .get_by_tags(&["new".to_string()], TagMatch::Any)
            .await
            .len(),
        1
    );

    // Unknown id is a no-op, not an error.
    let missing = engine
        .update(&uuid::Uuid::new_v4(), mnemo::UpdateRequest::default())
        .await
        .unwrap();
    assert!(missing.is_none());
}

#[tokio::test]
async fn store_batch_preserves_input_order() {
    let engine = quiet_engine();
    let requests: Vec<StoreRequest> = (0..5)
        .map(|i| StoreRequest::new(format!("batch item {i}"), MemoryKind::Conversation))
        .collect();

    let entries = engine.store_batch(requests).await.unwrap();

    assert_eq!(entries.len(), 5);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.content, format!("batch item {i}"));
        assert!(entry.embedding.is_some());
    }
}

#[tokio::test]
async fn consolidation_moves_promoted_entries_out_of_short_term() {
    let engine = quiet_engine();
    let stored = engine
        .store(StoreRequest::new("valuable fact", MemoryKind::Learning).verified())
        .await
        .unwrap();

    let report = engine.consolidate().await;

    assert_eq!(report.consolidated, 1);
    assert!(report.promoted_ids.contains(&stored.id));
    let stats = engine.statistics().await;
    assert_eq!(stats.short_term_count, 0);
    assert_eq!(stats.long_term_count, 1);
}

#[tokio::test]
async fn crossing_the_occupancy_watermark_triggers_consolidation() {
    // max_short_term = 50: the 41st store crosses 80% occupancy and must
    // drain the short-term tier automatically.
    let engine = MemoryEngine::in_memory(MemoryEngineConfig {
        max_short_term: 50,
        ..quiet_config()
    });

    for i in 0..41 {
        engine
            .store(StoreRequest::new(format!("entry {i}"), MemoryKind::Context))
            .await
            .unwrap();
    }

    let stats = engine.statistics().await;
    assert!(
        stats.short_term_count < 50,
        "short-term still at {}",
        stats.short_term_count
    );
    assert!(stats.long_term_count > 0);
}

#[tokio::test]
async fn closing_an_epoch_reports_its_memory_count() {
    let engine = quiet_engine();

    let epoch_a = engine.start_epoch("A", "first session").await.unwrap();
    for i in 0..3 {
        engine
            .store(StoreRequest::new(format!("epoch-a memory {i}"), MemoryKind::Context))
            .await
            .unwrap();
    }
    engine.start_epoch("B", "second session").await.unwrap();

    let closed_a = engine.epoch(&epoch_a.id).await.unwrap();
    assert_eq!(closed_a.memory_count, 3);
    assert!(closed_a.ended_at.is_some());

    let open = engine.current_epoch().await.unwrap();
    assert_eq!(open.name, "B");
}

#[tokio::test]
async fn entries_are_stamped_with_per_epoch_sequences() {
    let engine = quiet_engine();
    engine.start_epoch("A", "").await.unwrap();

    let first = engine
        .store(StoreRequest::new("first", MemoryKind::Context))
        .await
        .unwrap();
    let second = engine
        .store(StoreRequest::new("second", MemoryKind::Context))
        .await
        .unwrap();
    assert_eq!(first.stamp.sequence, 0);
    assert_eq!(second.stamp.sequence, 1);

    engine.start_epoch("B", "").await.unwrap();
    let restarted = engine
        .store(StoreRequest::new("third", MemoryKind::Context))
        .await
        .unwrap();
    assert_eq!(restarted.stamp.sequence, 0);
    assert_ne!(restarted.stamp.epoch_id, first.stamp.epoch_id);
}

#[tokio::test]
async fn session_events_drive_epochs_when_auto_detection_is_on() {
    let engine = quiet_engine();

    engine
        .capture_event(
            TimelineEventKind::SessionStart,
            "fix flaky test",
            vec![],
            serde_json::Map::new(),
        )
        .await
        .unwrap();
    assert_eq!(engine.current_epoch().await.unwrap().name, "fix flaky test");

    engine
        .capture_event(
            TimelineEventKind::SessionComplete,
            "done",
            vec![],
            serde_json::Map::new(),
        )
        .await
        .unwrap();
    assert!(engine.current_epoch().await.is_none());
    assert_eq!(engine.timeline_events().await.len(), 2);
}

#[tokio::test]
async fn query_filters_by_tags_with_all_semantics() {
    let engine = quiet_engine();
    engine
        .store(StoreRequest::new("has both", MemoryKind::Code).with_tags(["x", "y"]))
        .await
        .unwrap();
    engine
        .store(StoreRequest::new("has one", MemoryKind::Code).with_tags(["x"]))
        .await
        .unwrap();

    let outcome = engine
        .query(
            MemoryQuery::new("anything").with_filter(MemoryFilter {
                tags: vec!["x".to_string()],
                tag_match: TagMatch::All,
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    // tags=["x"] with all-match returns every entry whose tag set contains x.
    assert_eq!(outcome.entries.len(), 2);
    for hit in &outcome.entries {
        assert!(hit.entry.tags.contains("x"));
    }

    let outcome = engine
        .query(
            MemoryQuery::new("anything").with_filter(MemoryFilter {
                tags: vec!["x".to_string(), "y".to_string()],
                tag_match: TagMatch::All,
                ..Default::default()
            }),
        )
        .await
        .unwrap();
    assert_eq!(outcome.entries.len(), 1);
    assert_eq!(outcome.entries[0].entry.content, "has both");
}

#[tokio::test]
async fn importance_sorted_results_are_non_increasing() {
    let engine = quiet_engine();
    engine
        .store(StoreRequest::new("plain", MemoryKind::Context))
        .await
        .unwrap();
    engine
        .store(StoreRequest::new("trusted", MemoryKind::Context).verified())
        .await
        .unwrap();
    engine
        .store(StoreRequest::new("tool sourced", MemoryKind::Context).with_tool("cargo"))
        .await
        .unwrap();

    let outcome = engine
        .query(MemoryQuery::new("anything").sorted_by(SortKey::Importance))
        .await
        .unwrap();

    for pair in outcome.entries.windows(2) {
        assert!(pair[0].entry.importance >= pair[1].entry.importance);
    }
}

#[tokio::test]
async fn malformed_queries_are_rejected_without_side_effects() {
    let engine = quiet_engine();
    engine
        .store(StoreRequest::new("something", MemoryKind::Context))
        .await
        .unwrap();

    let before = engine.statistics().await;
    assert!(engine.query(MemoryQuery::new("")).await.is_err());
    assert!(engine
        .query(MemoryQuery::new("ok").with_top_k(0))
        .await
        .is_err());

    let after = engine.statistics().await;
    assert_eq!(before.short_term_count, after.short_term_count);
}

#[tokio::test]
async fn queries_reinforce_returned_entries() {
    let engine = quiet_engine();
    let stored = engine
        .store(StoreRequest::new("refactor the scheduler", MemoryKind::Code))
        .await
        .unwrap();

    let outcome = engine.search("refactor the scheduler").await.unwrap();
    assert!(!outcome.entries.is_empty());

    let entry = engine.peek(&stored.id).await.unwrap();
    assert_eq!(entry.access_count, 1);
    assert!(entry.importance > stored.importance);
}

#[tokio::test]
async fn notifications_fan_out_to_subscribers() {
    let engine = quiet_engine();
    let mut rx = engine.subscribe();

    let stored = engine
        .store(StoreRequest::new("observable", MemoryKind::Context))
        .await
        .unwrap();

    let notification = rx.recv().await.unwrap();
    match notification.kind {
        NotificationKind::Stored { id } => assert_eq!(id, stored.id),
        other => panic!("expected Stored, got {other:?}"),
    }
}

#[tokio::test]
async fn statistics_pre_populate_every_category() {
    let engine = quiet_engine();
    let stats = engine.statistics().await;

    assert_eq!(stats.by_kind.len(), 10);
    assert_eq!(stats.by_source.len(), 5);
    assert_eq!(stats.by_kind.get("error"), Some(&0));
    assert_eq!(stats.by_source.get("external"), Some(&0));
}

#[tokio::test]
async fn clear_wipes_entries_and_timeline() {
    let engine = quiet_engine();
    engine.start_epoch("work", "").await.unwrap();
    engine
        .store(StoreRequest::new("soon gone", MemoryKind::Context))
        .await
        .unwrap();

    engine.clear().await;

    let stats = engine.statistics().await;
    assert_eq!(stats.short_term_count, 0);
    assert_eq!(stats.epoch_count, 0);
    assert_eq!(stats.event_count, 0);
    assert!(engine.current_epoch().await.is_none());
}

#[tokio::test]
async fn state_survives_shutdown_and_reinitialize() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("memory.json");
    let config = quiet_config();

    let first = MemoryEngine::new(
        config.clone(),
        Arc::new(mnemo::HashEmbedder::new(config.embedding_dimension)),
        Arc::new(JsonFileBackend::new(&path)),
    );
    first.initialize().await.unwrap();
    let stored = first
        .store(StoreRequest::new("durable memory", MemoryKind::Learning).with_tags(["keep"]))
        .await
        .unwrap();
    first.start_epoch("session", "").await.unwrap();
    first.shutdown().await.unwrap();

    // Mutations after shutdown are refused.
    assert!(first
        .store(StoreRequest::new("late", MemoryKind::Context))
        .await
        .is_err());

    let second = MemoryEngine::new(
        config.clone(),
        Arc::new(mnemo::HashEmbedder::new(config.embedding_dimension)),
        Arc::new(JsonFileBackend::new(&path)),
    );
    second.initialize().await.unwrap();

    let restored = second.peek(&stored.id).await.unwrap();
    assert_eq!(restored.content, "durable memory");
    assert_eq!(
        second
            .get_by_tags(&["keep".to_string()], TagMatch::Any)
            .await
            .len(),
        1
    );
    assert_eq!(second.current_epoch().await.unwrap().name, "session");
    second.shutdown().await.unwrap();
}

// ── Similarity scenarios with a fixed-vector provider ────────────────

/// Provider returning hand-picked vectors, for exact similarity control.
struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| vec![0.0, 0.0]))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "fixed-test"
    }
}

#[tokio::test]
async fn min_similarity_returns_exactly_the_strong_matches() {
    let vectors: HashMap<String, Vec<f32>> = [
        ("refactor".to_string(), vec![1.0, 0.0]),
        ("close match".to_string(), vec![1.0, 0.0]),
        ("decent match".to_string(), vec![0.8, 0.6]),
        ("unrelated".to_string(), vec![0.0, 1.0]),
    ]
    .into_iter()
    .collect();

    let engine = MemoryEngine::new(
        quiet_config(),
        Arc::new(FixedEmbedder { vectors }),
        Arc::new(mnemo::NullBackend),
    );

    for text in ["close match", "decent match", "unrelated"] {
        engine
            .store(StoreRequest::new(text, MemoryKind::Context))
            .await
            .unwrap();
    }

    let outcome = engine
        .query(MemoryQuery::new("refactor").with_min_similarity(0.5))
        .await
        .unwrap();

    // Exactly the two entries above the floor, descending similarity.
    assert_eq!(outcome.entries.len(), 2);
    assert_eq!(outcome.total_candidates, 2);
    assert_eq!(outcome.entries[0].entry.content, "close match");
    assert_eq!(outcome.entries[1].entry.content, "decent match");
    assert!(outcome.entries[0].similarity >= outcome.entries[1].similarity);
}

#[tokio::test]
async fn relevance_sorted_results_are_non_increasing_in_similarity() {
    let vectors: HashMap<String, Vec<f32>> = [
        ("q".to_string(), vec![1.0, 0.0]),
        ("a".to_string(), vec![0.9, 0.1]),
        ("b".to_string(), vec![0.5, 0.5]),
        ("c".to_string(), vec![0.1, 0.9]),
    ]
    .into_iter()
    .collect();

    let engine = MemoryEngine::new(
        quiet_config(),
        Arc::new(FixedEmbedder { vectors }),
        Arc::new(mnemo::NullBackend),
    );
    for text in ["b", "c", "a"] {
        engine
            .store(StoreRequest::new(text, MemoryKind::Context))
            .await
            .unwrap();
    }

    let outcome = engine.query(MemoryQuery::new("q")).await.unwrap();
    assert_eq!(outcome.entries.len(), 3);
    for pair in outcome.entries.windows(2) {
        assert!(pair[0].similarity >= pair[1].similarity);
    }
    assert_eq!(outcome.entries[0].entry.content, "a");
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let engine = quiet_engine();
    engine
        .store(StoreRequest::new("cached content", MemoryKind::Context))
        .await
        .unwrap();

    engine.search("cached content").await.unwrap();
    engine.search("cached content").await.unwrap();

    let stats = engine.statistics().await;
    assert!(stats.query_cache.hits >= 1);

    // A store invalidates cached rankings; the next query misses.
    engine
        .store(StoreRequest::new("new content", MemoryKind::Context))
        .await
        .unwrap();
    engine.search("cached content").await.unwrap();
    let stats = engine.statistics().await;
    assert!(stats.query_cache.misses >= 2);
}

/// Provider that always returns one vector too few from a batch call.
struct ShortBatchEmbedder;

#[async_trait]
impl EmbeddingProvider for ShortBatchEmbedder {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(vec![1.0, 0.0])
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
    }

    fn dimension(&self) -> usize {
        2
    }

    fn model_name(&self) -> &str {
        "short-batch-test"
    }
}

#[tokio::test]
async fn misaligned_batch_embeddings_keep_entries_without_vectors() {
    let engine = MemoryEngine::new(
        quiet_config(),
        Arc::new(ShortBatchEmbedder),
        Arc::new(mnemo::NullBackend),
    );

    let entries = engine
        .store_batch(vec![
            StoreRequest::new("first note", MemoryKind::Context),
            StoreRequest::new("second note", MemoryKind::Context),
            StoreRequest::new("third note", MemoryKind::Context),
        ])
        .await
        .unwrap();

    // The memories survive the misaligned provider; only the vectors are lost.
    assert_eq!(entries.len(), 3);
    for entry in &entries {
        assert!(entry.embedding.is_none());
        assert!(entry.embedding_model.is_none());
        assert!(engine.peek(&entry.id).await.is_some());
    }
}
