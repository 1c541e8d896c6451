// src/engine/maintenance.rs

//! Background maintenance: the consolidation timer and the autosave timer.
//! Both are engine-owned, cancellable tasks created in `initialize` and
//! drained in `shutdown`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::MemoryEngineConfig;
use crate::events::{NotificationBus, NotificationKind};
use crate::memory::features::consolidation::run_consolidation;
use crate::memory::RetentionScorer;
use crate::persistence::PersistenceBackend;
use crate::query::QueryCache;

use super::EngineState;

pub(crate) struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn spawn(
        config: MemoryEngineConfig,
        state: Arc<RwLock<EngineState>>,
        backend: Arc<dyn PersistenceBackend>,
        query_cache: Arc<Mutex<QueryCache>>,
        bus: NotificationBus,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::new();

        if config.consolidation_interval_secs > 0 {
            handles.push(spawn_consolidation_timer(
                config.clone(),
                state.clone(),
                query_cache,
                bus.clone(),
                cancel.clone(),
            ));
        }
        if config.autosave_interval_secs > 0 {
            handles.push(spawn_autosave_timer(
                config.autosave_interval_secs,
                state,
                backend,
                bus,
                cancel.clone(),
            ));
        }

        Self { cancel, handles }
    }

    /// Cancel and await every task; nothing is left in flight afterwards.
    pub async fn stop(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(err) = handle.await {
                warn!("maintenance task aborted uncleanly: {err}");
            }
        }
    }
}

fn spawn_consolidation_timer(
    config: MemoryEngineConfig,
    state: Arc<RwLock<EngineState>>,
    query_cache: Arc<Mutex<QueryCache>>,
    bus: NotificationBus,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let scorer = RetentionScorer::new();
        let mut ticker = interval(Duration::from_secs(config.consolidation_interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so a fresh engine does
        // not consolidate an empty store.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let report = {
                        let mut state = state.write().await;
                        run_consolidation(&mut state.store, &scorer, &config, false, Utc::now())
                    };
                    if report.consolidated > 0 || report.pruned > 0 || report.archived > 0 {
                        query_cache.lock().await.invalidate();
                        bus.emit_report(&report);
                    }
                    debug!(
                        "scheduled consolidation: {} promoted, {} pruned, {} archived",
                        report.consolidated, report.pruned, report.archived
                    );
                }
            }
        }
        debug!("consolidation timer stopped");
    })
}

fn spawn_autosave_timer(
    interval_secs: u64,
    state: Arc<RwLock<EngineState>>,
    backend: Arc<dyn PersistenceBackend>,
    bus: NotificationBus,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(interval_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let snapshot = state.read().await.snapshot();
                    if let Err(err) = backend.persist(&snapshot).await {
                        // Autosave failure is reported, never fatal; the
                        // next tick retries with fresh state.
                        warn!("autosave failed: {err:#}");
                        bus.emit(NotificationKind::EngineError {
                            message: format!("autosave failed: {err}"),
                        });
                    } else {
                        debug!("autosave flushed");
                    }
                }
            }
        }
        debug!("autosave timer stopped");
    })
}
