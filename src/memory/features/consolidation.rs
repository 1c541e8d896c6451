// src/memory/features/consolidation.rs

//! One consolidation pass: score everything short-term, prune the worst,
//! promote the good, and flag stale long-term entries for archival. Runs
//! under the engine's write lock; the engine decides when (timer or the 80%
//! occupancy trigger) and emits notifications from the returned report.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::MemoryEngineConfig;
use crate::memory::store::TieredStore;
use super::retention::RetentionScorer;

/// What one pass did, with the affected ids for notification fan-out.
#[derive(Debug, Default, Clone)]
pub struct ConsolidationReport {
    pub consolidated: usize,
    pub archived: usize,
    pub pruned: usize,
    pub promoted_ids: Vec<Uuid>,
    pub pruned_ids: Vec<Uuid>,
    pub archived_ids: Vec<Uuid>,
}

pub fn run_consolidation(
    store: &mut TieredStore,
    scorer: &RetentionScorer,
    config: &MemoryEngineConfig,
    force: bool,
    now: DateTime<Utc>,
) -> ConsolidationReport {
    let mut report = ConsolidationReport::default();

    // 1. Score every short-term entry. Entries past their expiry are treated
    //    as prune candidates regardless of score.
    let mut scored: Vec<(Uuid, f32, bool)> = Vec::new();
    for entry in store.short_term_entries() {
        let expired = entry.expires_at.is_some_and(|at| at <= now);
        scored.push((entry.id, scorer.score(entry, now), expired));
    }

    // 2. Split into prune and promote candidates. A forced pass (occupancy
    //    trigger) promotes everything that is not being pruned.
    let mut prune_candidates: Vec<(Uuid, f32)> = Vec::new();
    let mut promote_candidates: Vec<Uuid> = Vec::new();
    for (id, score, expired) in scored {
        if expired || score < config.prune_threshold {
            prune_candidates.push((id, score));
        } else if force || score >= config.consolidation_threshold {
            promote_candidates.push(id);
        }
    }

    // 3. Delete only the lowest-scoring fraction of the prune set this
    //    cycle. The cap is the backpressure valve keeping one burst from
    //    erasing a whole tier at once; rounding up keeps every non-empty
    //    prune set shrinking by at least one entry, so a lone expired
    //    entry still goes this pass instead of lingering forever.
    prune_candidates
        .sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
    let prune_now = ((prune_candidates.len() as f32) * config.prune_fraction.clamp(0.0, 1.0))
        .ceil() as usize;
    for (id, score) in prune_candidates.into_iter().take(prune_now) {
        match store.remove(&id) {
            Some(_) => {
                debug!("pruned {} (score {:.3})", id, score);
                report.pruned += 1;
                report.pruned_ids.push(id);
            }
            // Skipped, not fatal: a concurrent delete got there first.
            None => warn!("prune candidate {} vanished mid-pass", id),
        }
    }

    // 4. Promote the rest.
    for id in promote_candidates {
        if store.promote(&id) {
            report.consolidated += 1;
            report.promoted_ids.push(id);
        }
    }

    // 5. Archival sweep over long-term: old and below HIGH importance gets
    //    flagged, never deleted. Physical migration is the persistence
    //    backend's business.
    let archive_cutoff = now - Duration::seconds((config.archive_age_hours * 3600.0) as i64);
    for entry in store.long_term_entries_mut() {
        if !entry.archived && entry.created_at < archive_cutoff && entry.importance < 0.8 {
            entry.archived = true;
            report.archived += 1;
            report.archived_ids.push(entry.id);
        }
    }

    if report.consolidated > 0 || report.pruned > 0 || report.archived > 0 {
        info!(
            "consolidation: {} promoted, {} pruned, {} archived (forced: {})",
            report.consolidated, report.pruned, report.archived, force
        );
    }
    report
}
